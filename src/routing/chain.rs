//! Ordered, pluggable route handlers.

use std::sync::Arc;

use async_trait::async_trait;

use crate::http::{HttpContext, ServerError};

/// One member of the route handler chain.
///
/// `Ok(true)` claims the request and stops the chain. A claiming member may
/// leave the response open; the server closes it afterwards.
#[async_trait]
pub trait RouteHandler: Send + Sync {
    async fn handle_route(&self, ctx: &mut HttpContext) -> Result<bool, ServerError>;
}

/// Members in registration order plus an optional fallback.
#[derive(Default, Clone)]
pub struct RouteHandlerChain {
    handlers: Vec<Arc<dyn RouteHandler>>,
    not_found: Option<Arc<dyn RouteHandler>>,
}

impl RouteHandlerChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, handler: Arc<dyn RouteHandler>) {
        self.handlers.push(handler);
    }

    /// Runs when no member claims the request.
    pub fn set_not_found(&mut self, handler: Arc<dyn RouteHandler>) {
        self.not_found = Some(handler);
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Offer the exchange to each member until one claims it.
    pub async fn handle(&self, ctx: &mut HttpContext) -> Result<bool, ServerError> {
        for handler in &self.handlers {
            if handler.handle_route(ctx).await? {
                return Ok(true);
            }
        }
        match &self.not_found {
            Some(handler) => handler.handle_route(ctx).await,
            None => Ok(false),
        }
    }
}
