//! The route-table-backed chain member.
//!
//! # Responsibilities
//! - Resolve the request path against exposed service routes
//! - Dispatch the action and map its outcome onto the response
//! - Tag every log line of an exchange with a correlation id
//!
//! # Design Decisions
//! - Unmatched paths and unaccepted verbs are not claimed (fall through)
//! - Failures close the response here; success leaves it for the server
//! - Handler error details go to the log, never into the response

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::http::{HttpContext, ServerError};
use crate::observability::Logger;
use crate::routing::chain::RouteHandler;
use crate::routing::dispatcher::{DispatchError, Dispatcher};
use crate::routing::table::RouteTable;
use crate::routing::template::{normalize_route, RouteError};
use crate::service::{DependencyResolver, ExposedService, InstanceMode, ResolveError};

/// Startup failure while registering services.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// Serves the routes of exposed services.
pub struct ServiceRouteHandler {
    table: RouteTable,
    dispatcher: Dispatcher,
    logger: Arc<dyn Logger>,
}

impl ServiceRouteHandler {
    /// Register every service. Strict singletons are resolved here.
    pub fn new(
        services: Vec<ExposedService>,
        resolver: Arc<dyn DependencyResolver>,
        logger: Arc<dyn Logger>,
    ) -> Result<Self, RegistrationError> {
        let mut table = RouteTable::new();

        for service in services {
            if service.slot().mode() == InstanceMode::SingletonStrict {
                service.slot().instance(resolver.as_ref())?;
            }
            let name = service.service().name();
            for action in table.register_service(service)? {
                logger.info(&format!(
                    "Exposed {} route '{}' [{}]",
                    name,
                    action.route(),
                    action.methods().join(",")
                ));
            }
        }

        Ok(Self {
            table,
            dispatcher: Dispatcher::new(resolver),
            logger,
        })
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }
}

#[async_trait]
impl RouteHandler for ServiceRouteHandler {
    async fn handle_route(&self, ctx: &mut HttpContext) -> Result<bool, ServerError> {
        let path = normalize_route(ctx.request().path()).to_string();
        let Some(route_match) = self.table.resolve(&path) else {
            return Ok(false);
        };

        let method = ctx.request().method();
        if !route_match.action().accepts(method) {
            tracing::debug!(path = %path, method = %method, "Verb not accepted by route");
            return Ok(false);
        }

        let correlation_id = Uuid::new_v4();
        self.logger
            .info(&format!("{} Handling route {} {}", correlation_id, method, path));

        match self.dispatcher.dispatch(&route_match, ctx.shared_request()).await {
            Ok(Some(value)) => {
                let body = serde_json::to_string(&value).map_err(DispatchError::Encode);
                match body {
                    Ok(body) => {
                        ctx.response.headers_mut().set("Content-Type", "application/json");
                        ctx.response.write_content(&body)?;
                    }
                    Err(e) => return self.fail(ctx, correlation_id, &path, e).await,
                }
            }
            Ok(None) => {}
            Err(DispatchError::BadRequest(message)) => {
                self.logger.warn(&format!(
                    "{} Bad request on {}: {}",
                    correlation_id, path, message
                ));
                ctx.response.bad_request(&message);
                ctx.response.close().await?;
                return Ok(true);
            }
            Err(e) => return self.fail(ctx, correlation_id, &path, e).await,
        }

        self.logger
            .info(&format!("{} Routing ended gracefully {}", correlation_id, path));
        Ok(true)
    }
}

impl ServiceRouteHandler {
    async fn fail(
        &self,
        ctx: &mut HttpContext,
        correlation_id: Uuid,
        path: &str,
        error: DispatchError,
    ) -> Result<bool, ServerError> {
        self.logger.error(&format!(
            "{} Routing failed, action for {} failed: {}",
            correlation_id, path, error
        ));
        let (status, reason) = error.status_line();
        ctx.response.set_status(status);
        ctx.response.set_reason(reason);
        ctx.response.close().await?;
        Ok(true)
    }
}
