//! Route lookup.
//!
//! # Responsibilities
//! - Store exposed actions under their compiled routes
//! - Resolve a request path to an action plus raw parameter values
//! - Reject duplicate literal routes at registration
//!
//! # Design Decisions
//! - Built once at startup, read-only afterwards (no locks)
//! - O(1) literal lookup via a lower-cased HashMap key
//! - Parameterized routes scanned in registration order, first match wins
//! - A literal route always beats a parameterized one

use std::collections::HashMap;
use std::sync::Arc;

use crate::routing::action::ExposedAction;
use crate::routing::template::{normalize_route, RouteError};
use crate::service::ExposedService;

/// A resolved route: the action and its raw parameter values.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    action: Arc<ExposedAction>,
    params: Vec<String>,
}

impl RouteMatch {
    pub fn action(&self) -> &ExposedAction {
        &self.action
    }

    /// Raw (still percent-encoded) values, in binding order.
    pub fn params(&self) -> &[String] {
        &self.params
    }
}

/// Literal and parameterized routes of every exposed service.
#[derive(Debug, Default)]
pub struct RouteTable {
    literal: HashMap<String, Arc<ExposedAction>>,
    parameterized: Vec<Arc<ExposedAction>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one action.
    pub fn register(&mut self, action: ExposedAction) -> Result<Arc<ExposedAction>, RouteError> {
        let action = Arc::new(action);
        if action.template().is_parameterized() {
            self.parameterized.push(Arc::clone(&action));
        } else {
            let key = action.route().to_ascii_lowercase();
            if self.literal.contains_key(&key) {
                return Err(RouteError::DuplicateRoute(action.route().to_string()));
            }
            self.literal.insert(key, Arc::clone(&action));
        }
        Ok(action)
    }

    /// Add every action of a service.
    pub fn register_service(&mut self, service: ExposedService) -> Result<Vec<Arc<ExposedAction>>, RouteError> {
        service
            .into_actions()
            .into_iter()
            .map(|action| self.register(action))
            .collect()
    }

    /// Find the action for a request path.
    pub fn resolve(&self, path: &str) -> Option<RouteMatch> {
        let path = normalize_route(path);

        if let Some(action) = self.literal.get(&path.to_ascii_lowercase()) {
            return Some(RouteMatch {
                action: Arc::clone(action),
                params: Vec::new(),
            });
        }

        self.parameterized.iter().find_map(|action| {
            action.template().extract(path).map(|params| RouteMatch {
                action: Arc::clone(action),
                params,
            })
        })
    }

    pub fn len(&self) -> usize {
        self.literal.len() + self.parameterized.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
