//! Binding request data to an action and invoking it.
//!
//! # Data Flow
//! ```text
//! RouteMatch + Request
//!     → bind_input (body decode, path params overwrite properties)
//!     → ServiceSlot::instance (resolver / singleton)
//!     → Execution strategy (void / value / deferred)
//!     → Option<Value>: None means "nothing to report"
//! ```

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use serde_json::Value;
use thiserror::Error;

use crate::http::Request;
use crate::routing::action::{ActionArgs, ExposedAction, Execution, InputKind};
use crate::routing::table::RouteMatch;
use crate::service::{DependencyResolver, ResolveError, ServiceCallError};

/// Error type for action dispatch.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Request data could not be bound to the action's input.
    #[error("{0}")]
    BadRequest(String),

    /// The handler itself failed.
    #[error("Handler failed: {0:#}")]
    Handler(anyhow::Error),

    #[error("Failed to encode handler result: {0}")]
    Encode(#[source] serde_json::Error),

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

impl DispatchError {
    /// Service call error carried by a handler failure, if any.
    pub fn service_call(&self) -> Option<&ServiceCallError> {
        match self {
            DispatchError::Handler(e) => ServiceCallError::find(e),
            _ => None,
        }
    }

    /// Status code and reason phrase this failure answers with.
    pub fn status_line(&self) -> (u16, String) {
        match self {
            DispatchError::BadRequest(msg) => (400, format!("Bad Request - {}", msg)),
            _ => match self.service_call() {
                Some(call) => (call.status, call.reason.clone()),
                None => (500, "Internal Server Error".to_string()),
            },
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn panicked(payload: Box<dyn Any + Send>) -> DispatchError {
    DispatchError::Handler(anyhow::anyhow!("handler panicked: {}", panic_message(payload)))
}

fn is_blank(body: &[u8]) -> bool {
    body.iter().all(u8::is_ascii_whitespace)
}

/// Build the arguments for an action from the request and path values.
///
/// Returns `None` for actions that take no input.
pub fn bind_input(
    action: &ExposedAction,
    request: &Request,
    params: &[String],
) -> Result<Option<ActionArgs>, DispatchError> {
    let Some(input) = action.input() else {
        return Ok(None);
    };

    let body = match input.kind {
        InputKind::Json => String::new(),
        InputKind::RawBody | InputKind::JsonAndBody => request
            .body_str()
            .map_err(|e| DispatchError::BadRequest(format!("Request body is not valid UTF-8: {}", e)))?
            .to_string(),
    };

    let mut json = match input.kind {
        InputKind::RawBody => Value::Null,
        InputKind::Json | InputKind::JsonAndBody if is_blank(request.body()) => {
            input.default_value().map_err(DispatchError::Encode)?
        }
        InputKind::Json | InputKind::JsonAndBody => serde_json::from_slice(request.body())
            .map_err(|e| DispatchError::BadRequest(format!("Invalid JSON body for {}: {}", input.type_name, e)))?,
    };

    let bindings = action.template().bindings();
    if !bindings.is_empty() {
        let route = action.route();
        let Value::Object(fields) = &mut json else {
            return Err(DispatchError::BadRequest(format!(
                "Route '{}' requires a JSON object body for {}",
                route, input.type_name
            )));
        };

        for (binding, raw) in bindings.iter().zip(params) {
            let decoded = urlencoding::decode(raw).map_err(|e| {
                DispatchError::BadRequest(format!("Invalid encoding in {} '{}': {}", binding.token, raw, e))
            })?;
            let value = binding.kind.convert(&decoded).map_err(|_| {
                DispatchError::BadRequest(format!(
                    "Unable to convert {} '{}' to destination type {} on Route '{}'",
                    binding.token, decoded, binding.kind, route
                ))
            })?;
            fields.retain(|name, _| !name.eq_ignore_ascii_case(binding.property));
            fields.insert(binding.property.to_string(), value);
        }
    }

    Ok(Some(ActionArgs { json, body }))
}

/// Invokes resolved actions.
#[derive(Clone)]
pub struct Dispatcher {
    resolver: Arc<dyn DependencyResolver>,
}

impl Dispatcher {
    pub fn new(resolver: Arc<dyn DependencyResolver>) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &dyn DependencyResolver {
        self.resolver.as_ref()
    }

    /// Bind, resolve, invoke. `Ok(None)` means there is nothing to report.
    pub async fn dispatch(&self, route_match: &RouteMatch, request: Arc<Request>) -> Result<Option<Value>, DispatchError> {
        let action = route_match.action();
        let args = bind_input(action, &request, route_match.params())?;
        let instance = action.slot().instance(self.resolver.as_ref())?;

        let value = match action.execution() {
            Execution::Void(invoke) => {
                std::panic::catch_unwind(AssertUnwindSafe(|| invoke(instance, request, args)))
                    .map_err(panicked)??;
                return Ok(None);
            }
            Execution::Value(invoke) => {
                std::panic::catch_unwind(AssertUnwindSafe(|| invoke(instance, request, args)))
                    .map_err(panicked)??
            }
            Execution::Deferred(invoke) => {
                let pending = std::panic::catch_unwind(AssertUnwindSafe(|| invoke(instance, request, args)))
                    .map_err(panicked)?;
                AssertUnwindSafe(pending).catch_unwind().await.map_err(panicked)??
            }
        };

        Ok(match value {
            Value::Null => None,
            value => Some(value),
        })
    }
}
