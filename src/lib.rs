//! Embeddable REST server library

pub mod config;
pub mod files;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;
pub mod service;

pub use config::schema::ServerConfig;
pub use http::{HttpContext, RestServer, ServerError, ServerHandle};
pub use lifecycle::{Shutdown, ShutdownSignal};
pub use observability::{Logger, TracingLogger};
pub use routing::{Action, Json, RouteHandler, RouteParams};
pub use service::{InstanceMode, ServiceBuilder, ServiceCallError, SimpleResolver};
