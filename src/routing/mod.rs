//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route Compilation (at startup):
//!     ServiceBuilder declarations
//!     → template.rs (tokens → property bindings, anchored matcher)
//!     → action.rs (input descriptor + execution strategy)
//!     → table.rs (literal map + ordered parameterized list)
//!
//! Incoming Request:
//!     → chain.rs (members in registration order)
//!     → handler.rs (ServiceRouteHandler: resolve path, check verb)
//!     → dispatcher.rs (bind input, resolve instance, invoke)
//!     → Response: JSON value, 400, 500, or fall through
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - Literal routes checked before parameterized ones
//! - Deterministic: first registered parameterized match wins

pub mod action;
pub mod chain;
pub mod dispatcher;
pub mod handler;
pub mod table;
pub mod template;

pub use action::{Action, ExposedAction, Json, OutputShape, RouteInput, RouteParams};
pub use chain::{RouteHandler, RouteHandlerChain};
pub use dispatcher::{DispatchError, Dispatcher};
pub use handler::{RegistrationError, ServiceRouteHandler};
pub use table::{RouteMatch, RouteTable};
pub use template::{Property, RouteError, RouteTemplate, ScalarKind};
