//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events (connection_id, peer_addr, correlation_id fields)
//!
//! Route handlers produce:
//!     → Logger (info / warn / error), TracingLogger by default
//!
//! Consumers:
//!     → fmt layer on stdout (pretty or JSON)
//! ```

pub mod logging;

pub use logging::{init_tracing, Logger, LoggingError, TracingLogger};
