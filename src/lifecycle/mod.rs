//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Init tracing → Register services → Launch listener
//!
//! Shutdown (shutdown.rs):
//!     Ctrl-C → Shutdown::trigger → accept loop exits → listener stopped
//!     In-flight connections run to completion
//! ```

pub mod shutdown;

pub use shutdown::{Shutdown, ShutdownSignal};
