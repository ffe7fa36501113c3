//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (start / accept_next / stop)
//!     → connection.rs (id, peer address, read/write halves)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - One request/response exchange per connection (no keep-alive)
//! - No backpressure: accepted connections are not counted or bounded

pub mod connection;
pub mod listener;

pub use connection::{Connection, ConnectionId};
pub use listener::{Listener, ListenerError};
