//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (net)
//!     → request.rs (parse request line, headers, Content-Length body)
//!     → response.rs (response shell bound to the write half)
//!     → context.rs (request + response handed to the chain)
//!     → server.rs (run the route handler chain, close exactly once)
//!     → Send to client, tear the connection down
//! ```

pub mod context;
pub mod headers;
pub mod request;
pub mod response;
pub mod server;

pub use context::HttpContext;
pub use headers::HeaderMap;
pub use request::{ParseError, Request, RequestReader};
pub use response::{canonical_reason, Response, ResponseError, ResponseSink};
pub use server::{RestServer, ServerError, ServerHandle};
