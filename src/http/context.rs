//! Per-exchange request/response pair handed to route handlers.

use std::sync::Arc;

use crate::http::request::Request;
use crate::http::response::Response;

/// One request and the response that answers it.
///
/// The request is shared read-only with handler invocations; the response has
/// exactly one writer, whichever chain member currently holds the context.
#[derive(Debug)]
pub struct HttpContext {
    request: Arc<Request>,
    /// The response being built for this exchange.
    pub response: Response,
}

impl HttpContext {
    pub fn new(request: Request, response: Response) -> Self {
        Self {
            request: Arc::new(request),
            response,
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Shared handle to the request, for handlers that outlive a borrow.
    pub fn shared_request(&self) -> Arc<Request> {
        Arc::clone(&self.request)
    }
}
