//! Response buffering and one-shot serialization.
//!
//! # Responsibilities
//! - Hold status, reason, headers and an in-memory body
//! - Serialize everything onto the connection exactly once
//! - Tear the socket down after sending
//!
//! # Design Decisions
//! - Body writes only touch the buffer; nothing reaches the wire before `close`
//! - `Content-Length` is always computed from the buffer, never chunked
//! - A second `close` is a programmer error and fails loudly

use std::fmt;

use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::http::headers::HeaderMap;

/// Outbound byte sink of a connection.
pub type ResponseSink = Box<dyn AsyncWrite + Send + Unpin>;

/// Error type for response operations.
#[derive(Debug, Error)]
pub enum ResponseError {
    /// `close` (or a write) after the response was already closed.
    #[error("Response is already closed")]
    AlreadyClosed,

    #[error("I/O error while sending response: {0}")]
    Io(#[from] std::io::Error),
}

/// Standard reason phrase for the status codes this server produces.
pub fn canonical_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        503 => "Service Unavailable",
        _ => "",
    }
}

/// An HTTP response bound to one connection.
pub struct Response {
    version: String,
    status: u16,
    reason: String,
    headers: HeaderMap,
    body: Vec<u8>,
    closed: bool,
    sink: Option<ResponseSink>,
}

impl Response {
    /// Create the response shell for a request of the given protocol version.
    pub fn new(version: impl Into<String>, sink: ResponseSink) -> Self {
        let mut headers = HeaderMap::new();
        headers.set("Connection", "close");
        Self {
            version: version.into(),
            status: 200,
            reason: "OK".to_string(),
            headers,
            body: Vec::new(),
            closed: false,
            sink: Some(sink),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Set the status code and its standard reason phrase.
    pub fn set_status(&mut self, status: u16) {
        self.status = status;
        self.reason = canonical_reason(status).to_string();
    }

    /// Override the reason phrase. CR and LF are replaced with spaces.
    pub fn set_reason(&mut self, reason: impl Into<String>) {
        self.reason = reason.into().replace(['\r', '\n'], " ");
    }

    pub fn not_found(&mut self) {
        self.set_status(404);
    }

    pub fn internal_server_error(&mut self) {
        self.set_status(500);
    }

    /// 400 with the failure message carried in the reason phrase.
    pub fn bad_request(&mut self, message: &str) {
        self.status = 400;
        self.set_reason(format!("Bad Request - {}", message));
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Append UTF-8 text to the body buffer.
    pub fn write_content(&mut self, text: &str) -> Result<(), ResponseError> {
        self.write_bytes(text.as_bytes())
    }

    /// Append raw bytes to the body buffer.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), ResponseError> {
        if self.closed {
            return Err(ResponseError::AlreadyClosed);
        }
        self.body.extend_from_slice(bytes);
        Ok(())
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Status line and header block, including the trailing blank line.
    fn head(&self) -> String {
        let mut headers = self.headers.clone();
        headers.remove("Content-Length");
        format!(
            "{} {} {}\r\n{}Content-Length: {}\r\n\r\n",
            self.version,
            self.status,
            self.reason,
            headers,
            self.body.len()
        )
    }

    /// Send the response and release the connection.
    ///
    /// May be called once. The closed flag is set before any I/O, so a
    /// failed send still counts as the one close.
    pub async fn close(&mut self) -> Result<(), ResponseError> {
        if self.closed {
            return Err(ResponseError::AlreadyClosed);
        }
        self.closed = true;

        let Some(mut sink) = self.sink.take() else {
            return Ok(());
        };

        let head = self.head();
        sink.write_all(head.as_bytes()).await?;
        sink.write_all(&self.body).await?;
        sink.flush().await?;
        sink.shutdown().await?;

        tracing::trace!(
            status = self.status,
            body_len = self.body.len(),
            "Response sent"
        );
        Ok(())
    }

    /// Drop the connection without sending anything.
    pub async fn abort(&mut self) {
        self.closed = true;
        if let Some(mut sink) = self.sink.take() {
            if let Err(e) = sink.shutdown().await {
                tracing::trace!(error = %e, "Shutdown on abort failed");
            }
        }
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("version", &self.version)
            .field("status", &self.status)
            .field("reason", &self.reason)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .field("closed", &self.closed)
            .finish()
    }
}
