//! Request model and wire parser.
//!
//! # Responsibilities
//! - Read bytes until the header block terminator (CRLFCRLF)
//! - Tokenize request line and headers with `httparse`, then read `Content-Length`
//! - Read exactly `Content-Length` body bytes
//!
//! # Design Decisions
//! - No size caps; the body grows only as bytes arrive, never to the declared length up front
//! - Any framing problem is a `ParseError` and the connection is dropped
//! - The parsed `Request` is immutable

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::http::headers::HeaderMap;

const READ_CHUNK: usize = 4096;
const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";
const INITIAL_HEADERS: usize = 64;

/// Malformed request framing. The peer gets no response.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("I/O error while reading request: {0}")]
    Io(#[from] std::io::Error),

    /// Peer closed the connection before sending anything.
    #[error("Connection closed before a request was received")]
    ConnectionClosed,

    #[error("Connection closed in the middle of a request")]
    UnexpectedEof,

    #[error("Request head is not valid UTF-8")]
    InvalidEncoding,

    #[error("Malformed request line: {0}")]
    MalformedRequestLine(httparse::Error),

    #[error("Unsupported protocol version")]
    InvalidVersion,

    #[error("Invalid request target: {0:?}")]
    InvalidTarget(String),

    #[error("Malformed header: {0}")]
    MalformedHeader(httparse::Error),

    #[error("Invalid Content-Length: {0:?}")]
    InvalidContentLength(String),
}

/// A parsed HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    method: String,
    path: String,
    query: Option<String>,
    version: String,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl Request {
    /// Build a request by hand, e.g. for chain members under test.
    ///
    /// `target` is split into path and query the same way the parser does.
    pub fn new(method: impl Into<String>, target: &str) -> Self {
        let (path, query) = split_target(target);
        Self {
            method: method.into(),
            path: path.to_string(),
            query: query.map(str::to_string),
            version: "HTTP/1.1".to_string(),
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self.headers.set("Content-Length", self.body.len().to_string());
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Absolute path, still percent-encoded.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw query string without the leading `?`.
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Decoded query pairs in order of appearance.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.query
            .as_deref()
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Protocol version as sent, e.g. `HTTP/1.1`.
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body as UTF-8 text.
    pub fn body_str(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.body)
    }
}

/// Reads one request from a byte stream.
pub struct RequestReader<R> {
    inner: R,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> RequestReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(READ_CHUNK),
        }
    }

    /// Read and parse a complete request.
    pub async fn read_request(&mut self) -> Result<Request, ParseError> {
        let head_end = self.read_head().await?;

        let body_start = head_end + HEAD_TERMINATOR.len();
        let (method, target, version, headers) = parse_head(&self.buf[..body_start])?;
        let (path, query) = parse_target(&target)?;
        let content_length = content_length(&headers)?;

        let mut body = self.buf.split_off(body_start);
        self.buf.clear();

        if body.len() >= content_length {
            body.truncate(content_length);
        } else {
            // Grow with the bytes that actually arrive, never the declared size
            let remaining = (content_length - body.len()) as u64;
            (&mut self.inner).take(remaining).read_to_end(&mut body).await?;
            if body.len() < content_length {
                return Err(ParseError::UnexpectedEof);
            }
        }

        tracing::trace!(
            method = %method,
            path = %path,
            body_len = body.len(),
            "Request parsed"
        );

        Ok(Request {
            method,
            path,
            query,
            version,
            headers,
            body,
        })
    }

    /// Fill the buffer until it holds the head terminator. Returns the
    /// offset of the terminator.
    async fn read_head(&mut self) -> Result<usize, ParseError> {
        let mut chunk = [0u8; READ_CHUNK];
        let mut searched = 0;
        loop {
            if let Some(pos) = find_terminator(&self.buf[searched..]) {
                return Ok(searched + pos);
            }
            searched = self.buf.len().saturating_sub(HEAD_TERMINATOR.len() - 1);

            let n = self.inner.read(&mut chunk).await?;
            if n == 0 {
                return Err(if self.buf.is_empty() {
                    ParseError::ConnectionClosed
                } else {
                    ParseError::UnexpectedEof
                });
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }
}

fn find_terminator(haystack: &[u8]) -> Option<usize> {
    haystack
        .windows(HEAD_TERMINATOR.len())
        .position(|w| w == HEAD_TERMINATOR)
}

type Head = (String, String, String, HeaderMap);

/// Tokenize the request line and headers. `head` ends with CRLFCRLF.
fn parse_head(head: &[u8]) -> Result<Head, ParseError> {
    let mut capacity = INITIAL_HEADERS;
    loop {
        let mut slots = vec![httparse::EMPTY_HEADER; capacity];
        let mut req = httparse::Request::new(&mut slots);
        match req.parse(head) {
            Ok(httparse::Status::Complete(_)) => {}
            Ok(httparse::Status::Partial) => return Err(ParseError::UnexpectedEof),
            Err(httparse::Error::TooManyHeaders) => {
                capacity *= 2;
                continue;
            }
            Err(httparse::Error::Version) => return Err(ParseError::InvalidVersion),
            Err(e @ (httparse::Error::HeaderName | httparse::Error::HeaderValue)) => {
                return Err(ParseError::MalformedHeader(e));
            }
            Err(e) => return Err(ParseError::MalformedRequestLine(e)),
        }

        let (Some(method), Some(target), Some(minor)) = (req.method, req.path, req.version) else {
            return Err(ParseError::UnexpectedEof);
        };
        if target.is_empty() {
            return Err(ParseError::MalformedRequestLine(httparse::Error::Token));
        }

        let mut headers = HeaderMap::new();
        for header in req.headers.iter() {
            let value =
                std::str::from_utf8(header.value).map_err(|_| ParseError::InvalidEncoding)?;
            headers.append(header.name, value.trim());
        }

        return Ok((
            method.to_string(),
            target.to_string(),
            format!("HTTP/1.{}", minor),
            headers,
        ));
    }
}

fn split_target(target: &str) -> (&str, Option<&str>) {
    let target = target.split('#').next().unwrap_or_default();
    match target.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (target, None),
    }
}

fn parse_target(target: &str) -> Result<(String, Option<String>), ParseError> {
    if target.starts_with('/') || target == "*" {
        let (path, query) = split_target(target);
        return Ok((path.to_string(), query.map(str::to_string)));
    }

    // absolute-form; the authority is ignored
    if target.starts_with("http://") || target.starts_with("https://") {
        let url = url::Url::parse(target)
            .map_err(|_| ParseError::InvalidTarget(target.to_string()))?;
        return Ok((url.path().to_string(), url.query().map(str::to_string)));
    }

    Err(ParseError::InvalidTarget(target.to_string()))
}

fn content_length(headers: &HeaderMap) -> Result<usize, ParseError> {
    let values = headers.get_all("Content-Length");
    let Some(first) = values.first() else {
        return Ok(0);
    };
    if values.iter().any(|v| v != first) {
        return Err(ParseError::InvalidContentLength(values.join(", ")));
    }
    first
        .trim()
        .parse::<usize>()
        .map_err(|_| ParseError::InvalidContentLength(first.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn parse(raw: &[u8]) -> Result<Request, ParseError> {
        RequestReader::new(raw).read_request().await
    }

    #[tokio::test]
    async fn parses_simple_get() {
        let req = parse(b"GET /ping HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();
        assert_eq!(req.method(), "GET");
        assert_eq!(req.path(), "/ping");
        assert_eq!(req.query(), None);
        assert_eq!(req.version(), "HTTP/1.1");
        assert_eq!(req.header("host"), Some("localhost"));
        assert!(req.body().is_empty());
    }

    #[tokio::test]
    async fn splits_query_string() {
        let req = parse(b"GET /search?q=rust+lang&page=2 HTTP/1.1\r\n\r\n")
            .await
            .unwrap();
        assert_eq!(req.path(), "/search");
        assert_eq!(req.query(), Some("q=rust+lang&page=2"));
        assert_eq!(
            req.query_pairs(),
            vec![
                ("q".to_string(), "rust lang".to_string()),
                ("page".to_string(), "2".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn reads_body_by_content_length() {
        let req = parse(b"POST /echo HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello")
            .await
            .unwrap();
        assert_eq!(req.body(), b"hello");
        assert_eq!(req.body_str().unwrap(), "hello");
    }

    #[tokio::test]
    async fn ignores_bytes_past_content_length() {
        let req = parse(b"POST /echo HTTP/1.1\r\nContent-Length: 2\r\n\r\nhello")
            .await
            .unwrap();
        assert_eq!(req.body(), b"he");
    }

    #[tokio::test]
    async fn missing_content_length_means_empty_body() {
        let req = parse(b"POST /echo HTTP/1.1\r\n\r\nstray").await.unwrap();
        assert!(req.body().is_empty());
    }

    #[tokio::test]
    async fn body_split_across_reads() {
        let (mut client, server) = tokio::io::duplex(64);
        let reader = tokio::spawn(async move { RequestReader::new(server).read_request().await });

        use tokio::io::AsyncWriteExt;
        client
            .write_all(b"PUT /items HTTP/1.1\r\nContent-")
            .await
            .unwrap();
        client.write_all(b"Length: 11\r\n\r\nhello").await.unwrap();
        client.write_all(b" world").await.unwrap();

        let req = reader.await.unwrap().unwrap();
        assert_eq!(req.method(), "PUT");
        assert_eq!(req.body(), b"hello world");
    }

    #[tokio::test]
    async fn absolute_form_target() {
        let req = parse(b"GET http://example.com:8080/a/b?x=1 HTTP/1.1\r\n\r\n")
            .await
            .unwrap();
        assert_eq!(req.path(), "/a/b");
        assert_eq!(req.query(), Some("x=1"));
    }

    #[tokio::test]
    async fn repeated_headers_keep_order() {
        let req = parse(b"GET / HTTP/1.1\r\nAccept: a\r\naccept: b\r\n\r\n")
            .await
            .unwrap();
        assert_eq!(
            req.headers().get_all("Accept"),
            &["a".to_string(), "b".to_string()]
        );
    }

    #[tokio::test]
    async fn malformed_request_line() {
        assert!(matches!(
            parse(b"GET /only-two\r\n\r\n").await,
            Err(ParseError::MalformedRequestLine(_))
        ));
    }

    #[tokio::test]
    async fn invalid_method_and_version() {
        assert!(matches!(
            parse(b"G(T / HTTP/1.1\r\n\r\n").await,
            Err(ParseError::MalformedRequestLine(_))
        ));
        assert!(matches!(
            parse(b"GET / HTTX/1.1\r\n\r\n").await,
            Err(ParseError::InvalidVersion)
        ));
    }

    #[tokio::test]
    async fn invalid_target() {
        assert!(matches!(
            parse(b"GET relative/path HTTP/1.1\r\n\r\n").await,
            Err(ParseError::InvalidTarget(_))
        ));
    }

    #[tokio::test]
    async fn malformed_header() {
        assert!(matches!(
            parse(b"GET / HTTP/1.1\r\nNoColonHere\r\n\r\n").await,
            Err(ParseError::MalformedHeader(_))
        ));
        assert!(matches!(
            parse(b"GET / HTTP/1.1\r\nBad Name: x\r\n\r\n").await,
            Err(ParseError::MalformedHeader(_))
        ));
    }

    #[tokio::test]
    async fn invalid_content_length() {
        assert!(matches!(
            parse(b"POST / HTTP/1.1\r\nContent-Length: ten\r\n\r\n").await,
            Err(ParseError::InvalidContentLength(_))
        ));
        assert!(matches!(
            parse(b"POST / HTTP/1.1\r\nContent-Length: 1\r\nContent-Length: 2\r\n\r\nab").await,
            Err(ParseError::InvalidContentLength(_))
        ));
    }

    #[tokio::test]
    async fn eof_handling() {
        assert!(matches!(parse(b"").await, Err(ParseError::ConnectionClosed)));
        assert!(matches!(
            parse(b"GET / HTTP/1.1\r\nHost: x\r\n").await,
            Err(ParseError::UnexpectedEof)
        ));
        assert!(matches!(
            parse(b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\nshort").await,
            Err(ParseError::UnexpectedEof)
        ));
    }

    #[tokio::test]
    async fn huge_declared_length_with_short_body() {
        assert!(matches!(
            parse(b"POST /echo HTTP/1.1\r\nContent-Length: 1000000000000000\r\n\r\nhi").await,
            Err(ParseError::UnexpectedEof)
        ));
    }

    #[tokio::test]
    async fn many_headers_are_accepted() {
        let mut raw = String::from("GET / HTTP/1.1\r\n");
        for i in 0..200 {
            raw.push_str(&format!("X-H{}: {}\r\n", i, i));
        }
        raw.push_str("\r\n");
        let req = parse(raw.as_bytes()).await.unwrap();
        assert_eq!(req.headers().get("x-h199"), Some("199"));
    }

    #[test]
    fn hand_built_request() {
        let req = Request::new("POST", "/items/7?verbose=1").with_body("{}");
        assert_eq!(req.path(), "/items/7");
        assert_eq!(req.query(), Some("verbose=1"));
        assert_eq!(req.header("content-length"), Some("2"));
    }
}
