//! Static file serving as a route handler chain member.
//!
//! # Responsibilities
//! - Map `GET` request paths below a base directory
//! - Serve `index.html` for directory paths
//! - Pick a content type from the file extension
//!
//! # Design Decisions
//! - File access goes through the `FileSystem` seam so tests stay in memory
//! - Paths escaping the base directory are not claimed
//! - Registered after the service handler; service routes win

use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::http::{HttpContext, ServerError};
use crate::routing::chain::RouteHandler;

/// Read access to files served by [`FileRouteHandler`].
#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn exists(&self, path: &Path) -> bool;

    async fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
}

/// Files on local disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskFileSystem;

#[async_trait]
impl FileSystem for DiskFileSystem {
    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::metadata(path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }
}

/// Content type for a file, by extension.
pub fn content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" => "application/javascript",
        "json" => "application/json",
        "txt" => "text/plain",
        "xml" => "application/xml",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// Serves files below a base directory.
pub struct FileRouteHandler {
    base_path: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl FileRouteHandler {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self::with_file_system(base_path, Arc::new(DiskFileSystem))
    }

    pub fn with_file_system(base_path: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            base_path: base_path.into(),
            fs,
        }
    }

    /// File path for a request path, or `None` if it leaves the base.
    pub fn map_path(&self, request_path: &str) -> Option<PathBuf> {
        let decoded = urlencoding::decode(request_path).ok()?;
        let mut local = decoded.trim_start_matches('/').to_string();
        if local.is_empty() || local.ends_with('/') {
            local.push_str("index.html");
        }

        let mut path = self.base_path.clone();
        for component in Path::new(&local).components() {
            match component {
                Component::Normal(segment) => path.push(segment),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(path)
    }
}

#[async_trait]
impl RouteHandler for FileRouteHandler {
    async fn handle_route(&self, ctx: &mut HttpContext) -> Result<bool, ServerError> {
        if ctx.request().method() != "GET" {
            return Ok(false);
        }
        let Some(path) = self.map_path(ctx.request().path()) else {
            tracing::debug!(path = %ctx.request().path(), "File path escapes base directory");
            return Ok(false);
        };

        if !self.fs.exists(&path).await {
            ctx.response.not_found();
            return Ok(true);
        }

        match self.fs.read(&path).await {
            Ok(bytes) => {
                ctx.response.set_status(200);
                ctx.response.headers_mut().set("Content-Type", content_type(&path));
                ctx.response.write_bytes(&bytes)?;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => ctx.response.not_found(),
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Failed to read file");
                ctx.response.internal_server_error();
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Request, Response};
    use std::collections::HashMap;

    #[derive(Default)]
    struct MemoryFs {
        files: HashMap<PathBuf, Vec<u8>>,
    }

    #[async_trait]
    impl FileSystem for MemoryFs {
        async fn exists(&self, path: &Path) -> bool {
            self.files.contains_key(path)
        }

        async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
            self.files
                .get(path)
                .cloned()
                .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
        }
    }

    fn handler() -> FileRouteHandler {
        let mut fs = MemoryFs::default();
        fs.files.insert(PathBuf::from("site/index.html"), b"<h1>home</h1>".to_vec());
        fs.files.insert(PathBuf::from("site/docs/index.html"), b"docs".to_vec());
        fs.files.insert(PathBuf::from("site/app.js"), b"run()".to_vec());
        FileRouteHandler::with_file_system("site", Arc::new(fs))
    }

    fn ctx(method: &str, target: &str) -> HttpContext {
        HttpContext::new(
            Request::new(method, target),
            Response::new("HTTP/1.1", Box::new(tokio::io::sink())),
        )
    }

    #[tokio::test]
    async fn serves_file_with_content_type() {
        let mut ctx = ctx("GET", "/app.js");
        assert!(handler().handle_route(&mut ctx).await.unwrap());
        assert_eq!(ctx.response.status(), 200);
        assert_eq!(ctx.response.body(), b"run()");
        assert_eq!(
            ctx.response.headers().get("Content-Type"),
            Some("application/javascript")
        );
    }

    #[tokio::test]
    async fn directory_paths_serve_index() {
        let handler = handler();

        let mut root = ctx("GET", "/");
        assert!(handler.handle_route(&mut root).await.unwrap());
        assert_eq!(root.response.body(), b"<h1>home</h1>");

        let mut docs = ctx("GET", "/docs/");
        assert!(handler.handle_route(&mut docs).await.unwrap());
        assert_eq!(docs.response.body(), b"docs");
    }

    #[tokio::test]
    async fn missing_file_is_claimed_404() {
        let mut ctx = ctx("GET", "/nope.css");
        assert!(handler().handle_route(&mut ctx).await.unwrap());
        assert_eq!(ctx.response.status(), 404);
        assert!(!ctx.response.is_closed());
    }

    #[tokio::test]
    async fn non_get_and_traversal_are_not_claimed() {
        let handler = handler();
        assert!(!handler.handle_route(&mut ctx("POST", "/app.js")).await.unwrap());
        assert!(!handler.handle_route(&mut ctx("GET", "/../secret")).await.unwrap());
        assert!(!handler.handle_route(&mut ctx("GET", "/a/%2e%2e/%2e%2e/x")).await.unwrap());
    }

    #[test]
    fn content_types_by_extension() {
        assert_eq!(content_type(Path::new("a/INDEX.HTML")), "text/html");
        assert_eq!(content_type(Path::new("style.css")), "text/css");
        assert_eq!(content_type(Path::new("blob")), "application/octet-stream");
    }
}
