//! Shared utilities for integration and load testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use rest_server::routing::{Property, ScalarKind};
use rest_server::service::ExposedService;
use rest_server::{
    Action, Json, Logger, RestServer, RouteHandler, RouteParams, ServerHandle, ServiceBuilder,
    ServiceCallError, Shutdown, SimpleResolver,
};

/// Logger that keeps every line for assertions.
#[derive(Default)]
pub struct RecordingLogger {
    lines: Mutex<Vec<String>>,
}

impl RecordingLogger {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|l| l.contains(needle))
    }
}

impl Logger for RecordingLogger {
    fn info(&self, message: &str) {
        self.lines.lock().unwrap().push(format!("INFO {}", message));
    }

    fn warn(&self, message: &str) {
        self.lines.lock().unwrap().push(format!("WARN {}", message));
    }

    fn error(&self, message: &str) {
        self.lines.lock().unwrap().push(format!("ERROR {}", message));
    }
}

/// Service used across integration tests.
#[derive(Default)]
pub struct Catalog;

#[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Item {
    #[serde(rename = "Id")]
    pub id: i32,
    #[serde(rename = "Name")]
    pub name: String,
}

impl RouteParams for Item {
    const PROPERTIES: &'static [Property] = &[
        Property::new("Id", ScalarKind::I32),
        Property::new("Name", ScalarKind::String),
    ];
}

pub fn catalog_service() -> ExposedService {
    ServiceBuilder::<Catalog>::new()
        .route_with_methods("/ping", "GET", Action::value(|_, _| Ok("pong")))
        .route("/echo", Action::value_with(|_, _, body: String| Ok(body)))
        .route(
            "/items/{Id}",
            Action::value_with(|_, _, Json(item): Json<Item>| Ok(item)),
        )
        .route("/items/featured", Action::value(|_, _| Ok(vec!["featured"])))
        .route(
            "/boom",
            Action::value(|_, _| -> anyhow::Result<i32> { anyhow::bail!("database exploded") }),
        )
        .route(
            "/tuple-keys",
            Action::value(|_, _| Ok(std::collections::HashMap::from([((1, 2), "pair")]))),
        )
        .route(
            "/teapot",
            Action::void(|_, _| Err(ServiceCallError::new(418, "I'm a teapot", "short and stout").into())),
        )
        .route(
            "/slow",
            Action::deferred(|_, _| async {
                tokio::time::sleep(Duration::from_millis(300)).await;
                anyhow::Ok("finally")
            }),
        )
        .build()
        .expect("catalog routes compile")
}

pub fn catalog_resolver() -> SimpleResolver {
    let mut resolver = SimpleResolver::new();
    resolver.register(|_| Ok(Catalog));
    resolver
}

/// A launched server and the means to stop it.
pub struct TestServer {
    pub addr: SocketAddr,
    pub logger: Arc<RecordingLogger>,
    pub shutdown: Shutdown,
    pub handle: ServerHandle,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        self.handle.stopped().await;
    }
}

/// Start the catalog service on an ephemeral port, plus extra chain members.
pub async fn start_server(extra: Vec<Arc<dyn RouteHandler>>) -> TestServer {
    let logger = Arc::new(RecordingLogger::default());
    let mut server = RestServer::with_services(
        "127.0.0.1:0".parse().unwrap(),
        vec![catalog_service()],
        Arc::new(catalog_resolver()),
        logger.clone(),
    )
    .unwrap();
    for handler in extra {
        server.register_route_handler(handler).unwrap();
    }

    let shutdown = Shutdown::new();
    let handle = server.launch(shutdown.subscribe()).await.unwrap();
    TestServer {
        addr: handle.local_addr(),
        logger,
        shutdown,
        handle,
    }
}

/// Send raw bytes and read until the server closes the connection.
pub async fn raw_request(addr: SocketAddr, raw: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw.as_bytes()).await.unwrap();
    let mut out = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut out))
        .await
        .expect("server did not close the connection")
        .unwrap();
    String::from_utf8(out).unwrap()
}

/// HTTP client with pooling disabled (one exchange per connection).
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
