//! REST server (v1)
//!
//! Serves exposed service actions over HTTP/1.1, one exchange per connection.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request        ┌──────────────────────────────────────────────────────┐
//!     ──────────────────────┼─▶ net::listener ─▶ http::request ─▶ routing::chain   │
//!                           │                                        │             │
//!                           │                    ┌───────────────────┴──────┐      │
//!                           │                    ▼                          ▼      │
//!                           │        routing::handler (services)    files (static) │
//!                           │                    │                                 │
//!                           │                    ▼                                 │
//!                           │        routing::dispatcher ─▶ service::resolver      │
//!     Client Response       │                    │                                 │
//!     ◀─────────────────────┼── http::response ◀─┘                                 │
//!                           │                                                      │
//!                           │   config · observability · lifecycle                 │
//!                           └──────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde::{Deserialize, Serialize};

use rest_server::config::{load_config, ServerConfig};
use rest_server::files::FileRouteHandler;
use rest_server::observability::init_tracing;
use rest_server::routing::{Property, ScalarKind};
use rest_server::{
    Action, InstanceMode, Json, RestServer, RouteParams, ServiceBuilder, ServiceCallError, Shutdown,
    SimpleResolver, TracingLogger,
};

#[derive(Debug, Parser)]
#[command(name = "rest-server", version, about = "Serve exposed service actions over HTTP")]
struct Cli {
    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(long)]
    bind: Option<SocketAddr>,
}

/// Demo service exposed by the binary.
#[derive(Debug, Default)]
struct DemoService;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct Item {
    #[serde(rename = "Id")]
    id: i64,
    #[serde(rename = "Name")]
    name: String,
}

impl RouteParams for Item {
    const PROPERTIES: &'static [Property] = &[
        Property::new("Id", ScalarKind::I64),
        Property::new("Name", ScalarKind::String),
    ];
}

impl DemoService {
    fn item(&self, mut item: Item) -> anyhow::Result<Item> {
        if item.id < 0 {
            return Err(ServiceCallError::new(404, "Not Found", format!("no item {}", item.id)).into());
        }
        if item.name.is_empty() {
            item.name = format!("item-{}", item.id);
        }
        Ok(item)
    }
}

fn demo_service() -> anyhow::Result<rest_server::service::ExposedService> {
    let service = ServiceBuilder::<DemoService>::new()
        .instance_mode(InstanceMode::SingletonLazy)
        .route_with_methods("/ping", "GET", Action::value(|_, _| Ok("pong")))
        .route_with_methods("/echo", "POST,PUT", Action::value_with(|_, _, body: String| Ok(body)))
        .route_with_methods(
            "/items/{Id}",
            "GET,PUT",
            Action::value_with(|svc: &DemoService, _, Json(item): Json<Item>| svc.item(item)),
        )
        .build()?;
    Ok(service)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind.to_string();
    }

    init_tracing(&config.observability)?;
    tracing::info!("rest-server v{} starting", env!("CARGO_PKG_VERSION"));

    let endpoint: SocketAddr = config.listener.bind_address.parse()?;
    tracing::info!(
        bind_address = %endpoint,
        files_enabled = config.files.enabled,
        "Configuration loaded"
    );

    let mut resolver = SimpleResolver::new();
    resolver.register(|_| Ok(DemoService));

    let mut server = RestServer::with_services(
        endpoint,
        vec![demo_service()?],
        Arc::new(resolver),
        Arc::new(TracingLogger),
    )?;
    if config.files.enabled {
        tracing::info!(base_path = %config.files.base_path, "Serving static files");
        server.register_route_handler(Arc::new(FileRouteHandler::new(&config.files.base_path)))?;
    }

    let shutdown = Shutdown::new();
    let handle = server.launch(shutdown.subscribe()).await?;
    tracing::info!(address = %handle.local_addr(), "Listening for connections");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    shutdown.trigger();
    handle.stopped().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
