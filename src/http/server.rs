//! REST server setup and the listener loop.
//!
//! # Responsibilities
//! - Own the route handler chain until launch
//! - Bind the listener and run the accept loop on its own task
//! - Per connection: parse, build the response shell, run the chain,
//!   close the response exactly once
//! - Stop accepting when the shutdown signal fires

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;

use crate::http::context::HttpContext;
use crate::http::request::{ParseError, RequestReader};
use crate::http::response::{Response, ResponseError};
use crate::lifecycle::ShutdownSignal;
use crate::net::{Connection, Listener, ListenerError};
use crate::observability::Logger;
use crate::routing::chain::{RouteHandler, RouteHandlerChain};
use crate::routing::handler::{RegistrationError, ServiceRouteHandler};
use crate::service::{DependencyResolver, ExposedService};

/// Error type for server operations and chain members.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Response(#[from] ResponseError),

    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Handlers can only be registered before launch.
    #[error("Server is already running")]
    AlreadyRunning,

    #[error("Launch cancelled: shutdown already signalled")]
    Cancelled,
}

/// A REST server bound to one endpoint.
pub struct RestServer {
    endpoint: SocketAddr,
    chain: RouteHandlerChain,
    logger: Arc<dyn Logger>,
    running: bool,
}

impl RestServer {
    /// Server with an empty chain.
    pub fn new(endpoint: SocketAddr, logger: Arc<dyn Logger>) -> Self {
        Self {
            endpoint,
            chain: RouteHandlerChain::new(),
            logger,
            running: false,
        }
    }

    /// Server whose first chain member serves the given services.
    pub fn with_services(
        endpoint: SocketAddr,
        services: Vec<ExposedService>,
        resolver: Arc<dyn DependencyResolver>,
        logger: Arc<dyn Logger>,
    ) -> Result<Self, ServerError> {
        let handler = ServiceRouteHandler::new(services, resolver, Arc::clone(&logger))?;
        let mut server = Self::new(endpoint, logger);
        server.chain.push(Arc::new(handler));
        Ok(server)
    }

    pub fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    fn ensure_stopped(&self, what: &str) -> Result<(), ServerError> {
        if self.running {
            self.logger
                .error(&format!("Cannot register {} while the server is running", what));
            return Err(ServerError::AlreadyRunning);
        }
        Ok(())
    }

    /// Append a chain member.
    pub fn register_route_handler(&mut self, handler: Arc<dyn RouteHandler>) -> Result<&mut Self, ServerError> {
        self.ensure_stopped("a route handler")?;
        self.chain.push(handler);
        Ok(self)
    }

    /// Set the handler that runs when no member claims a request.
    pub fn with_not_found_handler(&mut self, handler: Arc<dyn RouteHandler>) -> Result<&mut Self, ServerError> {
        self.ensure_stopped("a not-found handler")?;
        self.chain.set_not_found(handler);
        Ok(self)
    }

    /// Bind and start accepting on a background task.
    ///
    /// The loop runs until `shutdown` fires; connections already accepted
    /// run to completion.
    pub async fn launch(&mut self, shutdown: ShutdownSignal) -> Result<ServerHandle, ServerError> {
        if self.running {
            self.logger.error("Server launch requested while already running");
            return Err(ServerError::AlreadyRunning);
        }
        if shutdown.is_triggered() {
            return Err(ServerError::Cancelled);
        }

        let mut listener = Listener::new();
        let local_addr = listener.start(self.endpoint).await?;
        self.running = true;

        let chain = Arc::new(std::mem::take(&mut self.chain));
        self.logger
            .info(&format!("Listening on {} with {} route handler(s)", local_addr, chain.len()));

        let task = tokio::spawn(accept_loop(listener, chain, Arc::clone(&self.logger), shutdown));
        Ok(ServerHandle { local_addr, task })
    }
}

/// Handle to a launched server.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// Address actually bound (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for the accept loop to end.
    pub async fn stopped(self) {
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Accept loop task failed");
        }
    }
}

async fn accept_loop(
    listener: Listener,
    chain: Arc<RouteHandlerChain>,
    logger: Arc<dyn Logger>,
    mut shutdown: ShutdownSignal,
) {
    loop {
        let accepted = tokio::select! {
            _ = shutdown.recv() => {
                listener.stop();
                break;
            }
            accepted = listener.accept_next() => accepted,
        };

        match accepted {
            Ok(connection) => {
                tokio::spawn(serve_connection(connection, Arc::clone(&chain)));
            }
            Err(ListenerError::Closed) => break,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to accept connection");
            }
        }
    }
    logger.info("Listener loop stopped");
}

async fn serve_connection(connection: Connection, chain: Arc<RouteHandlerChain>) {
    let connection_id = connection.id();
    let peer_addr = connection.peer_addr();
    let (read_half, write_half) = connection.into_split();

    let request = match RequestReader::new(read_half).read_request().await {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!(
                connection_id = %connection_id,
                peer_addr = %peer_addr,
                error = %e,
                "Dropping connection, request could not be parsed"
            );
            return;
        }
    };

    tracing::debug!(
        connection_id = %connection_id,
        peer_addr = %peer_addr,
        method = %request.method(),
        path = %request.path(),
        "Request received"
    );

    let response = Response::new(request.version(), Box::new(write_half));
    let mut ctx = HttpContext::new(request, response);

    match chain.handle(&mut ctx).await {
        Ok(claimed) => {
            if ctx.response.is_closed() {
                return;
            }
            if !claimed {
                ctx.response.not_found();
            }
            if let Err(e) = ctx.response.close().await {
                tracing::debug!(connection_id = %connection_id, error = %e, "Failed to send response");
            }
        }
        Err(e) => {
            tracing::warn!(
                connection_id = %connection_id,
                peer_addr = %peer_addr,
                error = %e,
                "Route handler failed, closing connection"
            );
            if !ctx.response.is_closed() {
                ctx.response.abort().await;
            }
        }
    }
}
