//! TCP listener with an explicit start/accept/stop lifecycle.
//!
//! # Responsibilities
//! - Bind to the configured endpoint
//! - Accept incoming TCP connections one at a time
//! - Unblock a pending accept when stopped
//!
//! # Design Decisions
//! - No connection limit; open connections are not tracked
//! - `accept_next` after `stop` fails fast with `Closed`

use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::net::connection::Connection;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    Bind(#[source] std::io::Error),

    /// Failed to accept connection.
    #[error("Failed to accept: {0}")]
    Accept(#[source] std::io::Error),

    /// `start` called on a listener that is already started.
    #[error("Listener already started on {0}")]
    AlreadyStarted(SocketAddr),

    /// `accept_next` called before `start`.
    #[error("Listener not started")]
    NotStarted,

    /// The listener was stopped.
    #[error("Listener closed")]
    Closed,
}

/// A TCP listener that can be started once and stopped from any task.
pub struct Listener {
    inner: Option<TcpListener>,
    local_addr: Option<SocketAddr>,
    stop_tx: watch::Sender<bool>,
}

impl Listener {
    /// Create an unbound listener.
    pub fn new() -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            inner: None,
            local_addr: None,
            stop_tx,
        }
    }

    /// Bind to `endpoint` and begin accepting.
    ///
    /// Returns the actual bound address (useful with port 0).
    pub async fn start(&mut self, endpoint: SocketAddr) -> Result<SocketAddr, ListenerError> {
        if let Some(addr) = self.local_addr {
            return Err(ListenerError::AlreadyStarted(addr));
        }

        let listener = TcpListener::bind(endpoint)
            .await
            .map_err(ListenerError::Bind)?;
        let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;

        tracing::info!(address = %local_addr, "Listener bound");

        self.inner = Some(listener);
        self.local_addr = Some(local_addr);
        Ok(local_addr)
    }

    /// Wait for the next connection.
    ///
    /// Resolves with `Closed` as soon as the listener is stopped, including
    /// while a previous call is suspended.
    pub async fn accept_next(&self) -> Result<Connection, ListenerError> {
        let listener = self.inner.as_ref().ok_or(ListenerError::NotStarted)?;
        let mut stop_rx = self.stop_tx.subscribe();
        if *stop_rx.borrow() {
            return Err(ListenerError::Closed);
        }

        tokio::select! {
            _ = stop_rx.wait_for(|stopped| *stopped) => Err(ListenerError::Closed),
            accepted = listener.accept() => {
                let (stream, peer_addr) = accepted.map_err(ListenerError::Accept)?;
                let conn = Connection::new(stream, peer_addr);
                tracing::debug!(
                    connection_id = %conn.id(),
                    peer_addr = %peer_addr,
                    "Connection accepted"
                );
                Ok(conn)
            }
        }
    }

    /// Stop accepting. Pending and future `accept_next` calls fail with `Closed`.
    pub fn stop(&self) {
        if !self.stop_tx.send_replace(true) {
            tracing::info!(address = ?self.local_addr, "Listener stopped");
        }
    }

    pub fn is_started(&self) -> bool {
        self.local_addr.is_some()
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop_tx.borrow()
    }

    /// The bound address, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

impl Default for Listener {
    fn default() -> Self {
        Self::new()
    }
}
