//! WebSocket server for chat clients.
//!
//! Binds a TCP listener and upgrades every accepted connection that asks for
//! the configured path. Anything else, including plain HTTP requests, is
//! answered with `404 Not Found`.
//!
//! # Connection Flow
//!
//! 1. Client opens TCP and sends an upgrade request
//! 2. The request head is screened for path and upgrade headers
//! 3. Handshake completes, [`Connection::open`] registers with the hub
//! 4. Reader and Writer tasks take over, the accept task returns

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_async;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::Result;
use crate::hub::HubHandle;

use super::{Connection, upgrade};

// ============================================================================
// Server
// ============================================================================

/// A bound WebSocket server feeding one hub.
///
/// # Example
///
/// ```ignore
/// use broadcast_hub::{Hub, ServerConfig};
/// use broadcast_hub::transport::Server;
///
/// let config = ServerConfig::new().with_port(0);
/// let hub = Hub::spawn(config.event_capacity);
/// let server = Server::bind(&config, hub).await?;
/// println!("Listening on {}", server.ws_url());
/// server.run().await;
/// ```
pub struct Server {
    /// TCP listener for incoming connections.
    listener: TcpListener,
    /// Address the listener is bound to.
    local_addr: SocketAddr,
    /// Only path accepted for upgrades.
    path: Arc<str>,
    /// Mailbox capacity given to each new connection.
    mailbox_capacity: usize,
    /// Hub every connection registers with.
    hub: HubHandle,
}

impl Server {
    /// Binds the server to the configured address.
    ///
    /// Port 0 lets the OS pick a free port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails.
    pub async fn bind(config: &ServerConfig, hub: HubHandle) -> Result<Self> {
        let listener = TcpListener::bind(config.socket_addr()).await?;
        let local_addr = listener.local_addr()?;

        debug!(%local_addr, path = %config.path, "WebSocket server bound");

        Ok(Self {
            listener,
            local_addr,
            path: Arc::from(config.path.as_str()),
            mailbox_capacity: config.mailbox_capacity,
            hub,
        })
    }

    /// Returns the port the server is bound to.
    #[inline]
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Returns the local socket address.
    #[inline]
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the WebSocket URL clients should connect to.
    ///
    /// Format: `ws://{ip}:{port}{path}`
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://{}{}", self.local_addr, self.path)
    }

    /// Accepts connections forever.
    ///
    /// Accept errors are logged and the loop keeps going. Each connection is
    /// handled on its own task, so a slow handshake never blocks the loop.
    pub async fn run(self) {
        info!(addr = %self.local_addr, path = %self.path, "Server listening");

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let path = Arc::clone(&self.path);
                    let hub = self.hub.clone();
                    let capacity = self.mailbox_capacity;

                    tokio::spawn(async move {
                        match handle_connection(stream, addr, path, hub, capacity).await {
                            Ok(()) => {}
                            Err(e) if e.is_connection_error() => {
                                debug!(error = %e, %addr, "Connection refused");
                            }
                            Err(e) => warn!(error = %e, %addr, "Connection setup failed"),
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Accept failed");
                }
            }
        }
    }
}

// ============================================================================
// Connection Handling
// ============================================================================

/// Upgrades one TCP connection and hands it to the hub.
async fn handle_connection(
    mut stream: TcpStream,
    addr: SocketAddr,
    path: Arc<str>,
    hub: HubHandle,
    capacity: usize,
) -> Result<()> {
    debug!(%addr, "New TCP connection");

    upgrade::screen(&mut stream, &path).await?;
    let ws_stream = accept_async(stream).await?;

    let id = Connection::open(ws_stream, &hub, capacity).await?;

    info!(conn_id = %id, %addr, "Client connected");

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
