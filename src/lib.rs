//! Broadcast Hub - real-time WebSocket message broadcaster.
//!
//! Clients connect over WebSocket, name themselves with their first frame,
//! and every frame they send afterwards is fanned out to all other
//! connected clients.
//!
//! # Architecture
//!
//! - **Hub**: single control loop owning the registry of live connections
//! - **Connection**: identity plus a bounded outbound mailbox
//! - **Reader task**: inbound frames → identity claim, chat, departure
//! - **Writer task**: mailbox → outbound frames, close frame on eviction
//!
//! Key design principles:
//!
//! - Only the hub loop touches the registry; everything else sends events
//! - Fan-out never waits: a full mailbox evicts its own connection
//! - Errors stay inside the task that saw them and become teardown events
//!
//! # Quick Start
//!
//! ```no_run
//! use broadcast_hub::{Result, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = ServerConfig::from_env()?;
//!     broadcast_hub::serve(config).await
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | Process configuration |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`hub`] | Connection hub and registry |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Wire message types |
//! | [`transport`] | WebSocket server, Reader and Writer tasks |

// ============================================================================
// Modules
// ============================================================================

/// Process configuration.
pub mod config;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Connection hub.
///
/// Owns the registry and serializes register, unregister and broadcast
/// events through one control loop.
pub mod hub;

/// Type-safe identifiers.
pub mod identifiers;

/// Wire message types.
pub mod protocol;

/// WebSocket transport layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::ServerConfig;
pub use error::{Error, Result};
pub use hub::{Hub, HubHandle};
pub use identifiers::ConnectionId;
pub use protocol::{ChatMessage, Notice, Payload};
pub use transport::{Connection, Server};

// ============================================================================
// Entry Point
// ============================================================================

/// Starts a hub and serves WebSocket clients until the process exits.
///
/// # Errors
///
/// Returns [`Error::Io`] if the listener cannot be bound.
pub async fn serve(config: ServerConfig) -> Result<()> {
    let hub = Hub::spawn(config.event_capacity);
    let server = Server::bind(&config, hub).await?;
    server.run().await;
    Ok(())
}
