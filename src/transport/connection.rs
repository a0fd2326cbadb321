//! Client connection.
//!
//! A connection is split in two halves once it is upgraded:
//!
//! - [`Connection`] is the hub-side half: identity plus the sending end of
//!   the mailbox. It lives in the hub's registry. Dropping it closes the
//!   mailbox.
//! - The WebSocket stream is split between a Reader task (read half) and a
//!   Writer task (write half plus the receiving end of the mailbox).

// ============================================================================
// Imports
// ============================================================================

use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_tungstenite::WebSocketStream;
use tracing::debug;

use crate::error::Result;
use crate::hub::HubHandle;
use crate::identifiers::ConnectionId;
use crate::protocol::Payload;

use super::reader::run_reader;
use super::writer::run_writer;

// ============================================================================
// Types
// ============================================================================

/// Receiving end of a connection's mailbox, drained by its Writer task.
pub type MailboxReceiver = mpsc::Receiver<Payload>;

// ============================================================================
// Connection
// ============================================================================

/// Hub-side half of one client connection.
#[derive(Debug)]
pub struct Connection {
    /// Unique identity, for logs and registry keying.
    id: ConnectionId,
    /// Bounded outbound queue.
    mailbox: mpsc::Sender<Payload>,
}

impl Connection {
    /// Creates a connection with a fresh identity and an empty mailbox.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Frames the mailbox can buffer before the connection
    ///   counts as unresponsive (at least 1)
    #[must_use]
    pub fn new(capacity: usize) -> (Self, MailboxReceiver) {
        let (mailbox, mailbox_rx) = mpsc::channel(capacity.max(1));
        let connection = Self {
            id: ConnectionId::generate(),
            mailbox,
        };
        (connection, mailbox_rx)
    }

    /// Registers an upgraded WebSocket with the hub and starts its tasks.
    ///
    /// Returns as soon as both tasks are spawned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HubClosed`](crate::Error::HubClosed) if the hub is gone.
    pub async fn open(
        ws_stream: WebSocketStream<TcpStream>,
        hub: &HubHandle,
        capacity: usize,
    ) -> Result<ConnectionId> {
        let (connection, mailbox_rx) = Self::new(capacity);
        let id = connection.id;

        hub.register(connection).await?;

        let (ws_write, ws_read) = ws_stream.split();
        tokio::spawn(run_reader(id, ws_read, hub.clone()));
        tokio::spawn(run_writer(id, mailbox_rx, ws_write));

        debug!(conn_id = %id, "Connection tasks started");

        Ok(id)
    }

    /// Returns the connection identity.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Enqueues a frame without waiting.
    ///
    /// # Errors
    ///
    /// Returns the frame back if the mailbox is full or its Writer is gone.
    #[inline]
    pub fn try_deliver(&self, payload: Payload) -> std::result::Result<(), TrySendError<Payload>> {
        self.mailbox.try_send(payload)
    }
}

// ============================================================================
// Tests
// ============================================================================
