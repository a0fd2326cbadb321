//! Writer task.
//!
//! One per connection. Drains the mailbox in FIFO order and writes each
//! payload as a text frame. Mailbox closure is the hub's way of saying the
//! connection is finished: the task sends a close frame and exits. A write
//! failure ends the task early.
//!
//! The write half is closed on every exit path. Closing it after the peer
//! or a previous close already shut it down is logged and ignored.

// ============================================================================
// Imports
// ============================================================================

use std::fmt::Display;

use futures_util::{Sink, SinkExt};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};

use crate::identifiers::ConnectionId;

use super::MailboxReceiver;

// ============================================================================
// Writer Loop
// ============================================================================

/// Runs the Writer task until the mailbox closes or a write fails.
///
/// # Arguments
///
/// * `id` - Identity of the connection being written
/// * `mailbox` - Receiving end of the connection's mailbox
/// * `sink` - Write half of the WebSocket
pub async fn run_writer<S>(id: ConnectionId, mut mailbox: MailboxReceiver, mut sink: S)
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    loop {
        let Some(payload) = mailbox.recv().await else {
            debug!(conn_id = %id, "Mailbox closed, sending close frame");
            if let Err(e) = sink.send(Message::Close(None)).await {
                debug!(conn_id = %id, error = %e, "Failed to send close frame");
            }
            break;
        };

        if let Err(e) = sink.send(Message::Text(payload)).await {
            warn!(conn_id = %id, error = %e, "WebSocket write failed");
            break;
        }

        trace!(conn_id = %id, "Frame written");
    }

    // Stop accepting frames from the hub before releasing the socket
    mailbox.close();

    if let Err(e) = sink.close().await {
        debug!(conn_id = %id, error = %e, "Write half already closed");
    }

    debug!(conn_id = %id, "Writer terminated");
}

// ============================================================================
// Tests
// ============================================================================
