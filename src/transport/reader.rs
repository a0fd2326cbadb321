//! Reader task.
//!
//! One per connection. Pulls inbound frames and turns them into hub events:
//!
//! 1. The first content frame is an identity claim. It sets the display
//!    name and announces `"/{name} has connected"` to everyone else.
//! 2. Every later frame is chat content, wrapped with the display name as
//!    sender and broadcast to everyone else.
//! 3. On close, read error or end of stream the connection is unregistered
//!    once and the read half is dropped.
//!
//! A frame that cannot be decoded or serialized is logged and dropped. It
//! never ends the connection.

// ============================================================================
// Imports
// ============================================================================

use futures_util::{Stream, StreamExt};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::hub::HubHandle;
use crate::identifiers::ConnectionId;
use crate::protocol::{ChatMessage, Notice, Payload};

// ============================================================================
// ReaderState
// ============================================================================

/// Identity protocol state of one connection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReaderState {
    /// No frame received yet. The next one is the display name.
    #[default]
    AwaitingIdentity,

    /// Display name claimed. Frames are chat content.
    Active {
        /// Name fixed for the rest of the connection.
        display_name: String,
    },
}

impl ReaderState {
    /// Returns the display name once claimed.
    #[inline]
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        match self {
            Self::AwaitingIdentity => None,
            Self::Active { display_name } => Some(display_name),
        }
    }

    /// Consumes one content frame.
    ///
    /// Returns the payload to broadcast to all other connections.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the outbound frame cannot be serialized.
    /// The state is still advanced on a failed identity claim.
    pub fn advance(&mut self, content: String) -> Result<Payload> {
        match self {
            Self::AwaitingIdentity => {
                let notice = Notice::Connected {
                    name: content.clone(),
                };
                *self = Self::Active {
                    display_name: content,
                };
                notice.into_message().to_payload()
            }
            Self::Active { display_name } => {
                ChatMessage::chat(display_name.as_str(), content).to_payload()
            }
        }
    }
}

// ============================================================================
// Frame Decoding
// ============================================================================

/// Extracts the text carried by a frame.
///
/// Returns `Ok(None)` for control frames that carry no content and
/// [`Error::ConnectionClosed`] for a close frame.
fn frame_content(message: Message) -> Result<Option<String>> {
    match message {
        Message::Text(text) => Ok(Some(text.as_str().to_owned())),
        Message::Binary(data) => String::from_utf8(data.to_vec())
            .map(Some)
            .map_err(|e| Error::protocol(format!("binary frame is not UTF-8: {e}"))),
        Message::Close(_) => Err(Error::ConnectionClosed),
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Ok(None),
    }
}

// ============================================================================
// Reader Loop
// ============================================================================

/// Runs the Reader task until the stream ends.
///
/// # Arguments
///
/// * `id` - Identity of the connection being read
/// * `stream` - Read half of the WebSocket
/// * `hub` - Hub to feed events into
pub async fn run_reader<S>(id: ConnectionId, mut stream: S, hub: HubHandle)
where
    S: Stream<Item = std::result::Result<Message, WsError>> + Unpin,
{
    let mut state = ReaderState::default();

    loop {
        let message = match stream.next().await {
            Some(Ok(message)) => message,
            Some(Err(e)) => {
                debug!(conn_id = %id, error = %e, "WebSocket read failed");
                break;
            }
            None => {
                debug!(conn_id = %id, "WebSocket stream ended");
                break;
            }
        };

        let content = match frame_content(message) {
            Ok(Some(content)) => content,
            Ok(None) => continue,
            Err(Error::ConnectionClosed) => {
                debug!(conn_id = %id, "WebSocket closed by client");
                break;
            }
            Err(e) => {
                warn!(conn_id = %id, error = %e, "Dropping undecodable frame");
                continue;
            }
        };

        let identifying = state == ReaderState::AwaitingIdentity;

        let payload = match state.advance(content) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(conn_id = %id, error = %e, "Dropping unserializable frame");
                continue;
            }
        };

        if identifying {
            info!(
                conn_id = %id,
                display_name = state.display_name().unwrap_or_default(),
                "Client identified"
            );
        } else {
            trace!(conn_id = %id, "Chat frame received");
        }

        if hub.broadcast_except(payload, id).await.is_err() {
            warn!(conn_id = %id, "Hub closed, stopping reader");
            break;
        }
    }

    let display_name = match state {
        ReaderState::AwaitingIdentity => None,
        ReaderState::Active { display_name } => Some(display_name),
    };

    if hub.unregister(id, display_name).await.is_err() {
        debug!(conn_id = %id, "Hub closed before unregister");
    }

    // Read half is released here
    drop(stream);
    debug!(conn_id = %id, "Reader terminated");
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use futures_util::stream;
    use tokio::time::timeout;

    use crate::hub::Hub;
    use crate::transport::{Connection, MailboxReceiver};

    const WAIT: Duration = Duration::from_secs(2);

    async fn peer(hub: &HubHandle) -> MailboxReceiver {
        let (connection, mailbox) = Connection::new(64);
        hub.register(connection).await.expect("register");
        mailbox
    }

    async fn next(mailbox: &mut MailboxReceiver) -> Option<String> {
        timeout(WAIT, mailbox.recv())
            .await
            .expect("mailbox activity")
            .map(|payload| payload.as_str().to_string())
    }

    async fn collect(mailbox: &mut MailboxReceiver, count: usize) -> Vec<String> {
        let mut received = Vec::with_capacity(count);
        while received.len() < count {
            received.push(next(mailbox).await.expect("delivery"));
        }
        received
    }

    fn frames(
        messages: Vec<Message>,
    ) -> impl Stream<Item = std::result::Result<Message, WsError>> + Unpin {
        stream::iter(messages.into_iter().map(Ok))
    }

    #[test]
    fn test_state_transitions_once() {
        let mut state = ReaderState::default();
        assert_eq!(state.display_name(), None);

        let notice = state.advance("alice".into()).expect("notice");
        assert_eq!(notice.as_str(), r#"{"content":"/alice has connected"}"#);
        assert_eq!(state.display_name(), Some("alice"));

        let chat = state.advance("bob".into()).expect("chat");
        assert_eq!(chat.as_str(), r#"{"sender":"alice","content":"bob"}"#);
        assert_eq!(state.display_name(), Some("alice"));
    }

    #[test]
    fn test_frame_content() {
        assert_eq!(
            frame_content(Message::text("hi")).expect("text"),
            Some("hi".to_string())
        );
        assert_eq!(
            frame_content(Message::binary(b"raw".to_vec())).expect("binary"),
            Some("raw".to_string())
        );
        assert_eq!(frame_content(Message::Ping(Default::default())).expect("ping"), None);
        assert!(matches!(
            frame_content(Message::Close(None)),
            Err(Error::ConnectionClosed)
        ));
        assert!(matches!(
            frame_content(Message::binary(vec![0xff, 0xfe])),
            Err(Error::Protocol { .. })
        ));
    }

    #[tokio::test]
    async fn test_identity_then_chat_then_departure() {
        let hub = Hub::spawn(64);
        let mut other = peer(&hub).await;

        let (connection, mut own) = Connection::new(64);
        let id = connection.id();
        hub.register(connection).await.expect("register");

        let mut input = vec![Message::text("alice")];
        input.extend((0..20).map(|i| Message::text(format!("m{i}"))));
        input.push(Message::Close(None));
        run_reader(id, frames(input), hub.clone()).await;

        let mut expected = vec![r#"{"content":"/alice has connected"}"#.to_string()];
        expected.extend((0..20).map(|i| format!(r#"{{"sender":"alice","content":"m{i}"}}"#)));
        expected.push(r#"{"content":"alice disconnected"}"#.to_string());

        // Departure notice is the last word about this connection
        assert_eq!(collect(&mut other, expected.len()).await, expected);

        // Own frames never come back; only the mailbox closure does
        assert_eq!(next(&mut own).await, None);
        hub.wait_for_connections(1).await.expect("count");
        assert!(other.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_undecodable_frame_is_dropped() {
        let hub = Hub::spawn(64);
        let mut other = peer(&hub).await;

        let (connection, _own) = Connection::new(64);
        let id = connection.id();
        hub.register(connection).await.expect("register");

        let input = frames(vec![
            Message::text("alice"),
            Message::binary(vec![0xff]),
            Message::text("still here"),
        ]);
        run_reader(id, input, hub.clone()).await;

        assert_eq!(
            collect(&mut other, 3).await,
            vec![
                r#"{"content":"/alice has connected"}"#,
                r#"{"sender":"alice","content":"still here"}"#,
                r#"{"content":"alice disconnected"}"#,
            ]
        );

        hub.wait_for_connections(1).await.expect("count");
        assert!(other.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_read_error_unregisters_anonymous_silently() {
        let hub = Hub::spawn(64);
        let mut other = peer(&hub).await;

        let (connection, mut own) = Connection::new(64);
        let id = connection.id();
        hub.register(connection).await.expect("register");

        let input = stream::iter(vec![Err::<Message, _>(WsError::ConnectionClosed)]);
        run_reader(id, input, hub.clone()).await;

        assert_eq!(next(&mut own).await, None);
        hub.wait_for_connections(1).await.expect("count");
        assert!(other.try_recv().is_err());
    }
}
