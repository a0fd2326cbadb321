//! Outbound message envelope.
//!
//! # Format
//!
//! ```json
//! { "sender": "alice", "content": "hi" }
//! ```
//!
//! Absent fields are omitted, never emitted as `null`.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::to_string;
use tokio_tungstenite::tungstenite::Utf8Bytes;

use crate::error::Result;

// ============================================================================
// Types
// ============================================================================

/// Serialized outbound frame.
///
/// Cloning shares the underlying buffer, so one payload can sit in every
/// mailbox it was fanned out to.
pub type Payload = Utf8Bytes;

// ============================================================================
// ChatMessage
// ============================================================================

/// JSON envelope exchanged between the hub and Writer tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Display name of the author. Absent for system notices.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,

    /// Intended recipient. Accepted on the wire, never used for routing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receptor: Option<String>,

    /// Message body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ChatMessage {
    /// Creates a chat message authored by `sender`.
    #[inline]
    #[must_use]
    pub fn chat(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            sender: Some(sender.into()),
            receptor: None,
            content: Some(content.into()),
        }
    }

    /// Creates a system notice with no sender.
    #[inline]
    #[must_use]
    pub fn notice(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    /// Serializes the message into an outbound frame payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if serialization fails.
    pub fn to_payload(&self) -> Result<Payload> {
        Ok(Payload::from(to_string(self)?))
    }
}

// ============================================================================
// Tests
// ============================================================================
