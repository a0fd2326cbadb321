//! System notices.
//!
//! Notices are announced by the server, not by a user, so they carry no
//! sender. They are always delivered to everyone except the connection
//! they describe.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use super::ChatMessage;

// ============================================================================
// Notice
// ============================================================================

/// Announcement about another connection's lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// A connection claimed its display name.
    Connected {
        /// Display name that was claimed.
        name: String,
    },

    /// A registered connection went away.
    Disconnected {
        /// Display name of the departed connection.
        name: String,
    },
}

impl Notice {
    /// Wraps the notice text into a sender-less [`ChatMessage`].
    #[inline]
    #[must_use]
    pub fn into_message(self) -> ChatMessage {
        ChatMessage::notice(self.to_string())
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected { name } => write!(f, "/{name} has connected"),
            Self::Disconnected { name } => write!(f, "{name} disconnected"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
