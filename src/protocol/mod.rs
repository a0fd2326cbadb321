//! Wire message types.
//!
//! Clients send plaintext frames; the server answers with JSON envelopes.
//!
//! # Protocol Overview
//!
//! | Frame | Direction | Format |
//! |-------|-----------|--------|
//! | Identity claim | Client → Server | First frame, plaintext username |
//! | Chat content | Client → Server | Every later frame, plaintext |
//! | Chat message | Server → Client | [`ChatMessage`] with `sender` and `content` |
//! | System notice | Server → Client | [`ChatMessage`] with `content` only |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `message` | JSON envelope and outbound payload type |
//! | `notice` | Connect and disconnect announcements |

// ============================================================================
// Submodules
// ============================================================================

/// JSON envelope for outbound frames.
pub mod message;

/// System notices announced by the hub.
pub mod notice;

// ============================================================================
// Re-exports
// ============================================================================

pub use message::{ChatMessage, Payload};
pub use notice::Notice;
