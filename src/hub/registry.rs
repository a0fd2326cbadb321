//! Registry of live connections.
//!
//! Owned by the hub control loop and never shared. Fan-out never waits on
//! a mailbox: a connection whose mailbox is full or already closed is
//! evicted on the spot, which closes its mailbox and lets its Writer task
//! finish.

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::identifiers::ConnectionId;
use crate::protocol::Payload;
use crate::transport::Connection;

// ============================================================================
// Registry
// ============================================================================

/// Set of registered connections keyed by identity.
#[derive(Debug, Default)]
pub struct Registry {
    connections: FxHashMap<ConnectionId, Connection>,
}

impl Registry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of registered connections.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Returns `true` if no connection is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Returns `true` if `id` is registered.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    /// Adds a connection.
    pub fn insert(&mut self, connection: Connection) {
        self.connections.insert(connection.id(), connection);
    }

    /// Removes a connection, returning it if it was registered.
    ///
    /// Dropping the returned value closes its mailbox.
    pub fn remove(&mut self, id: &ConnectionId) -> Option<Connection> {
        self.connections.remove(id)
    }

    /// Offers `payload` to every mailbox except `except`.
    ///
    /// Returns the number of connections evicted because their mailbox was
    /// full or closed.
    pub fn fan_out(&mut self, payload: &Payload, except: Option<ConnectionId>) -> usize {
        let before = self.connections.len();

        self.connections.retain(|id, connection| {
            if Some(*id) == except {
                return true;
            }

            match connection.try_deliver(payload.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    warn!(conn_id = %id, "Mailbox full, evicting connection");
                    false
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(conn_id = %id, "Mailbox closed, evicting connection");
                    false
                }
            }
        });

        before - self.connections.len()
    }
}

// ============================================================================
// Tests
// ============================================================================
