//! Hub control loop.
//!
//! The loop services three event streams in priority order:
//!
//! | Event | Effect |
//! |-------|--------|
//! | Register | Insert the connection, acknowledge the producer |
//! | Unregister | Remove it, close its mailbox, announce the departure |
//! | Broadcast | Offer the payload to every mailbox but the excluded one |
//!
//! Fan-out never blocks. A mailbox that cannot take another frame gets its
//! connection evicted, so a stalled client only ever drops itself. System
//! notices go through the same path as chat broadcasts.
//!
//! A Reader finishes sending its broadcasts before it sends its
//! Unregister. Pending broadcasts are always drained before departures, so
//! a departure notice is the last frame peers see from that connection.

// ============================================================================
// Imports
// ============================================================================

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::identifiers::ConnectionId;
use crate::protocol::{Notice, Payload};
use crate::transport::Connection;

use super::Registry;

// ============================================================================
// Events
// ============================================================================

/// Register intent, acknowledged once the connection is in the registry.
struct Registration {
    connection: Connection,
    ack: oneshot::Sender<()>,
}

/// Unregister intent.
struct Departure {
    id: ConnectionId,
    display_name: Option<String>,
}

/// Broadcast intent.
struct Broadcast {
    payload: Payload,
    except: Option<ConnectionId>,
}

// ============================================================================
// HubHandle
// ============================================================================

/// Producer side of the hub.
///
/// Cheap to clone. Every clone feeds the same control loop; the loop keeps
/// running while at least one handle is alive.
#[derive(Debug, Clone)]
pub struct HubHandle {
    register_tx: mpsc::Sender<Registration>,
    unregister_tx: mpsc::Sender<Departure>,
    broadcast_tx: mpsc::Sender<Broadcast>,
    size_rx: watch::Receiver<usize>,
}

impl HubHandle {
    /// Registers a connection and waits until the hub has inserted it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HubClosed`] if the control loop is gone.
    pub async fn register(&self, connection: Connection) -> Result<()> {
        let (ack, ack_rx) = oneshot::channel();

        self.register_tx
            .send(Registration { connection, ack })
            .await
            .map_err(|_| Error::HubClosed)?;

        ack_rx.await.map_err(|_| Error::HubClosed)
    }

    /// Asks the hub to drop a connection.
    ///
    /// `display_name` is used for the departure notice; connections that
    /// never identified themselves leave silently. Unregistering an id that
    /// is not registered is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HubClosed`] if the control loop is gone.
    pub async fn unregister(&self, id: ConnectionId, display_name: Option<String>) -> Result<()> {
        self.unregister_tx
            .send(Departure { id, display_name })
            .await
            .map_err(|_| Error::HubClosed)
    }

    /// Offers `payload` to every registered connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HubClosed`] if the control loop is gone.
    pub async fn broadcast(&self, payload: Payload) -> Result<()> {
        self.send_broadcast(payload, None).await
    }

    /// Offers `payload` to every registered connection except `except`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HubClosed`] if the control loop is gone.
    pub async fn broadcast_except(&self, payload: Payload, except: ConnectionId) -> Result<()> {
        self.send_broadcast(payload, Some(except)).await
    }

    /// Returns the registry size last published by the hub.
    #[inline]
    #[must_use]
    pub fn connection_count(&self) -> usize {
        *self.size_rx.borrow()
    }

    /// Waits until the registry holds exactly `count` connections.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HubClosed`] if the control loop stops first.
    pub async fn wait_for_connections(&self, count: usize) -> Result<()> {
        let mut size_rx = self.size_rx.clone();
        size_rx
            .wait_for(|&size| size == count)
            .await
            .map_err(|_| Error::HubClosed)?;
        Ok(())
    }

    async fn send_broadcast(&self, payload: Payload, except: Option<ConnectionId>) -> Result<()> {
        self.broadcast_tx
            .send(Broadcast { payload, except })
            .await
            .map_err(|_| Error::HubClosed)
    }
}

// ============================================================================
// Hub
// ============================================================================

/// Hub control loop state.
///
/// Owns the [`Registry`]. Nothing outside [`Hub::run`] can reach it.
pub struct Hub {
    registry: Registry,
    register_rx: mpsc::Receiver<Registration>,
    unregister_rx: mpsc::Receiver<Departure>,
    broadcast_rx: mpsc::Receiver<Broadcast>,
    size_tx: watch::Sender<usize>,
}

impl Hub {
    /// Creates a hub and its first handle.
    ///
    /// `event_capacity` bounds each of the three event channels. Values
    /// below 1 are raised to 1.
    #[must_use]
    pub fn new(event_capacity: usize) -> (Self, HubHandle) {
        let event_capacity = event_capacity.max(1);
        let (register_tx, register_rx) = mpsc::channel(event_capacity);
        let (unregister_tx, unregister_rx) = mpsc::channel(event_capacity);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(event_capacity);
        let (size_tx, size_rx) = watch::channel(0);

        let hub = Self {
            registry: Registry::new(),
            register_rx,
            unregister_rx,
            broadcast_rx,
            size_tx,
        };

        let handle = HubHandle {
            register_tx,
            unregister_tx,
            broadcast_tx,
            size_rx,
        };

        (hub, handle)
    }

    /// Creates a hub and spawns its control loop on the current runtime.
    #[must_use]
    pub fn spawn(event_capacity: usize) -> HubHandle {
        let (hub, handle) = Self::new(event_capacity);
        tokio::spawn(hub.run());
        handle
    }

    /// Runs the control loop until every [`HubHandle`] is dropped.
    pub async fn run(mut self) {
        info!("Hub started");

        loop {
            tokio::select! {
                biased;

                Some(registration) = self.register_rx.recv() => {
                    self.handle_register(registration);
                }

                Some(broadcast) = self.broadcast_rx.recv() => {
                    self.handle_broadcast(broadcast);
                }

                Some(departure) = self.unregister_rx.recv() => {
                    self.handle_unregister(departure);
                }

                else => break,
            }
        }

        info!("Hub stopped");
    }

    fn handle_register(&mut self, registration: Registration) {
        let Registration { connection, ack } = registration;
        let id = connection.id();

        self.registry.insert(connection);
        self.publish_size();

        debug!(conn_id = %id, connections = self.registry.len(), "Connection registered");

        // Producer may have given up waiting; the entry stays either way
        let _ = ack.send(());
    }

    fn handle_unregister(&mut self, departure: Departure) {
        let Departure { id, display_name } = departure;

        let Some(connection) = self.registry.remove(&id) else {
            debug!(conn_id = %id, "Unregister for unknown connection ignored");
            return;
        };

        // Closes the mailbox; its Writer sends a close frame and exits
        drop(connection);

        info!(
            conn_id = %id,
            display_name = display_name.as_deref().unwrap_or_default(),
            "Connection unregistered"
        );

        if let Some(name) = display_name {
            let notice = Notice::Disconnected { name };
            match notice.into_message().to_payload() {
                Ok(payload) => self.fan_out(&payload, None),
                Err(e) => error!(error = %e, "Failed to serialize disconnect notice"),
            }
        }

        self.publish_size();
    }

    fn handle_broadcast(&mut self, broadcast: Broadcast) {
        self.fan_out(&broadcast.payload, broadcast.except);
        self.publish_size();
    }

    fn fan_out(&mut self, payload: &Payload, except: Option<ConnectionId>) {
        let evicted = self.registry.fan_out(payload, except);
        if evicted > 0 {
            info!(
                evicted,
                connections = self.registry.len(),
                "Evicted unresponsive connections"
            );
        }
    }

    fn publish_size(&self) {
        self.size_tx.send_replace(self.registry.len());
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use proptest::prelude::*;
    use tokio::time::timeout;

    use crate::protocol::ChatMessage;

    const WAIT: Duration = Duration::from_secs(2);

    async fn connect(hub: &HubHandle, capacity: usize) -> (ConnectionId, mpsc::Receiver<Payload>) {
        let (connection, mailbox) = Connection::new(capacity);
        let id = connection.id();
        hub.register(connection).await.expect("register");
        (id, mailbox)
    }

    async fn next(mailbox: &mut mpsc::Receiver<Payload>) -> Option<String> {
        timeout(WAIT, mailbox.recv())
            .await
            .expect("mailbox activity")
            .map(|payload| payload.as_str().to_string())
    }

    fn chat(sender: &str, content: &str) -> Payload {
        ChatMessage::chat(sender, content)
            .to_payload()
            .expect("serialize")
    }

    #[tokio::test]
    async fn test_register_updates_count() {
        let hub = Hub::spawn(16);
        assert_eq!(hub.connection_count(), 0);

        let (_a, _a_rx) = connect(&hub, 4).await;
        let (_b, _b_rx) = connect(&hub, 4).await;

        assert_eq!(hub.connection_count(), 2);
    }

    #[tokio::test]
    async fn test_broadcast_excludes_origin() {
        let hub = Hub::spawn(16);
        let (alice, mut alice_rx) = connect(&hub, 4).await;
        let (_bob, mut bob_rx) = connect(&hub, 4).await;
        let (_carol, mut carol_rx) = connect(&hub, 4).await;

        hub.broadcast_except(chat("alice", "hi"), alice)
            .await
            .expect("broadcast");

        let expected = r#"{"sender":"alice","content":"hi"}"#;
        assert_eq!(next(&mut bob_rx).await.as_deref(), Some(expected));
        assert_eq!(next(&mut carol_rx).await.as_deref(), Some(expected));

        // Alice's first delivery is the next broadcast, not her own chat
        hub.broadcast(chat("bob", "barrier")).await.expect("broadcast");
        let first = next(&mut alice_rx).await.expect("barrier");
        assert!(first.contains("barrier"));
    }

    #[tokio::test]
    async fn test_unregister_announces_once_and_closes_mailbox() {
        let hub = Hub::spawn(16);
        let (_alice, mut alice_rx) = connect(&hub, 4).await;
        let (bob, mut bob_rx) = connect(&hub, 4).await;
        let (_carol, mut carol_rx) = connect(&hub, 4).await;

        hub.unregister(bob, Some("bob".into())).await.expect("unregister");
        hub.wait_for_connections(2).await.expect("count");

        let expected = r#"{"content":"bob disconnected"}"#;
        assert_eq!(next(&mut alice_rx).await.as_deref(), Some(expected));
        assert_eq!(next(&mut carol_rx).await.as_deref(), Some(expected));

        // Departed connection sees closure, not its own notice
        assert_eq!(next(&mut bob_rx).await, None);

        // Duplicate unregister is a no-op
        hub.unregister(bob, Some("bob".into())).await.expect("unregister");
        hub.broadcast(chat("alice", "still here")).await.expect("broadcast");
        assert!(next(&mut alice_rx).await.expect("chat").contains("still here"));
        assert_eq!(hub.connection_count(), 2);
    }

    #[tokio::test]
    async fn test_unregister_without_name_is_silent() {
        let hub = Hub::spawn(16);
        let (_alice, mut alice_rx) = connect(&hub, 4).await;
        let (anon, _anon_rx) = connect(&hub, 4).await;

        hub.unregister(anon, None).await.expect("unregister");
        hub.wait_for_connections(1).await.expect("count");

        hub.broadcast(chat("bob", "next")).await.expect("broadcast");
        assert!(next(&mut alice_rx).await.expect("chat").contains("next"));
    }

    #[tokio::test]
    async fn test_slow_consumer_evicted_without_stalling_others() {
        let hub = Hub::spawn(16);
        let (_slow, mut slow_rx) = connect(&hub, 1).await;
        let (_fast, mut fast_rx) = connect(&hub, 8).await;

        for i in 0..4 {
            hub.broadcast(chat("alice", &format!("m{i}"))).await.expect("broadcast");
        }

        for i in 0..4 {
            let text = next(&mut fast_rx).await.expect("delivered");
            assert!(text.contains(&format!("m{i}")));
        }

        hub.wait_for_connections(1).await.expect("count");

        // Evicted consumer keeps only what fit, then sees closure
        assert!(next(&mut slow_rx).await.expect("first").contains("m0"));
        assert_eq!(next(&mut slow_rx).await, None);
    }

    #[tokio::test]
    async fn test_departure_follows_pending_broadcasts() {
        let handle = Hub::spawn(64);
        let (_peer, mut peer_rx) = connect(&handle, 64).await;
        let (alice, _alice_rx) = connect(&handle, 64).await;

        // Both channels hold events by the time the loop next runs
        for i in 0..20 {
            handle
                .broadcast_except(chat("alice", &format!("m{i}")), alice)
                .await
                .expect("broadcast");
        }
        handle
            .unregister(alice, Some("alice".into()))
            .await
            .expect("unregister");

        for i in 0..20 {
            let text = next(&mut peer_rx).await.expect("chat");
            assert!(text.contains(&format!("\"m{i}\"")), "got {text}");
        }
        assert_eq!(
            next(&mut peer_rx).await.as_deref(),
            Some(r#"{"content":"alice disconnected"}"#)
        );
    }

    #[tokio::test]
    async fn test_zero_event_capacity_is_raised() {
        let hub = Hub::spawn(0);
        let (_a, _a_rx) = connect(&hub, 0).await;
        assert_eq!(hub.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_loop_stops_when_handles_dropped() {
        let (hub, handle) = Hub::new(4);
        let task = tokio::spawn(hub.run());

        drop(handle);
        timeout(WAIT, task).await.expect("loop exits").expect("no panic");
    }

    #[tokio::test]
    async fn test_closed_hub_reports_error() {
        let (hub, handle) = Hub::new(4);
        drop(hub);

        let (connection, _mailbox) = Connection::new(1);
        assert!(matches!(
            handle.register(connection).await,
            Err(Error::HubClosed)
        ));
        assert!(matches!(
            handle.broadcast(chat("a", "b")).await,
            Err(Error::HubClosed)
        ));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Connect,
        Disconnect(usize),
        DuplicateDisconnect(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => Just(Op::Connect),
            2 => any::<usize>().prop_map(Op::Disconnect),
            1 => any::<usize>().prop_map(Op::DuplicateDisconnect),
        ]
    }

    proptest! {
        #[test]
        fn prop_registry_size_matches_live_connections(ops in prop::collection::vec(op(), 1..40)) {
            tokio_test::block_on(async {
                let hub = Hub::spawn(64);
                let mut live: Vec<(ConnectionId, mpsc::Receiver<Payload>)> = Vec::new();
                let mut gone: Vec<ConnectionId> = Vec::new();

                let mut joins = Vec::new();
                for op in ops {
                    match op {
                        Op::Connect => {
                            // Concurrent registrations
                            let hub = hub.clone();
                            joins.push(tokio::spawn(async move { connect(&hub, 64).await }));
                        }
                        Op::Disconnect(i) => {
                            for join in joins.drain(..) {
                                live.push(join.await.expect("join"));
                            }
                            if !live.is_empty() {
                                let (id, _mailbox) = live.swap_remove(i % live.len());
                                hub.unregister(id, None).await.expect("unregister");
                                gone.push(id);
                            }
                        }
                        Op::DuplicateDisconnect(i) => {
                            if !gone.is_empty() {
                                let id = gone[i % gone.len()];
                                hub.unregister(id, None).await.expect("unregister");
                            }
                        }
                    }
                }

                for join in joins.drain(..) {
                    live.push(join.await.expect("join"));
                }

                timeout(WAIT, hub.wait_for_connections(live.len()))
                    .await
                    .expect("registry converges")
                    .expect("hub alive");
            });
        }
    }
}
