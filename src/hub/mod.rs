//! Connection hub.
//!
//! The hub is the only owner of the set of live connections. Producers
//! (the accept loop and Reader tasks) talk to it through a [`HubHandle`];
//! a single control loop task consumes their events and is the sole
//! mutator of the registry.
//!
//! # Architecture
//!
//! ```text
//!  accept loop ── register ───┐
//!                             ▼
//!  Reader tasks ─ unregister ─► Hub control loop ── try_send ──► mailboxes
//!               ─ broadcast ──┘   (owns Registry)                  │
//!                                                                  ▼
//!                                                            Writer tasks
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `core` | Control loop and producer handle |
//! | `registry` | Live connection set with evict-on-full fan-out |

// ============================================================================
// Submodules
// ============================================================================

/// Hub control loop and handle.
pub mod core;

/// Registry of live connections.
pub mod registry;

// ============================================================================
// Re-exports
// ============================================================================

pub use core::{Hub, HubHandle};
pub use registry::Registry;
