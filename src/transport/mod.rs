//! WebSocket transport layer.
//!
//! This module accepts clients, upgrades them to WebSocket and runs the
//! per-connection Reader and Writer tasks.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐   upgrade    ┌────────────┐  register   ┌─────┐
//! │  Client  │─────────────►│   Server   │────────────►│ Hub │
//! └──────────┘              └────────────┘             └─────┘
//!      ▲  │                      │ spawn                 │  ▲
//!      │  │ frames          ┌────┴─────┐                 │  │
//!      │  └────────────────►│  Reader  │── broadcast ────┼──┘
//!      │                    └──────────┘  unregister     │
//!      │     frames         ┌──────────┐                 │
//!      └────────────────────│  Writer  │◄─── mailbox ────┘
//!                           └──────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `Server::run` accepts TCP and upgrades requests on the configured path
//! 2. `Connection::open` registers with the hub and spawns both tasks
//! 3. Reader turns frames into identity, chat and departure events
//! 4. Writer drains the mailbox until the hub closes it
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | Hub-side connection half and task startup |
//! | `reader` | Inbound frame loop and identity protocol |
//! | `server` | Listener, accept loop and upgrade routing |
//! | `upgrade` | Request screening and 404 replies |
//! | `writer` | Outbound mailbox drain |

// ============================================================================
// Submodules
// ============================================================================

/// Hub-side connection half.
pub mod connection;

/// Inbound Reader task.
pub mod reader;

/// WebSocket server and upgrade routing.
pub mod server;

/// Request screening ahead of the handshake.
mod upgrade;

/// Outbound Writer task.
pub mod writer;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Connection, MailboxReceiver};
pub use reader::{ReaderState, run_reader};
pub use server::Server;
pub use writer::run_writer;
