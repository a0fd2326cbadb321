//! Broadcast hub server binary.
//!
//! Usage:
//!   PORT=8080 broadcast-hub
//!   RUST_LOG=broadcast_hub=debug broadcast-hub

// ============================================================================
// Imports
// ============================================================================

use broadcast_hub::{Result, ServerConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

/// Filter used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "broadcast_hub=info";

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    init_logging();

    if let Err(e) = run().await {
        error!(error = %e, "Broadcast hub stopped");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = ServerConfig::from_env()?;
    info!(addr = %config.socket_addr(), path = %config.path, "Starting broadcast hub");
    broadcast_hub::serve(config).await
}

/// Initialize tracing/logging.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
