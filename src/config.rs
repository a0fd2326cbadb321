//! Process configuration.
//!
//! The only environment setting is `PORT`. Everything else has a fixed
//! default and can be overridden through the builder methods, which tests
//! and embedders use.
//!
//! # Example
//!
//! ```ignore
//! use broadcast_hub::ServerConfig;
//!
//! let config = ServerConfig::from_env()?.with_mailbox_capacity(128);
//! assert_eq!(config.path, "/ws");
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Environment variable selecting the listen port.
pub const PORT_ENV: &str = "PORT";

/// Port used when `PORT` is unset.
pub const DEFAULT_PORT: u16 = 12345;

/// Upgrade endpoint path.
pub const DEFAULT_PATH: &str = "/ws";

/// Frames a mailbox buffers before its connection is evicted.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 64;

/// Capacity of each hub event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Bind address: all interfaces.
const DEFAULT_IP: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

// ============================================================================
// ServerConfig
// ============================================================================

/// Server and hub settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to bind on.
    pub ip: IpAddr,

    /// Port to bind on (0 for random).
    pub port: u16,

    /// Only request path upgraded to WebSocket.
    pub path: String,

    /// Per-connection mailbox capacity.
    pub mailbox_capacity: usize,

    /// Per-channel capacity of the hub's event queues.
    pub event_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ServerConfig {
    /// Creates a configuration with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            ip: DEFAULT_IP,
            port: DEFAULT_PORT,
            path: DEFAULT_PATH.to_owned(),
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `PORT` is set but not a valid port.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    ///
    /// An unset or empty `PORT` falls back to [`DEFAULT_PORT`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `PORT` is set but not a valid port.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new();

        if let Some(raw) = lookup(PORT_ENV)
            && !raw.trim().is_empty()
        {
            config.port = raw.trim().parse().map_err(|e| {
                Error::config(format!("{PORT_ENV}={raw:?} is not a valid port: {e}"))
            })?;
        }

        Ok(config)
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ServerConfig {
    /// Sets the bind address.
    #[inline]
    #[must_use]
    pub fn with_ip(mut self, ip: IpAddr) -> Self {
        self.ip = ip;
        self
    }

    /// Sets the bind port.
    #[inline]
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the upgrade path.
    #[inline]
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Sets the per-connection mailbox capacity.
    ///
    /// Values below 1 are raised to 1.
    #[inline]
    #[must_use]
    pub fn with_mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = capacity.max(1);
        self
    }

    /// Sets the hub event channel capacity.
    ///
    /// Values below 1 are raised to 1.
    #[inline]
    #[must_use]
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}

// ============================================================================
// Accessors
// ============================================================================

impl ServerConfig {
    /// Returns the address to bind on.
    #[inline]
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_port(value: Option<&str>) -> impl Fn(&str) -> Option<String> {
        let value = value.map(str::to_owned);
        move |key| {
            assert_eq!(key, PORT_ENV);
            value.clone()
        }
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 12345);
        assert_eq!(config.path, "/ws");
        assert!(config.ip.is_unspecified());
        assert_eq!(config.socket_addr().to_string(), "0.0.0.0:12345");
    }

    #[test]
    fn test_port_from_lookup() {
        let config = ServerConfig::from_lookup(lookup_port(Some("8080"))).expect("valid");
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_unset_or_empty_port_uses_default() {
        let unset = ServerConfig::from_lookup(lookup_port(None)).expect("valid");
        let empty = ServerConfig::from_lookup(lookup_port(Some(""))).expect("valid");
        assert_eq!(unset.port, DEFAULT_PORT);
        assert_eq!(empty.port, DEFAULT_PORT);
    }

    #[test]
    fn test_invalid_port_is_config_error() {
        let err = ServerConfig::from_lookup(lookup_port(Some("http"))).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));

        let err = ServerConfig::from_lookup(lookup_port(Some("70000"))).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_builder_methods() {
        let config = ServerConfig::new()
            .with_ip(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .with_port(0)
            .with_path("/chat")
            .with_mailbox_capacity(0)
            .with_event_capacity(32);

        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:0");
        assert_eq!(config.path, "/chat");
        assert_eq!(config.mailbox_capacity, 1);
        assert_eq!(config.event_capacity, 32);
    }
}
