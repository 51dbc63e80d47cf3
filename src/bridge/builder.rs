//! Builder pattern for bridge configuration.
//!
//! Initialization is explicit and awaitable: [`BridgeBuilder::bind`]
//! binds the local WebSocket server and returns a [`PendingBridge`]
//! exposing the URL the hub page must connect to;
//! [`PendingBridge::initialize`] awaits the hub's READY handshake and
//! returns a ready [`TabBridge`]. Callers sequence on that instead of
//! racing an implicit load.
//!
//! # Example
//!
//! ```no_run
//! use tab_bridge::TabBridge;
//!
//! # async fn example() -> tab_bridge::Result<()> {
//! let pending = TabBridge::builder()
//!     .target_url("https://web.whatsapp.com/")
//!     .bind()
//!     .await?;
//!
//! println!("point the hub at {}", pending.hub_url());
//! let bridge = pending.initialize().await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use tracing::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::transport::PendingServer;

use super::TabBridge;

// ============================================================================
// Defaults
// ============================================================================

/// Default child tab target.
const DEFAULT_TARGET_URL: &str = "https://web.whatsapp.com/";

/// Default window name passed to the browser's open call.
const DEFAULT_WINDOW_NAME: &str = "AcrossTab";

/// Default timeout for the hub's connection and READY handshake.
const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for a single wire command.
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Default reply registry capacity.
const DEFAULT_REGISTRY_CAPACITY: usize = 64;

/// Default TTL for a pending reply handler.
const DEFAULT_REPLY_TTL: Duration = Duration::from_secs(120);

// ============================================================================
// BridgeConfig
// ============================================================================

/// Resolved bridge configuration.
#[derive(Debug, Clone)]
pub(crate) struct BridgeConfig {
    /// URL `connect` opens child tabs at.
    pub target_url: String,
    /// Window name for opened tabs.
    pub window_name: String,
    /// Timeout for hub connection and READY handshake.
    pub handshake_timeout: Duration,
    /// Timeout for a single wire command.
    pub command_timeout: Duration,
    /// Reply registry capacity.
    pub registry_capacity: usize,
    /// TTL for a pending reply handler.
    pub reply_ttl: Duration,
}

// ============================================================================
// BridgeBuilder
// ============================================================================

/// Builder for configuring a [`TabBridge`].
///
/// Use [`TabBridge::builder()`] to create a new builder.
#[derive(Debug, Clone)]
pub struct BridgeBuilder {
    bind_ip: IpAddr,
    bind_port: u16,
    target_url: String,
    window_name: String,
    handshake_timeout: Duration,
    command_timeout: Duration,
    registry_capacity: usize,
    reply_ttl: Duration,
}

impl Default for BridgeBuilder {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            bind_port: 0,
            target_url: DEFAULT_TARGET_URL.to_string(),
            window_name: DEFAULT_WINDOW_NAME.to_string(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            registry_capacity: DEFAULT_REGISTRY_CAPACITY,
            reply_ttl: DEFAULT_REPLY_TTL,
        }
    }
}

impl BridgeBuilder {
    /// Creates a builder with default configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the address the WebSocket server binds to.
    ///
    /// Defaults to localhost.
    #[inline]
    #[must_use]
    pub fn bind_ip(mut self, ip: IpAddr) -> Self {
        self.bind_ip = ip;
        self
    }

    /// Sets the port the WebSocket server binds to.
    ///
    /// Defaults to 0 (OS-assigned).
    #[inline]
    #[must_use]
    pub fn bind_port(mut self, port: u16) -> Self {
        self.bind_port = port;
        self
    }

    /// Sets the URL child tabs are opened at.
    #[inline]
    #[must_use]
    pub fn target_url(mut self, url: impl Into<String>) -> Self {
        self.target_url = url.into();
        self
    }

    /// Sets the window name passed to the browser's open call.
    #[inline]
    #[must_use]
    pub fn window_name(mut self, name: impl Into<String>) -> Self {
        self.window_name = name.into();
        self
    }

    /// Sets the timeout for the hub's connection and READY handshake.
    #[inline]
    #[must_use]
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Sets the timeout for a single wire command.
    #[inline]
    #[must_use]
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Sets the reply registry capacity.
    ///
    /// Event dispatch fails with [`Error::RegistryFull`] once this many
    /// handlers are pending.
    #[inline]
    #[must_use]
    pub fn registry_capacity(mut self, capacity: usize) -> Self {
        self.registry_capacity = capacity;
        self
    }

    /// Sets how long an unanswered reply handler is kept before
    /// eviction.
    #[inline]
    #[must_use]
    pub fn reply_ttl(mut self, ttl: Duration) -> Self {
        self.reply_ttl = ttl;
        self
    }

    /// Validates the configuration and binds the WebSocket server.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the target URL is invalid or the registry
    ///   capacity is zero
    /// - [`Error::Io`] if binding fails
    pub async fn bind(self) -> Result<PendingBridge> {
        let config = self.validate()?;

        let server = PendingServer::bind(self.bind_ip, self.bind_port).await?;
        debug!(port = server.port(), target = %config.target_url, "Bridge server bound");

        Ok(PendingBridge { server, config })
    }

    /// Validates the builder state into a [`BridgeConfig`].
    fn validate(&self) -> Result<BridgeConfig> {
        let parsed = Url::parse(&self.target_url)
            .map_err(|e| Error::config(format!("Invalid target URL {:?}: {e}", self.target_url)))?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::config(format!(
                "Target URL must be http(s), got scheme {:?}",
                parsed.scheme()
            )));
        }

        if self.registry_capacity == 0 {
            return Err(Error::config("Registry capacity must be at least 1"));
        }

        Ok(BridgeConfig {
            target_url: self.target_url.clone(),
            window_name: self.window_name.clone(),
            handshake_timeout: self.handshake_timeout,
            command_timeout: self.command_timeout,
            registry_capacity: self.registry_capacity,
            reply_ttl: self.reply_ttl,
        })
    }
}

// ============================================================================
// PendingBridge
// ============================================================================

/// A bound bridge awaiting the hub's connection.
///
/// Expose [`hub_url`](Self::hub_url) to the page hosting the hub
/// script, then await [`initialize`](Self::initialize).
pub struct PendingBridge {
    server: PendingServer,
    config: BridgeConfig,
}

impl PendingBridge {
    /// Returns the WebSocket URL the hub must connect to.
    #[inline]
    #[must_use]
    pub fn hub_url(&self) -> String {
        self.server.hub_url()
    }

    /// Returns the bound port.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.server.port()
    }

    /// Returns the local socket address.
    #[inline]
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    /// Awaits the hub's connection and READY handshake.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionTimeout`] if the hub doesn't connect and
    ///   complete its handshake within the configured timeout
    /// - [`Error::Connection`] if the WebSocket upgrade fails
    pub async fn initialize(self) -> Result<TabBridge> {
        let port = self.server.port();
        let (connection, ready) = self.server.accept(self.config.handshake_timeout).await?;
        Ok(TabBridge::new(connection, ready, self.config, port))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configuration() {
        let builder = BridgeBuilder::new();
        let config = builder.validate().expect("valid defaults");

        assert_eq!(config.target_url, "https://web.whatsapp.com/");
        assert_eq!(config.window_name, "AcrossTab");
        assert_eq!(config.registry_capacity, 64);
    }

    #[test]
    fn test_setters() {
        let builder = BridgeBuilder::new()
            .target_url("https://example.com/")
            .window_name("Bridge")
            .registry_capacity(8)
            .reply_ttl(Duration::from_secs(5))
            .command_timeout(Duration::from_secs(10));

        let config = builder.validate().expect("valid");
        assert_eq!(config.target_url, "https://example.com/");
        assert_eq!(config.window_name, "Bridge");
        assert_eq!(config.registry_capacity, 8);
        assert_eq!(config.reply_ttl, Duration::from_secs(5));
        assert_eq!(config.command_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_invalid_target_url_rejected() {
        let result = BridgeBuilder::new().target_url("not a url").validate();
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_non_http_scheme_rejected() {
        let result = BridgeBuilder::new()
            .target_url("ftp://example.com/")
            .validate();
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result = BridgeBuilder::new().registry_capacity(0).validate();
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[tokio::test]
    async fn test_bind_exposes_hub_url() {
        let pending = BridgeBuilder::new().bind().await.expect("bind");
        assert!(pending.hub_url().starts_with("ws://127.0.0.1:"));
        assert!(pending.port() > 0);
    }
}
