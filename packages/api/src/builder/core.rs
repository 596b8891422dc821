//! Core `ConnectionBuilder` structure and base functionality
//!
//! Collects a `ConnectionConfig` through method chaining and hands it to
//! `HttpConnection::new` on `build`.

use std::net::SocketAddr;
use std::time::Duration;

use hface_core::config::ConnectionConfig;
use hface_core::{HttpConnection, HttpVersion, Result, Role};

/// Fluent builder for one connection driver
///
/// Starts from the protocol defaults; only the section matching the chosen
/// version is consulted when the connection is built.
#[derive(Debug, Clone)]
pub struct ConnectionBuilder {
    pub(crate) config: ConnectionConfig,
    /// Debug logging enabled flag
    pub(crate) debug_enabled: bool,
}

impl ConnectionBuilder {
    /// Start building a connection for `role`, defaulting to HTTP/1.1.
    #[must_use]
    pub fn new(role: Role) -> Self {
        Self {
            config: ConnectionConfig::new(HttpVersion::Http11, role),
            debug_enabled: false,
        }
    }

    #[must_use]
    pub fn client() -> Self {
        Self::new(Role::Client)
    }

    #[must_use]
    pub fn server() -> Self {
        Self::new(Role::Server)
    }

    /// Pick the wire version. It stays fixed for the connection's lifetime.
    #[must_use]
    pub fn version(mut self, version: HttpVersion) -> Self {
        self.config.version = version;
        self
    }

    #[must_use]
    pub fn http1(self) -> Self {
        self.version(HttpVersion::Http11)
    }

    #[must_use]
    pub fn http2(self) -> Self {
        self.version(HttpVersion::Http2)
    }

    #[must_use]
    pub fn http3(self) -> Self {
        self.version(HttpVersion::Http3)
    }

    /// Log the configuration at debug level when building.
    #[must_use]
    pub fn debug(mut self) -> Self {
        self.debug_enabled = true;
        self
    }

    /// Replace the whole configuration, e.g. one loaded with serde.
    #[must_use]
    pub fn with_config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Scheme reported as `:scheme` on inbound HTTP/1.1 requests.
    #[must_use]
    pub fn scheme(mut self, scheme: &str) -> Self {
        self.config.http1.scheme = scheme.to_string();
        self
    }

    #[must_use]
    pub fn max_headers(mut self, max: usize) -> Self {
        self.config.http1.max_headers = max;
        self
    }

    /// HTTP/2 initial stream window.
    #[must_use]
    pub fn initial_window_size(mut self, size: u32) -> Self {
        self.config.http2.initial_window_size = size;
        self
    }

    #[must_use]
    pub fn initial_connection_window_size(mut self, size: u32) -> Self {
        self.config.http2.initial_connection_window_size = size;
        self
    }

    #[must_use]
    pub fn max_frame_size(mut self, size: u32) -> Self {
        self.config.http2.max_frame_size = size;
        self
    }

    #[must_use]
    pub fn max_concurrent_streams(mut self, max: u32) -> Self {
        self.config.http2.max_concurrent_streams = max;
        self.config.http3.initial_max_streams_bidi = u64::from(max);
        self
    }

    /// QUIC path endpoints; required for HTTP/3.
    #[must_use]
    pub fn addresses(mut self, local: SocketAddr, peer: SocketAddr) -> Self {
        self.config.http3.local_addr = local;
        self.config.http3.peer_addr = peer;
        self
    }

    /// SNI for HTTP/3 clients.
    #[must_use]
    pub fn server_name(mut self, name: &str) -> Self {
        self.config.http3.server_name = Some(name.to_string());
        self
    }

    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.http3.max_idle_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// PEM certificate chain and private key for an HTTP/3 server.
    #[must_use]
    pub fn certificate(mut self, chain_file: &str, key_file: &str) -> Self {
        self.config.http3.tls.cert_chain_file = Some(chain_file.to_string());
        self.config.http3.tls.private_key_file = Some(key_file.to_string());
        self
    }

    /// Trust anchors for peer verification; turns verification on.
    #[must_use]
    pub fn ca_file(mut self, ca_file: &str) -> Self {
        self.config.http3.tls.ca_file = Some(ca_file.to_string());
        self.config.http3.tls.verify_peer = true;
        self
    }

    #[must_use]
    pub fn verify_peer(mut self, verify: bool) -> Self {
        self.config.http3.tls.verify_peer = verify;
        self
    }

    /// Validate the configuration and construct the driver.
    ///
    /// # Errors
    ///
    /// `Configuration` if validation fails or the engine rejects the settings.
    pub fn build(self) -> Result<HttpConnection> {
        if self.debug_enabled {
            tracing::debug!(target: "hface::builder", config = ?self.config, "building connection");
        }
        HttpConnection::new(self.config)
    }
}

impl Default for ConnectionBuilder {
    fn default() -> Self {
        Self::client()
    }
}
