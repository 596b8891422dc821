//! Protocol Configuration Module
//!
//! HTTP/1.1, HTTP/2 and HTTP/3 engine settings.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use serde::{Deserialize, Serialize};

use super::validation::{ConfigResult, ConfigValidator, ConfigurationError, Validator};

/// HTTP/1.1 framer limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Http1Config {
    /// Scheme reported as `:scheme` for requests read off the wire.
    pub scheme: String,
    /// Maximum number of header fields in one message head.
    pub max_headers: usize,
    /// Maximum size of a message head before it is rejected.
    pub max_head_bytes: usize,
}

impl Default for Http1Config {
    fn default() -> Self {
        Self {
            scheme: "http".to_string(),
            max_headers: 100,
            max_head_bytes: 64 * 1024,
        }
    }
}

impl Validator for Http1Config {
    fn validate(&self) -> ConfigResult<()> {
        if self.scheme != "http" && self.scheme != "https" {
            return Err(ConfigurationError::InvalidParameter(format!(
                "scheme must be http or https, got {}",
                self.scheme
            )));
        }
        ConfigValidator::validate_size(self.max_headers as u64, 1024, "max_headers")?;
        ConfigValidator::validate_size(self.max_head_bytes as u64, 1 << 20, "max_head_bytes")
    }
}

/// HTTP/2 settings handed to `h2::client::Builder` / `h2::server::Builder`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Http2Config {
    pub initial_window_size: u32,
    pub initial_connection_window_size: u32,
    pub max_frame_size: u32,
    pub max_concurrent_streams: u32,
    pub max_header_list_size: u32,
    pub max_send_buffer_size: usize,
}

impl Default for Http2Config {
    fn default() -> Self {
        Self {
            initial_window_size: 65_535,
            initial_connection_window_size: 65_535,
            max_frame_size: 16_384,
            max_concurrent_streams: 100,
            max_header_list_size: 16 << 20,
            max_send_buffer_size: 400 * 1024,
        }
    }
}

impl Http2Config {
    /// Larger windows for bulk transfers
    #[must_use]
    pub fn high_throughput() -> Self {
        Self {
            initial_window_size: 1 << 20,
            initial_connection_window_size: 1 << 24,
            max_frame_size: 1 << 20,
            ..Self::default()
        }
    }
}

impl Validator for Http2Config {
    fn validate(&self) -> ConfigResult<()> {
        ConfigValidator::validate_window(self.initial_window_size.into(), "initial_window_size")?;
        ConfigValidator::validate_window(
            self.initial_connection_window_size.into(),
            "initial_connection_window_size",
        )?;
        if !(16_384..=16_777_215).contains(&self.max_frame_size) {
            return Err(ConfigurationError::InvalidParameter(
                "max_frame_size must be between 16384 and 16777215".to_string(),
            ));
        }
        ConfigValidator::validate_size(
            self.max_send_buffer_size as u64,
            ConfigValidator::MAX_WINDOW,
            "max_send_buffer_size",
        )
    }
}

/// TLS material for the QUIC handshake
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuicTlsConfig {
    /// PEM certificate chain, required for servers.
    pub cert_chain_file: Option<String>,
    /// PEM private key, required for servers.
    pub private_key_file: Option<String>,
    /// PEM trust anchors used when `verify_peer` is set.
    pub ca_file: Option<String>,
    pub verify_peer: bool,
}

/// QUIC transport and HTTP/3 settings handed to `quiche::Config`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Http3Config {
    pub local_addr: SocketAddr,
    pub peer_addr: SocketAddr,
    /// SNI sent by clients.
    pub server_name: Option<String>,
    pub max_idle_timeout_ms: u64,
    pub max_udp_payload_size: u16,
    pub initial_max_data: u64,
    pub initial_max_stream_data_bidi_local: u64,
    pub initial_max_stream_data_bidi_remote: u64,
    pub initial_max_stream_data_uni: u64,
    pub initial_max_streams_bidi: u64,
    pub initial_max_streams_uni: u64,
    pub tls: QuicTlsConfig,
}

impl Default for Http3Config {
    fn default() -> Self {
        let unspecified = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        Self {
            local_addr: unspecified,
            peer_addr: unspecified,
            server_name: None,
            max_idle_timeout_ms: 30_000,
            max_udp_payload_size: 1350,
            initial_max_data: 10_000_000,
            initial_max_stream_data_bidi_local: 1_000_000,
            initial_max_stream_data_bidi_remote: 1_000_000,
            initial_max_stream_data_uni: 1_000_000,
            initial_max_streams_bidi: 100,
            initial_max_streams_uni: 100,
            tls: QuicTlsConfig::default(),
        }
    }
}

impl Validator for Http3Config {
    fn validate(&self) -> ConfigResult<()> {
        if self.max_idle_timeout_ms == 0 {
            return Err(ConfigurationError::InvalidTimeout(
                "max_idle_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.max_udp_payload_size < 1200 {
            return Err(ConfigurationError::InvalidBufferSize(
                "max_udp_payload_size must be at least 1200".to_string(),
            ));
        }
        // The control stream plus both QPACK streams.
        if self.initial_max_streams_uni < 3 {
            return Err(ConfigurationError::InvalidParameter(
                "initial_max_streams_uni must allow at least 3 streams".to_string(),
            ));
        }
        if self.tls.verify_peer && self.tls.ca_file.is_none() {
            return Err(ConfigurationError::MissingTls(
                "verify_peer requires ca_file".to_string(),
            ));
        }
        Ok(())
    }
}
