//! Core protocol types
//!
//! Versions, roles and the capability flags each engine adapter advertises.

use std::fmt;

use serde::{Deserialize, Serialize};

/// HTTP protocol versions a connection can be driven with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HttpVersion {
    Http11,
    Http2,
    Http3,
}

impl HttpVersion {
    /// The ALPN / display token for this version.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            HttpVersion::Http11 => "HTTP/1.1",
            HttpVersion::Http2 => "HTTP/2",
            HttpVersion::Http3 => "HTTP/3",
        }
    }

    /// Capability flags of the engine used for this version.
    #[inline]
    #[must_use]
    pub const fn capabilities(self) -> ProtocolCapabilities {
        match self {
            HttpVersion::Http11 => ProtocolCapabilities::http1(),
            HttpVersion::Http2 => ProtocolCapabilities::http2(),
            HttpVersion::Http3 => ProtocolCapabilities::http3(),
        }
    }
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of the exchange this connection plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Client,
    Server,
}

impl Role {
    #[inline]
    #[must_use]
    pub const fn is_client(self) -> bool {
        matches!(self, Role::Client)
    }
}

/// Overall connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    GoingAway,
    Closed,
}

/// Protocol capability flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolCapabilities {
    pub supports_multiplexing: bool,
    pub supports_flow_control: bool,
    /// Whether a single stream can be reset without tearing down the connection.
    pub supports_stream_reset: bool,
    pub datagram_transport: bool,
}

impl ProtocolCapabilities {
    pub const fn http1() -> Self {
        Self {
            supports_multiplexing: false,
            supports_flow_control: false,
            supports_stream_reset: false,
            datagram_transport: false,
        }
    }

    pub const fn http2() -> Self {
        Self {
            supports_multiplexing: true,
            supports_flow_control: true,
            supports_stream_reset: true,
            datagram_transport: false,
        }
    }

    pub const fn http3() -> Self {
        Self {
            supports_multiplexing: true,
            supports_flow_control: true,
            supports_stream_reset: true,
            datagram_transport: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_http1_lacks_multiplexing() {
        assert!(!HttpVersion::Http11.capabilities().supports_multiplexing);
        assert!(HttpVersion::Http2.capabilities().supports_multiplexing);
        assert!(HttpVersion::Http3.capabilities().datagram_transport);
    }

    #[test]
    fn version_display() {
        assert_eq!(HttpVersion::Http3.to_string(), "HTTP/3");
    }
}
