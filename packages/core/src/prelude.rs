//! hface core prelude
//!
//! The types needed to construct and drive a connection.

// Driver and its event vocabulary
pub use crate::protocols::{
    ConnectionState, Credit, ErrorCode, Event, Events, FlowLedger, HalfState, HttpConnection, HttpVersion, Origin,
    Role, StreamHandle,
};

// Header model
pub use crate::http::Headers;

// Configuration
pub use crate::config::{ConnectionConfig, Http1Config, Http2Config, Http3Config, QuicTlsConfig, Validator};

// Telemetry
pub use crate::telemetry::{ConnectionStats, ConnectionStatsSnapshot};
