//! Connection configuration
//!
//! Plain data structs with defaults, presets and validation. Each protocol
//! section is only consulted when the connection runs that version.

pub mod connection;
pub mod protocol;
pub mod validation;

pub use connection::ConnectionConfig;
pub use protocol::{Http1Config, Http2Config, Http3Config, QuicTlsConfig};
pub use validation::{ConfigResult, ConfigValidator, ConfigurationError, Validator};
