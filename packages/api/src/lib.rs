//! hface public API
//!
//! One sans-io connection interface for HTTP/1.1, HTTP/2 and HTTP/3, with
//! fluent builders for connections and header blocks. The driver itself
//! lives in `hface_core` and is re-exported here.

#![deny(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]

pub mod builder;
pub mod prelude;

// Re-export all public API components
pub use builder::*;

// Re-export the driver and its vocabulary from the core package
pub use hface_core::{
    ConnectionConfig, ConnectionState, ConnectionStats, ConnectionStatsSnapshot, Credit, Error, ErrorCode, Event,
    Events, Headers, HttpConnection, HttpVersion, Kind, Origin, Result, Role, StreamHandle,
};
pub use hface_core::{config, error};

/// Main entry point providing static builder methods
pub struct Hface;

impl Hface {
    /// Shorthand for `ConnectionBuilder::client()`
    #[must_use]
    pub fn client() -> ConnectionBuilder {
        ConnectionBuilder::client()
    }

    /// Shorthand for `ConnectionBuilder::server()`
    #[must_use]
    pub fn server() -> ConnectionBuilder {
        ConnectionBuilder::server()
    }
}

/// Shorthand for `ConnectionBuilder::client()`
#[must_use]
pub fn client() -> ConnectionBuilder {
    ConnectionBuilder::client()
}

/// Shorthand for `ConnectionBuilder::server()`
#[must_use]
pub fn server() -> ConnectionBuilder {
    ConnectionBuilder::server()
}
