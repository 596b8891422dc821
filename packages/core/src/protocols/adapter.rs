//! Engine Adapter Trait - Common interface for all protocol engines
//!
//! Each protocol version wraps its engine in a type implementing this trait.
//! The connection driver picks one at construction time and never swaps it.
//! Adapters hold engine state but no stream data: everything the engine
//! emits is pushed out as `EngineEvent`s and collected by the driver after
//! every call.

use std::time::Duration;

use bytes::Bytes;

use super::core::HttpVersion;
use super::error_codes::ErrorCode;
use super::events::EngineEvent;
use super::flow::Credit;
use super::registry::{NativeId, StreamHandle};
use crate::config::ConnectionConfig;
use crate::error::{self, Result};
use crate::http::Headers;

/// Capability set every protocol engine exposes to the driver
pub(crate) trait EngineAdapter: Send {
    /// Protocol version of the wrapped engine
    fn version(&self) -> HttpVersion;

    /// Feed inbound bytes (one datagram for HTTP/3).
    ///
    /// # Errors
    ///
    /// `ProtocolViolation` if the engine rejects the bytes.
    fn receive(&mut self, data: &[u8]) -> Result<()>;

    /// The transport reported end of input.
    fn receive_eof(&mut self) -> Result<()>;

    /// Open a local stream and send its first header block.
    ///
    /// Returns the native id, or `None` if the engine assigns it later via
    /// `EngineEvent::Bound`.
    fn open_stream(
        &mut self,
        handle: StreamHandle,
        headers: &Headers,
        end_stream: bool,
    ) -> Result<Option<NativeId>>;

    /// Response headers or trailers on an existing stream.
    fn send_headers(&mut self, native: NativeId, headers: &Headers, end_stream: bool) -> Result<()>;

    fn send_data(&mut self, native: NativeId, data: Bytes, end_stream: bool) -> Result<()>;

    fn reset_stream(&mut self, native: NativeId, code: ErrorCode) -> Result<()>;

    /// Drop a local stream that never received a native id.
    fn cancel_pending(&mut self, _handle: StreamHandle) {}

    /// Send credit the engine currently grants on `native`.
    fn credit(&self, native: NativeId) -> Credit;

    /// Connection-wide credit not already folded into stream credit.
    fn connection_credit(&self) -> Credit {
        Credit::Unbounded
    }

    /// Begin graceful shutdown.
    fn close(&mut self) -> Result<()>;

    /// Every stream finished after `close`; release the connection.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }

    /// Drain outbound transmit units.
    fn bytes_to_send(&mut self) -> Vec<Bytes>;

    /// Move queued engine events into `out`.
    fn drain_events(&mut self, out: &mut Vec<EngineEvent>);

    /// Whether the engine would accept a new local stream right now.
    fn can_open_stream(&self) -> bool;

    /// Deadline of the next engine timer, relative to now.
    fn next_timeout(&self) -> Option<Duration> {
        None
    }

    /// Fire expired engine timers.
    fn on_timeout(&mut self) -> Result<()> {
        Ok(())
    }

    /// Local transport connection id, where the engine has one.
    fn source_connection_id(&self) -> Option<Bytes> {
        None
    }
}

/// Build the adapter for the configured version.
pub(crate) fn build(config: &ConnectionConfig) -> Result<Box<dyn EngineAdapter>> {
    match config.version {
        HttpVersion::Http11 => Ok(Box::new(super::h1::Http1Adapter::new(
            config.role,
            &config.http1,
        ))),
        #[cfg(feature = "h2")]
        HttpVersion::Http2 => Ok(Box::new(super::h2::Http2Adapter::new(
            config.role,
            &config.http2,
        )?)),
        #[cfg(feature = "h3")]
        HttpVersion::Http3 => Ok(Box::new(super::h3::Http3Adapter::new(
            config.role,
            &config.http3,
        )?)),
        #[allow(unreachable_patterns)]
        other => Err(error::configuration(
            crate::config::ConfigurationError::UnsupportedVersion(other.to_string()),
        )),
    }
}
