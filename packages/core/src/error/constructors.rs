use super::helpers::{ConnectionClosed, CreditShortfall, MissingPseudoHeader, StateMismatch};
use super::types::{Error, Kind};
use crate::protocols::flow::Credit;
use crate::protocols::registry::StreamHandle;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Creates an `Error` for bytes the engine rejected as malformed.
pub fn protocol_violation<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::ProtocolViolation).with(e.into())
}

/// Creates an `Error` for an intent the stream cannot accept in its current state.
pub fn invalid_stream_state(stream: StreamHandle, reason: &'static str) -> Error {
    Error::new(Kind::InvalidStreamState)
        .with(StateMismatch(reason))
        .with_stream(stream)
}

/// Same as `invalid_stream_state`, for adapters that only know the native id.
/// The driver attaches the handle on the way out.
pub fn stream_state_mismatch(reason: &'static str) -> Error {
    Error::new(Kind::InvalidStreamState).with(StateMismatch(reason))
}

/// Creates an `Error` for a payload larger than the available send credit.
pub fn flow_control_exceeded(stream: StreamHandle, requested: u64, available: Credit) -> Error {
    Error::new(Kind::FlowControlExceeded)
        .with(CreditShortfall {
            requested,
            available,
        })
        .with_stream(stream)
}

/// Creates an `Error` for a second HTTP/1.1 exchange opened too early.
pub fn pipelining_not_ready(in_flight: StreamHandle) -> Error {
    Error::new(Kind::PipeliningNotReady)
        .with(StateMismatch("response half of the previous exchange is still open"))
        .with_stream(in_flight)
}

/// Creates an `Error` for a header block missing a mandatory pseudo-header.
pub fn missing_pseudo_header(name: &'static str) -> Error {
    Error::new(Kind::InvalidHeaders).with(MissingPseudoHeader(name))
}

/// Creates an `Error` for a header block the engine could not encode.
pub fn invalid_headers<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::InvalidHeaders).with(e.into())
}

/// Creates an `Error` for intents issued after shutdown began.
pub fn connection_closed() -> Error {
    Error::new(Kind::ConnectionClosed).with(ConnectionClosed)
}

/// Creates an `Error` when the engine refuses to open a stream for now.
pub fn unavailable<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Unavailable).with(e.into())
}

/// Creates an `Error` for an engine failure not caused by the peer.
pub fn engine<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Engine).with(e.into())
}

/// Creates an `Error` for a rejected configuration.
pub fn configuration<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Configuration).with(e.into())
}
