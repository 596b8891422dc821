//! Unified event model
//!
//! `Event` is what callers see. `EngineEvent` is what adapters produce: the
//! same vocabulary keyed by engine-native stream ids, before the driver
//! resolves them to public handles.

use bytes::Bytes;

use super::error_codes::ErrorCode;
use super::flow::Credit;
use super::registry::{NativeId, StreamHandle};
use crate::http::Headers;

/// Which side caused a reset or termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Local,
    Remote,
}

/// A protocol-independent occurrence on a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    HeadersReceived {
        stream: StreamHandle,
        headers: Headers,
        end_stream: bool,
    },
    DataReceived {
        stream: StreamHandle,
        data: Bytes,
        end_stream: bool,
    },
    /// The peer finished sending on this stream.
    StreamEnded { stream: StreamHandle },
    StreamReset {
        stream: StreamHandle,
        code: ErrorCode,
        origin: Origin,
    },
    /// New absolute send credit; `stream: None` is connection scoped.
    FlowControlUpdated {
        stream: Option<StreamHandle>,
        credit: Credit,
    },
    /// The QUIC handshake finished and HTTP/3 streams can be opened.
    HandshakeCompleted { alpn: Option<String> },
    /// The peer announced shutdown; no new streams will be accepted.
    GoawayReceived { code: ErrorCode },
    ConnectionTerminated {
        code: ErrorCode,
        origin: Origin,
        reason: Option<String>,
    },
}

impl Event {
    /// The stream this event is scoped to, if any.
    #[must_use]
    pub fn stream(&self) -> Option<StreamHandle> {
        match self {
            Event::HeadersReceived { stream, .. }
            | Event::DataReceived { stream, .. }
            | Event::StreamEnded { stream }
            | Event::StreamReset { stream, .. } => Some(*stream),
            Event::FlowControlUpdated { stream, .. } => *stream,
            Event::HandshakeCompleted { .. }
            | Event::GoawayReceived { .. }
            | Event::ConnectionTerminated { .. } => None,
        }
    }

    /// Whether the event closes the stream's remote half or the stream itself.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Event::StreamEnded { .. } | Event::StreamReset { .. } | Event::ConnectionTerminated { .. }
        )
    }
}

/// Adapter output, keyed by native stream id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EngineEvent {
    Headers {
        native: NativeId,
        headers: Headers,
        end_stream: bool,
    },
    Data {
        native: NativeId,
        data: Bytes,
        end_stream: bool,
    },
    /// The peer reset the stream.
    Reset { native: NativeId, code: ErrorCode },
    /// The engine reset the stream on our behalf (for example after a
    /// stream-level protocol error by the peer).
    LocalReset { native: NativeId, code: ErrorCode },
    Credit {
        native: Option<NativeId>,
        credit: Credit,
    },
    /// A deferred local stream received its native id.
    Bound {
        handle: StreamHandle,
        native: NativeId,
    },
    Handshake { alpn: Option<String> },
    Goaway { code: ErrorCode },
    Terminated {
        code: ErrorCode,
        origin: Origin,
        reason: Option<String>,
    },
}

impl EngineEvent {
    pub(crate) fn native(&self) -> Option<NativeId> {
        match self {
            EngineEvent::Headers { native, .. }
            | EngineEvent::Data { native, .. }
            | EngineEvent::Reset { native, .. }
            | EngineEvent::LocalReset { native, .. }
            | EngineEvent::Bound { native, .. } => Some(*native),
            EngineEvent::Credit { native, .. } => *native,
            EngineEvent::Handshake { .. }
            | EngineEvent::Goaway { .. }
            | EngineEvent::Terminated { .. } => None,
        }
    }

    /// Remote-closing events are ordered ahead of local-closing ones for the
    /// same stream within a batch.
    pub(crate) fn closes_remote(&self) -> bool {
        matches!(
            self,
            EngineEvent::Headers { end_stream: true, .. }
                | EngineEvent::Data { end_stream: true, .. }
                | EngineEvent::Reset { .. }
        )
    }

    pub(crate) fn closes_local(&self) -> bool {
        matches!(self, EngineEvent::LocalReset { .. })
    }
}
