use std::error::Error as StdError;
use std::fmt;

use crate::protocols::registry::StreamHandle;

/// A Result alias where the Err case is `hface_core::Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the connection driver and its engine adapters.
///
/// Peer resets are not errors; they arrive as `Event::StreamReset`.
pub struct Error {
    pub(crate) inner: Box<Inner>,
}

pub(crate) struct Inner {
    pub(crate) kind: Kind,
    pub(crate) source: Option<Box<dyn StdError + Send + Sync>>,
    pub(crate) stream: Option<StreamHandle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Malformed or illegal bytes from the peer. Fatal to the connection.
    ProtocolViolation,
    /// The stream is not in a state that permits the requested operation.
    InvalidStreamState,
    /// The payload exceeds the current send credit.
    FlowControlExceeded,
    /// An HTTP/1.1 exchange is still in flight.
    PipeliningNotReady,
    /// Mandatory pseudo-headers are missing or a field is not representable.
    InvalidHeaders,
    /// The connection is going away or closed.
    ConnectionClosed,
    /// The engine cannot open another stream right now.
    Unavailable,
    /// Unexpected engine failure not caused by the peer.
    Engine,
    /// Invalid connection configuration
    Configuration,
}

impl Error {
    pub fn new(kind: Kind) -> Error {
        Error {
            inner: Box::new(Inner {
                kind,
                source: None,
                stream: None,
            }),
        }
    }

    #[must_use = "Error builder methods return a new Error and should be used"]
    pub fn with<E: Into<Box<dyn StdError + Send + Sync>>>(mut self, source: E) -> Error {
        self.inner.source = Some(source.into());
        self
    }

    #[must_use]
    pub fn with_stream(mut self, stream: StreamHandle) -> Error {
        self.inner.stream = Some(stream);
        self
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> Kind {
        self.inner.kind
    }

    /// The stream the failed operation targeted, if any.
    #[must_use]
    pub fn stream(&self) -> Option<StreamHandle> {
        self.inner.stream
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut f = f.debug_struct("hface::Error");

        f.field("kind", &self.inner.kind);

        if let Some(ref source) = self.inner.source {
            f.field("source", source);
        }

        if let Some(stream) = self.inner.stream {
            f.field("stream", &stream);
        }

        f.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.inner.kind {
            Kind::ProtocolViolation => "peer violated the protocol",
            Kind::InvalidStreamState => "invalid stream state",
            Kind::FlowControlExceeded => "send credit exceeded",
            Kind::PipeliningNotReady => "previous HTTP/1.1 exchange still in flight",
            Kind::InvalidHeaders => "invalid header block",
            Kind::ConnectionClosed => "connection is closing",
            Kind::Unavailable => "no stream available",
            Kind::Engine => "protocol engine error",
            Kind::Configuration => "configuration error",
        };
        f.write_str(prefix)?;
        if let Some(stream) = self.inner.stream {
            write!(f, " on {stream}")?;
        }
        if let Some(ref source) = self.inner.source {
            write!(f, ": {source}")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner
            .source
            .as_ref()
            .map(|err| &**err as &(dyn StdError + 'static))
    }
}
