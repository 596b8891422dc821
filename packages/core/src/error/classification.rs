use super::types::{Error, Kind};

impl Error {
    /// Returns true if the peer sent bytes the engine rejected.
    #[must_use]
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self.inner.kind, Kind::ProtocolViolation)
    }

    /// Returns true if the stream's state did not permit the operation.
    #[must_use]
    pub fn is_invalid_stream_state(&self) -> bool {
        matches!(self.inner.kind, Kind::InvalidStreamState)
    }

    /// Returns true if a send exceeded the available credit.
    #[must_use]
    pub fn is_flow_control_exceeded(&self) -> bool {
        matches!(self.inner.kind, Kind::FlowControlExceeded)
    }

    /// Returns true if an HTTP/1.1 exchange was still in flight.
    #[must_use]
    pub fn is_pipelining_not_ready(&self) -> bool {
        matches!(self.inner.kind, Kind::PipeliningNotReady)
    }

    /// Returns true if the header block was rejected.
    #[must_use]
    pub fn is_invalid_headers(&self) -> bool {
        matches!(self.inner.kind, Kind::InvalidHeaders)
    }

    /// Returns true if the connection no longer accepts new work.
    #[must_use]
    pub fn is_connection_closed(&self) -> bool {
        matches!(self.inner.kind, Kind::ConnectionClosed)
    }

    /// Returns true if the configuration was rejected.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self.inner.kind, Kind::Configuration)
    }

    /// Returns true if the caller can retry the same call later on the same connection.
    ///
    /// Credit shortfalls clear after a `FlowControlUpdated`, pipelining and
    /// availability errors clear once in-flight exchanges finish.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.inner.kind,
            Kind::FlowControlExceeded | Kind::PipeliningNotReady | Kind::Unavailable
        )
    }

    /// Returns true if the connection cannot be used any further.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.inner.kind,
            Kind::ProtocolViolation | Kind::ConnectionClosed | Kind::Engine
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::error;
    use crate::protocols::flow::Credit;
    use crate::protocols::registry::StreamHandle;

    #[test]
    fn credit_errors_are_retryable() {
        let err = error::flow_control_exceeded(StreamHandle::from_raw(3), 10, Credit::Limited(4));
        assert!(err.is_flow_control_exceeded());
        assert!(err.is_retryable());
        assert!(!err.is_fatal());
        assert_eq!(err.stream(), Some(StreamHandle::from_raw(3)));
        assert!(err.to_string().contains("10 bytes requested"));
    }

    #[test]
    fn violations_are_fatal() {
        let err = error::protocol_violation("bad frame");
        assert!(err.is_protocol_violation());
        assert!(err.is_fatal());
        assert!(!err.is_retryable());
    }
}
