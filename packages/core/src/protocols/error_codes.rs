//! Reset and termination reasons across protocol versions
//!
//! `ErrorCode` is the union of the HTTP/2 and HTTP/3 application code
//! spaces. Each version narrows codes it does not know to its generic
//! protocol error when widening to the wire, and unknown wire codes survive
//! as `Other`. HTTP/1.1 has no reset frame; its code space is the status
//! family used to describe a torn down exchange (400, 500, 502).

use std::fmt;

use super::core::HttpVersion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NoError,
    ProtocolError,
    InternalError,
    FlowControlError,
    SettingsTimeout,
    StreamClosed,
    FrameSizeError,
    RefusedStream,
    Cancel,
    CompressionError,
    ConnectError,
    ExcessiveLoad,
    InadequateSecurity,
    VersionFallback,
    StreamCreationError,
    ClosedCriticalStream,
    FrameUnexpected,
    FrameError,
    IdError,
    SettingsError,
    MissingSettings,
    RequestIncomplete,
    MessageError,
    /// A wire code with no named meaning in this table.
    Other(u64),
}

const H2_TABLE: &[(ErrorCode, u64)] = &[
    (ErrorCode::NoError, 0x0),
    (ErrorCode::ProtocolError, 0x1),
    (ErrorCode::InternalError, 0x2),
    (ErrorCode::FlowControlError, 0x3),
    (ErrorCode::SettingsTimeout, 0x4),
    (ErrorCode::StreamClosed, 0x5),
    (ErrorCode::FrameSizeError, 0x6),
    (ErrorCode::RefusedStream, 0x7),
    (ErrorCode::Cancel, 0x8),
    (ErrorCode::CompressionError, 0x9),
    (ErrorCode::ConnectError, 0xa),
    (ErrorCode::ExcessiveLoad, 0xb),
    (ErrorCode::InadequateSecurity, 0xc),
    (ErrorCode::VersionFallback, 0xd),
];

const H3_TABLE: &[(ErrorCode, u64)] = &[
    (ErrorCode::NoError, 0x100),
    (ErrorCode::ProtocolError, 0x101),
    (ErrorCode::InternalError, 0x102),
    (ErrorCode::StreamCreationError, 0x103),
    (ErrorCode::ClosedCriticalStream, 0x104),
    (ErrorCode::FrameUnexpected, 0x105),
    (ErrorCode::FrameError, 0x106),
    (ErrorCode::ExcessiveLoad, 0x107),
    (ErrorCode::IdError, 0x108),
    (ErrorCode::SettingsError, 0x109),
    (ErrorCode::MissingSettings, 0x10a),
    (ErrorCode::RefusedStream, 0x10b),
    (ErrorCode::Cancel, 0x10c),
    (ErrorCode::RequestIncomplete, 0x10d),
    (ErrorCode::MessageError, 0x10e),
    (ErrorCode::ConnectError, 0x10f),
    (ErrorCode::VersionFallback, 0x110),
    // QPACK decompression failed; encoder and decoder stream errors narrow here too.
    (ErrorCode::CompressionError, 0x200),
];

const H1_TABLE: &[(ErrorCode, u64)] = &[
    (ErrorCode::NoError, 0),
    (ErrorCode::ProtocolError, 400),
    (ErrorCode::InternalError, 500),
    (ErrorCode::ConnectError, 502),
];

impl ErrorCode {
    /// Widen into `version`'s code space.
    #[must_use]
    pub fn to_wire(self, version: HttpVersion) -> u64 {
        if let ErrorCode::Other(code) = self {
            return code;
        }
        let table = table(version);
        if let Some((_, code)) = table.iter().find(|(c, _)| *c == self) {
            return *code;
        }
        // No counterpart: fall back to the version's generic error.
        match version {
            HttpVersion::Http11 if self == ErrorCode::Cancel || self == ErrorCode::RefusedStream => 0,
            HttpVersion::Http11 => 500,
            HttpVersion::Http2 if self == ErrorCode::FrameError => 0x6,
            HttpVersion::Http2 => 0x1,
            HttpVersion::Http3 if self == ErrorCode::FrameSizeError => 0x106,
            HttpVersion::Http3 if self == ErrorCode::SettingsTimeout => 0x109,
            HttpVersion::Http3 => 0x101,
        }
    }

    /// Narrow a wire code received over `version`.
    #[must_use]
    pub fn from_wire(version: HttpVersion, code: u64) -> ErrorCode {
        if version == HttpVersion::Http3 && (0x201..=0x202).contains(&code) {
            return ErrorCode::CompressionError;
        }
        table(version)
            .iter()
            .find(|(_, c)| *c == code)
            .map_or(ErrorCode::Other(code), |(name, _)| *name)
    }

    #[must_use]
    pub fn is_no_error(self) -> bool {
        self == ErrorCode::NoError
    }
}

fn table(version: HttpVersion) -> &'static [(ErrorCode, u64)] {
    match version {
        HttpVersion::Http11 => H1_TABLE,
        HttpVersion::Http2 => H2_TABLE,
        HttpVersion::Http3 => H3_TABLE,
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::Other(code) => write!(f, "error code {code:#x}"),
            named => fmt::Debug::fmt(named, f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn h2_codes_round_trip() {
        for (name, code) in H2_TABLE {
            assert_eq!(ErrorCode::from_wire(HttpVersion::Http2, *code), *name);
            assert_eq!(name.to_wire(HttpVersion::Http2), *code);
        }
    }

    #[test]
    fn h3_only_codes_narrow_to_protocol_error_on_h2() {
        assert_eq!(ErrorCode::RequestIncomplete.to_wire(HttpVersion::Http2), 0x1);
        assert_eq!(ErrorCode::FrameError.to_wire(HttpVersion::Http2), 0x6);
        assert_eq!(ErrorCode::FlowControlError.to_wire(HttpVersion::Http3), 0x101);
    }

    #[test]
    fn cancel_maps_to_request_cancelled_on_h3() {
        assert_eq!(ErrorCode::Cancel.to_wire(HttpVersion::Http3), 0x10c);
        assert_eq!(ErrorCode::from_wire(HttpVersion::Http3, 0x10c), ErrorCode::Cancel);
    }

    #[test]
    fn qpack_stream_errors_narrow() {
        assert_eq!(
            ErrorCode::from_wire(HttpVersion::Http3, 0x202),
            ErrorCode::CompressionError
        );
    }

    #[test]
    fn http1_uses_status_family() {
        assert_eq!(ErrorCode::ProtocolError.to_wire(HttpVersion::Http11), 400);
        assert_eq!(ErrorCode::ConnectError.to_wire(HttpVersion::Http11), 502);
        assert_eq!(ErrorCode::FlowControlError.to_wire(HttpVersion::Http11), 500);
        assert_eq!(ErrorCode::from_wire(HttpVersion::Http11, 418), ErrorCode::Other(418));
    }

    #[test]
    fn unknown_codes_survive() {
        assert_eq!(ErrorCode::from_wire(HttpVersion::Http2, 0x42), ErrorCode::Other(0x42));
        assert_eq!(ErrorCode::Other(0x42).to_wire(HttpVersion::Http2), 0x42);
    }
}
