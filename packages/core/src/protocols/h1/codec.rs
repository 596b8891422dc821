//! HTTP/1.1 message heads and body framing
//!
//! Heads are parsed with `httparse` and written by hand; bodies are framed by
//! `Content-Length`, chunked transfer coding, or connection close.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::field_case::write_capitalized;
use crate::error::{self, Result, UnrepresentableField};
use crate::http::headers::{self, Headers};

/// How a message body is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Framing {
    Empty,
    Length(u64),
    Chunked,
    UntilClose,
}

/// Request methods whose responses are framed differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum RequestKind {
    #[default]
    Other,
    Head,
    Connect,
}

impl RequestKind {
    fn of(method: &[u8]) -> Self {
        match method {
            b"HEAD" => RequestKind::Head,
            b"CONNECT" => RequestKind::Connect,
            _ => RequestKind::Other,
        }
    }

    /// Whether a response with `status` carries no body.
    fn bodiless(self, status: u16) -> bool {
        self == RequestKind::Head
            || (100..200).contains(&status)
            || status == 204
            || status == 304
            || self.tunnels(status)
    }

    /// Whether a response with `status` turns the connection into a tunnel.
    pub(crate) fn tunnels(self, status: u16) -> bool {
        status == 101 || (self == RequestKind::Connect && (200..300).contains(&status))
    }
}

/// A parsed message head.
#[derive(Debug)]
pub(crate) struct Head {
    pub consumed: usize,
    pub headers: Headers,
    pub framing: Framing,
    /// 1xx other than 101: more heads follow for the same exchange.
    pub informational: bool,
    pub kind: RequestKind,
    /// Requests: CONNECT or `Upgrade` offered. Responses: the offer was taken.
    pub switching: bool,
    /// HTTP/1.0 peer or `Connection: close`.
    pub close_after: bool,
}

fn wants_close(headers: &Headers, version: Option<u8>) -> bool {
    let close = headers
        .get_all(b"connection")
        .any(|v| v.split(|b| *b == b',').any(|t| t.trim_ascii().eq_ignore_ascii_case(b"close")));
    close || version == Some(0)
}

fn collect_fields(fields: &[httparse::Header<'_>], out: &mut Headers) {
    for field in fields {
        out.push(field.name, Bytes::copy_from_slice(field.value));
    }
}

fn content_length(headers: &Headers) -> Result<Option<u64>> {
    let mut length = None;
    for value in headers.get_all(b"content-length") {
        let parsed = std::str::from_utf8(value)
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .ok_or_else(|| error::protocol_violation("invalid Content-Length"))?;
        if length.is_some_and(|l| l != parsed) {
            return Err(error::protocol_violation("conflicting Content-Length values"));
        }
        length = Some(parsed);
    }
    Ok(length)
}

fn is_chunked(headers: &Headers) -> Option<bool> {
    let last = headers.get_all(b"transfer-encoding").last()?;
    let coding = last.rsplit(|b| *b == b',').next().unwrap_or_default();
    Some(coding.trim_ascii().eq_ignore_ascii_case(b"chunked"))
}

/// Parses a request head. `Ok(None)` means more bytes are needed.
pub(crate) fn parse_request(buf: &[u8], max_headers: usize, scheme: &Bytes) -> Result<Option<Head>> {
    let mut slots = vec![httparse::EMPTY_HEADER; max_headers];
    let mut req = httparse::Request::new(&mut slots);
    let consumed = match req.parse(buf) {
        Ok(httparse::Status::Complete(n)) => n,
        Ok(httparse::Status::Partial) => return Ok(None),
        Err(e) => return Err(error::protocol_violation(e)),
    };
    let method = req.method.unwrap_or_default();
    let target = req.path.unwrap_or_default();
    let kind = RequestKind::of(method.as_bytes());

    let mut fields = Headers::with_capacity(req.headers.len() + 4);
    collect_fields(req.headers, &mut fields);

    let hosts: Vec<Bytes> = fields.get_all(b"host").cloned().collect();
    if hosts.len() > 1 {
        return Err(error::protocol_violation("duplicate Host header"));
    }
    let host = hosts.into_iter().next();
    fields.remove("host");

    let mut headers = Headers::with_capacity(fields.len() + 4);
    headers.push(headers::METHOD, Bytes::copy_from_slice(method.as_bytes()));
    if kind == RequestKind::Connect {
        headers.push(headers::AUTHORITY, Bytes::copy_from_slice(target.as_bytes()));
    } else {
        headers.push(headers::SCHEME, scheme.clone());
        headers.push(headers::AUTHORITY, host.unwrap_or_default());
        headers.push(headers::PATH, Bytes::copy_from_slice(target.as_bytes()));
    }
    for (name, value) in fields {
        headers.push(name, value);
    }

    let framing = match is_chunked(&headers) {
        Some(true) => Framing::Chunked,
        Some(false) => return Err(error::protocol_violation("unsupported transfer coding")),
        None => match content_length(&headers)? {
            Some(0) | None => Framing::Empty,
            Some(n) => Framing::Length(n),
        },
    };

    Ok(Some(Head {
        consumed,
        close_after: wants_close(&headers, req.version),
        switching: kind == RequestKind::Connect || headers.contains("upgrade"),
        headers,
        framing,
        informational: false,
        kind,
    }))
}

/// Parses a response head to a request of `kind`.
pub(crate) fn parse_response(buf: &[u8], max_headers: usize, kind: RequestKind) -> Result<Option<Head>> {
    let mut slots = vec![httparse::EMPTY_HEADER; max_headers];
    let mut resp = httparse::Response::new(&mut slots);
    let consumed = match resp.parse(buf) {
        Ok(httparse::Status::Complete(n)) => n,
        Ok(httparse::Status::Partial) => return Ok(None),
        Err(e) => return Err(error::protocol_violation(e)),
    };
    let status = resp.code.unwrap_or_default();

    let mut headers = Headers::response(status);
    collect_fields(resp.headers, &mut headers);

    let informational = (100..200).contains(&status) && status != 101;
    let framing = if kind.bodiless(status) {
        Framing::Empty
    } else {
        match is_chunked(&headers) {
            Some(true) => Framing::Chunked,
            Some(false) => Framing::UntilClose,
            None => match content_length(&headers)? {
                Some(0) => Framing::Empty,
                Some(n) => Framing::Length(n),
                None => Framing::UntilClose,
            },
        }
    };

    Ok(Some(Head {
        consumed,
        close_after: wants_close(&headers, resp.version),
        switching: kind.tunnels(status),
        headers,
        framing,
        informational,
        kind,
    }))
}

fn check_field(name: &[u8], value: &[u8]) -> Result<()> {
    let bad_name = name.is_empty()
        || name
            .iter()
            .any(|b| b.is_ascii_whitespace() || b.is_ascii_control() || *b == b':');
    let bad_value = value.iter().any(|b| *b == b'\r' || *b == b'\n' || *b == 0);
    if bad_name || bad_value {
        return Err(error::invalid_headers(UnrepresentableField {
            name: String::from_utf8_lossy(name).into_owned(),
            reason: "not a valid HTTP/1.1 field".to_string(),
        }));
    }
    Ok(())
}

fn write_field(name: &[u8], value: &[u8], out: &mut BytesMut) -> Result<()> {
    check_field(name, value)?;
    let mut canonical = Vec::with_capacity(name.len());
    write_capitalized(name, &mut canonical);
    out.put_slice(&canonical);
    out.put_slice(b": ");
    out.put_slice(value);
    out.put_slice(b"\r\n");
    Ok(())
}

/// Framing chosen for an outbound message from its declared fields.
///
/// A Transfer-Encoding must end in `chunked`; a Content-Length must be a
/// single non-negative integer.
fn declared_framing(headers: &Headers) -> Result<Option<Framing>> {
    match is_chunked(headers) {
        Some(true) => return Ok(Some(Framing::Chunked)),
        Some(false) => return Err(error::invalid_headers("Transfer-Encoding must end in chunked")),
        None => {}
    }
    let length = content_length(headers).map_err(|_| error::invalid_headers("invalid Content-Length"))?;
    Ok(length.map(|n| if n == 0 { Framing::Empty } else { Framing::Length(n) }))
}

/// Framing for a head that also ends the message. A declared length has to
/// be zero; a declared chunked body gets its terminating chunk right away.
fn ended_framing(declared: Option<Framing>, tail: &mut bool) -> Result<Framing> {
    match declared {
        Some(Framing::Length(_)) => Err(error::invalid_headers("Content-Length declares a body the message ends without")),
        Some(Framing::Chunked) => {
            *tail = true;
            Ok(Framing::Empty)
        }
        _ => Ok(Framing::Empty),
    }
}

/// Writes a request line and header block.
///
/// Returns the body framing and the kind of request written.
pub(crate) fn encode_request(headers: &Headers, end_stream: bool, out: &mut BytesMut) -> Result<(Framing, RequestKind)> {
    let method = headers
        .get(headers::METHOD)
        .ok_or_else(|| error::missing_pseudo_header(":method"))?;
    let authority = headers
        .get(headers::AUTHORITY)
        .ok_or_else(|| error::missing_pseudo_header(":authority"))?;
    let kind = RequestKind::of(method);
    let target = if kind == RequestKind::Connect {
        if headers.contains(headers::SCHEME) || headers.contains(headers::PATH) {
            return Err(error::invalid_headers("CONNECT carries only :method and :authority"));
        }
        authority
    } else {
        if !headers.contains(headers::SCHEME) {
            return Err(error::missing_pseudo_header(":scheme"));
        }
        headers
            .get(headers::PATH)
            .ok_or_else(|| error::missing_pseudo_header(":path"))?
    };
    check_field(b"method", method)?;

    out.put_slice(method);
    out.put_u8(b' ');
    out.put_slice(target);
    out.put_slice(b" HTTP/1.1\r\n");

    match headers.get("host") {
        None => write_field(b"host", authority, out)?,
        Some(host) if host != authority => {
            return Err(error::invalid_headers("Host header does not match :authority"));
        }
        Some(_) => {}
    }
    for (name, value) in headers.regular() {
        write_field(name, value, out)?;
    }

    let declared = declared_framing(headers)?;
    let mut tail = false;
    let framing = if end_stream {
        ended_framing(declared, &mut tail)?
    } else if let Some(declared) = declared {
        declared
    } else if kind == RequestKind::Connect || headers.contains("upgrade") {
        // Tunnel bytes follow the switch; the request itself is bodiless.
        Framing::Empty
    } else {
        write_field(b"transfer-encoding", b"chunked", out)?;
        Framing::Chunked
    };
    out.put_slice(b"\r\n");
    if tail {
        out.put_slice(b"0\r\n\r\n");
    }
    Ok((framing, kind))
}

/// Writes a status line and header block.
///
/// Returns the body framing and whether the head was informational.
pub(crate) fn encode_response(
    headers: &Headers,
    end_stream: bool,
    kind: RequestKind,
    out: &mut BytesMut,
) -> Result<(Framing, bool)> {
    let status = headers
        .status()
        .ok_or_else(|| error::missing_pseudo_header(":status"))?;
    let reason = http::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("");
    out.put_slice(format!("HTTP/1.1 {status} {reason}\r\n").as_bytes());
    for (name, value) in headers.regular() {
        write_field(name, value, out)?;
    }

    let informational = (100..200).contains(&status) && status != 101;
    let mut tail = false;
    let framing = if kind.bodiless(status) {
        Framing::Empty
    } else {
        match (declared_framing(headers)?, end_stream) {
            (None, true) => {
                write_field(b"content-length", b"0", out)?;
                Framing::Empty
            }
            (None, false) => {
                write_field(b"transfer-encoding", b"chunked", out)?;
                Framing::Chunked
            }
            (declared, true) => ended_framing(declared, &mut tail)?,
            (Some(declared), false) => declared,
        }
    };
    out.put_slice(b"\r\n");
    if tail {
        out.put_slice(b"0\r\n\r\n");
    }
    Ok((framing, informational))
}

/// Outbound body state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BodyEncoder {
    Empty,
    Length(u64),
    Chunked,
}

impl BodyEncoder {
    pub(crate) fn new(framing: Framing) -> Self {
        match framing {
            Framing::Empty | Framing::UntilClose => BodyEncoder::Empty,
            Framing::Length(n) => BodyEncoder::Length(n),
            Framing::Chunked => BodyEncoder::Chunked,
        }
    }

    /// Frames `data`; with `end` the message is finished.
    pub(crate) fn encode(&mut self, data: &[u8], end: bool, out: &mut BytesMut) -> Result<()> {
        match self {
            BodyEncoder::Empty => {
                if !data.is_empty() {
                    return Err(error::stream_state_mismatch("message has no body"));
                }
            }
            BodyEncoder::Length(remaining) => {
                let len = data.len() as u64;
                if len > *remaining {
                    return Err(error::stream_state_mismatch("body exceeds declared Content-Length"));
                }
                if end && len != *remaining {
                    return Err(error::stream_state_mismatch("body shorter than declared Content-Length"));
                }
                *remaining -= len;
                out.put_slice(data);
            }
            BodyEncoder::Chunked => {
                if !data.is_empty() {
                    out.put_slice(format!("{:x}\r\n", data.len()).as_bytes());
                    out.put_slice(data);
                    out.put_slice(b"\r\n");
                }
                if end {
                    out.put_slice(b"0\r\n\r\n");
                }
            }
        }
        Ok(())
    }

    /// Terminates a chunked body with a trailer section.
    pub(crate) fn encode_trailers(&mut self, trailers: &Headers, out: &mut BytesMut) -> Result<()> {
        if *self != BodyEncoder::Chunked {
            return Err(error::stream_state_mismatch("trailers need chunked framing"));
        }
        if trailers.has_pseudo() {
            return Err(error::invalid_headers("pseudo-headers are not allowed in trailers"));
        }
        out.put_slice(b"0\r\n");
        for (name, value) in trailers.regular() {
            write_field(name, value, out)?;
        }
        out.put_slice(b"\r\n");
        Ok(())
    }
}

/// A decoded piece of an inbound body.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Piece {
    Data(Bytes),
    Trailers(Headers),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChunkPhase {
    Size,
    Data(u64),
    DataEnd,
    Trailers,
}

/// Inbound body state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BodyDecoder {
    Length(u64),
    Chunked(ChunkPhase),
    UntilClose,
}

impl BodyDecoder {
    pub(crate) fn new(framing: Framing) -> Option<Self> {
        match framing {
            Framing::Empty => None,
            Framing::Length(n) => Some(BodyDecoder::Length(n)),
            Framing::Chunked => Some(BodyDecoder::Chunked(ChunkPhase::Size)),
            Framing::UntilClose => Some(BodyDecoder::UntilClose),
        }
    }

    /// Consumes what it can from `buf`. Returns true once the body is complete.
    pub(crate) fn decode(&mut self, buf: &mut BytesMut, max_headers: usize, out: &mut Vec<Piece>) -> Result<bool> {
        match self {
            BodyDecoder::Length(remaining) => {
                let n = usize::try_from(*remaining).unwrap_or(usize::MAX).min(buf.len());
                if n > 0 {
                    out.push(Piece::Data(buf.split_to(n).freeze()));
                    *remaining -= n as u64;
                }
                Ok(*remaining == 0)
            }
            BodyDecoder::UntilClose => {
                if !buf.is_empty() {
                    out.push(Piece::Data(buf.split().freeze()));
                }
                Ok(false)
            }
            BodyDecoder::Chunked(phase) => loop {
                match *phase {
                    ChunkPhase::Size => match httparse::parse_chunk_size(&buf[..]) {
                        Ok(httparse::Status::Complete((n, size))) => {
                            buf.advance(n);
                            *phase = if size == 0 { ChunkPhase::Trailers } else { ChunkPhase::Data(size) };
                        }
                        Ok(httparse::Status::Partial) => return Ok(false),
                        Err(_) => return Err(error::protocol_violation("invalid chunk size line")),
                    },
                    ChunkPhase::Data(remaining) => {
                        if buf.is_empty() {
                            return Ok(false);
                        }
                        let n = usize::try_from(remaining).unwrap_or(usize::MAX).min(buf.len());
                        out.push(Piece::Data(buf.split_to(n).freeze()));
                        let left = remaining - n as u64;
                        *phase = if left == 0 { ChunkPhase::DataEnd } else { ChunkPhase::Data(left) };
                    }
                    ChunkPhase::DataEnd => {
                        if buf.len() < 2 {
                            return Ok(false);
                        }
                        if &buf[..2] != b"\r\n" {
                            return Err(error::protocol_violation("chunk not terminated by CRLF"));
                        }
                        buf.advance(2);
                        *phase = ChunkPhase::Size;
                    }
                    ChunkPhase::Trailers => {
                        if buf.len() < 2 {
                            return Ok(false);
                        }
                        if &buf[..2] == b"\r\n" {
                            buf.advance(2);
                            return Ok(true);
                        }
                        let mut slots = vec![httparse::EMPTY_HEADER; max_headers];
                        let (consumed, trailers) = match httparse::parse_headers(&buf[..], &mut slots) {
                            Ok(httparse::Status::Complete((n, fields))) => {
                                let mut trailers = Headers::with_capacity(fields.len());
                                collect_fields(fields, &mut trailers);
                                (n, trailers)
                            }
                            Ok(httparse::Status::Partial) => return Ok(false),
                            Err(e) => return Err(error::protocol_violation(e)),
                        };
                        buf.advance(consumed);
                        out.push(Piece::Trailers(trailers));
                        return Ok(true);
                    }
                }
            },
        }
    }

    pub(crate) fn until_close(&self) -> bool {
        matches!(self, BodyDecoder::UntilClose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheme() -> Bytes {
        Bytes::from_static(b"http")
    }

    #[test]
    fn request_head_gets_host_and_chunked() {
        let headers = Headers::request("POST", "http", "example.com", "/upload").with("content-type", "text/plain");
        let mut out = BytesMut::new();
        let (framing, kind) = encode_request(&headers, false, &mut out).expect("encode");
        assert_eq!(framing, Framing::Chunked);
        assert_eq!(kind, RequestKind::Other);
        assert_eq!(
            &out[..],
            &b"POST /upload HTTP/1.1\r\nHost: example.com\r\nContent-Type: text/plain\r\nTransfer-Encoding: chunked\r\n\r\n"[..]
        );
    }

    #[test]
    fn connect_uses_authority_form() {
        let headers = Headers::new()
            .with(":method", "CONNECT")
            .with(":authority", "example.com:443");
        let mut out = BytesMut::new();
        let (framing, kind) = encode_request(&headers, false, &mut out).expect("encode");
        assert!(out.starts_with(b"CONNECT example.com:443 HTTP/1.1\r\n"));
        assert_eq!((framing, kind), (Framing::Empty, RequestKind::Connect));
        assert!(!out.windows(8).any(|w| w.eq_ignore_ascii_case(b"transfer")));
    }

    #[test]
    fn request_without_method_is_rejected() {
        let headers = Headers::new().with(":path", "/");
        let err = encode_request(&headers, true, &mut BytesMut::new()).expect_err("no method");
        assert!(err.is_invalid_headers());
    }

    #[test]
    fn parsed_request_gets_pseudo_headers() {
        let raw = b"GET /index HTTP/1.1\r\nHost: example.com\r\nAccept: */*\r\n\r\n";
        let head = parse_request(raw, 16, &scheme()).expect("parse").expect("complete");
        assert_eq!(head.consumed, raw.len());
        assert_eq!(head.framing, Framing::Empty);
        let expected = Headers::request("GET", "http", "example.com", "/index").with("accept", "*/*");
        assert_eq!(head.headers, expected);
    }

    #[test]
    fn duplicate_host_is_rejected() {
        let raw = b"GET / HTTP/1.1\r\nHost: a.example\r\nHost: b.example\r\n\r\n";
        let err = parse_request(raw, 16, &scheme()).expect_err("two hosts");
        assert!(err.is_protocol_violation());

        let single = parse_request(b"GET / HTTP/1.1\r\nHost: a.example\r\n\r\n", 16, &scheme())
            .expect("parse")
            .expect("complete");
        assert_eq!(single.headers.get(headers::AUTHORITY).map(|v| &v[..]), Some(&b"a.example"[..]));
        assert!(!single.headers.contains("host"));
    }

    #[test]
    fn connect_and_upgrade_requests_offer_a_switch() {
        let connect = parse_request(b"CONNECT example.com:443 HTTP/1.1\r\nHost: example.com:443\r\n\r\n", 16, &scheme())
            .expect("parse")
            .expect("complete");
        assert_eq!(connect.kind, RequestKind::Connect);
        assert!(connect.switching);

        let upgrade = parse_request(b"GET /chat HTTP/1.1\r\nHost: x\r\nUpgrade: websocket\r\n\r\n", 16, &scheme())
            .expect("parse")
            .expect("complete");
        assert!(upgrade.switching);

        let plain = parse_request(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n", 16, &scheme())
            .expect("parse")
            .expect("complete");
        assert!(!plain.switching);
    }

    #[test]
    fn partial_head_needs_more() {
        assert!(parse_request(b"GET / HTTP/1.1\r\nHo", 16, &scheme()).expect("parse").is_none());
    }

    #[test]
    fn garbage_is_a_violation() {
        let err = parse_request(b"\x00\x01 nonsense\r\n\r\n", 16, &scheme()).expect_err("violation");
        assert!(err.is_protocol_violation());
    }

    #[test]
    fn response_framing_rules() {
        let no_body = parse_response(b"HTTP/1.1 204 No Content\r\n\r\n", 16, RequestKind::Other)
            .expect("parse")
            .expect("complete");
        assert_eq!(no_body.framing, Framing::Empty);

        let head = parse_response(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\n", 16, RequestKind::Head)
            .expect("parse")
            .expect("complete");
        assert_eq!(head.framing, Framing::Empty);

        let close = parse_response(b"HTTP/1.0 200 OK\r\n\r\n", 16, RequestKind::Other)
            .expect("parse")
            .expect("complete");
        assert_eq!(close.framing, Framing::UntilClose);
        assert!(close.close_after);

        let info = parse_response(b"HTTP/1.1 100 Continue\r\n\r\n", 16, RequestKind::Other)
            .expect("parse")
            .expect("complete");
        assert!(info.informational);

        let tunnel = parse_response(b"HTTP/1.1 200 Connection Established\r\n\r\n", 16, RequestKind::Connect)
            .expect("parse")
            .expect("complete");
        assert_eq!(tunnel.framing, Framing::Empty);
        assert!(tunnel.switching);
        assert!(!tunnel.close_after);

        let refused = parse_response(b"HTTP/1.1 407 Proxy Auth\r\nContent-Length: 0\r\n\r\n", 16, RequestKind::Connect)
            .expect("parse")
            .expect("complete");
        assert!(!refused.switching);
    }

    #[test]
    fn bodiless_response_gets_zero_length() {
        let mut out = BytesMut::new();
        let (framing, _) = encode_response(&Headers::response(200), true, RequestKind::Other, &mut out).expect("encode");
        assert_eq!(framing, Framing::Empty);
        assert_eq!(&out[..], &b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n"[..]);
    }

    #[test]
    fn ended_head_cannot_promise_a_body() {
        let promised = Headers::response(200).with("content-length", "5");
        let err = encode_response(&promised, true, RequestKind::Other, &mut BytesMut::new()).expect_err("length without body");
        assert!(err.is_invalid_headers());

        let request = Headers::request("POST", "http", "example.com", "/").with("content-length", "5");
        let err = encode_request(&request, true, &mut BytesMut::new()).expect_err("length without body");
        assert!(err.is_invalid_headers());

        // HEAD and 304 responses describe a body they never carry.
        let mut out = BytesMut::new();
        encode_response(&promised, true, RequestKind::Head, &mut out).expect("head response");
        encode_response(&Headers::response(304).with("content-length", "5"), true, RequestKind::Other, &mut out)
            .expect("not modified");

        let mut out = BytesMut::new();
        let zero = Headers::response(200).with("content-length", "0");
        let (framing, _) = encode_response(&zero, true, RequestKind::Other, &mut out).expect("zero length");
        assert_eq!(framing, Framing::Empty);
    }

    #[test]
    fn ended_chunked_head_writes_the_last_chunk() {
        let headers = Headers::response(200).with("transfer-encoding", "chunked");
        let mut out = BytesMut::new();
        let (framing, _) = encode_response(&headers, true, RequestKind::Other, &mut out).expect("encode");
        assert_eq!(framing, Framing::Empty);
        assert!(out.ends_with(b"Transfer-Encoding: chunked\r\n\r\n0\r\n\r\n"));
    }

    #[test]
    fn transfer_coding_must_end_in_chunked() {
        let gzip = Headers::response(200).with("transfer-encoding", "gzip");
        let err = encode_response(&gzip, false, RequestKind::Other, &mut BytesMut::new()).expect_err("gzip only");
        assert!(err.is_invalid_headers());

        let layered = Headers::response(200).with("transfer-encoding", "gzip, chunked");
        let (framing, _) = encode_response(&layered, false, RequestKind::Other, &mut BytesMut::new()).expect("layered");
        assert_eq!(framing, Framing::Chunked);

        let bad_length = Headers::request("PUT", "http", "example.com", "/").with("content-length", "ten");
        let err = encode_request(&bad_length, false, &mut BytesMut::new()).expect_err("bad length");
        assert!(err.is_invalid_headers());
    }

    #[test]
    fn chunked_body_with_trailers() {
        let mut buf = BytesMut::from(&b"5\r\nhello\r\n6\r\n world\r\n0\r\nX-Checksum: abc\r\n\r\n"[..]);
        let mut decoder = BodyDecoder::new(Framing::Chunked).expect("decoder");
        let mut pieces = Vec::new();
        assert!(decoder.decode(&mut buf, 16, &mut pieces).expect("decode"));
        assert_eq!(
            pieces,
            vec![
                Piece::Data(Bytes::from_static(b"hello")),
                Piece::Data(Bytes::from_static(b" world")),
                Piece::Trailers(Headers::new().with("x-checksum", "abc")),
            ]
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn chunked_body_across_reads() {
        let mut decoder = BodyDecoder::new(Framing::Chunked).expect("decoder");
        let mut pieces = Vec::new();
        let mut buf = BytesMut::from(&b"3\r\nab"[..]);
        assert!(!decoder.decode(&mut buf, 16, &mut pieces).expect("first"));
        buf.extend_from_slice(b"c\r\n0\r\n\r\n");
        assert!(decoder.decode(&mut buf, 16, &mut pieces).expect("second"));
        assert_eq!(
            pieces,
            vec![Piece::Data(Bytes::from_static(b"ab")), Piece::Data(Bytes::from_static(b"c"))]
        );
    }

    #[test]
    fn length_encoder_enforces_declared_size() {
        let mut encoder = BodyEncoder::new(Framing::Length(4));
        let mut out = BytesMut::new();
        assert!(encoder.encode(b"hello", false, &mut out).is_err());
        encoder.encode(b"he", false, &mut out).expect("partial");
        assert!(encoder.encode(b"l", true, &mut out).is_err());
        encoder.encode(b"ll", true, &mut out).expect("rest");
        assert_eq!(&out[..], b"hell");
    }
}
