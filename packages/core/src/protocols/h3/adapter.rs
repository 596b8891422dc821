//! HTTP/3 engine adapter
//!
//! Wraps a `quiche` QUIC connection and, once the handshake allows it, the
//! `quiche::h3` layer on top. Inbound datagrams go straight to
//! `Connection::recv`; outbound ones are produced one per transmit unit.
//!
//! A client may send a request before the handshake finishes. Such streams
//! wait in `deferred` without a QUIC stream id and are bound (with a
//! `Bound` event followed by their first credit report) as soon as the
//! HTTP/3 layer is up.

use std::collections::BTreeMap;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use quiche::h3::{self, NameValue};

use super::config;
use crate::config::Http3Config;
use crate::error::{self, Result};
use crate::http::headers::{self, Headers};
use crate::protocols::adapter::EngineAdapter;
use crate::protocols::core::{HttpVersion, Role};
use crate::protocols::error_codes::ErrorCode;
use crate::protocols::events::{EngineEvent, Origin};
use crate::protocols::flow::Credit;
use crate::protocols::registry::{NativeId, StreamHandle};

/// Worst-case DATA frame header: one byte type plus an eight byte length.
const DATA_FRAME_OVERHEAD: usize = 9;

/// Read size for request bodies.
const BODY_CHUNK: usize = 64 * 1024;

/// Header progress on our side of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeadState {
    None,
    Informational,
    Final,
}

#[derive(Debug)]
struct Stream {
    head: HeadState,
    local_done: bool,
    remote_done: bool,
    reported: Option<usize>,
}

impl Stream {
    fn new(head: HeadState, local_done: bool) -> Self {
        Self {
            head,
            local_done,
            remote_done: false,
            reported: None,
        }
    }
}

struct Deferred {
    handle: StreamHandle,
    fields: Vec<h3::Header>,
    end_stream: bool,
}

pub(crate) struct Http3Adapter {
    role: Role,
    conn: quiche::Connection,
    h3: Option<h3::Connection>,
    local_addr: std::net::SocketAddr,
    peer_addr: std::net::SocketAddr,
    datagram: usize,
    streams: BTreeMap<NativeId, Stream>,
    deferred: Vec<Deferred>,
    events: Vec<EngineEvent>,
    /// Highest peer-initiated stream seen, for the GOAWAY id.
    last_remote: Option<NativeId>,
    closing: bool,
    terminated: bool,
    violation: Option<String>,
}

fn to_fields(headers: &Headers) -> Vec<h3::Header> {
    headers
        .without_connection_specific()
        .iter()
        .map(|(name, value)| h3::Header::new(name, value))
        .collect()
}

fn from_fields(list: &[h3::Header]) -> Headers {
    list.iter()
        .map(|field| (field.name(), Bytes::copy_from_slice(field.value())))
        .collect()
}

fn check_request(headers: &Headers) -> Result<()> {
    let method = headers
        .get(headers::METHOD)
        .ok_or_else(|| error::missing_pseudo_header(":method"))?;
    if &method[..] == b"CONNECT" {
        if headers.contains(headers::SCHEME) || headers.contains(headers::PATH) {
            return Err(error::invalid_headers("CONNECT carries only :method and :authority"));
        }
    } else {
        for (name, label) in [
            (headers::SCHEME, ":scheme"),
            (headers::PATH, ":path"),
        ] {
            if !headers.contains(name) {
                return Err(error::missing_pseudo_header(label));
            }
        }
    }
    if !headers.contains(headers::AUTHORITY) {
        return Err(error::missing_pseudo_header(":authority"));
    }
    Ok(())
}

fn h3_error_code(e: &h3::Error) -> ErrorCode {
    match e {
        h3::Error::ExcessiveLoad => ErrorCode::ExcessiveLoad,
        h3::Error::IdError => ErrorCode::IdError,
        h3::Error::StreamCreationError => ErrorCode::StreamCreationError,
        h3::Error::ClosedCriticalStream => ErrorCode::ClosedCriticalStream,
        h3::Error::MissingSettings => ErrorCode::MissingSettings,
        h3::Error::FrameUnexpected => ErrorCode::FrameUnexpected,
        h3::Error::FrameError => ErrorCode::FrameError,
        h3::Error::QpackDecompressionFailed => ErrorCode::CompressionError,
        h3::Error::SettingsError => ErrorCode::SettingsError,
        h3::Error::RequestRejected => ErrorCode::RefusedStream,
        h3::Error::RequestCancelled => ErrorCode::Cancel,
        h3::Error::RequestIncomplete => ErrorCode::RequestIncomplete,
        h3::Error::MessageError => ErrorCode::MessageError,
        h3::Error::ConnectError => ErrorCode::ConnectError,
        h3::Error::VersionFallback => ErrorCode::VersionFallback,
        _ => ErrorCode::InternalError,
    }
}

/// How a failed body read ends things.
#[derive(Debug, PartialEq, Eq)]
enum BodyFailure {
    /// The peer reset the stream.
    Reset(ErrorCode),
    /// The connection cannot go on.
    Connection(ErrorCode),
}

fn body_failure(e: &h3::Error) -> BodyFailure {
    match e {
        h3::Error::TransportError(quiche::Error::StreamReset(code)) => {
            BodyFailure::Reset(ErrorCode::from_wire(HttpVersion::Http3, *code))
        }
        other => BodyFailure::Connection(h3_error_code(other)),
    }
}

/// Closes the QUIC connection. A connection already closing is fine.
fn close_connection(conn: &mut quiche::Connection, code: ErrorCode) {
    match conn.close(true, code.to_wire(HttpVersion::Http3), b"") {
        Ok(()) | Err(quiche::Error::Done) => {}
        Err(e) => tracing::warn!(target: "hface::h3", error = %e, %code, "closing the connection failed"),
    }
}

impl Http3Adapter {
    pub(crate) fn new(role: Role, config: &Http3Config) -> Result<Self> {
        let mut transport = config::transport_config(role, config)?;
        let scid_bytes: [u8; quiche::MAX_CONN_ID_LEN] = rand::random();
        let scid = quiche::ConnectionId::from_ref(&scid_bytes);
        let conn = match role {
            Role::Client => quiche::connect(
                config.server_name.as_deref(),
                &scid,
                config.local_addr,
                config.peer_addr,
                &mut transport,
            ),
            Role::Server => quiche::accept(&scid, None, config.local_addr, config.peer_addr, &mut transport),
        }
        .map_err(error::engine)?;
        tracing::debug!(target: "hface::h3", ?role, trace_id = conn.trace_id(), "QUIC connection created");
        Ok(Self {
            role,
            conn,
            h3: None,
            local_addr: config.local_addr,
            peer_addr: config.peer_addr,
            datagram: config::datagram_size(config),
            streams: BTreeMap::new(),
            deferred: Vec::new(),
            events: Vec::new(),
            last_remote: None,
            closing: false,
            terminated: false,
            violation: None,
        })
    }

    /// Brings up the HTTP/3 layer once QUIC can carry application data.
    fn ensure_h3(&mut self) {
        if self.h3.is_some() || !(self.conn.is_established() || self.conn.is_in_early_data()) {
            return;
        }
        let created = h3::Config::new().and_then(|cfg| h3::Connection::with_transport(&mut self.conn, &cfg));
        match created {
            Ok(h3) => {
                self.h3 = Some(h3);
                let alpn = String::from_utf8(self.conn.application_proto().to_vec()).ok();
                tracing::debug!(target: "hface::h3", ?alpn, "HTTP/3 layer ready");
                self.events.push(EngineEvent::Handshake { alpn });
                if self.closing {
                    self.send_goaway();
                }
                self.bind_deferred();
            }
            Err(e) => {
                tracing::warn!(target: "hface::h3", error = %e, "HTTP/3 layer setup failed");
                close_connection(&mut self.conn, h3_error_code(&e));
            }
        }
    }

    fn bind_deferred(&mut self) {
        let Some(h3) = self.h3.as_mut() else {
            return;
        };
        let mut waiting = std::mem::take(&mut self.deferred).into_iter();
        for pending in waiting.by_ref() {
            match h3.send_request(&mut self.conn, &pending.fields, pending.end_stream) {
                Ok(native) => {
                    tracing::trace!(target: "hface::h3", handle = %pending.handle, native, "deferred request sent");
                    let mut stream = Stream::new(HeadState::Final, pending.end_stream);
                    let credit = stream_credit(&self.conn, native);
                    stream.reported = Some(credit);
                    self.streams.insert(native, stream);
                    self.events.push(EngineEvent::Bound {
                        handle: pending.handle,
                        native,
                    });
                    self.events.push(EngineEvent::Credit {
                        native: Some(native),
                        credit: Credit::Limited(credit as u64),
                    });
                }
                Err(h3::Error::StreamBlocked | h3::Error::TransportError(quiche::Error::StreamLimit)) => {
                    self.deferred.push(pending);
                    break;
                }
                Err(e) => {
                    tracing::warn!(target: "hface::h3", error = %e, "deferred request failed");
                    self.deferred.push(pending);
                    close_connection(&mut self.conn, ErrorCode::InternalError);
                    break;
                }
            }
        }
        self.deferred.extend(waiting);
    }

    /// Drains HTTP/3 events into engine events.
    fn poll_h3(&mut self) {
        let Some(h3) = self.h3.as_mut() else {
            return;
        };
        let mut body = vec![0u8; BODY_CHUNK];
        'events: loop {
            let (native, event) = match h3.poll(&mut self.conn) {
                Ok(polled) => polled,
                Err(h3::Error::Done) => break,
                Err(e) => {
                    tracing::debug!(target: "hface::h3", error = %e, "HTTP/3 layer failed");
                    self.violation.get_or_insert_with(|| e.to_string());
                    close_connection(&mut self.conn, h3_error_code(&e));
                    break;
                }
            };
            match event {
                h3::Event::Headers { list, more_frames } => {
                    let is_new = !self.streams.contains_key(&native);
                    if is_new {
                        self.last_remote = Some(self.last_remote.map_or(native, |last| last.max(native)));
                        self.streams.insert(native, Stream::new(HeadState::None, false));
                    }
                    if let Some(stream) = self.streams.get_mut(&native) {
                        stream.remote_done |= !more_frames;
                    }
                    self.events.push(EngineEvent::Headers {
                        native,
                        headers: from_fields(&list),
                        end_stream: !more_frames,
                    });
                }
                h3::Event::Data => loop {
                    match h3.recv_body(&mut self.conn, native, &mut body) {
                        Ok(read) => self.events.push(EngineEvent::Data {
                            native,
                            data: Bytes::copy_from_slice(&body[..read]),
                            end_stream: false,
                        }),
                        Err(h3::Error::Done) => break,
                        Err(e) => {
                            tracing::debug!(target: "hface::h3", native, error = %e, "body read failed");
                            match body_failure(&e) {
                                BodyFailure::Reset(code) => {
                                    if self.streams.remove(&native).is_some() {
                                        self.events.push(EngineEvent::Reset { native, code });
                                    }
                                    break;
                                }
                                BodyFailure::Connection(code) => {
                                    self.violation.get_or_insert_with(|| e.to_string());
                                    close_connection(&mut self.conn, code);
                                    break 'events;
                                }
                            }
                        }
                    }
                },
                h3::Event::Finished => {
                    let already = self
                        .streams
                        .get_mut(&native)
                        .is_some_and(|s| std::mem::replace(&mut s.remote_done, true));
                    if !already {
                        flag_end(&mut self.events, native);
                    }
                }
                h3::Event::Reset(code) => {
                    if self.streams.remove(&native).is_some() {
                        self.events.push(EngineEvent::Reset {
                            native,
                            code: ErrorCode::from_wire(HttpVersion::Http3, code),
                        });
                    }
                }
                h3::Event::GoAway => {
                    tracing::debug!(target: "hface::h3", id = native, "GOAWAY received");
                    self.events.push(EngineEvent::Goaway { code: ErrorCode::NoError });
                }
                _ => {}
            }
        }
        self.streams.retain(|_, s| !(s.local_done && s.remote_done));
    }

    /// Reports credit that moved since the driver last saw it.
    fn refresh_credit(&mut self) {
        for (&native, stream) in &mut self.streams {
            if stream.local_done || stream.head == HeadState::None {
                continue;
            }
            let credit = stream_credit(&self.conn, native);
            match stream.reported {
                Some(reported) if reported == credit => {}
                None => stream.reported = Some(credit),
                Some(_) => {
                    stream.reported = Some(credit);
                    self.events.push(EngineEvent::Credit {
                        native: Some(native),
                        credit: Credit::Limited(credit as u64),
                    });
                }
            }
        }
    }

    fn check_terminated(&mut self) {
        if self.terminated || !(self.conn.is_closed() || self.conn.is_draining()) {
            return;
        }
        self.terminated = true;
        let (code, origin, reason) = if let Some(peer) = self.conn.peer_error() {
            (peer_code(peer), Origin::Remote, reason_text(&peer.reason))
        } else if let Some(local) = self.conn.local_error() {
            (peer_code(local), Origin::Local, reason_text(&local.reason))
        } else if self.conn.is_timed_out() {
            (ErrorCode::NoError, Origin::Local, Some("idle timeout".to_string()))
        } else {
            (ErrorCode::NoError, Origin::Local, None)
        };
        tracing::debug!(target: "hface::h3", %code, ?origin, "connection terminated");
        self.streams.clear();
        self.events.push(EngineEvent::Terminated { code, origin, reason });
    }

    /// Work common to every entry point.
    fn after_io(&mut self) {
        self.ensure_h3();
        self.poll_h3();
        self.refresh_credit();
        self.check_terminated();
    }

    fn h3_and_stream(&mut self, native: NativeId) -> Result<(&mut h3::Connection, &mut quiche::Connection, &mut Stream)> {
        if self.terminated {
            return Err(error::connection_closed());
        }
        let h3 = self
            .h3
            .as_mut()
            .ok_or_else(|| error::stream_state_mismatch("HTTP/3 layer not ready"))?;
        let stream = self
            .streams
            .get_mut(&native)
            .ok_or_else(|| error::stream_state_mismatch("stream is not open in the engine"))?;
        Ok((h3, &mut self.conn, stream))
    }

    fn send_goaway(&mut self) {
        let Some(h3) = self.h3.as_mut() else {
            return;
        };
        let id = match self.role {
            Role::Server => self.last_remote.map_or(0, |last| last + 4),
            Role::Client => 0,
        };
        if let Err(e) = h3.send_goaway(&mut self.conn, id) {
            tracing::debug!(target: "hface::h3", error = %e, "GOAWAY not sent");
        }
    }
}

fn stream_credit(conn: &quiche::Connection, native: NativeId) -> usize {
    conn.stream_capacity(native)
        .map_or(0, |c| c.saturating_sub(DATA_FRAME_OVERHEAD))
}

fn peer_code(error: &quiche::ConnectionError) -> ErrorCode {
    if error.is_app {
        ErrorCode::from_wire(HttpVersion::Http3, error.error_code)
    } else if error.error_code == 0 {
        ErrorCode::NoError
    } else {
        // Transport-level failure below HTTP/3.
        ErrorCode::ProtocolError
    }
}

fn reason_text(reason: &[u8]) -> Option<String> {
    (!reason.is_empty()).then(|| String::from_utf8_lossy(reason).into_owned())
}

/// Marks the last queued headers or data event of `native` as final, or
/// queues an empty final data event.
fn flag_end(events: &mut Vec<EngineEvent>, native: NativeId) {
    let last = events.iter_mut().rev().find_map(|event| match event {
        EngineEvent::Headers {
            native: n,
            end_stream,
            ..
        }
        | EngineEvent::Data {
            native: n,
            end_stream,
            ..
        } if *n == native => Some(end_stream),
        _ => None,
    });
    match last {
        Some(end_stream) => *end_stream = true,
        None => events.push(EngineEvent::Data {
            native,
            data: Bytes::new(),
            end_stream: true,
        }),
    }
}

impl EngineAdapter for Http3Adapter {
    fn version(&self) -> HttpVersion {
        HttpVersion::Http3
    }

    fn receive(&mut self, data: &[u8]) -> Result<()> {
        if self.terminated {
            return Err(error::connection_closed());
        }
        // quiche decrypts in place.
        let mut datagram = BytesMut::from(data);
        let info = quiche::RecvInfo {
            from: self.peer_addr,
            to: self.local_addr,
        };
        let received = self.conn.recv(&mut datagram, info);
        self.after_io();
        match received {
            Ok(_) | Err(quiche::Error::Done) => {}
            Err(e) => {
                tracing::debug!(target: "hface::h3", error = %e, "datagram rejected");
                return Err(error::protocol_violation(e));
            }
        }
        match self.violation.take() {
            Some(reason) => Err(error::protocol_violation(reason)),
            None => Ok(()),
        }
    }

    fn receive_eof(&mut self) -> Result<()> {
        if self.terminated {
            return Ok(());
        }
        self.terminated = true;
        let code = if self.streams.is_empty() && self.deferred.is_empty() {
            ErrorCode::NoError
        } else {
            ErrorCode::RequestIncomplete
        };
        self.streams.clear();
        self.deferred.clear();
        self.events.push(EngineEvent::Terminated {
            code,
            origin: Origin::Remote,
            reason: Some("transport closed".to_string()),
        });
        Ok(())
    }

    fn open_stream(&mut self, handle: StreamHandle, headers: &Headers, end_stream: bool) -> Result<Option<NativeId>> {
        if self.terminated || self.closing {
            return Err(error::connection_closed());
        }
        if self.role == Role::Server {
            return Err(error::unavailable("an HTTP/3 server cannot initiate request streams"));
        }
        check_request(headers)?;
        let fields = to_fields(headers);
        let Some(h3) = self.h3.as_mut() else {
            tracing::trace!(target: "hface::h3", %handle, "request deferred until handshake completes");
            self.deferred.push(Deferred {
                handle,
                fields,
                end_stream,
            });
            return Ok(None);
        };
        let native = match h3.send_request(&mut self.conn, &fields, end_stream) {
            Ok(native) => native,
            Err(h3::Error::StreamBlocked | h3::Error::TransportError(quiche::Error::StreamLimit)) => {
                return Err(error::unavailable("peer stream limit reached"));
            }
            Err(e) => return Err(error::engine(e)),
        };
        let mut stream = Stream::new(HeadState::Final, end_stream);
        stream.reported = Some(stream_credit(&self.conn, native));
        self.streams.insert(native, stream);
        tracing::trace!(target: "hface::h3", native, end_stream, "request sent");
        Ok(Some(native))
    }

    fn send_headers(&mut self, native: NativeId, headers: &Headers, end_stream: bool) -> Result<()> {
        let (h3, conn, stream) = self.h3_and_stream(native)?;
        if stream.local_done {
            return Err(error::stream_state_mismatch("stream already ended"));
        }
        let fields = to_fields(headers);
        match stream.head {
            HeadState::None | HeadState::Informational => {
                let status = headers
                    .status()
                    .ok_or_else(|| error::missing_pseudo_header(":status"))?;
                let informational = (100..200).contains(&status);
                if informational && end_stream {
                    return Err(error::invalid_headers("an informational response cannot end the stream"));
                }
                let sent = if stream.head == HeadState::None {
                    h3.send_response(conn, native, &fields, end_stream)
                } else {
                    h3.send_additional_headers(conn, native, &fields, false, end_stream)
                };
                sent.map_err(error::engine)?;
                stream.head = if informational { HeadState::Informational } else { HeadState::Final };
            }
            HeadState::Final => {
                if !end_stream {
                    return Err(error::stream_state_mismatch("trailers must end the stream"));
                }
                if headers.has_pseudo() {
                    return Err(error::invalid_headers("pseudo-headers are not allowed in trailers"));
                }
                h3.send_additional_headers(conn, native, &fields, true, true)
                    .map_err(error::engine)?;
            }
        }
        stream.local_done |= end_stream;
        self.after_io();
        Ok(())
    }

    fn send_data(&mut self, native: NativeId, data: Bytes, end_stream: bool) -> Result<()> {
        let (h3, conn, stream) = self.h3_and_stream(native)?;
        if stream.local_done || stream.head != HeadState::Final {
            return Err(error::stream_state_mismatch("stream is not open for data"));
        }
        let written = match h3.send_body(conn, native, &data, end_stream) {
            Ok(written) => written,
            Err(h3::Error::Done) if data.is_empty() && !end_stream => 0,
            Err(h3::Error::Done) => return Err(error::engine("stream has no capacity")),
            Err(e) => return Err(error::engine(e)),
        };
        if written < data.len() {
            return Err(error::engine(format!("only {written} of {} bytes accepted", data.len())));
        }
        stream.local_done |= end_stream;
        stream.reported = stream.reported.map(|r| r.saturating_sub(written));
        self.after_io();
        Ok(())
    }

    fn reset_stream(&mut self, native: NativeId, code: ErrorCode) -> Result<()> {
        let Some(stream) = self.streams.remove(&native) else {
            return Ok(());
        };
        let wire = code.to_wire(HttpVersion::Http3);
        let halves = [
            (!stream.local_done, quiche::Shutdown::Write, "write"),
            (!stream.remote_done, quiche::Shutdown::Read, "read"),
        ];
        for (open, direction, half) in halves {
            if !open {
                continue;
            }
            match self.conn.stream_shutdown(native, direction, wire) {
                Ok(()) | Err(quiche::Error::Done) => {}
                Err(e) => tracing::warn!(target: "hface::h3", native, half, error = %e, "stream shutdown failed"),
            }
        }
        tracing::trace!(target: "hface::h3", native, %code, "stream reset");
        Ok(())
    }

    fn cancel_pending(&mut self, handle: StreamHandle) {
        self.deferred.retain(|d| d.handle != handle);
    }

    fn credit(&self, native: NativeId) -> Credit {
        Credit::Limited(stream_credit(&self.conn, native) as u64)
    }

    fn close(&mut self) -> Result<()> {
        self.closing = true;
        if self.h3.is_some() {
            self.send_goaway();
        } else {
            self.deferred.clear();
            close_connection(&mut self.conn, ErrorCode::NoError);
        }
        self.after_io();
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        match self.conn.close(true, ErrorCode::NoError.to_wire(HttpVersion::Http3), b"") {
            Ok(()) | Err(quiche::Error::Done) => Ok(()),
            Err(e) => Err(error::engine(e)),
        }
    }

    fn bytes_to_send(&mut self) -> Vec<Bytes> {
        let mut out = Vec::new();
        loop {
            let mut datagram = BytesMut::zeroed(self.datagram);
            match self.conn.send(&mut datagram) {
                Ok((written, _info)) => {
                    datagram.truncate(written);
                    out.push(datagram.freeze());
                }
                Err(quiche::Error::Done) => break,
                Err(e) => {
                    tracing::warn!(target: "hface::h3", error = %e, "send failed");
                    break;
                }
            }
        }
        self.check_terminated();
        out
    }

    fn drain_events(&mut self, out: &mut Vec<EngineEvent>) {
        out.append(&mut self.events);
    }

    fn can_open_stream(&self) -> bool {
        if self.role != Role::Client || self.terminated || self.closing {
            return false;
        }
        self.h3.is_none() || self.conn.peer_streams_left_bidi() > 0
    }

    fn next_timeout(&self) -> Option<Duration> {
        self.conn.timeout()
    }

    fn on_timeout(&mut self) -> Result<()> {
        self.conn.on_timeout();
        self.after_io();
        Ok(())
    }

    fn source_connection_id(&self) -> Option<Bytes> {
        let scid = self.conn.source_id();
        let id: &[u8] = scid.as_ref();
        Some(Bytes::copy_from_slice(id))
    }
}
