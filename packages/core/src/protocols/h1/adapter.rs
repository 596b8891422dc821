//! HTTP/1.1 engine adapter
//!
//! One exchange at a time. The exchange sequence number doubles as the native
//! stream id, so every request/response pair gets a fresh id starting at 1.
//! A server parses the next pipelined request only once the current exchange
//! is finished in both directions; until then its bytes stay buffered.
//!
//! A CONNECT answered with 2xx, or an `Upgrade` answered with 101, turns the
//! connection into a tunnel: bytes pass through unframed on the same stream
//! until either side ends it, which ends the connection.

use bytes::{Bytes, BytesMut};

use super::codec::{self, BodyDecoder, BodyEncoder, Head, Piece, RequestKind};
use crate::config::Http1Config;
use crate::error::{self, Result};
use crate::http::Headers;
use crate::protocols::adapter::EngineAdapter;
use crate::protocols::core::{HttpVersion, Role};
use crate::protocols::error_codes::ErrorCode;
use crate::protocols::events::{EngineEvent, Origin};
use crate::protocols::flow::Credit;
use crate::protocols::registry::{NativeId, StreamHandle};

/// Our side of the current exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outbound {
    /// Nothing final sent yet (informational responses keep us here).
    Idle,
    Body(BodyEncoder),
    Tunnel,
    Done,
}

/// The peer's side of the current exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Inbound {
    AwaitingHead,
    Body(BodyDecoder),
    /// Server only: the request offered a switch and our answer decides.
    AwaitingSwitch,
    Tunnel,
    Done,
}

pub(crate) struct Http1Adapter {
    role: Role,
    scheme: Bytes,
    max_headers: usize,
    max_head_bytes: usize,
    exchange: NativeId,
    ours: Outbound,
    theirs: Inbound,
    request_kind: RequestKind,
    /// The current request is a CONNECT or carries `Upgrade`.
    switch_offered: bool,
    recv_buf: BytesMut,
    send_buf: BytesMut,
    events: Vec<EngineEvent>,
    /// `close()` was called; finish the current exchange and stop.
    closing: bool,
    /// Who asked for the connection to end after this exchange.
    close_after: Option<Origin>,
    terminated: bool,
}

impl Http1Adapter {
    pub(crate) fn new(role: Role, config: &Http1Config) -> Self {
        Self {
            role,
            scheme: Bytes::copy_from_slice(config.scheme.as_bytes()),
            max_headers: config.max_headers,
            max_head_bytes: config.max_head_bytes,
            exchange: 1,
            ours: Outbound::Idle,
            theirs: Inbound::AwaitingHead,
            request_kind: RequestKind::Other,
            switch_offered: false,
            recv_buf: BytesMut::new(),
            send_buf: BytesMut::new(),
            events: Vec::new(),
            closing: false,
            close_after: None,
            terminated: false,
        }
    }

    fn exchange_started(&self) -> bool {
        match self.role {
            Role::Client => self.ours != Outbound::Idle,
            Role::Server => self.theirs != Inbound::AwaitingHead,
        }
    }

    fn check_current(&self, native: NativeId) -> Result<()> {
        if self.terminated {
            return Err(error::connection_closed());
        }
        if native != self.exchange || !self.exchange_started() {
            return Err(error::stream_state_mismatch("not the active exchange"));
        }
        Ok(())
    }

    fn terminate(&mut self, code: ErrorCode, origin: Origin, reason: Option<&str>) {
        if self.terminated {
            return;
        }
        self.terminated = true;
        tracing::debug!(target: "hface::h1", %code, ?origin, exchange = self.exchange, "connection terminated");
        self.events.push(EngineEvent::Terminated {
            code,
            origin,
            reason: reason.map(str::to_owned),
        });
    }

    fn note_close_request(&mut self, head: &Head, origin: Origin) {
        if head.close_after && self.close_after.is_none() {
            self.close_after = Some(origin);
        }
    }

    /// Flags the end of the peer's message on the last event of this exchange
    /// still queued, or queues an empty final data event.
    fn end_inbound(&mut self) {
        if self.role == Role::Server && self.switch_offered {
            self.theirs = Inbound::AwaitingSwitch;
            return;
        }
        self.flag_inbound_end();
        self.theirs = Inbound::Done;
        tracing::trace!(target: "hface::h1", exchange = self.exchange, "inbound message complete");
        self.complete_cycle();
    }

    fn flag_inbound_end(&mut self) {
        let native = self.exchange;
        let flagged = self.events.iter_mut().rev().find_map(|event| match event {
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
        match flagged {
            Some(end_stream) => *end_stream = true,
            None => self.events.push(EngineEvent::Data {
                native,
                data: Bytes::new(),
                end_stream: true,
            }),
        }
    }

    fn enter_tunnel(&mut self) {
        tracing::debug!(target: "hface::h1", exchange = self.exchange, kind = ?self.request_kind, "switched to tunnel");
        self.theirs = Inbound::Tunnel;
        if self.ours != Outbound::Done {
            self.ours = Outbound::Tunnel;
        }
        self.drain_tunnel();
    }

    /// Everything buffered belongs to the tunnel.
    fn drain_tunnel(&mut self) {
        if self.recv_buf.is_empty() {
            return;
        }
        self.events.push(EngineEvent::Data {
            native: self.exchange,
            data: self.recv_buf.split().freeze(),
            end_stream: false,
        });
    }

    fn complete_cycle(&mut self) {
        if self.ours != Outbound::Done || self.theirs != Inbound::Done {
            return;
        }
        if let Some(origin) = self.close_after {
            self.terminate(ErrorCode::NoError, origin, Some("connection: close"));
            return;
        }
        if self.closing {
            self.terminate(ErrorCode::NoError, Origin::Local, None);
            return;
        }
        self.exchange += 1;
        self.ours = Outbound::Idle;
        self.theirs = Inbound::AwaitingHead;
        self.request_kind = RequestKind::Other;
        self.switch_offered = false;
    }

    fn parse_head(&self) -> Result<Option<Head>> {
        let head = match self.role {
            Role::Server => codec::parse_request(&self.recv_buf, self.max_headers, &self.scheme)?,
            Role::Client => codec::parse_response(&self.recv_buf, self.max_headers, self.request_kind)?,
        };
        if head.is_none() && self.recv_buf.len() > self.max_head_bytes {
            return Err(error::protocol_violation("message head too large"));
        }
        Ok(head)
    }

    /// Runs the inbound state machine over whatever is buffered.
    fn process(&mut self) -> Result<()> {
        loop {
            if self.terminated {
                return Ok(());
            }
            match self.theirs {
                Inbound::AwaitingHead => {
                    if self.recv_buf.is_empty() {
                        return Ok(());
                    }
                    match self.role {
                        Role::Client if self.ours == Outbound::Idle => {
                            return Err(error::protocol_violation("response without a request"));
                        }
                        // Pipelined request; wait until our response is done.
                        Role::Server if self.ours != Outbound::Idle => return Ok(()),
                        _ => {}
                    }
                    let Some(head) = self.parse_head()? else {
                        return Ok(());
                    };
                    let _ = self.recv_buf.split_to(head.consumed);
                    self.on_head(head)?;
                }
                Inbound::Body(mut decoder) => {
                    if self.recv_buf.is_empty() {
                        return Ok(());
                    }
                    let mut pieces = Vec::new();
                    let complete = decoder.decode(&mut self.recv_buf, self.max_headers, &mut pieces)?;
                    self.theirs = Inbound::Body(decoder);
                    for piece in pieces {
                        let event = match piece {
                            Piece::Data(data) => EngineEvent::Data {
                                native: self.exchange,
                                data,
                                end_stream: false,
                            },
                            Piece::Trailers(headers) => EngineEvent::Headers {
                                native: self.exchange,
                                headers,
                                end_stream: false,
                            },
                        };
                        self.events.push(event);
                    }
                    if complete {
                        self.end_inbound();
                    }
                }
                Inbound::AwaitingSwitch => return Ok(()),
                Inbound::Tunnel => {
                    self.drain_tunnel();
                    return Ok(());
                }
                Inbound::Done => {
                    if self.role == Role::Client && self.ours == Outbound::Done && !self.recv_buf.is_empty() {
                        return Err(error::protocol_violation("bytes after complete response"));
                    }
                    return Ok(());
                }
            }
        }
    }

    fn on_head(&mut self, head: Head) -> Result<()> {
        let native = self.exchange;
        tracing::trace!(
            target: "hface::h1",
            exchange = native,
            framing = ?head.framing,
            informational = head.informational,
            "message head parsed"
        );
        if self.role == Role::Server {
            self.request_kind = head.kind;
            self.switch_offered = head.switching;
        }
        if !head.informational {
            self.note_close_request(&head, Origin::Remote);
        }
        self.events.push(EngineEvent::Headers {
            native,
            headers: head.headers,
            end_stream: false,
        });
        if head.informational {
            return Ok(());
        }
        if self.role == Role::Client && head.switching {
            if !self.switch_offered {
                return Err(error::protocol_violation("protocol switch nobody asked for"));
            }
            self.enter_tunnel();
            return Ok(());
        }
        match BodyDecoder::new(head.framing) {
            Some(decoder) => self.theirs = Inbound::Body(decoder),
            None => self.end_inbound(),
        }
        Ok(())
    }

    fn mark_outbound_close(&mut self, headers: &Headers) {
        let close = headers
            .get_all(b"connection")
            .any(|v| v.eq_ignore_ascii_case(b"close"));
        if close && self.close_after.is_none() {
            self.close_after = Some(Origin::Local);
        }
    }

    fn finish_outbound(&mut self) {
        self.ours = Outbound::Done;
        tracing::trace!(target: "hface::h1", exchange = self.exchange, "outbound message complete");
        self.complete_cycle();
        if self.role == Role::Server
            && self.theirs == Inbound::AwaitingHead
            && !self.recv_buf.is_empty()
            && let Err(e) = self.process()
        {
            tracing::debug!(target: "hface::h1", error = %e, "pipelined request rejected");
            self.terminate(ErrorCode::ProtocolError, Origin::Remote, Some("malformed pipelined request"));
        }
    }
}

impl EngineAdapter for Http1Adapter {
    fn version(&self) -> HttpVersion {
        HttpVersion::Http11
    }

    fn receive(&mut self, data: &[u8]) -> Result<()> {
        if self.terminated {
            return Err(error::connection_closed());
        }
        self.recv_buf.extend_from_slice(data);
        let result = self.process();
        if result.is_err() {
            self.terminated = true;
        }
        result
    }

    fn receive_eof(&mut self) -> Result<()> {
        if self.terminated {
            return Ok(());
        }
        match self.theirs {
            Inbound::Tunnel => {
                self.flag_inbound_end();
                self.theirs = Inbound::Done;
                self.terminate(ErrorCode::NoError, Origin::Remote, Some("tunnel closed"));
            }
            Inbound::Body(decoder) if decoder.until_close() => {
                self.end_inbound();
                self.terminate(ErrorCode::NoError, Origin::Remote, None);
            }
            Inbound::Body(_) => {
                self.terminate(ErrorCode::ProtocolError, Origin::Remote, Some("connection closed mid-message"));
            }
            Inbound::AwaitingHead
                if !self.recv_buf.is_empty() || (self.role == Role::Client && self.ours != Outbound::Idle) =>
            {
                self.terminate(ErrorCode::ProtocolError, Origin::Remote, Some("connection closed before message head"));
            }
            Inbound::AwaitingHead | Inbound::AwaitingSwitch | Inbound::Done => {
                self.terminate(ErrorCode::NoError, Origin::Remote, None);
            }
        }
        Ok(())
    }

    fn open_stream(&mut self, _handle: StreamHandle, headers: &Headers, end_stream: bool) -> Result<Option<NativeId>> {
        if self.terminated || self.closing {
            return Err(error::connection_closed());
        }
        if self.role == Role::Server {
            return Err(error::unavailable("an HTTP/1.1 server cannot initiate exchanges"));
        }
        if self.ours != Outbound::Idle || self.theirs != Inbound::AwaitingHead {
            return Err(error::unavailable("previous exchange still in progress"));
        }
        let mut head = BytesMut::new();
        let (framing, kind) = codec::encode_request(headers, end_stream, &mut head)?;
        self.send_buf.unsplit(head);
        self.request_kind = kind;
        self.switch_offered = kind == RequestKind::Connect || headers.contains("upgrade");
        self.mark_outbound_close(headers);
        tracing::trace!(target: "hface::h1", exchange = self.exchange, ?framing, "request head queued");
        if end_stream {
            self.finish_outbound();
        } else {
            self.ours = Outbound::Body(BodyEncoder::new(framing));
        }
        Ok(Some(self.exchange))
    }

    fn send_headers(&mut self, native: NativeId, headers: &Headers, end_stream: bool) -> Result<()> {
        self.check_current(native)?;
        match self.ours {
            Outbound::Idle => {
                let status = headers.status();
                if status == Some(101) && !self.switch_offered {
                    return Err(error::invalid_headers("101 without an Upgrade request"));
                }
                let switching = self.switch_offered && status.is_some_and(|s| self.request_kind.tunnels(s));
                if switching && self.theirs != Inbound::AwaitingSwitch {
                    return Err(error::stream_state_mismatch("request body still open"));
                }
                let mut head = BytesMut::new();
                let (framing, informational) =
                    codec::encode_response(headers, end_stream, self.request_kind, &mut head)?;
                if informational && end_stream {
                    return Err(error::invalid_headers("an informational response cannot end the stream"));
                }
                self.send_buf.unsplit(head);
                if informational {
                    return Ok(());
                }
                if switching {
                    self.enter_tunnel();
                    if end_stream {
                        self.ours = Outbound::Done;
                        self.terminate(ErrorCode::NoError, Origin::Local, Some("tunnel closed"));
                    }
                    return Ok(());
                }
                if self.switch_offered {
                    self.switch_offered = false;
                    if self.theirs == Inbound::AwaitingSwitch {
                        self.end_inbound();
                    }
                }
                self.mark_outbound_close(headers);
                if end_stream || framing == codec::Framing::Empty {
                    self.finish_outbound();
                } else {
                    self.ours = Outbound::Body(BodyEncoder::new(framing));
                }
                Ok(())
            }
            Outbound::Body(mut encoder) => {
                if !end_stream {
                    return Err(error::stream_state_mismatch("trailers must end the stream"));
                }
                let mut block = BytesMut::new();
                encoder.encode_trailers(headers, &mut block)?;
                self.send_buf.unsplit(block);
                self.finish_outbound();
                Ok(())
            }
            Outbound::Tunnel => Err(error::stream_state_mismatch("a tunnel carries data only")),
            Outbound::Done => Err(error::stream_state_mismatch("message already complete")),
        }
    }

    fn send_data(&mut self, native: NativeId, data: Bytes, end_stream: bool) -> Result<()> {
        self.check_current(native)?;
        if self.ours == Outbound::Tunnel {
            self.send_buf.extend_from_slice(&data);
            if end_stream {
                self.ours = Outbound::Done;
                self.terminate(ErrorCode::NoError, Origin::Local, Some("tunnel closed"));
            }
            return Ok(());
        }
        let Outbound::Body(mut encoder) = self.ours else {
            return Err(error::stream_state_mismatch("no message body open"));
        };
        let mut framed = BytesMut::with_capacity(data.len() + 16);
        encoder.encode(&data, end_stream, &mut framed)?;
        self.send_buf.unsplit(framed);
        if end_stream {
            self.finish_outbound();
        } else {
            self.ours = Outbound::Body(encoder);
        }
        Ok(())
    }

    fn reset_stream(&mut self, native: NativeId, code: ErrorCode) -> Result<()> {
        if self.terminated || native != self.exchange {
            return Ok(());
        }
        // No reset on the wire: tearing down the connection is the only way
        // to abandon an exchange.
        self.terminate(code, Origin::Local, Some("exchange reset"));
        Ok(())
    }

    fn credit(&self, _native: NativeId) -> Credit {
        Credit::Unbounded
    }

    fn close(&mut self) -> Result<()> {
        self.closing = true;
        if !self.exchange_started() || self.theirs == Inbound::Tunnel {
            self.terminate(ErrorCode::NoError, Origin::Local, None);
        }
        Ok(())
    }

    fn bytes_to_send(&mut self) -> Vec<Bytes> {
        if self.send_buf.is_empty() {
            return Vec::new();
        }
        vec![self.send_buf.split().freeze()]
    }

    fn drain_events(&mut self, out: &mut Vec<EngineEvent>) {
        out.append(&mut self.events);
    }

    fn can_open_stream(&self) -> bool {
        self.role == Role::Client
            && !self.terminated
            && !self.closing
            && self.ours == Outbound::Idle
            && self.theirs == Inbound::AwaitingHead
    }
}
