//! HTTP/2 engine adapter
//!
//! Runs an `h2` client or server connection over an in-memory [`Pipe`] and
//! polls it with a no-op waker after every input and every intent. Nothing is
//! awaited: whatever the engine cannot finish now is picked up on the next
//! poll. Send credit is `SendStream::capacity()`, which already folds in the
//! connection window. Each sending stream reserves one default-sized frame at
//! a time, so concurrent streams share the connection window.
//!
//! Inbound bytes reach the engine one frame per drive; see [`frames`](super::frames).

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::task::noop_waker_ref;
use h2::client::{self, ResponseFuture, SendRequest};
use h2::server::{self, SendResponse};
use h2::{Reason, RecvStream, SendStream};

use super::convert;
use super::frames::FrameSplitter;
use super::pipe::Pipe;
use crate::config::Http2Config;
use crate::error::{self, Result};
use crate::http::Headers;
use crate::protocols::adapter::EngineAdapter;
use crate::protocols::core::{HttpVersion, Role};
use crate::protocols::error_codes::ErrorCode;
use crate::protocols::events::{EngineEvent, Origin};
use crate::protocols::flow::Credit;
use crate::protocols::registry::{NativeId, StreamHandle};

/// Capacity a sending stream asks for at a time: one default-sized frame.
const RESERVE: usize = 16_384;

/// Passes over connection and streams per drive before giving up on progress.
const MAX_PASSES: usize = 8;

enum Session {
    Client {
        send_request: Option<SendRequest<Bytes>>,
        connection: client::Connection<Pipe, Bytes>,
    },
    ServerHandshake(Pin<Box<server::Handshake<Pipe, Bytes>>>),
    Server(server::Connection<Pipe, Bytes>),
    Finished,
}

#[derive(Default)]
struct Stream {
    response: Option<ResponseFuture>,
    respond: Option<SendResponse<Bytes>>,
    /// Kept after our end so a later reset still carries its code.
    send: Option<SendStream<Bytes>>,
    recv: Option<RecvStream>,
    data_done: bool,
    /// Credit the driver currently believes in; `None` until first read.
    reported: Option<usize>,
    local_done: bool,
    remote_done: bool,
}

impl Stream {
    fn finished(&self) -> bool {
        self.local_done && self.remote_done
    }
}

pub(crate) struct Http2Adapter {
    role: Role,
    pipe: Pipe,
    inbound: FrameSplitter,
    session: Session,
    streams: BTreeMap<NativeId, Stream>,
    events: Vec<EngineEvent>,
    closing: bool,
    /// Peer misbehaviour detected while processing the current input.
    violation: Option<String>,
    /// `HandshakeCompleted` went out.
    settled: bool,
}

fn native_id(id: h2::StreamId) -> NativeId {
    u64::from(u32::from(id))
}

fn reason_code(reason: Reason) -> ErrorCode {
    ErrorCode::from_wire(HttpVersion::Http2, u64::from(u32::from(reason)))
}

fn wire_reason(code: ErrorCode) -> Reason {
    let wire = code.to_wire(HttpVersion::Http2);
    Reason::from(u32::try_from(wire).unwrap_or(u32::from(Reason::INTERNAL_ERROR)))
}

fn error_code(e: &h2::Error) -> ErrorCode {
    e.reason().map_or(ErrorCode::ProtocolError, reason_code)
}

impl Http2Adapter {
    pub(crate) fn new(role: Role, config: &Http2Config) -> Result<Self> {
        let pipe = Pipe::new();
        let session = match role {
            Role::Client => {
                let mut builder = client::Builder::new();
                builder
                    .initial_window_size(config.initial_window_size)
                    .initial_connection_window_size(config.initial_connection_window_size)
                    .max_frame_size(config.max_frame_size)
                    .max_concurrent_streams(config.max_concurrent_streams)
                    .max_header_list_size(config.max_header_list_size)
                    .max_send_buffer_size(config.max_send_buffer_size)
                    .enable_push(false);
                let mut handshake = Box::pin(builder.handshake::<_, Bytes>(pipe.clone()));
                let mut cx = Context::from_waker(noop_waker_ref());
                // The client preface only needs the pipe to accept writes.
                match handshake.as_mut().poll(&mut cx) {
                    Poll::Ready(Ok((send_request, connection))) => Session::Client {
                        send_request: Some(send_request),
                        connection,
                    },
                    Poll::Ready(Err(e)) => return Err(error::engine(e)),
                    Poll::Pending => return Err(error::engine("HTTP/2 client handshake did not complete")),
                }
            }
            Role::Server => {
                let mut builder = server::Builder::new();
                builder
                    .initial_window_size(config.initial_window_size)
                    .initial_connection_window_size(config.initial_connection_window_size)
                    .max_frame_size(config.max_frame_size)
                    .max_concurrent_streams(config.max_concurrent_streams)
                    .max_header_list_size(config.max_header_list_size)
                    .max_send_buffer_size(config.max_send_buffer_size);
                Session::ServerHandshake(Box::pin(builder.handshake::<_, Bytes>(pipe.clone())))
            }
        };
        tracing::debug!(target: "hface::h2", ?role, "HTTP/2 session created");
        let mut adapter = Self {
            role,
            pipe,
            inbound: FrameSplitter::new(role == Role::Server, config.max_frame_size),
            session,
            streams: BTreeMap::new(),
            events: Vec::new(),
            closing: false,
            violation: None,
            settled: false,
        };
        // Server settings go out right away, before any client bytes.
        adapter.drive();
        Ok(adapter)
    }

    /// Polls connection and streams until nothing moves.
    fn drive(&mut self) {
        let mut cx = Context::from_waker(noop_waker_ref());
        for _ in 0..MAX_PASSES {
            let before = (self.events.len(), self.pipe.unread(), self.streams.len());
            self.poll_session(&mut cx);
            self.poll_streams(&mut cx);
            self.poll_session(&mut cx);
            if (self.events.len(), self.pipe.unread(), self.streams.len()) == before {
                break;
            }
        }
    }

    fn poll_session(&mut self, cx: &mut Context<'_>) {
        loop {
            match &mut self.session {
                Session::Finished => return,
                Session::ServerHandshake(handshake) => match handshake.as_mut().poll(cx) {
                    Poll::Ready(Ok(mut connection)) => {
                        tracing::debug!(target: "hface::h2", "server handshake complete");
                        if self.closing {
                            connection.graceful_shutdown();
                        }
                        self.session = Session::Server(connection);
                    }
                    Poll::Ready(Err(e)) => return self.connection_failed(&e),
                    Poll::Pending => return,
                },
                Session::Server(connection) => match connection.poll_accept(cx) {
                    Poll::Ready(Some(Ok((request, respond)))) => self.accept(request, respond),
                    Poll::Ready(Some(Err(e))) => return self.connection_failed(&e),
                    Poll::Ready(None) => return self.connection_finished(),
                    Poll::Pending => return,
                },
                Session::Client { connection, .. } => {
                    return match Pin::new(connection).poll(cx) {
                        Poll::Ready(Ok(())) => self.connection_finished(),
                        Poll::Ready(Err(e)) => self.connection_failed(&e),
                        Poll::Pending => {}
                    };
                }
            }
        }
    }

    fn accept(&mut self, request: http::Request<RecvStream>, respond: SendResponse<Bytes>) {
        let native = native_id(respond.stream_id());
        let (parts, body) = request.into_parts();
        let headers = convert::from_request_parts(&parts);
        let end_stream = body.is_end_stream();
        tracing::trace!(target: "hface::h2", native, end_stream, "request accepted");
        self.events.push(EngineEvent::Headers {
            native,
            headers,
            end_stream,
        });
        self.streams.insert(
            native,
            Stream {
                respond: Some(respond),
                recv: (!end_stream).then_some(body),
                remote_done: end_stream,
                ..Stream::default()
            },
        );
    }

    fn connection_finished(&mut self) {
        let origin = if self.closing { Origin::Local } else { Origin::Remote };
        tracing::debug!(target: "hface::h2", ?origin, "connection finished");
        self.session = Session::Finished;
        self.streams.clear();
        self.events.push(EngineEvent::Terminated {
            code: ErrorCode::NoError,
            origin,
            reason: None,
        });
    }

    fn connection_failed(&mut self, e: &h2::Error) {
        let code = error_code(e);
        let origin = if e.is_remote() { Origin::Remote } else { Origin::Local };
        tracing::debug!(target: "hface::h2", error = %e, %code, ?origin, "connection failed");
        if e.is_go_away() && e.is_remote() {
            self.events.push(EngineEvent::Goaway { code });
        }
        if (e.is_library() || e.is_io()) && !code.is_no_error() {
            self.violation.get_or_insert_with(|| e.to_string());
        }
        self.session = Session::Finished;
        self.streams.clear();
        self.events.push(EngineEvent::Terminated {
            code,
            origin,
            reason: Some(e.to_string()),
        });
    }

    fn poll_streams(&mut self, cx: &mut Context<'_>) {
        let mut finished = Vec::new();
        for (&native, stream) in &mut self.streams {
            if let Some(event) = poll_stream(native, stream, cx, &mut self.events) {
                self.events.push(event);
                finished.push(native);
                continue;
            }
            if stream.finished() {
                finished.push(native);
            }
        }
        for native in finished {
            self.streams.remove(&native);
        }
    }

    fn stream_mut(&mut self, native: NativeId) -> Result<&mut Stream> {
        if matches!(self.session, Session::Finished) {
            return Err(error::connection_closed());
        }
        self.streams
            .get_mut(&native)
            .ok_or_else(|| error::stream_state_mismatch("stream is not open in the engine"))
    }
}

/// Classifies a stream-scoped engine error. `None` means the connection
/// failed and `poll_session` reports it.
fn stream_error(native: NativeId, e: &h2::Error) -> Option<EngineEvent> {
    if !e.is_reset() {
        return None;
    }
    let code = error_code(e);
    Some(if e.is_remote() {
        EngineEvent::Reset { native, code }
    } else {
        EngineEvent::LocalReset { native, code }
    })
}

/// Polls one stream, pushing its events. Returns a reset event if the
/// stream was torn down.
fn poll_stream(
    native: NativeId,
    stream: &mut Stream,
    cx: &mut Context<'_>,
    events: &mut Vec<EngineEvent>,
) -> Option<EngineEvent> {
    if let Some(response) = stream.response.as_mut() {
        match Pin::new(response).poll(cx) {
            Poll::Ready(Ok(response)) => {
                stream.response = None;
                let (parts, body) = response.into_parts();
                let end_stream = body.is_end_stream();
                events.push(EngineEvent::Headers {
                    native,
                    headers: convert::from_response_parts(&parts),
                    end_stream,
                });
                if end_stream {
                    stream.remote_done = true;
                } else {
                    stream.recv = Some(body);
                }
            }
            Poll::Ready(Err(e)) => {
                stream.response = None;
                return stream_error(native, &e);
            }
            Poll::Pending => {}
        }
    }

    if let Some(body) = stream.recv.as_mut() {
        while !stream.data_done {
            match body.poll_data(cx) {
                Poll::Ready(Some(Ok(data))) => {
                    if let Err(e) = body.flow_control().release_capacity(data.len()) {
                        tracing::warn!(target: "hface::h2", native, error = %e, "releasing received capacity failed");
                    }
                    let end_stream = body.is_end_stream();
                    events.push(EngineEvent::Data {
                        native,
                        data,
                        end_stream,
                    });
                    if end_stream {
                        stream.remote_done = true;
                        stream.recv = None;
                        break;
                    }
                }
                Poll::Ready(Some(Err(e))) => return stream_error(native, &e),
                Poll::Ready(None) => stream.data_done = true,
                Poll::Pending => break,
            }
        }
    }

    if stream.data_done
        && let Some(body) = stream.recv.as_mut()
    {
        match body.poll_trailers(cx) {
            Poll::Ready(Ok(Some(trailers))) => {
                events.push(EngineEvent::Headers {
                    native,
                    headers: convert::from_trailers(&trailers),
                    end_stream: true,
                });
                stream.remote_done = true;
                stream.recv = None;
            }
            Poll::Ready(Ok(None)) => {
                events.push(EngineEvent::Data {
                    native,
                    data: Bytes::new(),
                    end_stream: true,
                });
                stream.remote_done = true;
                stream.recv = None;
            }
            Poll::Ready(Err(e)) => return stream_error(native, &e),
            Poll::Pending => {}
        }
    }

    if !stream.finished() {
        let reset = if let Some(send) = stream.send.as_mut() {
            send.poll_reset(cx)
        } else if let Some(respond) = stream.respond.as_mut() {
            respond.poll_reset(cx)
        } else {
            Poll::Pending
        };
        if let Poll::Ready(Ok(reason)) = reset {
            return Some(EngineEvent::Reset {
                native,
                code: reason_code(reason),
            });
        }
    }

    if let Some(send) = stream.send.as_ref()
        && !stream.local_done
    {
        let capacity = send.capacity();
        match stream.reported {
            None => stream.reported = Some(capacity),
            Some(reported) if reported != capacity => {
                stream.reported = Some(capacity);
                events.push(EngineEvent::Credit {
                    native: Some(native),
                    credit: Credit::Limited(capacity as u64),
                });
            }
            Some(_) => {}
        }
    }
    None
}

impl EngineAdapter for Http2Adapter {
    fn version(&self) -> HttpVersion {
        HttpVersion::Http2
    }

    fn receive(&mut self, data: &[u8]) -> Result<()> {
        if matches!(self.session, Session::Finished) {
            return Err(error::connection_closed());
        }
        self.inbound.push(data);
        while let Some((bytes, unit)) = self.inbound.next_unit() {
            self.pipe.feed(&bytes);
            self.drive();
            if matches!(self.session, Session::Finished) {
                break;
            }
            if unit.acknowledges_settings() && !self.settled {
                self.settled = true;
                tracing::debug!(target: "hface::h2", role = ?self.role, "settings acknowledged");
                self.events.push(EngineEvent::Handshake {
                    alpn: Some("h2".to_string()),
                });
            }
        }
        match self.violation.take() {
            Some(reason) => Err(error::protocol_violation(reason)),
            None => Ok(()),
        }
    }

    fn receive_eof(&mut self) -> Result<()> {
        if matches!(self.session, Session::Finished) {
            return Ok(());
        }
        self.pipe.feed(&self.inbound.rest());
        self.pipe.feed_eof();
        self.drive();
        self.violation = None;
        if !matches!(self.session, Session::Finished) {
            // Engine still waiting on a handshake that can never finish.
            self.session = Session::Finished;
            self.streams.clear();
            self.events.push(EngineEvent::Terminated {
                code: ErrorCode::NoError,
                origin: Origin::Remote,
                reason: None,
            });
        }
        Ok(())
    }

    fn open_stream(&mut self, _handle: StreamHandle, headers: &Headers, end_stream: bool) -> Result<Option<NativeId>> {
        let Session::Client { send_request, .. } = &mut self.session else {
            return match self.session {
                Session::Finished => Err(error::connection_closed()),
                _ => Err(error::unavailable("an HTTP/2 server cannot initiate streams")),
            };
        };
        let Some(send_request) = send_request.as_mut() else {
            return Err(error::connection_closed());
        };
        let request = convert::to_request(headers)?;

        let mut cx = Context::from_waker(noop_waker_ref());
        match send_request.poll_ready(&mut cx) {
            Poll::Ready(Ok(())) => {}
            Poll::Ready(Err(e)) if e.is_go_away() => return Err(error::connection_closed()),
            Poll::Ready(Err(e)) => return Err(error::engine(e)),
            Poll::Pending => return Err(error::unavailable("peer concurrency limit reached")),
        }
        let (response, mut send) = send_request
            .send_request(request, end_stream)
            .map_err(error::engine)?;
        let native = native_id(response.stream_id());
        if !end_stream {
            send.reserve_capacity(RESERVE);
        }
        tracing::trace!(target: "hface::h2", native, end_stream, "request sent");
        self.streams.insert(
            native,
            Stream {
                response: Some(response),
                send: Some(send),
                local_done: end_stream,
                ..Stream::default()
            },
        );
        self.drive();
        Ok(Some(native))
    }

    fn send_headers(&mut self, native: NativeId, headers: &Headers, end_stream: bool) -> Result<()> {
        let stream = self.stream_mut(native)?;
        if stream.local_done {
            return Err(error::stream_state_mismatch("stream already ended"));
        }
        if let Some(respond) = stream.respond.as_mut() {
            if headers.status().is_some_and(|s| (100..200).contains(&s)) {
                return Err(error::invalid_headers("informational responses are not supported over HTTP/2"));
            }
            let response = convert::to_response(headers)?;
            let mut send = respond.send_response(response, end_stream).map_err(error::engine)?;
            stream.respond = None;
            if !end_stream {
                send.reserve_capacity(RESERVE);
            }
            stream.send = Some(send);
            stream.local_done = end_stream;
        } else if let Some(send) = stream.send.as_mut() {
            if !end_stream {
                return Err(error::stream_state_mismatch("trailers must end the stream"));
            }
            if headers.has_pseudo() {
                return Err(error::invalid_headers("pseudo-headers are not allowed in trailers"));
            }
            send.send_trailers(convert::to_header_map(headers)?)
                .map_err(error::engine)?;
            stream.local_done = true;
        } else {
            return Err(error::stream_state_mismatch("no header block expected"));
        }
        self.drive();
        Ok(())
    }

    fn send_data(&mut self, native: NativeId, data: Bytes, end_stream: bool) -> Result<()> {
        let stream = self.stream_mut(native)?;
        if stream.local_done {
            return Err(error::stream_state_mismatch("stream already ended"));
        }
        let Some(send) = stream.send.as_mut() else {
            return Err(error::stream_state_mismatch("stream is not open for data"));
        };
        let len = data.len();
        send.send_data(data, end_stream).map_err(error::engine)?;
        if end_stream {
            stream.local_done = true;
        } else {
            send.reserve_capacity(RESERVE);
            stream.reported = stream.reported.map(|r| r.saturating_sub(len));
        }
        self.drive();
        Ok(())
    }

    fn reset_stream(&mut self, native: NativeId, code: ErrorCode) -> Result<()> {
        let Some(mut stream) = self.streams.remove(&native) else {
            return Ok(());
        };
        let reason = wire_reason(code);
        if let Some(send) = stream.send.as_mut() {
            send.send_reset(reason);
        } else if let Some(respond) = stream.respond.as_mut() {
            respond.send_reset(reason);
        }
        tracing::trace!(target: "hface::h2", native, %code, "stream reset");
        drop(stream);
        self.drive();
        Ok(())
    }

    fn credit(&self, native: NativeId) -> Credit {
        let capacity = self
            .streams
            .get(&native)
            .filter(|s| !s.local_done)
            .and_then(|s| s.send.as_ref())
            .map_or(0, SendStream::capacity);
        Credit::Limited(capacity as u64)
    }

    fn close(&mut self) -> Result<()> {
        self.closing = true;
        match &mut self.session {
            Session::Client { send_request, .. } => {
                // Without request handles the connection winds down once idle.
                send_request.take();
            }
            Session::Server(connection) => connection.graceful_shutdown(),
            Session::ServerHandshake(_) | Session::Finished => {}
        }
        self.drive();
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Session::Server(connection) = &mut self.session {
            connection.abrupt_shutdown(Reason::NO_ERROR);
        }
        self.drive();
        Ok(())
    }

    fn bytes_to_send(&mut self) -> Vec<Bytes> {
        self.drive();
        self.pipe.take_outbound().into_iter().collect()
    }

    fn drain_events(&mut self, out: &mut Vec<EngineEvent>) {
        out.append(&mut self.events);
    }

    fn can_open_stream(&self) -> bool {
        self.role == Role::Client
            && matches!(
                &self.session,
                Session::Client {
                    send_request: Some(_),
                    ..
                }
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pump(from: &mut Http2Adapter, to: &mut Http2Adapter) {
        for unit in from.bytes_to_send() {
            to.receive(&unit).expect("receive");
        }
    }

    fn exchange(client: &mut Http2Adapter, server: &mut Http2Adapter) {
        for _ in 0..4 {
            pump(client, server);
            pump(server, client);
        }
    }

    fn drain(adapter: &mut Http2Adapter) -> Vec<EngineEvent> {
        let mut out = Vec::new();
        adapter.drain_events(&mut out);
        out
    }

    #[test]
    fn request_and_response_flow_through_the_pipe() {
        let mut client = Http2Adapter::new(Role::Client, &Http2Config::default()).expect("client");
        let mut server = Http2Adapter::new(Role::Server, &Http2Config::default()).expect("server");

        let get = Headers::request("GET", "https", "example.com", "/");
        let native = client
            .open_stream(StreamHandle::from_raw(1), &get, true)
            .expect("open")
            .expect("native id");
        assert_eq!(native, 1);
        exchange(&mut client, &mut server);

        let events = drain(&mut server);
        assert!(events.iter().any(|e| matches!(
            e,
            EngineEvent::Headers { native: 1, end_stream: true, headers } if headers.method().map(|m| &m[..]) == Some(&b"GET"[..])
        )));

        server
            .send_headers(1, &Headers::response(200), false)
            .expect("respond");
        server
            .send_data(1, Bytes::from_static(b"hello"), true)
            .expect("body");
        exchange(&mut client, &mut server);

        let events = drain(&mut client);
        assert!(events.iter().any(|e| matches!(e, EngineEvent::Headers { native: 1, end_stream: false, .. })));
        assert!(events.iter().any(|e| matches!(
            e,
            EngineEvent::Data { native: 1, end_stream: true, data } if &data[..] == b"hello"
        )));
    }

    #[test]
    fn server_cannot_open_streams() {
        let mut server = Http2Adapter::new(Role::Server, &Http2Config::default()).expect("server");
        let get = Headers::request("GET", "https", "example.com", "/");
        let err = server
            .open_stream(StreamHandle::from_raw(1), &get, true)
            .expect_err("server");
        assert!(matches!(err.kind(), crate::error::Kind::Unavailable));
    }

    #[test]
    fn garbage_preface_is_a_violation() {
        let mut server = Http2Adapter::new(Role::Server, &Http2Config::default()).expect("server");
        let err = server
            .receive(b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n")
            .expect_err("not a preface");
        assert!(err.is_protocol_violation());
    }

    #[test]
    fn error_codes_map_through_reasons() {
        assert_eq!(reason_code(Reason::CANCEL), ErrorCode::Cancel);
        assert_eq!(wire_reason(ErrorCode::RequestIncomplete), Reason::PROTOCOL_ERROR);
    }
}
