//! Connection driver
//!
//! `HttpConnection` owns one engine adapter, the stream registry and the
//! flow-control bridge. Every public call follows the same shape: validate
//! against registry state, delegate to the adapter, then pull whatever the
//! engine emitted through `absorb`, which resolves native ids to handles and
//! appends unified events to the delivery queue.
//!
//! The driver is not thread-safe; callers serialize access to one instance.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use super::adapter::{self, EngineAdapter};
use super::core::{ConnectionState, HttpVersion, Role};
use super::error_codes::ErrorCode;
use super::events::{EngineEvent, Event, Origin};
use super::flow::{Credit, FlowControlBridge, FlowLedger};
use super::registry::{HalfState, StreamEntry, StreamHandle, StreamRegistry};
use crate::config::{ConnectionConfig, Validator};
use crate::error::{self, Result};
use crate::http::Headers;
use crate::telemetry::ConnectionStats;

/// A protocol-agnostic HTTP connection.
///
/// Bytes go in through [`receive_bytes`](Self::receive_bytes) and come out
/// of [`bytes_to_send`](Self::bytes_to_send); intents are issued against
/// [`StreamHandle`]s that stay stable regardless of how the negotiated
/// version numbers its streams.
pub struct HttpConnection {
    version: HttpVersion,
    role: Role,
    adapter: Box<dyn EngineAdapter>,
    registry: StreamRegistry,
    flow: FlowControlBridge,
    state: ConnectionState,
    queue: VecDeque<Event>,
    batch: Vec<EngineEvent>,
    /// `ConnectionTerminated` has been queued.
    terminated: bool,
    /// `EngineAdapter::finish` has been called.
    finished: bool,
    stats: Arc<ConnectionStats>,
}

impl std::fmt::Debug for HttpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConnection")
            .field("version", &self.version)
            .field("role", &self.role)
            .field("state", &self.state)
            .field("streams", &self.registry.len())
            .field("queued", &self.queue.len())
            .finish_non_exhaustive()
    }
}

/// Moves every remote-closing event for a stream ahead of a local-closing
/// event for the same stream in the same batch.
fn order_batch(batch: &mut [EngineEvent]) {
    let mut i = 0;
    while i < batch.len() {
        if batch[i].closes_local()
            && let Some(native) = batch[i].native()
            && let Some(offset) = batch[i + 1..]
                .iter()
                .position(|e| e.native() == Some(native) && e.closes_remote())
        {
            batch[i..=i + 1 + offset].rotate_right(1);
        }
        i += 1;
    }
}

impl HttpConnection {
    /// Builds the engine for `config.version` in `config.role`.
    ///
    /// # Errors
    ///
    /// `Configuration` if the config fails validation or the engine rejects it.
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        config.validate().map_err(error::configuration)?;
        let adapter = adapter::build(&config)?;
        let flow = FlowControlBridge::new(adapter.connection_credit());
        tracing::debug!(
            target: "hface::driver",
            version = %config.version,
            role = ?config.role,
            "connection created"
        );
        let mut connection = Self {
            version: config.version,
            role: config.role,
            adapter,
            registry: StreamRegistry::new(config.version),
            flow,
            state: ConnectionState::Open,
            queue: VecDeque::new(),
            batch: Vec::new(),
            terminated: false,
            finished: false,
            stats: Arc::new(ConnectionStats::new()),
        };
        connection.absorb();
        Ok(connection)
    }

    /// Feeds inbound bytes (one datagram for HTTP/3) and returns the events
    /// they produced, along with anything already queued.
    ///
    /// # Errors
    ///
    /// `ProtocolViolation` if the engine rejects the bytes; the connection is
    /// terminated and the termination event stays queued.
    /// `ConnectionClosed` once the connection has terminated.
    pub fn receive_bytes(&mut self, data: &[u8]) -> Result<Events<'_>> {
        if self.terminated {
            return Err(error::connection_closed());
        }
        ConnectionStats::add(&self.stats.bytes_received, data.len() as u64);
        let received = self.adapter.receive(data);
        self.absorb();
        if let Err(e) = received {
            tracing::debug!(target: "hface::driver", error = %e, "inbound bytes rejected");
            if !self.terminated {
                self.terminate(ErrorCode::ProtocolError, Origin::Local, Some(e.to_string()));
            }
            return Err(e);
        }
        self.settle();
        Ok(self.events())
    }

    /// The transport reached end of input.
    ///
    /// # Errors
    ///
    /// Propagates an engine failure while finishing buffered input.
    pub fn receive_eof(&mut self) -> Result<Events<'_>> {
        if !self.terminated {
            let result = self.adapter.receive_eof();
            self.absorb();
            result?;
            self.settle();
        }
        Ok(self.events())
    }

    /// Sends a header block.
    ///
    /// With `stream: None` a new local stream is opened and its handle
    /// returned. On an existing stream this sends response headers, or
    /// trailers once the local half is already open.
    ///
    /// # Errors
    ///
    /// - `InvalidStreamState` if the local half is closed.
    /// - `PipeliningNotReady` for a second HTTP/1.1 exchange.
    /// - `InvalidHeaders` for missing pseudo-headers.
    /// - `ConnectionClosed` once shutdown has begun (new streams only).
    pub fn send_headers(
        &mut self,
        stream: Option<StreamHandle>,
        headers: &Headers,
        end_stream: bool,
    ) -> Result<StreamHandle> {
        let handle = match stream {
            None => self.open_stream(headers, end_stream)?,
            Some(handle) => {
                if self.terminated {
                    return Err(error::connection_closed().with_stream(handle));
                }
                let entry = self.registry.check_send_headers(handle)?;
                let native = entry
                    .native
                    .ok_or_else(|| error::unavailable("stream not yet bound by the engine").with_stream(handle))?;
                self.adapter
                    .send_headers(native, headers, end_stream)
                    .map_err(|e| e.with_stream(handle))?;
                self.registry.on_local_send(handle, end_stream);
                self.flow.update(Some(handle), self.adapter.credit(native));
                tracing::trace!(target: "hface::driver", %handle, end_stream, "headers sent");
                handle
            }
        };
        self.absorb();
        self.reap(handle);
        self.settle();
        Ok(handle)
    }

    fn open_stream(&mut self, headers: &Headers, end_stream: bool) -> Result<StreamHandle> {
        if self.terminated || self.state != ConnectionState::Open {
            return Err(error::connection_closed());
        }
        let handle = self.registry.allocate_local()?;
        let native = match self.adapter.open_stream(handle, headers, end_stream) {
            Ok(native) => native,
            Err(e) => {
                self.registry.forget(handle);
                return Err(e);
            }
        };
        match native {
            Some(native) => {
                self.registry.bind_native(handle, native);
                self.flow.open(handle, self.adapter.credit(native));
            }
            // Bound later; nothing may be sent until then.
            None => self.flow.open(handle, Credit::Limited(0)),
        }
        self.registry.on_local_send(handle, end_stream);
        ConnectionStats::bump(&self.stats.streams_opened_local);
        tracing::debug!(target: "hface::driver", %handle, ?native, end_stream, "local stream opened");
        Ok(handle)
    }

    /// Sends body bytes.
    ///
    /// # Errors
    ///
    /// - `FlowControlExceeded` if `data` is larger than the current credit.
    /// - `InvalidStreamState` if headers were not sent or the local half is closed.
    pub fn send_data(&mut self, stream: StreamHandle, data: impl Into<Bytes>, end_stream: bool) -> Result<()> {
        if self.terminated {
            return Err(error::connection_closed().with_stream(stream));
        }
        let data = data.into();
        let entry = self.registry.check_send_data(stream)?;
        let native = entry
            .native
            .ok_or_else(|| error::unavailable("stream not yet bound by the engine").with_stream(stream))?;
        let len = data.len() as u64;
        self.flow.check(stream, len)?;
        self.adapter
            .send_data(native, data, end_stream)
            .map_err(|e| e.with_stream(stream))?;
        self.flow.consume(stream, len);
        self.registry.on_local_send(stream, end_stream);
        tracing::trace!(target: "hface::driver", %stream, len, end_stream, "data sent");
        self.absorb();
        self.reap(stream);
        self.settle();
        Ok(())
    }

    /// Abandons a stream in both directions.
    ///
    /// Resetting a closed or unknown stream does nothing. Over HTTP/1.1 the
    /// reset tears down the whole connection.
    ///
    /// # Errors
    ///
    /// Propagates an engine failure while emitting the reset.
    pub fn reset_stream(&mut self, stream: StreamHandle, code: ErrorCode) -> Result<()> {
        let Some(entry) = self.registry.get(stream) else {
            return Ok(());
        };
        if entry.is_closed() {
            return Ok(());
        }
        let native = entry.native;
        match native {
            Some(native) => self
                .adapter
                .reset_stream(native, code)
                .map_err(|e| e.with_stream(stream))?,
            None => self.adapter.cancel_pending(stream),
        }
        self.registry.reset(stream);
        self.purge(stream);
        self.flow.forget(stream);
        ConnectionStats::bump(&self.stats.resets_sent);
        tracing::debug!(target: "hface::driver", %stream, %code, "stream reset locally");
        self.push(Event::StreamReset {
            stream,
            code,
            origin: Origin::Local,
        });
        self.absorb();
        self.settle();
        Ok(())
    }

    /// Drains outbound transmit units: one datagram each for HTTP/3, at most
    /// one coalesced buffer otherwise.
    pub fn bytes_to_send(&mut self) -> Vec<Bytes> {
        let out = self.adapter.bytes_to_send();
        let total: usize = out.iter().map(Bytes::len).sum();
        ConnectionStats::add(&self.stats.bytes_sent, total as u64);
        self.absorb();
        self.settle();
        out
    }

    /// Starts graceful shutdown. New local streams are refused; the
    /// connection closes once the streams in flight finish.
    ///
    /// # Errors
    ///
    /// Propagates an engine failure while announcing the shutdown.
    pub fn close(&mut self) -> Result<()> {
        if self.state != ConnectionState::Open {
            return Ok(());
        }
        tracing::debug!(target: "hface::driver", live = self.registry.live_count(), "closing");
        self.state = ConnectionState::GoingAway;
        let result = self.adapter.close();
        self.absorb();
        result?;
        self.settle();
        Ok(())
    }

    /// Next queued event, if any.
    pub fn next_event(&mut self) -> Option<Event> {
        let event = self.queue.pop_front()?;
        ConnectionStats::bump(&self.stats.events_delivered);
        if let Some(handle) = event.stream() {
            self.registry.note_delivered(handle);
            self.reap(handle);
        }
        Some(event)
    }

    #[must_use]
    pub fn has_pending_event(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Drains queued events lazily.
    pub fn events(&mut self) -> Events<'_> {
        Events { connection: self }
    }

    /// Credit a `send_data` on `stream` may use right now.
    #[must_use]
    pub fn send_credit(&self, stream: StreamHandle) -> Credit {
        self.flow.available(stream)
    }

    #[must_use]
    pub fn flow_ledger(&self, stream: StreamHandle) -> Option<FlowLedger> {
        self.flow.ledger(stream)
    }

    #[must_use]
    pub fn stream(&self, stream: StreamHandle) -> Option<&StreamEntry> {
        self.registry.get(stream)
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub fn version(&self) -> HttpVersion {
        self.version
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Whether a new local stream can be opened now.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.state == ConnectionState::Open
            && self.adapter.can_open_stream()
            && (self.version != HttpVersion::Http11 || self.registry.live_count() == 0)
    }

    #[must_use]
    pub fn has_expired(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    #[must_use]
    pub fn is_multiplexed(&self) -> bool {
        self.version.capabilities().supports_multiplexing
    }

    /// Time until the engine's next timer fires. Only HTTP/3 has timers.
    #[must_use]
    pub fn next_timeout(&self) -> Option<Duration> {
        self.adapter.next_timeout()
    }

    /// Fires expired engine timers.
    ///
    /// # Errors
    ///
    /// Propagates an engine failure.
    pub fn on_timeout(&mut self) -> Result<()> {
        let result = self.adapter.on_timeout();
        self.absorb();
        result?;
        self.settle();
        Ok(())
    }

    /// Local QUIC connection id, for routing datagrams on HTTP/3.
    #[must_use]
    pub fn source_connection_id(&self) -> Option<Bytes> {
        self.adapter.source_connection_id()
    }

    #[must_use]
    pub fn stats(&self) -> Arc<ConnectionStats> {
        Arc::clone(&self.stats)
    }

    fn push(&mut self, event: Event) {
        if let Some(handle) = event.stream() {
            self.registry.note_enqueued(handle);
        }
        self.queue.push_back(event);
    }

    /// Drops queued events for a reset stream.
    fn purge(&mut self, handle: StreamHandle) {
        let before = self.queue.len();
        self.queue.retain(|e| e.stream() != Some(handle));
        self.registry.note_discarded(handle, before - self.queue.len());
    }

    fn reap(&mut self, handle: StreamHandle) {
        if self.registry.reap(handle) {
            self.flow.forget(handle);
            tracing::trace!(target: "hface::driver", %handle, "stream released");
        }
    }

    /// Pulls engine events and translates them in emission order.
    fn absorb(&mut self) {
        self.adapter.drain_events(&mut self.batch);
        if self.batch.is_empty() {
            return;
        }
        let mut batch = std::mem::take(&mut self.batch);
        order_batch(&mut batch);
        for event in batch.drain(..) {
            self.apply(event);
        }
        self.batch = batch;
    }

    /// Whether events for `handle` may still be delivered.
    fn accepts_remote(&self, handle: StreamHandle) -> bool {
        self.registry
            .get(handle)
            .is_some_and(|e| !e.reset && matches!(e.remote, HalfState::Idle | HalfState::Open))
    }

    fn apply(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Headers {
                native,
                headers,
                end_stream,
            } => {
                let handle = match self.registry.lookup_native(native) {
                    Some(handle) => handle,
                    None if self.role == Role::Server && !self.terminated => {
                        let handle = self.registry.resolve_native(native);
                        self.flow.open(handle, self.adapter.credit(native));
                        ConnectionStats::bump(&self.stats.streams_opened_remote);
                        tracing::debug!(target: "hface::driver", %handle, native, "remote stream opened");
                        handle
                    }
                    None => {
                        tracing::trace!(target: "hface::driver", native, "headers for unknown stream dropped");
                        return;
                    }
                };
                if !self.accepts_remote(handle) {
                    return;
                }
                self.registry.on_remote_receive(handle, end_stream);
                self.push(Event::HeadersReceived {
                    stream: handle,
                    headers,
                    end_stream,
                });
                if end_stream {
                    self.push(Event::StreamEnded { stream: handle });
                }
            }
            EngineEvent::Data {
                native,
                data,
                end_stream,
            } => {
                let Some(handle) = self.registry.lookup_native(native) else {
                    return;
                };
                if !self.accepts_remote(handle) {
                    return;
                }
                self.registry.on_remote_receive(handle, end_stream);
                self.push(Event::DataReceived {
                    stream: handle,
                    data,
                    end_stream,
                });
                if end_stream {
                    self.push(Event::StreamEnded { stream: handle });
                }
            }
            EngineEvent::Reset { native, code } => self.engine_reset(native, code, Origin::Remote),
            EngineEvent::LocalReset { native, code } => self.engine_reset(native, code, Origin::Local),
            EngineEvent::Credit {
                native: Some(native),
                credit,
            } => {
                let Some(handle) = self.registry.lookup_native(native) else {
                    return;
                };
                if self.registry.get(handle).is_some_and(|e| !e.is_closed()) {
                    self.flow.update(Some(handle), credit);
                    self.push(Event::FlowControlUpdated {
                        stream: Some(handle),
                        credit,
                    });
                }
            }
            EngineEvent::Credit { native: None, credit } => {
                self.flow.update(None, credit);
                self.push(Event::FlowControlUpdated { stream: None, credit });
            }
            EngineEvent::Bound { handle, native } => {
                if self.registry.get(handle).is_some_and(|e| !e.reset) {
                    self.registry.bind_native(handle, native);
                    tracing::debug!(target: "hface::driver", %handle, native, "stream bound");
                }
            }
            EngineEvent::Handshake { alpn } => self.push(Event::HandshakeCompleted { alpn }),
            EngineEvent::Goaway { code } => {
                if self.state == ConnectionState::Open {
                    self.state = ConnectionState::GoingAway;
                }
                tracing::debug!(target: "hface::driver", %code, "peer is going away");
                self.push(Event::GoawayReceived { code });
            }
            EngineEvent::Terminated { code, origin, reason } => self.terminate(code, origin, reason),
        }
    }

    fn engine_reset(&mut self, native: u64, code: ErrorCode, origin: Origin) {
        let Some(handle) = self.registry.lookup_native(native) else {
            return;
        };
        if !self.registry.reset(handle) {
            return;
        }
        self.purge(handle);
        self.flow.forget(handle);
        let counter = match origin {
            Origin::Remote => &self.stats.resets_received,
            Origin::Local => &self.stats.resets_sent,
        };
        ConnectionStats::bump(counter);
        tracing::debug!(target: "hface::driver", %handle, %code, ?origin, "stream reset by engine");
        self.push(Event::StreamReset {
            stream: handle,
            code,
            origin,
        });
    }

    fn terminate(&mut self, code: ErrorCode, origin: Origin, reason: Option<String>) {
        if self.terminated {
            return;
        }
        self.terminated = true;
        self.state = ConnectionState::Closed;
        for handle in self.registry.close_all() {
            self.reap(handle);
        }
        tracing::debug!(target: "hface::driver", %code, ?origin, ?reason, "connection terminated");
        self.push(Event::ConnectionTerminated { code, origin, reason });
    }

    /// Finishes a going-away connection once no stream is live.
    fn settle(&mut self) {
        if self.state != ConnectionState::GoingAway || self.finished || self.registry.live_count() > 0 {
            return;
        }
        self.finished = true;
        tracing::debug!(target: "hface::driver", "all streams finished");
        if let Err(e) = self.adapter.finish() {
            tracing::warn!(target: "hface::driver", error = %e, "engine shutdown failed");
        }
        self.absorb();
        if !self.terminated {
            self.state = ConnectionState::Closed;
        }
    }
}

/// Lazy, finite view over the driver's queued events.
///
/// Each item is removed from the queue as it is yielded; dropping the
/// iterator early leaves the rest queued for the next drain.
pub struct Events<'a> {
    connection: &'a mut HttpConnection,
}

impl std::fmt::Debug for Events<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Events")
            .field("queued", &self.connection.queue.len())
            .finish_non_exhaustive()
    }
}

impl Iterator for Events<'_> {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        self.connection.next_event()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let queued = self.connection.queue.len();
        (queued, Some(queued))
    }
}
