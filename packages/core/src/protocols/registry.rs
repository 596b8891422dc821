//! Stream registry
//!
//! Maps stable public stream handles to engine-native stream identifiers and
//! owns the authoritative half-state of every stream. Handles are arena
//! indices that are never reused within one connection; the native id is
//! optional because some engines assign it late (HTTP/1.1 exchanges get one
//! when the request goes out, HTTP/3 streams once the QUIC handshake is done).

use std::fmt;

use hashbrown::HashMap;

use super::core::HttpVersion;
use crate::error::{self, Result};

/// Engine-native stream identifier (HTTP/2 stream id, QUIC stream id, or the
/// HTTP/1.1 exchange sequence number).
pub type NativeId = u64;

/// Public, protocol-independent stream handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamHandle(u64);

impl StreamHandle {
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        StreamHandle(raw)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream #{}", self.0)
    }
}

/// State of one direction of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalfState {
    Idle,
    Open,
    HalfClosed,
    Closed,
}

/// Which side opened the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Initiator {
    Local,
    Remote,
}

/// Registry entry for one stream.
#[derive(Debug, Clone)]
pub struct StreamEntry {
    pub handle: StreamHandle,
    pub native: Option<NativeId>,
    pub initiator: Initiator,
    pub local: HalfState,
    pub remote: HalfState,
    pub reset: bool,
    undelivered: usize,
}

impl StreamEntry {
    fn new(handle: StreamHandle, initiator: Initiator) -> Self {
        Self {
            handle,
            native: None,
            initiator,
            local: HalfState::Idle,
            remote: HalfState::Idle,
            reset: false,
            undelivered: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.local == HalfState::Closed && self.remote == HalfState::Closed
    }

    /// Queued events not yet handed to the caller.
    #[inline]
    #[must_use]
    pub fn undelivered(&self) -> usize {
        self.undelivered
    }

    fn advance(half: &mut HalfState, end_stream: bool) {
        if *half == HalfState::Idle {
            *half = HalfState::Open;
        }
        if end_stream && *half == HalfState::Open {
            *half = HalfState::HalfClosed;
        }
    }

    fn settle(&mut self) {
        if self.local == HalfState::HalfClosed && self.remote == HalfState::HalfClosed {
            self.local = HalfState::Closed;
            self.remote = HalfState::Closed;
        }
    }
}

/// Arena of streams for one connection.
#[derive(Debug)]
pub struct StreamRegistry {
    version: HttpVersion,
    next_handle: u64,
    streams: HashMap<StreamHandle, StreamEntry>,
    natives: HashMap<NativeId, StreamHandle>,
}

impl StreamRegistry {
    #[must_use]
    pub fn new(version: HttpVersion) -> Self {
        Self {
            version,
            next_handle: 1,
            streams: HashMap::new(),
            natives: HashMap::new(),
        }
    }

    fn mint(&mut self, initiator: Initiator) -> StreamHandle {
        let handle = StreamHandle(self.next_handle);
        self.next_handle += 1;
        self.streams.insert(handle, StreamEntry::new(handle, initiator));
        handle
    }

    /// Returns a fresh handle for a locally initiated stream.
    ///
    /// HTTP/1.1 carries one exchange at a time, so a second allocation fails
    /// with `PipeliningNotReady` until the previous exchange has closed.
    ///
    /// # Errors
    ///
    /// `PipeliningNotReady` for an HTTP/1.1 connection with an exchange in flight.
    pub fn allocate_local(&mut self) -> Result<StreamHandle> {
        if self.version == HttpVersion::Http11
            && let Some(busy) = self.streams.values().find(|s| !s.is_closed())
        {
            return Err(error::pipelining_not_ready(busy.handle));
        }
        Ok(self.mint(Initiator::Local))
    }

    /// Existing handle for `native`, or a new one for a freshly observed
    /// remote-initiated stream.
    pub fn resolve_native(&mut self, native: NativeId) -> StreamHandle {
        if let Some(handle) = self.natives.get(&native) {
            return *handle;
        }
        let handle = self.mint(Initiator::Remote);
        self.bind_native(handle, native);
        tracing::trace!(target: "hface::registry", %handle, native, "remote stream registered");
        handle
    }

    /// Attaches the engine's identifier once it is known.
    pub fn bind_native(&mut self, handle: StreamHandle, native: NativeId) {
        if let Some(entry) = self.streams.get_mut(&handle) {
            entry.native = Some(native);
            self.natives.insert(native, handle);
        }
    }

    #[must_use]
    pub fn lookup_native(&self, native: NativeId) -> Option<StreamHandle> {
        self.natives.get(&native).copied()
    }

    #[must_use]
    pub fn get(&self, handle: StreamHandle) -> Option<&StreamEntry> {
        self.streams.get(&handle)
    }

    fn entry(&self, handle: StreamHandle) -> Result<&StreamEntry> {
        self.streams
            .get(&handle)
            .ok_or_else(|| error::invalid_stream_state(handle, "unknown stream"))
    }

    /// Validates a header send and returns the entry for inspection.
    ///
    /// # Errors
    ///
    /// `InvalidStreamState` unless the local half is Idle or Open.
    pub fn check_send_headers(&self, handle: StreamHandle) -> Result<&StreamEntry> {
        let entry = self.entry(handle)?;
        match entry.local {
            HalfState::Idle | HalfState::Open => Ok(entry),
            HalfState::HalfClosed | HalfState::Closed => {
                Err(error::invalid_stream_state(handle, "local half already closed"))
            }
        }
    }

    /// Validates a data send.
    ///
    /// # Errors
    ///
    /// `InvalidStreamState` unless headers went out and the local half is still Open.
    pub fn check_send_data(&self, handle: StreamHandle) -> Result<&StreamEntry> {
        let entry = self.entry(handle)?;
        match entry.local {
            HalfState::Open => Ok(entry),
            HalfState::Idle => Err(error::invalid_stream_state(handle, "headers not sent yet")),
            HalfState::HalfClosed | HalfState::Closed => {
                Err(error::invalid_stream_state(handle, "local half already closed"))
            }
        }
    }

    /// Records a local send. Returns true if the stream became Closed.
    pub fn on_local_send(&mut self, handle: StreamHandle, end_stream: bool) -> bool {
        self.transition(handle, end_stream, true)
    }

    /// Records a remote header or data frame. Returns true if the stream became Closed.
    pub fn on_remote_receive(&mut self, handle: StreamHandle, end_stream: bool) -> bool {
        self.transition(handle, end_stream, false)
    }

    fn transition(&mut self, handle: StreamHandle, end_stream: bool, local: bool) -> bool {
        let Some(entry) = self.streams.get_mut(&handle) else {
            return false;
        };
        if entry.is_closed() {
            return false;
        }
        if local {
            StreamEntry::advance(&mut entry.local, end_stream);
        } else {
            StreamEntry::advance(&mut entry.remote, end_stream);
        }
        entry.settle();
        entry.is_closed()
    }

    /// Forces both halves Closed. Returns false if the stream was already
    /// closed or unknown, making repeated resets no-ops.
    pub fn reset(&mut self, handle: StreamHandle) -> bool {
        match self.streams.get_mut(&handle) {
            Some(entry) if !entry.is_closed() => {
                entry.local = HalfState::Closed;
                entry.remote = HalfState::Closed;
                entry.reset = true;
                true
            }
            _ => false,
        }
    }

    /// Closes every stream after the connection terminated.
    pub fn close_all(&mut self) -> Vec<StreamHandle> {
        let mut closed = Vec::new();
        for entry in self.streams.values_mut().filter(|e| !e.is_closed()) {
            entry.local = HalfState::Closed;
            entry.remote = HalfState::Closed;
            closed.push(entry.handle);
        }
        closed.sort();
        closed
    }

    pub(crate) fn note_enqueued(&mut self, handle: StreamHandle) {
        if let Some(entry) = self.streams.get_mut(&handle) {
            entry.undelivered += 1;
        }
    }

    pub(crate) fn note_delivered(&mut self, handle: StreamHandle) {
        if let Some(entry) = self.streams.get_mut(&handle) {
            entry.undelivered = entry.undelivered.saturating_sub(1);
        }
    }

    pub(crate) fn note_discarded(&mut self, handle: StreamHandle, count: usize) {
        if let Some(entry) = self.streams.get_mut(&handle) {
            entry.undelivered = entry.undelivered.saturating_sub(count);
        }
    }

    /// Drops the entry if both halves are Closed and nothing is queued for it.
    pub fn reap(&mut self, handle: StreamHandle) -> bool {
        let done = self
            .streams
            .get(&handle)
            .is_some_and(|e| e.is_closed() && e.undelivered == 0);
        if !done {
            return false;
        }
        if let Some(entry) = self.streams.remove(&handle)
            && let Some(native) = entry.native
        {
            self.natives.remove(&native);
        }
        true
    }

    /// Discards an allocation the engine refused.
    pub(crate) fn forget(&mut self, handle: StreamHandle) {
        if let Some(entry) = self.streams.remove(&handle)
            && let Some(native) = entry.native
        {
            self.natives.remove(&native);
        }
    }

    /// Streams not yet Closed.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.streams.values().filter(|e| !e.is_closed()).count()
    }

    /// Entries still held, including Closed ones with undelivered events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}
