//! Flow-control bridge
//!
//! One send-permission model for all versions. HTTP/1.1 reports
//! `Credit::Unbounded`; HTTP/2 and HTTP/3 report whatever the engine grants.
//! Engine reports are authoritative: each `FlowControlUpdated` replaces the
//! tracked credit, and the bridge subtracts what was sent in between.

use std::fmt;

use hashbrown::HashMap;

use super::registry::StreamHandle;
use crate::error::{self, Result};

/// Bytes a sender may transmit before waiting for more allowance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credit {
    /// No flow control on this path.
    Unbounded,
    Limited(u64),
}

impl Credit {
    #[inline]
    #[must_use]
    pub fn permits(self, len: u64) -> bool {
        match self {
            Credit::Unbounded => true,
            Credit::Limited(available) => len <= available,
        }
    }

    #[inline]
    #[must_use]
    pub fn consume(self, len: u64) -> Credit {
        match self {
            Credit::Unbounded => Credit::Unbounded,
            Credit::Limited(available) => Credit::Limited(available.saturating_sub(len)),
        }
    }

    #[inline]
    #[must_use]
    pub fn min(self, other: Credit) -> Credit {
        match (self, other) {
            (Credit::Unbounded, c) | (c, Credit::Unbounded) => c,
            (Credit::Limited(a), Credit::Limited(b)) => Credit::Limited(a.min(b)),
        }
    }

    /// Numeric view, with `Unbounded` as `u64::MAX`.
    #[inline]
    #[must_use]
    pub fn as_u64(self) -> u64 {
        match self {
            Credit::Unbounded => u64::MAX,
            Credit::Limited(available) => available,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_unbounded(self) -> bool {
        matches!(self, Credit::Unbounded)
    }
}

impl fmt::Display for Credit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credit::Unbounded => f.write_str("unbounded"),
            Credit::Limited(available) => write!(f, "{available}"),
        }
    }
}

/// Per-stream ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowLedger {
    pub credit: Credit,
    /// Cumulative bytes handed to the engine.
    pub sent: u64,
    /// Initial window plus every increase reported since.
    pub granted: u64,
}

impl FlowLedger {
    fn new(initial: Credit) -> Self {
        Self {
            credit: initial,
            sent: 0,
            granted: match initial {
                Credit::Unbounded => u64::MAX,
                Credit::Limited(n) => n,
            },
        }
    }

    fn replace(&mut self, reported: Credit) {
        if let (Credit::Limited(old), Credit::Limited(new)) = (self.credit, reported)
            && new > old
        {
            self.granted = self.granted.saturating_add(new - old);
        }
        if reported.is_unbounded() {
            self.granted = u64::MAX;
        }
        self.credit = reported;
    }
}

/// Send credit per stream and for the connection as a whole.
#[derive(Debug)]
pub struct FlowControlBridge {
    connection: FlowLedger,
    streams: HashMap<StreamHandle, FlowLedger>,
}

impl FlowControlBridge {
    #[must_use]
    pub fn new(connection: Credit) -> Self {
        Self {
            connection: FlowLedger::new(connection),
            streams: HashMap::new(),
        }
    }

    /// Starts tracking a stream with the engine's initial credit.
    pub fn open(&mut self, stream: StreamHandle, initial: Credit) {
        self.streams.insert(stream, FlowLedger::new(initial));
    }

    /// Credit a send on `stream` may use right now.
    #[must_use]
    pub fn available(&self, stream: StreamHandle) -> Credit {
        let own = self
            .streams
            .get(&stream)
            .map_or(Credit::Limited(0), |l| l.credit);
        own.min(self.connection.credit)
    }

    /// Fails with `FlowControlExceeded` if `len` bytes do not fit.
    ///
    /// # Errors
    ///
    /// `FlowControlExceeded` carrying the requested and available byte counts.
    pub fn check(&self, stream: StreamHandle, len: u64) -> Result<()> {
        let available = self.available(stream);
        if available.permits(len) {
            Ok(())
        } else {
            Err(error::flow_control_exceeded(stream, len, available))
        }
    }

    /// Records bytes handed to the engine.
    pub fn consume(&mut self, stream: StreamHandle, len: u64) {
        if let Some(ledger) = self.streams.get_mut(&stream) {
            ledger.credit = ledger.credit.consume(len);
            ledger.sent = ledger.sent.saturating_add(len);
        }
        self.connection.credit = self.connection.credit.consume(len);
        self.connection.sent = self.connection.sent.saturating_add(len);
    }

    /// Applies an engine report. `None` targets the connection.
    pub fn update(&mut self, stream: Option<StreamHandle>, reported: Credit) {
        match stream {
            Some(handle) => {
                self.streams
                    .entry(handle)
                    .or_insert_with(|| FlowLedger::new(Credit::Limited(0)))
                    .replace(reported);
            }
            None => self.connection.replace(reported),
        }
    }

    #[must_use]
    pub fn ledger(&self, stream: StreamHandle) -> Option<FlowLedger> {
        self.streams.get(&stream).copied()
    }

    #[must_use]
    pub fn connection_ledger(&self) -> FlowLedger {
        self.connection
    }

    pub fn forget(&mut self, stream: StreamHandle) {
        self.streams.remove(&stream);
    }
}
