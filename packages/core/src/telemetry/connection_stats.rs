//! Per-connection statistics with cache-padded atomic counters
//!
//! The driver is single-threaded, but the counters are shared through `Arc`
//! so a monitoring task can read them while the connection runs.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_utils::CachePadded;

/// Lock-free counters for one connection.
///
/// Each counter sits on its own cache line so a reader on another core does
/// not contend with the driver's writes.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Bytes fed into `receive_bytes`
    pub bytes_received: CachePadded<AtomicU64>,
    /// Bytes handed out by `bytes_to_send`
    pub bytes_sent: CachePadded<AtomicU64>,
    pub streams_opened_local: CachePadded<AtomicU64>,
    pub streams_opened_remote: CachePadded<AtomicU64>,
    pub resets_sent: CachePadded<AtomicU64>,
    pub resets_received: CachePadded<AtomicU64>,
    /// Unified events handed to the caller
    pub events_delivered: CachePadded<AtomicU64>,
}

/// Immutable snapshot of `ConnectionStats` at a point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStatsSnapshot {
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub streams_opened_local: u64,
    pub streams_opened_remote: u64,
    pub resets_sent: u64,
    pub resets_received: u64,
    pub events_delivered: u64,
}

impl ConnectionStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn add(counter: &CachePadded<AtomicU64>, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn bump(counter: &CachePadded<AtomicU64>) {
        Self::add(counter, 1);
    }

    /// Reads every counter with relaxed ordering.
    ///
    /// Counters are read one at a time, so a snapshot taken while the driver
    /// runs may mix values from adjacent calls.
    #[inline]
    #[must_use]
    pub fn snapshot(&self) -> ConnectionStatsSnapshot {
        ConnectionStatsSnapshot {
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            streams_opened_local: self.streams_opened_local.load(Ordering::Relaxed),
            streams_opened_remote: self.streams_opened_remote.load(Ordering::Relaxed),
            resets_sent: self.resets_sent.load(Ordering::Relaxed),
            resets_received: self.resets_received.load(Ordering::Relaxed),
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
        }
    }
}
