//! Connection telemetry
//!
//! Counters the driver bumps as bytes and events move through it.

pub mod connection_stats;

pub use connection_stats::{ConnectionStats, ConnectionStatsSnapshot};
