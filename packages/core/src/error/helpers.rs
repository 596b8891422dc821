use thiserror::Error;

use crate::protocols::flow::Credit;

/// The payload did not fit into the credit the engine currently grants.
#[derive(Debug, Error)]
#[error("{requested} bytes requested but only {available} permitted")]
pub struct CreditShortfall {
    pub requested: u64,
    pub available: Credit,
}

/// A mandatory pseudo-header was absent from a header block.
#[derive(Debug, Error)]
#[error("missing pseudo-header {0}")]
pub struct MissingPseudoHeader(pub &'static str);

/// A header name or value cannot be represented on the wire.
#[derive(Debug, Error)]
#[error("field {name:?} is not representable: {reason}")]
pub struct UnrepresentableField {
    pub name: String,
    pub reason: String,
}

/// Human readable explanation attached to state errors.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct StateMismatch(pub &'static str);

/// The connection no longer accepts new work.
#[derive(Debug, Error)]
#[error("connection closed")]
pub struct ConnectionClosed;
