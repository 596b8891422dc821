//! Protocol engines and the driver that unifies them
//!
//! One `HttpConnection` wraps one engine adapter chosen from the configured
//! version. The adapter speaks native stream ids; the registry and the
//! flow-control bridge turn that into handles and send credit the caller
//! can use without knowing which version is underneath.

pub mod adapter;
pub mod connection;
pub mod core;
pub mod error_codes;
pub mod events;
pub mod flow;
pub mod registry;

mod h1;
#[cfg(feature = "h2")]
mod h2;
#[cfg(feature = "h3")]
mod h3;

pub use connection::{Events, HttpConnection};
pub use core::{ConnectionState, HttpVersion, ProtocolCapabilities, Role};
pub use error_codes::ErrorCode;
pub use events::{Event, Origin};
pub use flow::{Credit, FlowControlBridge, FlowLedger};
pub use registry::{HalfState, Initiator, NativeId, StreamEntry, StreamHandle, StreamRegistry};
