//! # hface core
//!
//! A sans-io connection driver that puts HTTP/1.1, HTTP/2 and HTTP/3 behind
//! one interface. Bytes go in, unified events come out; requests, responses
//! and resets are issued against stable stream handles whatever the wire
//! version numbers its streams as.
//!
//! The engines are external: `httparse` for HTTP/1.1 heads, `h2` for
//! HTTP/2 and `quiche` for QUIC and HTTP/3. Socket I/O, TLS setup beyond
//! what QUIC requires, pooling and retries belong to the caller.
//!
//! ## Usage
//
// ```rust
// use hface_core::prelude::*;
//
// let mut client = HttpConnection::new(ConnectionConfig::client(HttpVersion::Http11))?;
// let request = Headers::request("GET", "http", "example.com", "/");
// let stream = client.send_headers(None, &request, true)?;
// for unit in client.bytes_to_send() {
//     socket.write_all(&unit)?;
// }
// for event in client.receive_bytes(&response_bytes)? {
//     println!("{stream}: {event:?}");
// }
// ```

#![deny(unsafe_code)]
#![warn(clippy::all)]

// Core modules
pub mod config;
pub mod error;
pub mod http;
pub mod protocols;
pub mod telemetry;

// Prelude with canonical types
pub mod prelude;

pub use crate::error::{Error, Kind, Result};
pub use crate::prelude::*;
