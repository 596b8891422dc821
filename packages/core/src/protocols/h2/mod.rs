//! HTTP/2 engine: `h2` driven over an in-memory pipe.

mod adapter;
mod convert;
mod frames;
mod pipe;

pub(crate) use adapter::Http2Adapter;
