//! HTTP/1.1 engine: `httparse` for parsing plus an in-crate framer.

mod adapter;
mod codec;
mod field_case;

pub(crate) use adapter::Http1Adapter;
