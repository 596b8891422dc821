//! HTTP/3 over `quiche`

mod adapter;
mod config;

pub(crate) use adapter::Http3Adapter;
