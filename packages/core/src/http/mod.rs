//! Header model shared by every protocol adapter

pub mod headers;

pub use headers::Headers;
