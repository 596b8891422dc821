//! Fluent builders
//!
//! `ConnectionBuilder` configures and constructs a driver; `HeadBuilder`
//! assembles the header blocks sent through it.

pub mod core;
pub mod headers;
pub mod methods;

pub use core::ConnectionBuilder;
pub use headers::{AcceptValue, ContentType, HeadBuilder, header};
