//! hface prelude
//!
//! Everything needed to build a connection, send heads and consume events.

pub use crate::builder::{ConnectionBuilder, ContentType, HeadBuilder};
pub use crate::Hface;

pub use hface_core::prelude::*;
pub use hface_core::{Error, Kind, Result};

// HTTP standard types from http crate
pub use ::http::{Method, StatusCode};
