//! Header block construction
//!
//! `HeadBuilder` assembles a request or response head as a `Headers` list,
//! pseudo-headers first, ready for `HttpConnection::send_headers`. Typed
//! `http` names and values are accepted so invalid fields are caught
//! before they reach an engine.

use bytes::Bytes;
use hface_core::Headers;
use http::{HeaderName, HeaderValue};

/// Content type enumeration for common media types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    ApplicationJson,
    ApplicationFormUrlEncoded,
    ApplicationOctetStream,
    TextPlain,
    TextHtml,
    MultipartFormData,
}

impl ContentType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::ApplicationJson => "application/json",
            ContentType::ApplicationFormUrlEncoded => "application/x-www-form-urlencoded",
            ContentType::ApplicationOctetStream => "application/octet-stream",
            ContentType::TextPlain => "text/plain",
            ContentType::TextHtml => "text/html",
            ContentType::MultipartFormData => "multipart/form-data",
        }
    }
}

/// Helper type for `accept` that takes either a string or a `ContentType`
pub enum AcceptValue {
    String(String),
    ContentType(ContentType),
}

impl AcceptValue {
    pub fn as_str(&self) -> &str {
        match self {
            AcceptValue::String(s) => s,
            AcceptValue::ContentType(ct) => ct.as_str(),
        }
    }
}

impl From<&str> for AcceptValue {
    fn from(s: &str) -> Self {
        AcceptValue::String(s.to_string())
    }
}

impl From<String> for AcceptValue {
    fn from(s: String) -> Self {
        AcceptValue::String(s)
    }
}

impl From<ContentType> for AcceptValue {
    fn from(ct: ContentType) -> Self {
        AcceptValue::ContentType(ct)
    }
}

/// Header constants for common HTTP headers
pub mod header {
    pub use http::header::*;
}

/// Builder for one header block
#[derive(Debug, Clone, Default)]
pub struct HeadBuilder {
    pub(crate) headers: Headers,
}

impl HeadBuilder {
    /// Start from an existing block.
    #[must_use]
    pub fn from_headers(headers: Headers) -> Self {
        Self { headers }
    }

    /// An empty block, for trailers.
    #[must_use]
    pub fn trailers() -> Self {
        Self::default()
    }

    /// Add a header without replacing existing ones.
    #[must_use]
    pub fn header(mut self, key: HeaderName, value: HeaderValue) -> Self {
        self.headers
            .push(key.as_str(), Bytes::copy_from_slice(value.as_bytes()));
        self
    }

    /// Add several headers from `(name, value)` pairs, skipping invalid names
    /// and values.
    #[must_use]
    pub fn headers<'a>(mut self, pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        for (name, value) in pairs {
            match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
                (Ok(name), Ok(value)) => self = self.header(name, value),
                _ => tracing::debug!(target: "hface::builder", name, "skipping invalid header"),
            }
        }
        self
    }

    fn text(self, key: HeaderName, value: &str) -> Self {
        match HeaderValue::from_str(value) {
            Ok(header_value) => self.header(key, header_value),
            Err(_) => self, // Skip invalid header value
        }
    }

    #[must_use]
    pub fn content_type(self, content_type: ContentType) -> Self {
        self.text(header::CONTENT_TYPE, content_type.as_str())
    }

    #[must_use]
    pub fn content_length(self, len: u64) -> Self {
        self.header(header::CONTENT_LENGTH, HeaderValue::from(len))
    }

    #[must_use]
    pub fn accept<T: Into<AcceptValue>>(self, accept: T) -> Self {
        self.text(header::ACCEPT, accept.into().as_str())
    }

    #[must_use]
    pub fn user_agent(self, user_agent: &str) -> Self {
        self.text(header::USER_AGENT, user_agent)
    }

    #[must_use]
    pub fn cache_control(self, value: &str) -> Self {
        self.text(header::CACHE_CONTROL, value)
    }

    /// `Authorization: Bearer <token>`
    #[must_use]
    pub fn bearer_auth(self, token: &str) -> Self {
        match HeaderValue::from_str(&format!("Bearer {token}")) {
            Ok(mut value) => {
                value.set_sensitive(true);
                self.header(header::AUTHORIZATION, value)
            }
            Err(_) => self,
        }
    }

    #[must_use]
    pub fn build(self) -> Headers {
        self.headers
    }
}

impl From<HeadBuilder> for Headers {
    fn from(builder: HeadBuilder) -> Self {
        builder.headers
    }
}
