//! Request and response head entry points
//!
//! Each method parses an absolute URI into the `:scheme`, `:authority` and
//! `:path` pseudo-headers; CONNECT takes an authority instead.

use http::{Method, StatusCode, Uri};

use hface_core::error;
use hface_core::{Headers, Result};

use crate::builder::headers::HeadBuilder;

fn request_head(method: &Method, uri: &str) -> Result<HeadBuilder> {
    let uri: Uri = uri.parse().map_err(error::invalid_headers)?;
    let scheme = uri
        .scheme_str()
        .ok_or_else(|| error::missing_pseudo_header(":scheme"))?;
    let authority = uri
        .authority()
        .ok_or_else(|| error::missing_pseudo_header(":authority"))?;
    let path = uri.path_and_query().map_or("/", |p| p.as_str());
    tracing::trace!(target: "hface::builder", %method, %uri, "request head");
    Ok(HeadBuilder::from_headers(Headers::request(
        method.as_str(),
        scheme,
        authority.as_str(),
        path,
    )))
}

impl HeadBuilder {
    /// A request head for `method` on an absolute URI.
    ///
    /// # Errors
    ///
    /// `InvalidHeaders` if the URI does not parse or is not absolute.
    pub fn request(method: Method, uri: &str) -> Result<Self> {
        if method == Method::CONNECT {
            return Self::connect(uri);
        }
        request_head(&method, uri)
    }

    /// # Errors
    ///
    /// `InvalidHeaders` for a URI that is not absolute.
    pub fn get(uri: &str) -> Result<Self> {
        request_head(&Method::GET, uri)
    }

    /// # Errors
    ///
    /// `InvalidHeaders` for a URI that is not absolute.
    pub fn head(uri: &str) -> Result<Self> {
        request_head(&Method::HEAD, uri)
    }

    /// # Errors
    ///
    /// `InvalidHeaders` for a URI that is not absolute.
    pub fn post(uri: &str) -> Result<Self> {
        request_head(&Method::POST, uri)
    }

    /// # Errors
    ///
    /// `InvalidHeaders` for a URI that is not absolute.
    pub fn put(uri: &str) -> Result<Self> {
        request_head(&Method::PUT, uri)
    }

    /// # Errors
    ///
    /// `InvalidHeaders` for a URI that is not absolute.
    pub fn patch(uri: &str) -> Result<Self> {
        request_head(&Method::PATCH, uri)
    }

    /// # Errors
    ///
    /// `InvalidHeaders` for a URI that is not absolute.
    pub fn delete(uri: &str) -> Result<Self> {
        request_head(&Method::DELETE, uri)
    }

    /// A CONNECT head, which carries only `:method` and `:authority`.
    ///
    /// # Errors
    ///
    /// `InvalidHeaders` if `authority` is not `host:port`.
    pub fn connect(authority: &str) -> Result<Self> {
        let authority: http::uri::Authority = authority.parse().map_err(error::invalid_headers)?;
        if authority.port().is_none() {
            return Err(error::invalid_headers("CONNECT authority needs a port"));
        }
        let headers = Headers::new()
            .with(hface_core::http::headers::METHOD, "CONNECT")
            .with(hface_core::http::headers::AUTHORITY, authority.as_str().to_string());
        Ok(Self::from_headers(headers))
    }

    /// A response head.
    #[must_use]
    pub fn response(status: StatusCode) -> Self {
        Self::from_headers(Headers::response(status.as_u16()))
    }
}
