//! Conversions between `Headers` and the `http` types `h2` speaks.

use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::uri::{Authority, PathAndQuery, Scheme};
use http::{Method, Request, Response, StatusCode, Uri};

use crate::error::{self, Result, UnrepresentableField};
use crate::http::headers::{self, Headers};

fn unrepresentable(name: &[u8], reason: impl ToString) -> error::Error {
    error::invalid_headers(UnrepresentableField {
        name: String::from_utf8_lossy(name).into_owned(),
        reason: reason.to_string(),
    })
}

/// Regular fields of `headers` as a `HeaderMap`, minus connection-specific ones.
pub(crate) fn to_header_map(headers: &Headers) -> Result<HeaderMap> {
    let stripped = headers.without_connection_specific();
    let mut map = HeaderMap::with_capacity(stripped.len());
    for (name, value) in stripped.regular() {
        let header_name = HeaderName::from_bytes(name).map_err(|e| unrepresentable(name, e))?;
        let header_value = HeaderValue::from_maybe_shared(value.clone()).map_err(|e| unrepresentable(name, e))?;
        map.append(header_name, header_value);
    }
    Ok(map)
}

pub(crate) fn to_request(headers: &Headers) -> Result<Request<()>> {
    let method = headers
        .get(headers::METHOD)
        .ok_or_else(|| error::missing_pseudo_header(":method"))?;
    let method = Method::from_bytes(method).map_err(|e| unrepresentable(headers::METHOD, e))?;
    let authority = headers
        .get(headers::AUTHORITY)
        .ok_or_else(|| error::missing_pseudo_header(":authority"))?;
    let authority =
        Authority::from_maybe_shared(authority.clone()).map_err(|e| unrepresentable(headers::AUTHORITY, e))?;

    let uri = if method == Method::CONNECT {
        if headers.contains(headers::SCHEME) || headers.contains(headers::PATH) {
            return Err(error::invalid_headers("CONNECT carries only :method and :authority"));
        }
        Uri::builder().authority(authority).build()
    } else {
        let scheme = headers
            .get(headers::SCHEME)
            .ok_or_else(|| error::missing_pseudo_header(":scheme"))?;
        let path = headers
            .get(headers::PATH)
            .ok_or_else(|| error::missing_pseudo_header(":path"))?;
        let scheme = Scheme::try_from(&scheme[..]).map_err(|e| unrepresentable(headers::SCHEME, e))?;
        let path = PathAndQuery::from_maybe_shared(path.clone()).map_err(|e| unrepresentable(headers::PATH, e))?;
        Uri::builder()
            .scheme(scheme)
            .authority(authority)
            .path_and_query(path)
            .build()
    }
    .map_err(error::invalid_headers)?;

    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .body(())
        .map_err(error::invalid_headers)?;
    *request.headers_mut() = to_header_map(headers)?;
    Ok(request)
}

pub(crate) fn to_response(headers: &Headers) -> Result<Response<()>> {
    let status = headers
        .status()
        .ok_or_else(|| error::missing_pseudo_header(":status"))?;
    let status = StatusCode::from_u16(status).map_err(|e| unrepresentable(headers::STATUS, e))?;
    let mut response = Response::builder()
        .status(status)
        .body(())
        .map_err(error::invalid_headers)?;
    *response.headers_mut() = to_header_map(headers)?;
    Ok(response)
}

fn push_fields(map: &HeaderMap, out: &mut Headers) {
    for (name, value) in map {
        out.push(name.as_str(), Bytes::copy_from_slice(value.as_bytes()));
    }
}

pub(crate) fn from_request_parts(parts: &http::request::Parts) -> Headers {
    let mut out = Headers::with_capacity(parts.headers.len() + 4);
    out.push(headers::METHOD, Bytes::copy_from_slice(parts.method.as_str().as_bytes()));
    if let Some(scheme) = parts.uri.scheme_str() {
        out.push(headers::SCHEME, Bytes::copy_from_slice(scheme.as_bytes()));
    }
    if let Some(authority) = parts.uri.authority() {
        out.push(headers::AUTHORITY, Bytes::copy_from_slice(authority.as_str().as_bytes()));
    }
    if let Some(path) = parts.uri.path_and_query() {
        out.push(headers::PATH, Bytes::copy_from_slice(path.as_str().as_bytes()));
    }
    push_fields(&parts.headers, &mut out);
    out
}

pub(crate) fn from_response_parts(parts: &http::response::Parts) -> Headers {
    let mut out = Headers::response(parts.status.as_u16());
    push_fields(&parts.headers, &mut out);
    out
}

pub(crate) fn from_trailers(map: &HeaderMap) -> Headers {
    let mut out = Headers::with_capacity(map.len());
    push_fields(map, &mut out);
    out
}
