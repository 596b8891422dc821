//! Protocol-independent header blocks
//!
//! Every adapter converts to and from this one representation: an ordered
//! list of `(name, value)` pairs with lowercase names, pseudo-headers first,
//! duplicates allowed.

use std::fmt;

use bytes::Bytes;

/// Request pseudo-headers in canonical order.
pub const METHOD: &[u8] = b":method";
pub const SCHEME: &[u8] = b":scheme";
pub const AUTHORITY: &[u8] = b":authority";
pub const PATH: &[u8] = b":path";
/// Response pseudo-header.
pub const STATUS: &[u8] = b":status";

/// Fields that only make sense on a single HTTP/1.1 hop.
const CONNECTION_SPECIFIC: &[&[u8]] = &[
    b"connection",
    b"keep-alive",
    b"proxy-connection",
    b"transfer-encoding",
    b"upgrade",
];

/// An ordered header block.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Headers {
    fields: Vec<(Bytes, Bytes)>,
}

impl Headers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    /// Request head with all four pseudo-headers.
    #[must_use]
    pub fn request(method: &str, scheme: &str, authority: &str, path: &str) -> Self {
        let mut headers = Self::with_capacity(8);
        headers.push(METHOD, Bytes::copy_from_slice(method.as_bytes()));
        headers.push(SCHEME, Bytes::copy_from_slice(scheme.as_bytes()));
        headers.push(AUTHORITY, Bytes::copy_from_slice(authority.as_bytes()));
        headers.push(PATH, Bytes::copy_from_slice(path.as_bytes()));
        headers
    }

    /// Response head carrying only `:status`.
    #[must_use]
    pub fn response(status: u16) -> Self {
        let mut headers = Self::with_capacity(8);
        headers.push(STATUS, status.to_string().into_bytes());
        headers
    }

    /// Appends a field, lowercasing its name.
    ///
    /// Pseudo-headers are inserted after any existing pseudo-headers so the
    /// block keeps them in front.
    pub fn push(&mut self, name: impl AsRef<[u8]>, value: impl Into<Bytes>) {
        let name = Bytes::from(name.as_ref().to_ascii_lowercase());
        let value = value.into();
        if name.starts_with(b":") {
            let at = self.fields.iter().take_while(|(n, _)| n.starts_with(b":")).count();
            self.fields.insert(at, (name, value));
        } else {
            self.fields.push((name, value));
        }
    }

    /// Builder-style `push`.
    #[must_use]
    pub fn with(mut self, name: impl AsRef<[u8]>, value: impl Into<Bytes>) -> Self {
        self.push(name, value);
        self
    }

    /// First value for `name` (case-insensitive).
    #[must_use]
    pub fn get(&self, name: impl AsRef<[u8]>) -> Option<&Bytes> {
        let name = name.as_ref();
        self.fields
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    /// All values for `name` in order.
    pub fn get_all<'a>(&'a self, name: &'a [u8]) -> impl Iterator<Item = &'a Bytes> + 'a {
        self.fields
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    #[must_use]
    pub fn contains(&self, name: impl AsRef<[u8]>) -> bool {
        self.get(name).is_some()
    }

    /// Removes every field called `name`, returning how many were dropped.
    pub fn remove(&mut self, name: impl AsRef<[u8]>) -> usize {
        let name = name.as_ref();
        let before = self.fields.len();
        self.fields.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        before - self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Bytes, &Bytes)> {
        self.fields.iter().map(|(n, v)| (n, v))
    }

    /// Fields that are not pseudo-headers.
    pub fn regular(&self) -> impl Iterator<Item = (&Bytes, &Bytes)> {
        self.iter().filter(|(n, _)| !n.starts_with(b":"))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// `:status` parsed as a number.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        self.get(STATUS)
            .and_then(|v| std::str::from_utf8(v).ok())
            .and_then(|s| s.parse().ok())
    }

    /// `:method`, if present.
    #[must_use]
    pub fn method(&self) -> Option<&Bytes> {
        self.get(METHOD)
    }

    /// Whether the block carries any pseudo-header at all.
    #[must_use]
    pub fn has_pseudo(&self) -> bool {
        self.fields.first().is_some_and(|(n, _)| n.starts_with(b":"))
    }

    /// Same fields regardless of order.
    #[must_use]
    pub fn same_fields(&self, other: &Headers) -> bool {
        let mut left = self.fields.clone();
        let mut right = other.fields.clone();
        left.sort();
        right.sort();
        left == right
    }

    /// Copy without fields that cannot cross an HTTP/2 or HTTP/3 hop.
    #[must_use]
    pub fn without_connection_specific(&self) -> Headers {
        let fields = self
            .fields
            .iter()
            .filter(|(n, v)| {
                if CONNECTION_SPECIFIC.iter().any(|c| &n[..] == *c) {
                    return false;
                }
                &n[..] != b"te" || v.eq_ignore_ascii_case(b"trailers")
            })
            .cloned()
            .collect();
        Headers { fields }
    }
}

impl fmt::Debug for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.fields.iter().map(|(n, v)| {
                (
                    String::from_utf8_lossy(n).into_owned(),
                    String::from_utf8_lossy(v).into_owned(),
                )
            }))
            .finish()
    }
}

impl<N: AsRef<[u8]>, V: Into<Bytes>> FromIterator<(N, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.push(name, value);
        }
        headers
    }
}

impl IntoIterator for Headers {
    type Item = (Bytes, Bytes);
    type IntoIter = std::vec::IntoIter<(Bytes, Bytes)>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pseudo_headers_stay_in_front() {
        let mut headers = Headers::new();
        headers.push("Content-Type", "text/plain");
        headers.push(":status", "200");
        let names: Vec<_> = headers.iter().map(|(n, _)| n.clone()).collect();
        assert_eq!(names[0], Bytes::from_static(b":status"));
        assert_eq!(names[1], Bytes::from_static(b"content-type"));
    }

    #[test]
    fn duplicates_are_kept_in_order() {
        let headers = Headers::response(200)
            .with("set-cookie", "a=1")
            .with("Set-Cookie", "b=2");
        let values: Vec<_> = headers.get_all(b"set-cookie").cloned().collect();
        assert_eq!(values, vec![Bytes::from_static(b"a=1"), Bytes::from_static(b"b=2")]);
    }

    #[test]
    fn strips_hop_by_hop_fields() {
        let headers = Headers::request("GET", "https", "example.com", "/")
            .with("connection", "keep-alive")
            .with("te", "gzip")
            .with("accept", "*/*");
        let stripped = headers.without_connection_specific();
        assert!(!stripped.contains("connection"));
        assert!(!stripped.contains("te"));
        assert!(stripped.contains("accept"));

        let trailers = Headers::new().with("te", "trailers").without_connection_specific();
        assert!(trailers.contains("te"));
    }

    #[test]
    fn multiset_comparison_ignores_order() {
        let a = Headers::new().with("a", "1").with("b", "2");
        let b = Headers::new().with("b", "2").with("a", "1");
        assert!(a.same_fields(&b));
        assert!(!a.same_fields(&Headers::new().with("a", "1")));
    }
}
