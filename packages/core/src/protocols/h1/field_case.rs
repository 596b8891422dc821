//! Canonical HTTP/1.1 field-name capitalisation
//!
//! Field names are case-insensitive, but peers commonly expect `Content-Type`
//! rather than `content-type` on an HTTP/1.1 wire.

/// Words whose registered spelling is not plain title case.
const SPECIAL_WORDS: &[(&[u8], &[u8])] = &[
    (b"alpn", b"ALPN"),
    (b"amp", b"AMP"),
    (b"cdn", b"CDN"),
    (b"ch", b"CH"),
    (b"ct", b"CT"),
    (b"caldav", b"CalDAV"),
    (b"dasl", b"DASL"),
    (b"dav", b"DAV"),
    (b"dns", b"DNS"),
    (b"dpr", b"DPR"),
    (b"ect", b"ECT"),
    (b"ediint", b"EDIINT"),
    (b"etag", b"ETag"),
    (b"entityid", b"EntityId"),
    (b"gpc", b"GPC"),
    (b"getprofile", b"GetProfile"),
    (b"http2", b"HTTP2"),
    (b"id", b"ID"),
    (b"im", b"IM"),
    (b"md5", b"MD5"),
    (b"mime", b"MIME"),
    (b"maxversion", b"MaxVersion"),
    (b"nel", b"NEL"),
    (b"odata", b"OData"),
    (b"oscore", b"OSCORE"),
    (b"oslc", b"OSLC"),
    (b"p3p", b"P3P"),
    (b"pep", b"PEP"),
    (b"pics", b"PICS"),
    (b"profileobject", b"ProfileObject"),
    (b"rtt", b"RTT"),
    (b"slug", b"SLUG"),
    (b"setprofile", b"SetProfile"),
    (b"soapaction", b"SoapAction"),
    (b"sourcemap", b"SourceMap"),
    (b"tcn", b"TCN"),
    (b"te", b"TE"),
    (b"ttl", b"TTL"),
    (b"ua", b"UA"),
    (b"uri", b"URI"),
    (b"www", b"WWW"),
    (b"websocket", b"WebSocket"),
];

/// Writes `name` in canonical form, e.g. `www-authenticate` as `WWW-Authenticate`.
pub(crate) fn write_capitalized(name: &[u8], out: &mut Vec<u8>) {
    for (i, word) in name.split(|b| *b == b'-').enumerate() {
        if i > 0 {
            out.push(b'-');
        }
        let lower = word.to_ascii_lowercase();
        if let Some((_, special)) = SPECIAL_WORDS.iter().find(|(w, _)| *w == lower.as_slice()) {
            out.extend_from_slice(special);
            continue;
        }
        let mut chars = lower.into_iter();
        if let Some(first) = chars.next() {
            out.push(first.to_ascii_uppercase());
            out.extend(chars);
        }
    }
}
