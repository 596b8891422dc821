//! HTTP/1.1 specifics: framing, pipelining and teardown.

mod common;

use bytes::Bytes;
use common::{Pair, body, first_remote_stream, init_logging, on_stream, received_headers};
use hface_core::prelude::*;

fn client() -> HttpConnection {
    init_logging();
    HttpConnection::new(ConnectionConfig::client(HttpVersion::Http11)).expect("client")
}

fn server() -> HttpConnection {
    init_logging();
    HttpConnection::new(ConnectionConfig::server(HttpVersion::Http11)).expect("server")
}

fn wire(conn: &mut HttpConnection) -> Vec<u8> {
    conn.bytes_to_send().concat()
}

#[test]
fn declared_length_frames_the_body() {
    let mut pair = Pair::new(HttpVersion::Http11);
    let request = Headers::request("PUT", "http", "example.com", "/item").with("content-length", "5");
    let stream = pair.client.send_headers(None, &request, false).expect("head");
    pair.client
        .send_data(stream, Bytes::from_static(b"hello"), true)
        .expect("body");

    let bytes = wire(&mut pair.client);
    let text = String::from_utf8_lossy(&bytes);
    assert!(text.starts_with("PUT /item HTTP/1.1\r\nHost: example.com\r\n"), "{text}");
    assert!(text.contains("Content-Length: 5\r\n"));
    assert!(!text.contains("Transfer-Encoding"));
    assert!(text.ends_with("\r\n\r\nhello"));

    let events: Vec<_> = pair.server.receive_bytes(&bytes).expect("request").collect();
    let remote = first_remote_stream(&events);
    assert_eq!(body(&on_stream(&events, remote)), b"hello");
    assert!(matches!(events.last(), Some(Event::StreamEnded { .. })));
}

#[test]
fn body_beyond_declared_length_is_refused() {
    let mut conn = client();
    let request = Headers::request("POST", "http", "example.com", "/").with("content-length", "2");
    let stream = conn.send_headers(None, &request, false).expect("head");
    let err = conn
        .send_data(stream, Bytes::from_static(b"abc"), true)
        .expect_err("too long");
    assert!(err.is_invalid_stream_state());
    assert_eq!(err.stream(), Some(stream));
}

#[test]
fn chunked_response_with_trailers() {
    let mut conn = client();
    let stream = conn
        .send_headers(None, &Headers::request("GET", "http", "example.com", "/"), true)
        .expect("request");
    let _ = wire(&mut conn);

    let events: Vec<_> = conn
        .receive_bytes(
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
              3\r\nabc\r\n2\r\nde\r\n0\r\nX-Digest: 42\r\n\r\n",
        )
        .expect("response")
        .collect();
    let seen = on_stream(&events, stream);

    assert_eq!(received_headers(&seen).status(), Some(200));
    assert_eq!(body(&seen), b"abcde");
    assert!(seen.iter().any(|e| matches!(
        e,
        Event::HeadersReceived { headers, end_stream: true, .. } if headers.contains("x-digest")
    )));
    assert!(matches!(seen.last(), Some(Event::StreamEnded { .. })));
    assert!(conn.stream(stream).is_none());
    assert!(conn.is_available());
}

#[test]
fn second_request_waits_for_the_first() {
    let mut conn = client();
    conn.send_headers(None, &Headers::request("GET", "http", "example.com", "/a"), true)
        .expect("first");
    assert!(!conn.is_available());
    let err = conn
        .send_headers(None, &Headers::request("GET", "http", "example.com", "/b"), true)
        .expect_err("pipelined");
    assert!(err.is_pipelining_not_ready());
}

#[test]
fn pipelined_requests_surface_one_at_a_time() {
    let mut conn = server();
    let events: Vec<_> = conn
        .receive_bytes(b"GET /a HTTP/1.1\r\nHost: x\r\n\r\nGET /b HTTP/1.1\r\nHost: x\r\n\r\n")
        .expect("requests")
        .collect();
    let first = first_remote_stream(&events);
    assert_eq!(
        received_headers(&events).get(":path").map(|v| &v[..]),
        Some(&b"/a"[..])
    );
    assert!(
        events
            .iter()
            .all(|e| e.stream() == Some(first)),
        "{events:?}"
    );

    conn.send_headers(Some(first), &Headers::response(204), true)
        .expect("first response");
    let events: Vec<_> = conn.events().collect();
    let second = first_remote_stream(&events);
    assert_ne!(first, second);
    assert_eq!(
        received_headers(&events).get(":path").map(|v| &v[..]),
        Some(&b"/b"[..])
    );
}

#[test]
fn reset_tears_down_the_connection() {
    let mut pair = Pair::new(HttpVersion::Http11);
    let stream = pair
        .client
        .send_headers(None, &Headers::request("GET", "http", "localhost", "/slow"), true)
        .expect("request");
    pair.settle();

    pair.client.reset_stream(stream, ErrorCode::Cancel).expect("reset");
    let events: Vec<_> = pair.client.events().collect();
    assert!(matches!(
        &events[..],
        [
            Event::StreamReset { code: ErrorCode::Cancel, origin: Origin::Local, .. },
            Event::ConnectionTerminated { origin: Origin::Local, .. },
        ]
    ));
    assert!(pair.client.has_expired());
}

#[test]
fn eof_completes_a_read_until_close_body() {
    let mut conn = client();
    let stream = conn
        .send_headers(None, &Headers::request("GET", "http", "example.com", "/"), true)
        .expect("request");
    let _ = wire(&mut conn);

    let mut events: Vec<_> = conn
        .receive_bytes(b"HTTP/1.0 200 OK\r\n\r\npartial")
        .expect("response")
        .collect();
    events.extend(conn.receive_eof().expect("eof"));

    let seen = on_stream(&events, stream);
    assert_eq!(body(&seen), b"partial");
    assert!(matches!(seen.last(), Some(Event::StreamEnded { .. })));
    assert!(matches!(
        events.last(),
        Some(Event::ConnectionTerminated { code: ErrorCode::NoError, origin: Origin::Remote, .. })
    ));
}

#[test]
fn eof_mid_message_is_a_protocol_error() {
    let mut conn = client();
    conn.send_headers(None, &Headers::request("GET", "http", "example.com", "/"), true)
        .expect("request");
    let _ = conn
        .receive_bytes(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nshort")
        .expect("partial response")
        .count();
    let events: Vec<_> = conn.receive_eof().expect("eof").collect();
    assert!(matches!(
        events.last(),
        Some(Event::ConnectionTerminated { code: ErrorCode::ProtocolError, origin: Origin::Remote, .. })
    ));
}

#[test]
fn malformed_response_terminates_once() {
    let mut conn = client();
    conn.send_headers(None, &Headers::request("GET", "http", "example.com", "/"), true)
        .expect("request");
    let err = conn
        .receive_bytes(b"HTTP/1.1 two hundred OK\r\n\r\n")
        .expect_err("malformed");
    assert!(err.is_protocol_violation());
    assert!(conn.has_expired());

    let events: Vec<_> = conn.events().collect();
    assert!(matches!(
        &events[..],
        [Event::ConnectionTerminated { code: ErrorCode::ProtocolError, origin: Origin::Local, .. }]
    ));
    assert!(conn.receive_eof().expect("eof after teardown").next().is_none());
}

#[test]
fn connection_close_ends_after_the_exchange() {
    let mut pair = Pair::new(HttpVersion::Http11);
    let request = Headers::request("GET", "http", "localhost", "/").with("connection", "close");
    pair.client.send_headers(None, &request, true).expect("request");
    pair.settle();
    let remote = first_remote_stream(&pair.take_server_events());

    pair.server
        .send_headers(Some(remote), &Headers::response(200).with("content-length", "0"), true)
        .expect("response");
    pair.settle();

    assert!(pair.server.has_expired());
    assert!(pair.client.has_expired());
    assert!(
        pair.take_client_events()
            .iter()
            .any(|e| matches!(e, Event::ConnectionTerminated { code: ErrorCode::NoError, .. }))
    );
}

#[test]
fn connect_tunnel_carries_raw_bytes_both_ways() {
    let mut pair = Pair::new(HttpVersion::Http11);
    let connect = Headers::new()
        .with(":method", "CONNECT")
        .with(":authority", "upstream.example:443");
    let stream = pair.client.send_headers(None, &connect, false).expect("connect");
    pair.settle();
    let server_events = pair.take_server_events();
    let remote = first_remote_stream(&server_events);
    assert!(!server_events.iter().any(|e| matches!(e, Event::StreamEnded { .. })));

    pair.server
        .send_headers(Some(remote), &Headers::response(200), false)
        .expect("established");
    pair.settle();
    let seen = on_stream(&pair.take_client_events(), stream);
    assert_eq!(received_headers(&seen).status(), Some(200));

    pair.client.send_data(stream, Bytes::from_static(b"ping"), false).expect("up");
    pair.settle();
    assert_eq!(body(&on_stream(&pair.take_server_events(), remote)), b"ping");
    let up = pair.client.flow_ledger(stream).map(|l| l.sent);
    assert_eq!(up, Some(4));

    pair.server.send_data(remote, Bytes::from_static(b"pong"), true).expect("down");
    pair.settle();
    let events = pair.take_client_events();
    assert_eq!(body(&on_stream(&events, stream)), b"pong");
    assert!(pair.server.has_expired());

    let events: Vec<_> = pair.client.receive_eof().expect("eof").collect();
    assert!(matches!(
        events.last(),
        Some(Event::ConnectionTerminated { code: ErrorCode::NoError, origin: Origin::Remote, .. })
    ));
}

#[test]
fn head_that_ends_the_stream_cannot_declare_a_length() {
    let mut pair = Pair::new(HttpVersion::Http11);
    pair.client
        .send_headers(None, &Headers::request("GET", "http", "example.com", "/"), true)
        .expect("request");
    pair.settle();
    let remote = first_remote_stream(&pair.take_server_events());

    let promised = Headers::response(200).with("content-length", "5");
    let err = pair
        .server
        .send_headers(Some(remote), &promised, true)
        .expect_err("body promised but never sent");
    assert!(err.is_invalid_headers());
    assert!(pair.server.bytes_to_send().is_empty());

    pair.server
        .send_headers(Some(remote), &promised, false)
        .expect("respond with a body");
}
