//! HTTP/2 specifics: flow control, trailers and shutdown.

#![cfg(feature = "h2")]

mod common;

use bytes::Bytes;
use common::{Pair, first_remote_stream, init_logging, on_stream};
use hface_core::Kind;
use hface_core::prelude::*;

const PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

fn frame(kind: u8, flags: u8, stream: u32, payload: &[u8]) -> Vec<u8> {
    let len = u32::try_from(payload.len()).expect("small frame").to_be_bytes();
    let mut out = vec![len[1], len[2], len[3], kind, flags];
    out.extend_from_slice(&stream.to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// A client that opens stream 1 with GET / and grants no stream window.
fn zero_window_client_bytes() -> Vec<u8> {
    let mut bytes = PREFACE.to_vec();
    // SETTINGS_INITIAL_WINDOW_SIZE = 0
    bytes.extend(frame(0x4, 0, 0, &[0x00, 0x04, 0, 0, 0, 0]));
    // :method GET, :scheme https, :path /, :authority example.com
    let mut block = vec![0x82, 0x87, 0x84, 0x41, 11];
    block.extend_from_slice(b"example.com");
    // END_STREAM | END_HEADERS
    bytes.extend(frame(0x1, 0x5, 1, &block));
    bytes
}

fn window_update(stream: u32, increment: u32) -> Vec<u8> {
    frame(0x8, 0, stream, &increment.to_be_bytes())
}

#[test]
fn window_update_unblocks_send_data() {
    init_logging();
    let mut server = HttpConnection::new(ConnectionConfig::server(HttpVersion::Http2)).expect("server");
    let events: Vec<_> = server
        .receive_bytes(&zero_window_client_bytes())
        .expect("client preface")
        .collect();
    let stream = first_remote_stream(&events);
    assert!(matches!(
        on_stream(&events, stream).as_slice(),
        [Event::HeadersReceived { end_stream: true, .. }, Event::StreamEnded { .. }]
    ));

    server
        .send_headers(Some(stream), &Headers::response(200), false)
        .expect("response head");
    assert_eq!(server.send_credit(stream), Credit::Limited(0));

    let payload = Bytes::from(vec![b'x'; 1000]);
    let err = server
        .send_data(stream, payload.clone(), true)
        .expect_err("no credit yet");
    assert!(err.is_flow_control_exceeded());
    assert_eq!(err.stream(), Some(stream));

    let events: Vec<_> = server
        .receive_bytes(&window_update(1, 1000))
        .expect("window update")
        .collect();
    assert!(
        events.contains(&Event::FlowControlUpdated {
            stream: Some(stream),
            credit: Credit::Limited(1000),
        }),
        "{events:?}"
    );
    assert_eq!(server.send_credit(stream), Credit::Limited(1000));

    server.send_data(stream, payload, true).expect("credit granted");
    assert!(!server.bytes_to_send().is_empty());
}

#[test]
fn data_beyond_credit_is_never_truncated() {
    init_logging();
    let mut server = HttpConnection::new(ConnectionConfig::server(HttpVersion::Http2)).expect("server");
    let events: Vec<_> = server
        .receive_bytes(&zero_window_client_bytes())
        .expect("client preface")
        .collect();
    let stream = first_remote_stream(&events);
    server
        .send_headers(Some(stream), &Headers::response(200), false)
        .expect("response head");
    let _ = server.receive_bytes(&window_update(1, 10)).expect("window update").count();

    let err = server
        .send_data(stream, Bytes::from(vec![0u8; 11]), false)
        .expect_err("one byte too many");
    assert!(err.is_flow_control_exceeded());
    server
        .send_data(stream, Bytes::from(vec![0u8; 10]), false)
        .expect("exact fit");

    let ledger = server.flow_ledger(stream).expect("ledger");
    assert_eq!(ledger.sent, 10);
    assert!(ledger.sent <= ledger.granted);
    assert_eq!(server.send_credit(stream), Credit::Limited(0));
}

#[test]
fn trailers_end_the_stream() {
    let mut pair = Pair::new(HttpVersion::Http2);
    let request = Headers::request("POST", "https", "localhost", "/upload");
    let stream = pair.client.send_headers(None, &request, false).expect("head");
    pair.client
        .send_data(stream, Bytes::from_static(b"abc"), false)
        .expect("body");

    let trailers = Headers::new().with("x-checksum", "900150983cd24fb0");
    let err = pair
        .client
        .send_headers(Some(stream), &trailers, false)
        .expect_err("trailers must end the stream");
    assert!(err.is_invalid_stream_state());

    pair.client
        .send_headers(Some(stream), &trailers, true)
        .expect("trailers");
    pair.settle();

    let events = pair.take_server_events();
    let remote = first_remote_stream(&events);
    let seen = on_stream(&events, remote);
    assert!(matches!(seen.first(), Some(Event::HeadersReceived { end_stream: false, .. })));
    assert!(matches!(seen.last(), Some(Event::StreamEnded { .. })));
    assert!(seen.iter().any(|e| matches!(
        e,
        Event::HeadersReceived { headers, end_stream: true, .. }
            if headers.get("x-checksum").is_some_and(|v| &v[..] == b"900150983cd24fb0")
    )));

    let err = pair
        .client
        .send_data(stream, Bytes::from_static(b"late"), false)
        .expect_err("local half closed");
    assert!(err.is_invalid_stream_state());
}

#[test]
fn server_cannot_open_streams() {
    init_logging();
    let mut server = HttpConnection::new(ConnectionConfig::server(HttpVersion::Http2)).expect("server");
    let err = server
        .send_headers(None, &Headers::request("GET", "https", "a", "/"), true)
        .expect_err("server-initiated");
    assert!(matches!(err.kind(), Kind::Unavailable));
    assert!(!server.is_available());
}

#[test]
fn informational_responses_are_refused() {
    let mut pair = Pair::new(HttpVersion::Http2);
    pair.client
        .send_headers(None, &Headers::request("GET", "https", "localhost", "/"), true)
        .expect("request");
    pair.settle();
    let remote = first_remote_stream(&pair.take_server_events());
    let err = pair
        .server
        .send_headers(Some(remote), &Headers::response(103), false)
        .expect_err("1xx");
    assert!(err.is_invalid_headers());
}

#[test]
fn close_refuses_new_streams() {
    let mut pair = Pair::new(HttpVersion::Http2);
    assert!(pair.client.is_available());
    pair.client.close().expect("close");
    pair.settle();

    assert!(pair.client.has_expired());
    assert!(!pair.client.is_available());
    let err = pair
        .client
        .send_headers(None, &Headers::request("GET", "https", "localhost", "/"), true)
        .expect_err("closed");
    assert!(err.is_connection_closed());
}

#[test]
fn garbage_is_a_protocol_violation() {
    init_logging();
    let mut server = HttpConnection::new(ConnectionConfig::server(HttpVersion::Http2)).expect("server");
    let err = server
        .receive_bytes(b"this is not an HTTP/2 preface at all\r\n\r\n")
        .expect_err("garbage");
    assert!(err.is_protocol_violation());
    assert!(server.has_expired());
    let events: Vec<_> = server.events().collect();
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, Event::ConnectionTerminated { .. }))
            .count(),
        1
    );
}

fn remote_streams(events: &[Event]) -> Vec<StreamHandle> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::HeadersReceived { stream, .. } => Some(*stream),
            _ => None,
        })
        .collect()
}

#[test]
fn responses_surface_in_arrival_order() {
    let mut pair = Pair::new(HttpVersion::Http2);
    let get = Headers::request("GET", "https", "localhost", "/");
    let first = pair.client.send_headers(None, &get, true).expect("first");
    let second = pair.client.send_headers(None, &get, true).expect("second");
    pair.settle();
    let remote = remote_streams(&pair.take_server_events());
    assert_eq!(remote.len(), 2);

    // Answer the later request first; both frames reach the client in one read.
    pair.server
        .send_headers(Some(remote[1]), &Headers::response(200), true)
        .expect("second answer");
    pair.server
        .send_headers(Some(remote[0]), &Headers::response(200), true)
        .expect("first answer");
    let units = pair.server.bytes_to_send();
    assert_eq!(units.len(), 1);
    let events: Vec<_> = pair.client.receive_bytes(&units[0]).expect("responses").collect();
    assert_eq!(remote_streams(&events), vec![second, first]);
}

#[test]
fn concurrent_streams_share_the_connection_window() {
    let mut pair = Pair::new(HttpVersion::Http2);
    let post = Headers::request("POST", "https", "localhost", "/upload");
    let a = pair.client.send_headers(None, &post, false).expect("a");
    let b = pair.client.send_headers(None, &post, false).expect("b");
    pair.settle();

    for stream in [a, b] {
        let credit = pair.client.send_credit(stream);
        assert!(matches!(credit, Credit::Limited(n) if n > 0), "{stream}: {credit:?}");
    }
    pair.client.send_data(b, Bytes::from_static(b"second"), true).expect("b body");
    pair.client.send_data(a, Bytes::from_static(b"first"), true).expect("a body");
    pair.settle();

    let events = pair.take_server_events();
    let remote = remote_streams(&events);
    assert_eq!(common::body(&on_stream(&events, remote[0])), b"first");
    assert_eq!(common::body(&on_stream(&events, remote[1])), b"second");
}

#[test]
fn reset_after_end_stream_keeps_its_code() {
    let mut pair = Pair::new(HttpVersion::Http2);
    let stream = pair
        .client
        .send_headers(None, &Headers::request("GET", "https", "localhost", "/"), true)
        .expect("request");
    pair.settle();
    let remote = first_remote_stream(&pair.take_server_events());

    pair.client.reset_stream(stream, ErrorCode::InternalError).expect("reset");
    pair.settle();
    let seen = on_stream(&pair.take_server_events(), remote);
    assert_eq!(
        seen,
        vec![Event::StreamReset {
            stream: remote,
            code: ErrorCode::InternalError,
            origin: Origin::Remote,
        }]
    );
}

#[test]
fn settings_acknowledgement_completes_the_handshake() {
    let mut pair = Pair::new(HttpVersion::Http2);
    pair.settle();
    for events in [pair.take_client_events(), pair.take_server_events()] {
        let handshakes: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, Event::HandshakeCompleted { .. }))
            .collect();
        assert_eq!(
            handshakes,
            vec![&Event::HandshakeCompleted {
                alpn: Some("h2".to_string()),
            }]
        );
    }
}
