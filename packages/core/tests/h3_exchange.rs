//! HTTP/3 specifics: handshake, deferred streams and datagrams.

#![cfg(feature = "h3")]

mod common;

use bytes::Bytes;
use common::{Pair, body, first_remote_stream, on_stream};
use hface_core::Kind;
use hface_core::prelude::*;

#[test]
fn handshake_negotiates_h3() {
    let mut pair = Pair::new(HttpVersion::Http3);
    pair.settle();
    for events in [pair.take_client_events(), pair.take_server_events()] {
        assert!(
            events.contains(&Event::HandshakeCompleted {
                alpn: Some("h3".to_string())
            }),
            "{events:?}"
        );
    }
    assert!(pair.client.is_available());
}

#[test]
fn request_before_handshake_is_bound_later() {
    let mut pair = Pair::new(HttpVersion::Http3);
    let request = Headers::request("POST", "https", "localhost", "/early");
    let stream = pair.client.send_headers(None, &request, false).expect("deferred open");
    assert!(pair.client.stream(stream).is_some_and(|e| e.native.is_none()));
    assert_eq!(pair.client.send_credit(stream), Credit::Limited(0));

    let err = pair
        .client
        .send_data(stream, Bytes::from_static(b"too soon"), false)
        .expect_err("not bound yet");
    assert!(matches!(err.kind(), Kind::Unavailable));
    assert_eq!(err.stream(), Some(stream));

    pair.settle();
    assert!(pair.client.stream(stream).is_some_and(|e| e.native.is_some()));
    assert!(pair.take_client_events().iter().any(|e| matches!(
        e,
        Event::FlowControlUpdated { stream: Some(s), credit: Credit::Limited(n) } if *s == stream && *n > 0
    )));

    pair.client
        .send_data(stream, Bytes::from_static(b"now"), true)
        .expect("bound");
    pair.settle();
    let events = pair.take_server_events();
    let remote = first_remote_stream(&events);
    assert_eq!(body(&on_stream(&events, remote)), b"now");
}

#[test]
fn reset_before_binding_cancels_the_request() {
    let mut pair = Pair::new(HttpVersion::Http3);
    let request = Headers::request("GET", "https", "localhost", "/never");
    let stream = pair.client.send_headers(None, &request, true).expect("deferred open");
    pair.client.reset_stream(stream, ErrorCode::Cancel).expect("reset");
    pair.settle();

    assert!(pair.client.stream(stream).is_none());
    assert!(
        !pair
            .take_server_events()
            .iter()
            .any(|e| matches!(e, Event::HeadersReceived { .. }))
    );
}

#[test]
fn datagrams_respect_the_payload_limit() {
    let mut pair = Pair::new(HttpVersion::Http3);
    pair.settle();
    let limit = usize::from(ConnectionConfig::client(HttpVersion::Http3).http3.max_udp_payload_size);

    let stream = pair
        .client
        .send_headers(None, &Headers::request("POST", "https", "localhost", "/bulk"), false)
        .expect("request");
    pair.client
        .send_data(stream, Bytes::from(vec![7u8; 4 * 1024]), true)
        .expect("body");
    let units = pair.client.bytes_to_send();
    assert!(units.len() > 1);
    assert!(units.iter().all(|unit| unit.len() <= limit));
}

#[test]
fn timers_and_connection_ids_are_exposed() {
    let mut pair = Pair::new(HttpVersion::Http3);
    pair.settle();
    assert!(pair.client.next_timeout().is_some());
    assert!(pair.client.source_connection_id().is_some_and(|id| !id.is_empty()));
    assert!(pair.client.is_multiplexed());
    pair.client.on_timeout().expect("timers");
}

#[test]
fn transport_eof_terminates() {
    let mut pair = Pair::new(HttpVersion::Http3);
    pair.settle();
    let events: Vec<_> = pair.client.receive_eof().expect("eof").collect();
    assert!(matches!(
        events.last(),
        Some(Event::ConnectionTerminated { code: ErrorCode::NoError, origin: Origin::Remote, .. })
    ));
    assert!(pair.client.has_expired());
}

#[test]
fn close_reaches_the_peer() {
    let mut pair = Pair::new(HttpVersion::Http3);
    pair.settle();
    let _ = pair.take_server_events();

    pair.client.close().expect("close");
    assert!(pair.client.has_expired());
    pair.settle();
    assert!(
        pair.take_server_events()
            .iter()
            .any(|e| matches!(e, Event::ConnectionTerminated { origin: Origin::Remote, .. }))
    );
}
