//! Shared helpers: two drivers wired back to back in memory.

#![allow(dead_code)]

use std::net::SocketAddr;

use hface_core::prelude::*;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn cert_path(name: &str) -> String {
    format!("{}/tests/certs/{name}", env!("CARGO_MANIFEST_DIR"))
}

pub fn client_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 50_000))
}

pub fn server_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 4433))
}

pub fn configs(version: HttpVersion) -> (ConnectionConfig, ConnectionConfig) {
    let mut client = ConnectionConfig::client(version);
    let mut server = ConnectionConfig::server(version);
    if version == HttpVersion::Http3 {
        client.http3.local_addr = client_addr();
        client.http3.peer_addr = server_addr();
        client.http3.server_name = Some("localhost".to_string());
        client.http3.tls.verify_peer = false;

        server.http3.local_addr = server_addr();
        server.http3.peer_addr = client_addr();
        server.http3.tls.cert_chain_file = Some(cert_path("cert.pem"));
        server.http3.tls.private_key_file = Some(cert_path("key.pem"));
    }
    (client, server)
}

/// Moves every pending transmit unit from `from` into `to`, collecting the
/// events `to` produced. Returns the number of units moved; units reaching a
/// closed peer are dropped like a transport would.
pub fn pump(from: &mut HttpConnection, to: &mut HttpConnection, sink: &mut Vec<Event>) -> usize {
    let units = from.bytes_to_send();
    for unit in &units {
        if to.has_expired() {
            break;
        }
        let events = to.receive_bytes(unit).expect("peer accepts bytes");
        sink.extend(events);
    }
    units.len()
}

pub struct Pair {
    pub client: HttpConnection,
    pub server: HttpConnection,
    pub client_events: Vec<Event>,
    pub server_events: Vec<Event>,
}

impl Pair {
    pub fn new(version: HttpVersion) -> Self {
        init_logging();
        let (client, server) = configs(version);
        Self {
            client: HttpConnection::new(client).expect("client"),
            server: HttpConnection::new(server).expect("server"),
            client_events: Vec::new(),
            server_events: Vec::new(),
        }
    }

    /// Pumps both directions until neither side has anything to send.
    pub fn settle(&mut self) {
        for _ in 0..64 {
            let up = pump(&mut self.client, &mut self.server, &mut self.server_events);
            let down = pump(&mut self.server, &mut self.client, &mut self.client_events);
            if up + down == 0 {
                break;
            }
        }
        self.client_events.extend(self.client.events());
        self.server_events.extend(self.server.events());
    }

    pub fn take_client_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.client_events)
    }

    pub fn take_server_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.server_events)
    }
}

/// Events scoped to `stream`, in delivery order.
pub fn on_stream(events: &[Event], stream: StreamHandle) -> Vec<Event> {
    events
        .iter()
        .filter(|e| e.stream() == Some(stream) && !matches!(e, Event::FlowControlUpdated { .. }))
        .cloned()
        .collect()
}

/// First stream that received headers.
pub fn first_remote_stream(events: &[Event]) -> StreamHandle {
    events
        .iter()
        .find_map(|e| match e {
            Event::HeadersReceived { stream, .. } => Some(*stream),
            _ => None,
        })
        .expect("a stream received headers")
}

/// Whether `events` reads headers, any data, then the end of the stream.
pub fn is_message_shape(events: &[Event]) -> bool {
    let Some((last, rest)) = events.split_last() else {
        return false;
    };
    let Some((first, middle)) = rest.split_first() else {
        return false;
    };
    matches!(first, Event::HeadersReceived { .. })
        && middle.iter().all(|e| matches!(e, Event::DataReceived { .. }))
        && matches!(last, Event::StreamEnded { .. })
}

pub fn body(events: &[Event]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::DataReceived { data, .. } => Some(&data[..]),
            _ => None,
        })
        .flatten()
        .copied()
        .collect()
}

pub fn received_headers(events: &[Event]) -> Headers {
    events
        .iter()
        .find_map(|e| match e {
            Event::HeadersReceived { headers, .. } => Some(headers.clone()),
            _ => None,
        })
        .expect("headers")
}
