//! `Http3Config` to `quiche::Config`

use crate::config::Http3Config;
use crate::error::{self, Result};
use crate::protocols::core::Role;

/// Smallest datagram QUIC allows a path to carry.
const MIN_DATAGRAM: usize = 1200;

pub(crate) fn datagram_size(config: &Http3Config) -> usize {
    usize::from(config.max_udp_payload_size).max(MIN_DATAGRAM)
}

/// Transport settings for one connection.
pub(crate) fn transport_config(role: Role, config: &Http3Config) -> Result<quiche::Config> {
    let mut transport = quiche::Config::new(quiche::PROTOCOL_VERSION).map_err(|e| {
        tracing::error!(target: "hface::h3", error = %e, "failed to create QUIC config");
        error::configuration(e)
    })?;

    transport
        .set_application_protos(quiche::h3::APPLICATION_PROTOCOL)
        .map_err(error::configuration)?;

    transport.set_max_idle_timeout(config.max_idle_timeout_ms);
    transport.set_max_recv_udp_payload_size(datagram_size(config));
    transport.set_max_send_udp_payload_size(datagram_size(config));
    transport.set_initial_max_data(config.initial_max_data);
    transport.set_initial_max_stream_data_bidi_local(config.initial_max_stream_data_bidi_local);
    transport.set_initial_max_stream_data_bidi_remote(config.initial_max_stream_data_bidi_remote);
    transport.set_initial_max_stream_data_uni(config.initial_max_stream_data_uni);
    transport.set_initial_max_streams_bidi(config.initial_max_streams_bidi);
    transport.set_initial_max_streams_uni(config.initial_max_streams_uni);
    transport.set_disable_active_migration(true);

    let tls = &config.tls;
    if let Some(chain) = tls.cert_chain_file.as_deref() {
        transport
            .load_cert_chain_from_pem_file(chain)
            .map_err(error::configuration)?;
    }
    if let Some(key) = tls.private_key_file.as_deref() {
        transport
            .load_priv_key_from_pem_file(key)
            .map_err(error::configuration)?;
    }
    if let Some(ca) = tls.ca_file.as_deref() {
        transport
            .load_verify_locations_from_file(ca)
            .map_err(error::configuration)?;
    }
    transport.verify_peer(tls.verify_peer);

    tracing::debug!(
        target: "hface::h3",
        ?role,
        verify_peer = tls.verify_peer,
        idle_timeout_ms = config.max_idle_timeout_ms,
        "QUIC transport configured"
    );
    Ok(transport)
}
