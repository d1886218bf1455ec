//! Configuration structs for the reliability endpoint and the handshake
//! server. Both are plain `serde`-derived structs loadable from TOML via
//! `serdeconv`, the same way `crate::logging::terminal_logger` loads its
//! own `sloggers::LoggerConfig`.

use serde_derive::{Deserialize, Serialize};

#[inline]
fn default_max_packet_size() -> usize {
    16 * 1024
}
#[inline]
fn default_fragment_threshold() -> usize {
    1024
}
#[inline]
fn default_fragment_size() -> usize {
    1024
}
#[inline]
fn default_max_fragments() -> usize {
    16
}
#[inline]
fn default_ack_buffer_size() -> usize {
    256
}
#[inline]
fn default_sent_size() -> usize {
    256
}
#[inline]
fn default_received_size() -> usize {
    256
}
#[inline]
fn default_reassembly_size() -> usize {
    64
}
#[inline]
fn default_rtt_alpha() -> f64 {
    0.0025
}
#[inline]
fn default_loss_alpha() -> f64 {
    0.1
}
#[inline]
fn default_bw_alpha() -> f64 {
    0.1
}
#[inline]
fn default_ip_udp_overhead() -> usize {
    28
}

/// Hard ceiling on `max_fragments` regardless of what a loaded config asks for.
pub const MAX_FRAGMENTS_CAP: usize = 256;

/// Endpoint configuration. All fields carry conservative defaults so
/// `EndpointConfig::default()` is always usable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    #[serde(default = "default_max_packet_size")]
    pub max_packet_size: usize,
    #[serde(default = "default_fragment_threshold")]
    pub fragment_threshold: usize,
    #[serde(default = "default_fragment_size")]
    pub fragment_size: usize,
    #[serde(default = "default_max_fragments")]
    pub max_fragments: usize,
    #[serde(default = "default_ack_buffer_size")]
    pub ack_buffer_size: usize,
    #[serde(default = "default_sent_size")]
    pub sent_size: usize,
    #[serde(default = "default_received_size")]
    pub received_size: usize,
    #[serde(default = "default_reassembly_size")]
    pub reassembly_size: usize,
    #[serde(default = "default_rtt_alpha")]
    pub rtt_alpha: f64,
    #[serde(default = "default_loss_alpha")]
    pub loss_alpha: f64,
    #[serde(default = "default_bw_alpha")]
    pub bw_alpha: f64,
    #[serde(default = "default_ip_udp_overhead")]
    pub ip_udp_overhead: usize,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        EndpointConfig {
            max_packet_size: default_max_packet_size(),
            fragment_threshold: default_fragment_threshold(),
            fragment_size: default_fragment_size(),
            max_fragments: default_max_fragments(),
            ack_buffer_size: default_ack_buffer_size(),
            sent_size: default_sent_size(),
            received_size: default_received_size(),
            reassembly_size: default_reassembly_size(),
            rtt_alpha: default_rtt_alpha(),
            loss_alpha: default_loss_alpha(),
            bw_alpha: default_bw_alpha(),
            ip_udp_overhead: default_ip_udp_overhead(),
        }
    }
}

impl EndpointConfig {
    /// Load from a TOML string, falling back to defaults for any field left
    /// unspecified.
    pub fn from_toml_str(s: &str) -> serdeconv::Result<EndpointConfig> {
        serdeconv::from_toml_str(s)
    }
}

#[inline]
fn default_max_clients() -> usize {
    64
}
#[inline]
fn default_connect_token_bytes() -> usize {
    crate::token::SEALED_CONNECT_TOKEN_SIZE
}
#[inline]
fn default_challenge_token_bytes() -> usize {
    crate::token::SEALED_CHALLENGE_TOKEN_SIZE
}
#[inline]
fn default_num_disconnect_packets() -> usize {
    10
}
#[inline]
fn default_request_send_interval() -> f64 {
    0.1
}
#[inline]
fn default_response_send_interval() -> f64 {
    0.1
}
#[inline]
fn default_confirm_send_rate() -> f64 {
    0.1
}
#[inline]
fn default_heartbeat_interval() -> f64 {
    1.0
}
#[inline]
fn default_request_timeout() -> f64 {
    5.0
}
#[inline]
fn default_response_timeout() -> f64 {
    5.0
}
#[inline]
fn default_connection_timeout() -> f64 {
    10.0
}
#[inline]
fn default_replay_table_size(max_clients: usize) -> usize {
    8 * max_clients
}
#[inline]
fn default_encryption_mapping_timeout() -> f64 {
    10.0
}

/// Handshake server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
    #[serde(default = "default_connect_token_bytes")]
    pub connect_token_bytes: usize,
    #[serde(default = "default_challenge_token_bytes")]
    pub challenge_token_bytes: usize,
    #[serde(default = "default_num_disconnect_packets")]
    pub num_disconnect_packets: usize,
    #[serde(default = "default_request_send_interval")]
    pub request_send_interval: f64,
    #[serde(default = "default_response_send_interval")]
    pub response_send_interval: f64,
    #[serde(default = "default_confirm_send_rate")]
    pub confirm_send_rate: f64,
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: f64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: f64,
    #[serde(default = "default_response_timeout")]
    pub response_timeout: f64,
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: f64,
    pub replay_table_size: usize,
    #[serde(default = "default_encryption_mapping_timeout")]
    pub encryption_mapping_timeout: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let max_clients = default_max_clients();
        ServerConfig {
            max_clients,
            connect_token_bytes: default_connect_token_bytes(),
            challenge_token_bytes: default_challenge_token_bytes(),
            num_disconnect_packets: default_num_disconnect_packets(),
            request_send_interval: default_request_send_interval(),
            response_send_interval: default_response_send_interval(),
            confirm_send_rate: default_confirm_send_rate(),
            heartbeat_interval: default_heartbeat_interval(),
            request_timeout: default_request_timeout(),
            response_timeout: default_response_timeout(),
            connection_timeout: default_connection_timeout(),
            replay_table_size: default_replay_table_size(max_clients),
            encryption_mapping_timeout: default_encryption_mapping_timeout(),
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(s: &str) -> serdeconv::Result<ServerConfig> {
        serdeconv::from_toml_str(s)
    }
}
