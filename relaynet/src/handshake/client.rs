//! Client side of the connect handshake: the four states a client walks
//! through to join a server, `SENDING_REQUEST` -> `SENDING_RESPONSE` ->
//! `CONNECTED`, with three timeout terminals and a denial terminal.

use std::net::SocketAddr;

use slog::{debug, info, Logger};

use crate::config::ServerConfig;
use crate::crypto::Key;
use crate::envelope;
use crate::handshake::packets::HandshakePacket;
use crate::transport::HandshakeTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    SendingRequest,
    SendingResponse,
    Connected,
    RequestTimedOut,
    ResponseTimedOut,
    ConnectionTimedOut,
    Denied,
    Disconnected,
}

impl ClientState {
    /// Once in one of these, the client will not progress further on its own.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ClientState::SendingRequest | ClientState::SendingResponse | ClientState::Connected)
    }
}

/// Drives a single client's side of the connect handshake. Holds no
/// reference to the reliability `Endpoint` the connection graduates into;
/// callers construct that separately once `state()` reaches `Connected`.
pub struct Client<H: HandshakeTransport> {
    config: ServerConfig,
    server_addr: SocketAddr,
    transport: H,
    log: Logger,

    state: ClientState,
    time: f64,
    state_entered_at: f64,
    last_send_time: f64,
    last_recv_time: f64,

    expire_timestamp: u64,
    sealed_connect_token: Vec<u8>,
    sealed_challenge_token: Option<Vec<u8>>,
    client_index: Option<u8>,

    send_key: Key,
    receive_key: Key,
    tx_sequence: u64,
}

impl<H: HandshakeTransport> Client<H> {
    #[allow(clippy::too_many_arguments)]
    pub fn connect(
        server_addr: SocketAddr,
        expire_timestamp: u64,
        sealed_connect_token: Vec<u8>,
        send_key: Key,
        receive_key: Key,
        config: ServerConfig,
        transport: H,
        log: Logger,
        now: f64,
    ) -> Self {
        debug!(log, "client starting handshake"; "server" => %server_addr);
        Client {
            config,
            server_addr,
            transport,
            log,
            state: ClientState::SendingRequest,
            time: now,
            state_entered_at: now,
            last_send_time: f64::NEG_INFINITY,
            last_recv_time: now,
            expire_timestamp,
            sealed_connect_token,
            sealed_challenge_token: None,
            client_index: None,
            send_key,
            receive_key,
            tx_sequence: 0,
        }
    }

    #[inline]
    pub fn state(&self) -> ClientState {
        self.state
    }

    #[inline]
    pub fn client_index(&self) -> Option<u8> {
        self.client_index
    }

    pub fn transport_mut(&mut self) -> &mut H {
        &mut self.transport
    }

    fn enter(&mut self, state: ClientState) {
        debug!(self.log, "client state transition"; "from" => ?self.state, "to" => ?state);
        self.state = state;
        self.state_entered_at = self.time;
        self.last_send_time = f64::NEG_INFINITY;
    }

    fn send_plain(&mut self, packet: &HandshakePacket) {
        self.transport.send_to(self.server_addr, &packet.encode());
        self.last_send_time = self.time;
    }

    fn send_enveloped(&mut self, packet: &HandshakePacket) {
        let sequence = self.tx_sequence;
        self.tx_sequence += 1;
        let sealed = envelope::seal(&packet.encode(), b"", sequence, &self.send_key);
        self.transport.send_to(self.server_addr, &sealed);
        self.last_send_time = self.time;
    }

    /// Advances timers and resends as needed. Call once per tick.
    pub fn update(&mut self, now: f64) {
        self.time = now;
        match self.state {
            ClientState::SendingRequest => {
                if now - self.state_entered_at > self.config.request_timeout {
                    info!(self.log, "connection request timed out"; "server" => %self.server_addr);
                    self.enter(ClientState::RequestTimedOut);
                    return;
                }
                if now - self.last_send_time >= self.config.request_send_interval {
                    let packet = HandshakePacket::ConnectionRequest {
                        expire_timestamp: self.expire_timestamp,
                        sealed_token: self.sealed_connect_token.clone(),
                    };
                    self.send_plain(&packet);
                }
            }
            ClientState::SendingResponse => {
                if now - self.state_entered_at > self.config.response_timeout {
                    info!(self.log, "connection response timed out"; "server" => %self.server_addr);
                    self.enter(ClientState::ResponseTimedOut);
                    return;
                }
                if now - self.last_send_time >= self.config.response_send_interval {
                    let sealed_challenge =
                        self.sealed_challenge_token.clone().expect("challenge stored before SendingResponse");
                    self.send_enveloped(&HandshakePacket::ConnectionResponse { sealed_challenge });
                }
            }
            ClientState::Connected => {
                if now - self.last_recv_time > self.config.connection_timeout {
                    info!(self.log, "connection timed out"; "server" => %self.server_addr);
                    self.enter(ClientState::ConnectionTimedOut);
                    return;
                }
                if now - self.last_send_time >= self.config.heartbeat_interval {
                    let client_index = self.client_index.unwrap_or(0);
                    self.send_enveloped(&HandshakePacket::ConnectionHeartbeat { client_index });
                }
            }
            _ => {}
        }
    }

    /// Feeds one datagram received from the server. Ignored if it fails to
    /// decode or decrypt, or arrives in a state that doesn't expect it.
    pub fn on_packet(&mut self, data: &[u8]) {
        match self.state {
            ClientState::SendingRequest => {
                let opened = envelope::open(data, b"", &self.receive_key);
                if let Ok((_, plain)) = opened {
                    if let Ok(packet) = HandshakePacket::decode(&plain) {
                        match packet {
                            HandshakePacket::ConnectionDenied => {
                                info!(self.log, "connection denied"; "server" => %self.server_addr);
                                self.enter(ClientState::Denied);
                            }
                            HandshakePacket::ConnectionChallenge { sealed_challenge } => {
                                self.sealed_challenge_token = Some(sealed_challenge);
                                self.last_recv_time = self.time;
                                self.enter(ClientState::SendingResponse);
                            }
                            _ => {}
                        }
                    }
                }
            }
            ClientState::SendingResponse => {
                let opened = envelope::open(data, b"", &self.receive_key);
                if let Ok((_, plain)) = opened {
                    match HandshakePacket::decode(&plain) {
                        Ok(HandshakePacket::ConnectionHeartbeat { client_index }) => {
                            self.client_index = Some(client_index);
                            self.last_recv_time = self.time;
                            info!(self.log, "connected"; "server" => %self.server_addr, "client_index" => client_index);
                            self.enter(ClientState::Connected);
                        }
                        Ok(HandshakePacket::ConnectionDenied) => {
                            self.enter(ClientState::Denied);
                        }
                        _ => {}
                    }
                }
            }
            ClientState::Connected => {
                let opened = envelope::open(data, b"", &self.receive_key);
                if let Ok((_, plain)) = opened {
                    self.last_recv_time = self.time;
                    if let Ok(HandshakePacket::ConnectionDisconnect) = HandshakePacket::decode(&plain) {
                        self.enter(ClientState::Disconnected);
                    }
                }
            }
            _ => {}
        }
    }

    /// Sends `num_disconnect_packets` best-effort disconnect notifications
    /// and moves straight to `Disconnected` without waiting on a reply.
    /// Disconnect is fire-and-forget: it is never acked.
    pub fn disconnect(&mut self) {
        if self.state == ClientState::Connected {
            for _ in 0..self.config.num_disconnect_packets {
                self.send_enveloped(&HandshakePacket::ConnectionDisconnect);
            }
        }
        self.enter(ClientState::Disconnected);
    }
}
