//! Server side of the connect handshake: admission of `CONNECTION_REQUEST`
//! and `CHALLENGE_RESPONSE` datagrams plus per-tick maintenance of
//! connected slots (heartbeats, confirmation resends, connection timeouts).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use slog::{debug, info, Logger};

use crate::config::ServerConfig;
use crate::crypto::{self, Key, XNONCE_SIZE};
use crate::envelope;
use crate::error::{Error, Result};
use crate::handshake::packets::HandshakePacket;
use crate::mapping::EncryptionMappingTable;
use crate::token::{ChallengeToken, ConnectToken};
use crate::token_replay::TokenReplayTable;
use crate::transport::HandshakeTransport;

/// Admission-path counters: how many `CONNECTION_REQUEST`/`CHALLENGE_RESPONSE`
/// datagrams were accepted versus rejected, and why. Mirrors `Counters`'
/// atomic-field style so a metrics exporter can snapshot this from another
/// thread without borrowing the server.
#[derive(Debug, Default)]
pub struct HandshakeCounters {
    pub requests_received: AtomicU64,
    pub requests_denied_token_decrypt_failed: AtomicU64,
    pub requests_denied_address_not_whitelisted: AtomicU64,
    pub requests_denied_zero_client_id: AtomicU64,
    pub requests_denied_token_expired: AtomicU64,
    pub requests_denied_mapping_table_full: AtomicU64,
    pub requests_denied_server_full: AtomicU64,
    pub requests_denied_token_replayed: AtomicU64,
    pub challenges_sent: AtomicU64,
    pub responses_received: AtomicU64,
    pub responses_denied_decrypt_failed: AtomicU64,
    pub clients_connected: AtomicU64,
    pub clients_timed_out: AtomicU64,
}

macro_rules! inc {
    ($counter:expr) => {
        $counter.fetch_add(1, Ordering::Relaxed)
    };
}

struct ClientSlot {
    address: SocketAddr,
    client_id: u64,
    fully_connected: bool,
    last_send_time: f64,
    last_recv_time: f64,
    send_key: Key,
}

/// Drives the server side of the connect handshake for every address that
/// has presented a connect token. Owns no reliability `Endpoint` itself:
/// once a slot reaches `fully_connected`, the caller is expected to spin up
/// an `Endpoint` keyed on the slot's index and hand subsequent traffic to it.
pub struct Server<H: HandshakeTransport> {
    config: ServerConfig,
    private_key: Key,
    own_addresses: Vec<SocketAddr>,
    transport: H,
    log: Logger,

    time: f64,
    tx_sequence: u64,
    next_challenge_nonce: u64,

    slots: Vec<Option<ClientSlot>>,
    mapping: EncryptionMappingTable,
    token_replay: TokenReplayTable,

    pub counters: HandshakeCounters,
}

impl<H: HandshakeTransport> Server<H> {
    pub fn new(own_addresses: Vec<SocketAddr>, private_key: Key, config: ServerConfig, transport: H, log: Logger) -> Self {
        let max_clients = config.max_clients;
        let replay_table_size = config.replay_table_size;
        let mut slots = Vec::with_capacity(max_clients);
        slots.resize_with(max_clients, || None);

        Server {
            config,
            private_key,
            own_addresses,
            transport,
            log,
            time: 0.0,
            tx_sequence: 0,
            next_challenge_nonce: 0,
            slots,
            mapping: EncryptionMappingTable::new(max_clients),
            token_replay: TokenReplayTable::new(replay_table_size),
            counters: HandshakeCounters::default(),
        }
    }

    #[inline]
    pub fn connected_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// The slot index a connected client was assigned, if any.
    pub fn slot_of(&self, address: SocketAddr) -> Option<usize> {
        self.slots.iter().position(|s| s.as_ref().map_or(false, |s| s.address == address))
    }

    fn next_nonce(&mut self) -> [u8; XNONCE_SIZE] {
        let mut nonce = [0u8; XNONCE_SIZE];
        nonce[..8].copy_from_slice(&self.next_challenge_nonce.to_le_bytes());
        self.next_challenge_nonce += 1;
        nonce
    }

    fn next_sequence(&mut self) -> u64 {
        let seq = self.tx_sequence;
        self.tx_sequence += 1;
        seq
    }

    fn send_unenveloped(&mut self, addr: SocketAddr, packet: &HandshakePacket) {
        self.transport.send_to(addr, &packet.encode());
    }

    fn send_enveloped(&mut self, addr: SocketAddr, send_key: &Key, packet: &HandshakePacket) {
        let sequence = self.next_sequence();
        let sealed = envelope::seal(&packet.encode(), b"", sequence, send_key);
        self.transport.send_to(addr, &sealed);
    }

    fn send_denied(&mut self, addr: SocketAddr, send_key: &Key) {
        self.send_enveloped(addr, send_key, &HandshakePacket::ConnectionDenied);
    }

    fn free_slot(&self) -> Option<usize> {
        self.slots.iter().position(|s| s.is_none())
    }

    /// Admits or rejects a `CONNECTION_REQUEST`.
    pub fn on_connection_request(&mut self, from: SocketAddr, expire_timestamp: u64, sealed_token: &[u8]) -> Result<()> {
        inc!(self.counters.requests_received);

        let token = match ConnectToken::open(sealed_token, &self.private_key, expire_timestamp) {
            Ok(token) => token,
            Err(err) => {
                inc!(self.counters.requests_denied_token_decrypt_failed);
                return Err(err);
            }
        };

        if !token.server_addresses.iter().any(|addr| self.own_addresses.contains(addr)) {
            inc!(self.counters.requests_denied_address_not_whitelisted);
            return Err(Error::AddressNotWhitelisted);
        }

        if token.client_id == 0 {
            inc!(self.counters.requests_denied_zero_client_id);
            return Err(Error::ZeroClientId);
        }

        // A retried request from an address already fully admitted under
        // this client id is a no-op, not a fresh admission attempt.
        if self.slots.iter().flatten().any(|slot| slot.address == from && slot.client_id == token.client_id) {
            return Ok(());
        }

        if token.expire_timestamp <= self.time as u64 {
            inc!(self.counters.requests_denied_token_expired);
            return Err(Error::TokenExpired);
        }

        let mac = token_mac(sealed_token);
        let already_known = self.token_replay.lookup(mac).is_some();
        if !already_known {
            if self
                .mapping
                .insert(from, token.server_to_client_key, token.client_to_server_key, self.time, self.config.encryption_mapping_timeout)
                .is_err()
            {
                inc!(self.counters.requests_denied_mapping_table_full);
                return Err(Error::MappingTableFull);
            }
        }

        if self.connected_count() >= self.config.max_clients {
            self.send_denied(from, &token.server_to_client_key);
            inc!(self.counters.requests_denied_server_full);
            return Err(Error::ServerFull);
        }

        if !self.token_replay.check_and_insert(from, mac, self.time) {
            inc!(self.counters.requests_denied_token_replayed);
            return Err(Error::TokenReplay);
        }

        let challenge = ChallengeToken {
            client_id: token.client_id,
            token_mac: mac,
            client_to_server_key: token.client_to_server_key,
            server_to_client_key: token.server_to_client_key,
            random: {
                let mut random = [0u8; 32];
                crypto::random_bytes(&mut random);
                random
            },
        };
        let nonce = self.next_nonce();
        let sealed_challenge = challenge.seal(&self.private_key, &nonce)?;
        debug!(self.log, "sending challenge"; "addr" => %from, "client_id" => token.client_id);
        self.send_enveloped(from, &token.server_to_client_key, &HandshakePacket::ConnectionChallenge { sealed_challenge });
        inc!(self.counters.challenges_sent);
        Ok(())
    }

    /// Admits a `CHALLENGE_RESPONSE`, creating a slot on first success and
    /// resending the confirming heartbeat on retries.
    pub fn on_challenge_response(&mut self, from: SocketAddr, sealed_challenge: &[u8]) -> Result<()> {
        inc!(self.counters.responses_received);

        let (send_key, _) = self.mapping.lookup(from, self.time).ok_or(Error::DecryptFailed)?;
        let challenge = match ChallengeToken::open(sealed_challenge, &self.private_key) {
            Ok(challenge) => challenge,
            Err(err) => {
                inc!(self.counters.responses_denied_decrypt_failed);
                return Err(err);
            }
        };

        if let Some(idx) = self.slot_of(from) {
            if self.time - self.slots[idx].as_ref().unwrap().last_send_time >= self.config.confirm_send_rate {
                self.send_heartbeat(idx);
            }
            return Ok(());
        }

        if self.connected_count() >= self.config.max_clients {
            self.send_denied(from, &send_key);
            inc!(self.counters.requests_denied_server_full);
            return Err(Error::ServerFull);
        }

        let idx = match self.free_slot() {
            Some(idx) => idx,
            None => {
                self.send_denied(from, &send_key);
                return Err(Error::ServerFull);
            }
        };

        self.slots[idx] = Some(ClientSlot {
            address: from,
            client_id: challenge.client_id,
            fully_connected: false,
            last_send_time: f64::NEG_INFINITY,
            last_recv_time: self.time,
            send_key,
        });
        info!(self.log, "client connected"; "addr" => %from, "client_id" => challenge.client_id, "slot" => idx);
        inc!(self.counters.clients_connected);
        self.send_heartbeat(idx);
        Ok(())
    }

    fn send_heartbeat(&mut self, idx: usize) {
        let (addr, send_key) = {
            let slot = self.slots[idx].as_ref().unwrap();
            (slot.address, slot.send_key)
        };
        let packet = HandshakePacket::ConnectionHeartbeat { client_index: idx as u8 };
        self.send_enveloped(addr, &send_key, &packet);
        self.slots[idx].as_mut().unwrap().last_send_time = self.time;
    }

    fn disconnect_slot(&mut self, idx: usize) {
        if let Some(slot) = self.slots[idx].take() {
            self.mapping.remove(slot.address);
            info!(self.log, "client disconnected"; "addr" => %slot.address, "slot" => idx);
        }
    }

    /// Single ingress point for everything arriving on the handshake
    /// channel: an unenveloped `CONNECTION_REQUEST`, or anything else
    /// enveloped under the keys an earlier request installed.
    pub fn receive(&mut self, from: SocketAddr, data: &[u8]) -> Result<()> {
        let first_byte = *data.first().ok_or(Error::Overflow)?;
        if HandshakePacket::is_unenveloped_tag(first_byte) {
            return match HandshakePacket::decode(data)? {
                HandshakePacket::ConnectionRequest { expire_timestamp, sealed_token } => {
                    self.on_connection_request(from, expire_timestamp, &sealed_token)
                }
                _ => Err(Error::OutOfRange),
            };
        }

        let (_, receive_key) = self.mapping.lookup(from, self.time).ok_or(Error::DecryptFailed)?;
        let (_, plain) = envelope::open(data, b"", &receive_key)?;
        let packet = HandshakePacket::decode(&plain)?;

        match packet {
            HandshakePacket::ConnectionResponse { sealed_challenge } => self.on_challenge_response(from, &sealed_challenge),
            HandshakePacket::ConnectionDisconnect => {
                if let Some(idx) = self.slot_of(from) {
                    self.disconnect_slot(idx);
                }
                Ok(())
            }
            _ => {
                if let Some(idx) = self.slot_of(from) {
                    let slot = self.slots[idx].as_mut().unwrap();
                    slot.last_recv_time = self.time;
                    slot.fully_connected = true;
                }
                Ok(())
            }
        }
    }

    /// Per-tick maintenance: times out stale slots, resends confirmation
    /// heartbeats to pending ones, and sends the steady-state heartbeat to
    /// fully connected ones.
    pub fn update(&mut self, now: f64) {
        self.time = now;

        for idx in 0..self.slots.len() {
            let timed_out = match &self.slots[idx] {
                Some(slot) => now - slot.last_recv_time > self.config.connection_timeout,
                None => continue,
            };
            if timed_out {
                inc!(self.counters.clients_timed_out);
                self.disconnect_slot(idx);
                continue;
            }

            let (fully_connected, last_send_time) = {
                let slot = self.slots[idx].as_ref().unwrap();
                (slot.fully_connected, slot.last_send_time)
            };
            let interval = if fully_connected { self.config.heartbeat_interval } else { self.config.confirm_send_rate };
            if now - last_send_time >= interval {
                self.send_heartbeat(idx);
            }
        }
    }
}

/// The MAC trailing a sealed connect token, which is what binds a token to
/// the one address that may redeem it.
fn token_mac(sealed_token: &[u8]) -> [u8; 16] {
    let start = sealed_token.len().saturating_sub(16);
    let mut mac = [0u8; 16];
    mac.copy_from_slice(&sealed_token[start..]);
    mac
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::random_key;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default, Clone)]
    struct RecordingTransport {
        sent: Rc<RefCell<Vec<(SocketAddr, Vec<u8>)>>>,
    }

    impl HandshakeTransport for RecordingTransport {
        fn send_to(&mut self, addr: SocketAddr, bytes: &[u8]) {
            self.sent.borrow_mut().push((addr, bytes.to_vec()));
        }
    }

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{}", port).parse().unwrap()
    }

    fn make_server(transport: RecordingTransport) -> Server<RecordingTransport> {
        let own = vec![addr(40000)];
        let private_key = random_key();
        let config = ServerConfig::default();
        Server::new(own, private_key, config, transport, crate::logging::discard())
    }

    fn make_token(server_addr: SocketAddr) -> (ConnectToken, Key) {
        let private_key = random_key();
        let token = ConnectToken {
            protocol_id: 1,
            client_id: 7,
            expire_timestamp: 1_000_000,
            server_addresses: vec![server_addr],
            client_to_server_key: random_key(),
            server_to_client_key: random_key(),
            random: [3u8; 32],
        };
        (token, private_key)
    }

    #[test]
    fn valid_request_produces_a_challenge() {
        let transport = RecordingTransport::default();
        let sent = transport.sent.clone();
        let mut server = make_server(transport);
        let (token, private_key) = make_token(addr(40000));
        server.private_key = private_key;

        let mut nonce = [0u8; XNONCE_SIZE];
        crypto::random_bytes(&mut nonce);
        let sealed = token.seal(&private_key, &nonce).unwrap();

        server.on_connection_request(addr(1), token.expire_timestamp, &sealed).unwrap();
        assert_eq!(sent.borrow().len(), 1);
        assert_eq!(server.counters.challenges_sent.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn request_for_unwhitelisted_address_is_rejected() {
        let transport = RecordingTransport::default();
        let mut server = make_server(transport);
        let (token, private_key) = make_token(addr(50000));
        server.private_key = private_key;

        let mut nonce = [0u8; XNONCE_SIZE];
        crypto::random_bytes(&mut nonce);
        let sealed = token.seal(&private_key, &nonce).unwrap();

        assert_eq!(
            server.on_connection_request(addr(1), token.expire_timestamp, &sealed),
            Err(Error::AddressNotWhitelisted)
        );
    }

    #[test]
    fn full_handshake_creates_a_slot() {
        let transport = RecordingTransport::default();
        let sent = transport.sent.clone();
        let mut server = make_server(transport);
        let (token, private_key) = make_token(addr(40000));
        server.private_key = private_key;

        let mut nonce = [0u8; XNONCE_SIZE];
        crypto::random_bytes(&mut nonce);
        let sealed_token = token.seal(&private_key, &nonce).unwrap();
        server.on_connection_request(addr(1), token.expire_timestamp, &sealed_token).unwrap();

        let (_, challenge_bytes) = sent.borrow()[0].clone();
        let (_, plain) = envelope::open(&challenge_bytes, b"", &token.server_to_client_key).unwrap();
        let sealed_challenge = match HandshakePacket::decode(&plain).unwrap() {
            HandshakePacket::ConnectionChallenge { sealed_challenge } => sealed_challenge,
            other => panic!("expected challenge, got {:?}", other),
        };

        server.on_challenge_response(addr(1), &sealed_challenge).unwrap();
        assert_eq!(server.connected_count(), 1);
        assert_eq!(server.slot_of(addr(1)), Some(0));
    }
}
