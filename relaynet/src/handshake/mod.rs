//! The four-step connect handshake: `CONNECTION_REQUEST` ->
//! `CONNECTION_CHALLENGE` -> `CONNECTION_RESPONSE` -> steady-state
//! heartbeats, built from the connect/challenge tokens (`crate::token`),
//! the encryption mapping table (`crate::mapping`), and the token replay
//! table (`crate::token_replay`).

mod client;
mod packets;
mod server;

pub use client::{Client, ClientState};
pub use packets::HandshakePacket;
pub use server::{HandshakeCounters, Server};
