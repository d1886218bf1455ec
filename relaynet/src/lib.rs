//! Reliability, bitpacked wire codec and encrypted handshake core for
//! real-time games over unreliable UDP transport.
//!
//! A bit codec (`bits`, `stream`) underpins a packet header codec
//! (`header`) and fragment reassembly (`reassembly`), both driven by the
//! reliability endpoint (`reliability`) through the caller-supplied
//! `transport`. AEAD (`crypto`) backs both the per-packet envelope
//! (`envelope`) and the connect/challenge tokens (`token`) that the
//! handshake (`handshake`) exchanges to stand up the encryption mapping
//! (`mapping`) and guard against token replay (`token_replay`). `sequence`
//! and `replay` are shared by several of the above. `config`, `error`,
//! `counters`, `logging` and `time_source` are the ambient stack everything
//! else runs on.

pub mod bits;
pub mod config;
pub mod counters;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod handshake;
pub mod header;
pub mod logging;
pub mod mapping;
pub mod reassembly;
pub mod reliability;
pub mod replay;
pub mod sequence;
pub mod stream;
pub mod time_source;
pub mod token;
pub mod token_replay;
pub mod transport;

pub use config::{EndpointConfig, ServerConfig};
pub use crypto::Key;
pub use error::{Error, Result};
pub use handshake::{Client, ClientState, Server};
pub use reliability::Endpoint;
pub use transport::{HandshakeTransport, Transport};
