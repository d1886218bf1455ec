//! Wire encoding for the six handshake control packets.
//!
//! `CONNECTION_REQUEST` travels unenveloped: its authenticity comes from
//! the sealed connect token it carries, not from the per-packet AEAD
//! envelope `crate::envelope` wraps everything else in. Its expiry
//! timestamp rides alongside the sealed token in cleartext so the server can
//! use it as associated data before it has anything decrypted; every other
//! handshake packet is small enough that a plain tag-plus-body encoding
//! (rather than `crate::stream::Stream` bitpacking) is sufficient.

use crate::error::{Error, Result};

const TAG_REQUEST: u8 = 0;
const TAG_DENIED: u8 = 1;
const TAG_CHALLENGE: u8 = 2;
const TAG_RESPONSE: u8 = 3;
const TAG_HEARTBEAT: u8 = 4;
const TAG_DISCONNECT: u8 = 5;

#[derive(Debug, Clone, PartialEq)]
pub enum HandshakePacket {
    /// Unenveloped. `expire_timestamp` is cleartext so it can serve as the
    /// connect token's associated data on the way in.
    ConnectionRequest { expire_timestamp: u64, sealed_token: Vec<u8> },
    ConnectionDenied,
    ConnectionChallenge { sealed_challenge: Vec<u8> },
    ConnectionResponse { sealed_challenge: Vec<u8> },
    ConnectionHeartbeat { client_index: u8 },
    ConnectionDisconnect,
}

impl HandshakePacket {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            HandshakePacket::ConnectionRequest { expire_timestamp, sealed_token } => {
                let mut out = Vec::with_capacity(9 + sealed_token.len());
                out.push(TAG_REQUEST);
                out.extend_from_slice(&expire_timestamp.to_le_bytes());
                out.extend_from_slice(sealed_token);
                out
            }
            HandshakePacket::ConnectionDenied => vec![TAG_DENIED],
            HandshakePacket::ConnectionChallenge { sealed_challenge } => {
                let mut out = Vec::with_capacity(1 + sealed_challenge.len());
                out.push(TAG_CHALLENGE);
                out.extend_from_slice(sealed_challenge);
                out
            }
            HandshakePacket::ConnectionResponse { sealed_challenge } => {
                let mut out = Vec::with_capacity(1 + sealed_challenge.len());
                out.push(TAG_RESPONSE);
                out.extend_from_slice(sealed_challenge);
                out
            }
            HandshakePacket::ConnectionHeartbeat { client_index } => vec![TAG_HEARTBEAT, *client_index],
            HandshakePacket::ConnectionDisconnect => vec![TAG_DISCONNECT],
        }
    }

    pub fn decode(data: &[u8]) -> Result<HandshakePacket> {
        let tag = *data.first().ok_or(Error::Overflow)?;
        match tag {
            TAG_REQUEST => {
                if data.len() < 9 {
                    return Err(Error::Overflow);
                }
                let expire_timestamp = u64::from_le_bytes(data[1..9].try_into().expect("length checked above"));
                Ok(HandshakePacket::ConnectionRequest { expire_timestamp, sealed_token: data[9..].to_vec() })
            }
            TAG_DENIED => Ok(HandshakePacket::ConnectionDenied),
            TAG_CHALLENGE => Ok(HandshakePacket::ConnectionChallenge { sealed_challenge: data[1..].to_vec() }),
            TAG_RESPONSE => Ok(HandshakePacket::ConnectionResponse { sealed_challenge: data[1..].to_vec() }),
            TAG_HEARTBEAT => {
                let client_index = *data.get(1).ok_or(Error::Overflow)?;
                Ok(HandshakePacket::ConnectionHeartbeat { client_index })
            }
            TAG_DISCONNECT => Ok(HandshakePacket::ConnectionDisconnect),
            _ => Err(Error::OutOfRange),
        }
    }

    /// `true` for the one packet type that is never wrapped by `crate::envelope`.
    #[inline]
    pub fn is_unenveloped_tag(first_byte: u8) -> bool {
        first_byte == TAG_REQUEST
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_roundtrip() {
        let packet = HandshakePacket::ConnectionRequest { expire_timestamp: 123, sealed_token: vec![1, 2, 3, 4] };
        let bytes = packet.encode();
        assert!(HandshakePacket::is_unenveloped_tag(bytes[0]));
        assert_eq!(HandshakePacket::decode(&bytes).unwrap(), packet);
    }

    #[test]
    fn challenge_roundtrip() {
        let packet = HandshakePacket::ConnectionChallenge { sealed_challenge: vec![9; 300] };
        let bytes = packet.encode();
        assert_eq!(HandshakePacket::decode(&bytes).unwrap(), packet);
    }

    #[test]
    fn heartbeat_roundtrip() {
        let packet = HandshakePacket::ConnectionHeartbeat { client_index: 5 };
        let bytes = packet.encode();
        assert_eq!(HandshakePacket::decode(&bytes).unwrap(), packet);
    }

    #[test]
    fn zero_length_is_rejected() {
        assert_eq!(HandshakePacket::decode(&[]), Err(Error::Overflow));
    }

    #[test]
    fn unknown_tag_is_rejected() {
        assert_eq!(HandshakePacket::decode(&[0xFF]), Err(Error::OutOfRange));
    }
}
