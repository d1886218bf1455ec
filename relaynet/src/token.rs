//! The connect token and challenge token. Both are bitpacked via
//! `crate::stream::Stream` and then sealed with an explicit 24-byte nonce
//! (`crate::crypto::seal_with_nonce`) for delivery over the wire.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

use crate::crypto::{self, Key, MAC_SIZE, XNONCE_SIZE};
use crate::error::{Error, Result};
use crate::stream::Stream;

pub const MAX_SERVER_ADDRESSES: usize = 8;
pub const SALT_SIZE: usize = 32;

/// Wire size of a sealed connect token.
pub const SEALED_CONNECT_TOKEN_SIZE: usize = 1024;
/// Wire size of a sealed challenge token.
pub const SEALED_CHALLENGE_TOKEN_SIZE: usize = 300;

fn write_address(stream: &mut Stream, addr: &SocketAddr) -> Result<()> {
    match addr {
        SocketAddr::V4(v4) => {
            let mut tag = 0i64;
            stream.int(&mut tag, 0, 1)?;
            for byte in v4.ip().octets().iter() {
                let mut v = *byte as u32;
                stream.bits(&mut v, 8)?;
            }
            let mut port = v4.port() as u32;
            stream.bits(&mut port, 16)?;
        }
        SocketAddr::V6(v6) => {
            let mut tag = 1i64;
            stream.int(&mut tag, 0, 1)?;
            for byte in v6.ip().octets().iter() {
                let mut v = *byte as u32;
                stream.bits(&mut v, 8)?;
            }
            let mut port = v6.port() as u32;
            stream.bits(&mut port, 16)?;
        }
    }
    Ok(())
}

fn read_address(stream: &mut Stream) -> Result<SocketAddr> {
    let mut tag = 0i64;
    stream.int(&mut tag, 0, 1)?;

    if tag == 0 {
        let mut octets = [0u8; 4];
        for slot in octets.iter_mut() {
            let mut v = 0u32;
            stream.bits(&mut v, 8)?;
            *slot = v as u8;
        }
        let mut port = 0u32;
        stream.bits(&mut port, 16)?;
        Ok(SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::from(octets), port as u16)))
    } else {
        let mut octets = [0u8; 16];
        for slot in octets.iter_mut() {
            let mut v = 0u32;
            stream.bits(&mut v, 8)?;
            *slot = v as u8;
        }
        let mut port = 0u32;
        stream.bits(&mut port, 16)?;
        Ok(SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::from(octets), port as u16, 0, 0)))
    }
}

/// Opaque-on-the-wire credential minted by a backend matchmaker and
/// consumed at most once by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectToken {
    pub protocol_id: u64,
    pub client_id: u64,
    pub expire_timestamp: u64,
    pub server_addresses: Vec<SocketAddr>,
    pub client_to_server_key: Key,
    pub server_to_client_key: Key,
    pub random: [u8; SALT_SIZE],
}

impl ConnectToken {
    pub fn write(&self, stream: &mut Stream) -> Result<()> {
        debug_assert!(!self.server_addresses.is_empty() && self.server_addresses.len() <= MAX_SERVER_ADDRESSES);

        let mut protocol_lo = (self.protocol_id & 0xFFFF_FFFF) as i64;
        let mut protocol_hi = (self.protocol_id >> 32) as i64;
        stream.int(&mut protocol_lo, 0, u32::MAX as i64)?;
        stream.int(&mut protocol_hi, 0, u32::MAX as i64)?;

        let mut client_lo = (self.client_id & 0xFFFF_FFFF) as i64;
        let mut client_hi = (self.client_id >> 32) as i64;
        stream.int(&mut client_lo, 0, u32::MAX as i64)?;
        stream.int(&mut client_hi, 0, u32::MAX as i64)?;

        let mut expire_lo = (self.expire_timestamp & 0xFFFF_FFFF) as i64;
        let mut expire_hi = (self.expire_timestamp >> 32) as i64;
        stream.int(&mut expire_lo, 0, u32::MAX as i64)?;
        stream.int(&mut expire_hi, 0, u32::MAX as i64)?;

        let mut count = self.server_addresses.len() as i64;
        stream.int(&mut count, 1, MAX_SERVER_ADDRESSES as i64)?;
        for addr in &self.server_addresses {
            write_address(stream, addr)?;
        }

        stream.align()?;
        let mut c2s = self.client_to_server_key;
        stream.bytes(&mut c2s)?;
        let mut s2c = self.server_to_client_key;
        stream.bytes(&mut s2c)?;
        let mut random = self.random;
        stream.bytes(&mut random)?;
        Ok(())
    }

    pub fn read(stream: &mut Stream) -> Result<ConnectToken> {
        let mut protocol_lo = 0i64;
        let mut protocol_hi = 0i64;
        stream.int(&mut protocol_lo, 0, u32::MAX as i64)?;
        stream.int(&mut protocol_hi, 0, u32::MAX as i64)?;
        let protocol_id = (protocol_lo as u64) | ((protocol_hi as u64) << 32);

        let mut client_lo = 0i64;
        let mut client_hi = 0i64;
        stream.int(&mut client_lo, 0, u32::MAX as i64)?;
        stream.int(&mut client_hi, 0, u32::MAX as i64)?;
        let client_id = (client_lo as u64) | ((client_hi as u64) << 32);

        let mut expire_lo = 0i64;
        let mut expire_hi = 0i64;
        stream.int(&mut expire_lo, 0, u32::MAX as i64)?;
        stream.int(&mut expire_hi, 0, u32::MAX as i64)?;
        let expire_timestamp = (expire_lo as u64) | ((expire_hi as u64) << 32);

        let mut count = 0i64;
        stream.int(&mut count, 1, MAX_SERVER_ADDRESSES as i64)?;
        let mut server_addresses = Vec::with_capacity(count as usize);
        for _ in 0..count {
            server_addresses.push(read_address(stream)?);
        }

        stream.align()?;
        let mut client_to_server_key = [0u8; crypto::KEY_SIZE];
        stream.bytes(&mut client_to_server_key)?;
        let mut server_to_client_key = [0u8; crypto::KEY_SIZE];
        stream.bytes(&mut server_to_client_key)?;
        let mut random = [0u8; SALT_SIZE];
        stream.bytes(&mut random)?;

        Ok(ConnectToken {
            protocol_id,
            client_id,
            expire_timestamp,
            server_addresses,
            client_to_server_key,
            server_to_client_key,
            random,
        })
    }

    /// Bitpacks and seals the token under `private_key`, using the expiry
    /// timestamp (little-endian 8 bytes) as associated data so it cannot be
    /// forged or truncated without invalidating the MAC.
    pub fn seal(&self, private_key: &Key, nonce: &[u8; XNONCE_SIZE]) -> Result<Vec<u8>> {
        let mut stream = Stream::writer(SEALED_CONNECT_TOKEN_SIZE);
        self.write(&mut stream)?;
        let mut plain = stream.into_write_bytes();

        // Pad to the fixed plaintext length so every sealed connect token is
        // exactly `SEALED_CONNECT_TOKEN_SIZE` bytes on the wire, regardless
        // of how many server addresses it names.
        let fixed_len = SEALED_CONNECT_TOKEN_SIZE - XNONCE_SIZE - MAC_SIZE;
        if plain.len() > fixed_len {
            return Err(Error::Overflow);
        }
        plain.resize(fixed_len, 0);

        let ad = self.expire_timestamp.to_le_bytes();
        let mut cipher = vec![0u8; plain.len()];
        let mut mac = [0u8; MAC_SIZE];
        if !crypto::seal_with_nonce(&mut cipher, &mut mac, &plain, &ad, nonce, private_key) {
            return Err(Error::DecryptFailed);
        }

        let mut sealed = Vec::with_capacity(nonce.len() + cipher.len() + MAC_SIZE);
        sealed.extend_from_slice(nonce);
        sealed.extend_from_slice(&cipher);
        sealed.extend_from_slice(&mac);
        Ok(sealed)
    }

    /// Opens a token sealed by [`ConnectToken::seal`]. The expiry is
    /// recovered from the plaintext only after the MAC (keyed on the AD of
    /// the *claimed* expiry) has verified, so a forged expiry is rejected
    /// before it is ever trusted; callers pass the same expiry the sender
    /// claims to get a definite answer either way.
    pub fn open(sealed: &[u8], private_key: &Key, claimed_expire_timestamp: u64) -> Result<ConnectToken> {
        if sealed.len() < XNONCE_SIZE + MAC_SIZE {
            return Err(Error::Overflow);
        }
        let nonce: [u8; XNONCE_SIZE] = sealed[..XNONCE_SIZE].try_into().expect("slice length checked above");
        let mac_start = sealed.len() - MAC_SIZE;
        let cipher = &sealed[XNONCE_SIZE..mac_start];
        let mac: [u8; MAC_SIZE] = sealed[mac_start..].try_into().expect("slice length checked above");

        let ad = claimed_expire_timestamp.to_le_bytes();
        let mut plain = vec![0u8; cipher.len()];
        if !crypto::open_with_nonce(&mut plain, cipher, &mac, &ad, &nonce, private_key) {
            return Err(Error::DecryptFailed);
        }

        let mut stream = Stream::reader(&plain);
        let token = ConnectToken::read(&mut stream)?;
        if token.expire_timestamp != claimed_expire_timestamp {
            return Err(Error::TokenExpired);
        }
        Ok(token)
    }
}

/// Server-minted cookie round-tripped through the client to confirm it can
/// receive on its claimed source address.
#[derive(Debug, Clone, PartialEq)]
pub struct ChallengeToken {
    pub client_id: u64,
    pub token_mac: [u8; 16],
    pub client_to_server_key: Key,
    pub server_to_client_key: Key,
    pub random: [u8; SALT_SIZE],
}

impl ChallengeToken {
    pub fn write(&self, stream: &mut Stream) -> Result<()> {
        let mut client_lo = (self.client_id & 0xFFFF_FFFF) as i64;
        let mut client_hi = (self.client_id >> 32) as i64;
        stream.int(&mut client_lo, 0, u32::MAX as i64)?;
        stream.int(&mut client_hi, 0, u32::MAX as i64)?;

        stream.align()?;
        let mut mac = self.token_mac;
        stream.bytes(&mut mac)?;
        let mut c2s = self.client_to_server_key;
        stream.bytes(&mut c2s)?;
        let mut s2c = self.server_to_client_key;
        stream.bytes(&mut s2c)?;
        let mut random = self.random;
        stream.bytes(&mut random)?;
        Ok(())
    }

    pub fn read(stream: &mut Stream) -> Result<ChallengeToken> {
        let mut client_lo = 0i64;
        let mut client_hi = 0i64;
        stream.int(&mut client_lo, 0, u32::MAX as i64)?;
        stream.int(&mut client_hi, 0, u32::MAX as i64)?;
        let client_id = (client_lo as u64) | ((client_hi as u64) << 32);

        stream.align()?;
        let mut token_mac = [0u8; 16];
        stream.bytes(&mut token_mac)?;
        let mut client_to_server_key = [0u8; crypto::KEY_SIZE];
        stream.bytes(&mut client_to_server_key)?;
        let mut server_to_client_key = [0u8; crypto::KEY_SIZE];
        stream.bytes(&mut server_to_client_key)?;
        let mut random = [0u8; SALT_SIZE];
        stream.bytes(&mut random)?;

        Ok(ChallengeToken { client_id, token_mac, client_to_server_key, server_to_client_key, random })
    }

    /// Seals with empty associated data, using a monotonically incremented
    /// server nonce counter zero-extended to 24 bytes.
    pub fn seal(&self, private_key: &Key, nonce: &[u8; XNONCE_SIZE]) -> Result<Vec<u8>> {
        let mut stream = Stream::writer(SEALED_CHALLENGE_TOKEN_SIZE);
        self.write(&mut stream)?;
        let mut plain = stream.into_write_bytes();

        // Pad to the fixed plaintext length so every sealed challenge token
        // is exactly `SEALED_CHALLENGE_TOKEN_SIZE` bytes on the wire.
        let fixed_len = SEALED_CHALLENGE_TOKEN_SIZE - XNONCE_SIZE - MAC_SIZE;
        if plain.len() > fixed_len {
            return Err(Error::Overflow);
        }
        plain.resize(fixed_len, 0);

        let mut cipher = vec![0u8; plain.len()];
        let mut mac = [0u8; MAC_SIZE];
        if !crypto::seal_with_nonce(&mut cipher, &mut mac, &plain, b"", nonce, private_key) {
            return Err(Error::DecryptFailed);
        }

        let mut sealed = Vec::with_capacity(nonce.len() + cipher.len() + MAC_SIZE);
        sealed.extend_from_slice(nonce);
        sealed.extend_from_slice(&cipher);
        sealed.extend_from_slice(&mac);
        Ok(sealed)
    }

    pub fn open(sealed: &[u8], private_key: &Key) -> Result<ChallengeToken> {
        if sealed.len() < XNONCE_SIZE + MAC_SIZE {
            return Err(Error::Overflow);
        }
        let nonce: [u8; XNONCE_SIZE] = sealed[..XNONCE_SIZE].try_into().expect("slice length checked above");
        let mac_start = sealed.len() - MAC_SIZE;
        let cipher = &sealed[XNONCE_SIZE..mac_start];
        let mac: [u8; MAC_SIZE] = sealed[mac_start..].try_into().expect("slice length checked above");

        let mut plain = vec![0u8; cipher.len()];
        if !crypto::open_with_nonce(&mut plain, cipher, &mac, b"", &nonce, private_key) {
            return Err(Error::DecryptFailed);
        }

        let mut stream = Stream::reader(&plain);
        ChallengeToken::read(&mut stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::random_key;

    fn sample_token() -> ConnectToken {
        ConnectToken {
            protocol_id: 0x1122_3344_5566_7788,
            client_id: 42,
            expire_timestamp: 1_893_456_000,
            server_addresses: vec!["127.0.0.1:40000".parse().unwrap(), "[::1]:40001".parse().unwrap()],
            client_to_server_key: random_key(),
            server_to_client_key: random_key(),
            random: [7u8; SALT_SIZE],
        }
    }

    #[test]
    fn bitpacked_roundtrip() {
        let token = sample_token();
        let mut stream = Stream::writer(SEALED_CONNECT_TOKEN_SIZE);
        token.write(&mut stream).unwrap();
        let bytes = stream.into_write_bytes();

        let mut stream = Stream::reader(&bytes);
        let decoded = ConnectToken::read(&mut stream).unwrap();
        assert_eq!(decoded, token);
    }

    #[test]
    fn seal_open_roundtrip() {
        let token = sample_token();
        let private_key = random_key();
        let mut nonce = [0u8; XNONCE_SIZE];
        crypto::random_bytes(&mut nonce);

        let sealed = token.seal(&private_key, &nonce).unwrap();
        let decoded = ConnectToken::open(&sealed, &private_key, token.expire_timestamp).unwrap();
        assert_eq!(decoded, token);
    }

    #[test]
    fn forged_expiry_is_rejected() {
        let token = sample_token();
        let private_key = random_key();
        let mut nonce = [0u8; XNONCE_SIZE];
        crypto::random_bytes(&mut nonce);

        let sealed = token.seal(&private_key, &nonce).unwrap();
        let wrong_expiry = token.expire_timestamp + 1;
        assert_eq!(
            ConnectToken::open(&sealed, &private_key, wrong_expiry),
            Err(Error::DecryptFailed)
        );
    }

    #[test]
    fn challenge_token_roundtrip() {
        let challenge = ChallengeToken {
            client_id: 99,
            token_mac: [1u8; 16],
            client_to_server_key: random_key(),
            server_to_client_key: random_key(),
            random: [2u8; SALT_SIZE],
        };
        let private_key = random_key();
        let mut nonce = [0u8; XNONCE_SIZE];
        crypto::random_bytes(&mut nonce);

        let sealed = challenge.seal(&private_key, &nonce).unwrap();
        let decoded = ChallengeToken::open(&sealed, &private_key).unwrap();
        assert_eq!(decoded, challenge);
    }
}
