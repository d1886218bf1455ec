//! AEAD primitive wrapper: ChaCha20-Poly1305 (IETF variant) via
//! `libsodium-sys`, used throughout connect-token sealing and per-packet
//! encryption.
//!
//! This module is the AEAD construction and CSPRNG the rest of the crate
//! builds on; `crate::envelope` and `crate::token` are the callers that
//! give it sequence-derived nonces and associated data.

use byteorder::{LittleEndian, WriteBytesExt};
use ctor::ctor;

pub const KEY_SIZE: usize = libsodium_sys::crypto_aead_chacha20poly1305_IETF_KEYBYTES as usize;
pub const NONCE_SIZE: usize = libsodium_sys::crypto_aead_chacha20poly1305_IETF_NPUBBYTES as usize;
pub const MAC_SIZE: usize = libsodium_sys::crypto_aead_chacha20poly1305_IETF_ABYTES as usize;

/// Tokens carry their own random nonce rather than deriving one from a
/// sequence counter, so they use the extended-nonce construction instead of
/// the sequence-keyed one above.
pub const XNONCE_SIZE: usize = libsodium_sys::crypto_aead_xchacha20poly1305_ietf_NPUBBYTES as usize;

pub type Key = [u8; KEY_SIZE];

#[ctor]
fn init_sodium() {
    unsafe {
        if libsodium_sys::sodium_init() < 0 {
            panic!("libsodium initialization failed");
        }
    }
}

/// Builds the nonce from a 64-bit sequence, zero-padded at the front as
/// needed to fill `NONCE_SIZE` bytes.
#[inline]
fn nonce_from_sequence(sequence: u64) -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    let offset = NONCE_SIZE - 8;
    (&mut nonce[offset..])
        .write_u64::<LittleEndian>(sequence)
        .expect("nonce buffer is sized for a u64");
    nonce
}

/// Encrypts `plain` in place into `cipher` (same length) and writes the
/// 16-byte MAC into `mac`. Returns `false` on failure.
#[inline]
pub fn encrypt(
    cipher: &mut [u8],
    mac: &mut [u8; MAC_SIZE],
    plain: &[u8],
    additional_data: &[u8],
    sequence: u64,
    key: &Key,
) -> bool {
    debug_assert_eq!(cipher.len(), plain.len());
    let nonce = nonce_from_sequence(sequence);

    unsafe {
        let result = libsodium_sys::crypto_aead_chacha20poly1305_ietf_encrypt_detached(
            cipher.as_mut_ptr(),
            mac.as_mut_ptr(),
            std::ptr::null_mut(),
            plain.as_ptr(),
            plain.len() as u64,
            additional_data.as_ptr(),
            additional_data.len() as u64,
            std::ptr::null(),
            nonce.as_ptr(),
            key.as_ptr(),
        );
        result == 0
    }
}

/// Decrypts `cipher`+`mac` into `plain` (same length as `cipher`). Returns
/// `false` on MAC failure, the sole outcome callers should rely on; do not
/// attempt to distinguish "corrupt ciphertext" from "wrong key" from
/// "replayed nonce", all three produce the same rejection.
#[inline]
pub fn decrypt(
    plain: &mut [u8],
    cipher: &[u8],
    mac: &[u8; MAC_SIZE],
    additional_data: &[u8],
    sequence: u64,
    key: &Key,
) -> bool {
    debug_assert_eq!(plain.len(), cipher.len());
    let nonce = nonce_from_sequence(sequence);

    unsafe {
        let result = libsodium_sys::crypto_aead_chacha20poly1305_ietf_decrypt_detached(
            plain.as_mut_ptr(),
            std::ptr::null_mut(),
            cipher.as_ptr(),
            cipher.len() as u64,
            mac.as_ptr(),
            additional_data.as_ptr(),
            additional_data.len() as u64,
            nonce.as_ptr(),
            key.as_ptr(),
        );
        result == 0
    }
}

/// Seals `plain` under `key` using an explicit, caller-supplied 24-byte
/// nonce. Used to seal connect and challenge tokens, which carry their own
/// random nonce rather than a sequence-derived one.
#[inline]
pub fn seal_with_nonce(
    cipher: &mut [u8],
    mac: &mut [u8; MAC_SIZE],
    plain: &[u8],
    additional_data: &[u8],
    nonce: &[u8; XNONCE_SIZE],
    key: &Key,
) -> bool {
    debug_assert_eq!(cipher.len(), plain.len());
    unsafe {
        let result = libsodium_sys::crypto_aead_xchacha20poly1305_ietf_encrypt_detached(
            cipher.as_mut_ptr(),
            mac.as_mut_ptr(),
            std::ptr::null_mut(),
            plain.as_ptr(),
            plain.len() as u64,
            additional_data.as_ptr(),
            additional_data.len() as u64,
            std::ptr::null(),
            nonce.as_ptr(),
            key.as_ptr(),
        );
        result == 0
    }
}

/// Dual of [`seal_with_nonce`].
#[inline]
pub fn open_with_nonce(
    plain: &mut [u8],
    cipher: &[u8],
    mac: &[u8; MAC_SIZE],
    additional_data: &[u8],
    nonce: &[u8; XNONCE_SIZE],
    key: &Key,
) -> bool {
    debug_assert_eq!(plain.len(), cipher.len());
    unsafe {
        let result = libsodium_sys::crypto_aead_xchacha20poly1305_ietf_decrypt_detached(
            plain.as_mut_ptr(),
            std::ptr::null_mut(),
            cipher.as_ptr(),
            cipher.len() as u64,
            mac.as_ptr(),
            additional_data.as_ptr(),
            additional_data.len() as u64,
            nonce.as_ptr(),
            key.as_ptr(),
        );
        result == 0
    }
}

/// Fills `out` with cryptographically secure random bytes, used for keys,
/// salts and nonces.
#[inline]
pub fn random_bytes(out: &mut [u8]) {
    unsafe {
        libsodium_sys::randombytes_buf(out.as_mut_ptr() as *mut std::ffi::c_void, out.len());
    }
}

/// Generates a fresh random AEAD key.
pub fn random_key() -> Key {
    let mut key = [0u8; KEY_SIZE];
    random_bytes(&mut key);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = random_key();
        let plain = b"the quick brown fox jumps over the lazy dog";
        let mut cipher = vec![0u8; plain.len()];
        let mut mac = [0u8; MAC_SIZE];

        assert!(encrypt(&mut cipher, &mut mac, plain, b"ad", 7, &key));

        let mut decoded = vec![0u8; plain.len()];
        assert!(decrypt(&mut decoded, &cipher, &mac, b"ad", 7, &key));
        assert_eq!(&decoded[..], &plain[..]);
    }

    #[test]
    fn bit_flip_in_ciphertext_fails() {
        let key = random_key();
        let plain = b"payload";
        let mut cipher = vec![0u8; plain.len()];
        let mut mac = [0u8; MAC_SIZE];
        assert!(encrypt(&mut cipher, &mut mac, plain, b"", 1, &key));

        cipher[0] ^= 1;
        let mut decoded = vec![0u8; plain.len()];
        assert!(!decrypt(&mut decoded, &cipher, &mac, b"", 1, &key));
    }

    #[test]
    fn bit_flip_in_mac_fails() {
        let key = random_key();
        let plain = b"payload";
        let mut cipher = vec![0u8; plain.len()];
        let mut mac = [0u8; MAC_SIZE];
        assert!(encrypt(&mut cipher, &mut mac, plain, b"", 1, &key));

        mac[0] ^= 1;
        let mut decoded = vec![0u8; plain.len()];
        assert!(!decrypt(&mut decoded, &cipher, &mac, b"", 1, &key));
    }

    #[test]
    fn seal_with_nonce_roundtrip() {
        let key = random_key();
        let mut nonce = [0u8; XNONCE_SIZE];
        random_bytes(&mut nonce);

        let plain = b"connect token payload";
        let mut cipher = vec![0u8; plain.len()];
        let mut mac = [0u8; MAC_SIZE];
        assert!(seal_with_nonce(&mut cipher, &mut mac, plain, b"ad", &nonce, &key));

        let mut decoded = vec![0u8; plain.len()];
        assert!(open_with_nonce(&mut decoded, &cipher, &mac, b"ad", &nonce, &key));
        assert_eq!(&decoded[..], &plain[..]);
    }
}
