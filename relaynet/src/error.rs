use std::io;

/// Every failure mode the core can produce. Nothing in this crate panics or
/// unwinds outside of debug assertions (see `bits::writer`); a misbehaving
/// peer can at worst cause packets to be counted and dropped.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum Error {
    /// A bit reader was asked to consume past the end of its buffer.
    Overflow,
    /// A stream `int`/`bits` value fell outside its declared range.
    OutOfRange,
    /// `stream.check(tag)` read a magic value that did not match.
    CheckMismatch,
    /// The received sequence is older than the receive window can track.
    Stale,
    /// A fragment id was seen twice for the same logical packet.
    DuplicateFragment,
    /// `total_fragments` on an incoming fragment exceeds `max_fragments`.
    TooManyFragments,
    /// A non-final fragment's payload length didn't match `fragment_size`.
    FragmentSizeMismatch,
    /// Payload exceeds `max_packet_size`.
    PayloadTooLarge,
    /// AEAD decryption failed (bad key, corrupt ciphertext, or replay).
    DecryptFailed,
    /// A sequence was rejected by the replay window.
    Replay,
    /// The connect token's expiry timestamp is in the past.
    TokenExpired,
    /// The server's own address is not in the token's whitelist.
    AddressNotWhitelisted,
    /// `client_id` was zero.
    ZeroClientId,
    /// A connect token with this MAC was already bound to a different address.
    TokenReplay,
    /// The server has no free client slots.
    ServerFull,
    /// The encryption mapping table has no free or expired slots to reuse.
    MappingTableFull,
    /// Wrapper around an I/O error that isn't a plain `WouldBlock`.
    Io(io::ErrorKind),
}

impl From<io::Error> for Error {
    #[inline]
    fn from(err: io::Error) -> Self {
        Error::Io(err.kind())
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
