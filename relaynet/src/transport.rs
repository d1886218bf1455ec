//! The transport interface the core calls out to. The core holds no
//! back-reference to its transport: every call here flows one direction,
//! endpoint to transport, through whatever implements this trait. `now()`
//! and `random_bytes` live on `crate::time_source` and `crate::crypto`
//! respectively rather than on this trait, since both are process-global;
//! `Transport` covers only the per-endpoint callbacks.

/// A capability set of non-blocking callbacks an `Endpoint` (or handshake
/// state machine) drives traffic through. Implementations must not block;
/// `transmit` and `process_payload` are expected O(1).
pub trait Transport {
    /// Enqueue `bytes` for delivery as a datagram belonging to
    /// `endpoint_id` at application `sequence`. May silently drop.
    fn transmit(&mut self, endpoint_id: u64, sequence: u64, bytes: &[u8]);

    /// Deliver an accepted regular-packet payload to the application.
    /// Returning `false` signals the application refused the payload; the
    /// endpoint still counts it as received and still acks it.
    fn process_payload(&mut self, endpoint_id: u64, sequence: u64, bytes: &[u8]) -> bool;
}

/// The transport the handshake state machines drive. Unlike `Transport`,
/// which is addressed by the stable `endpoint_id` an established
/// connection is assigned, the handshake runs before that id exists: both
/// the client and the server address datagrams by raw socket address.
pub trait HandshakeTransport {
    /// Sends `bytes` to `addr`. Non-blocking, may drop.
    fn send_to(&mut self, addr: std::net::SocketAddr, bytes: &[u8]);
}
