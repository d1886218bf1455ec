use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonically nondecreasing counters exposed per-endpoint.
///
/// Each field is a plain `AtomicU64` rather than a `u64` behind `&mut self`
/// so a caller can snapshot counters from another thread (e.g. a metrics
/// exporter) without taking the endpoint's own borrow. The endpoint itself
/// only ever touches these from its own single-threaded tick.
#[derive(Debug, Default)]
pub struct Counters {
    pub packets_sent: AtomicU64,
    pub packets_received: AtomicU64,
    pub packets_acked: AtomicU64,
    pub packets_stale: AtomicU64,
    pub packets_invalid: AtomicU64,
    pub packets_too_large_to_send: AtomicU64,
    pub packets_too_large_to_receive: AtomicU64,
    pub fragments_sent: AtomicU64,
    pub fragments_received: AtomicU64,
    pub fragments_invalid: AtomicU64,
    /// Newly-acked sequences dropped because the ack-staging queue was full.
    pub acks_dropped: AtomicU64,
}

macro_rules! counter_accessor {
    ($field:ident, $getter:ident) => {
        #[inline]
        pub fn $getter(&self) -> u64 {
            self.$field.load(Ordering::Relaxed)
        }
    };
}

impl Counters {
    counter_accessor!(packets_sent, packets_sent);
    counter_accessor!(packets_received, packets_received);
    counter_accessor!(packets_acked, packets_acked);
    counter_accessor!(packets_stale, packets_stale);
    counter_accessor!(packets_invalid, packets_invalid);
    counter_accessor!(packets_too_large_to_send, packets_too_large_to_send);
    counter_accessor!(packets_too_large_to_receive, packets_too_large_to_receive);
    counter_accessor!(fragments_sent, fragments_sent);
    counter_accessor!(fragments_received, fragments_received);
    counter_accessor!(fragments_invalid, fragments_invalid);
    counter_accessor!(acks_dropped, acks_dropped);

    #[inline]
    pub(crate) fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Zero every counter. Does not allocate or reset smoothed stats.
    pub fn reset(&self) {
        self.packets_sent.store(0, Ordering::Relaxed);
        self.packets_received.store(0, Ordering::Relaxed);
        self.packets_acked.store(0, Ordering::Relaxed);
        self.packets_stale.store(0, Ordering::Relaxed);
        self.packets_invalid.store(0, Ordering::Relaxed);
        self.packets_too_large_to_send.store(0, Ordering::Relaxed);
        self.packets_too_large_to_receive.store(0, Ordering::Relaxed);
        self.fragments_sent.store(0, Ordering::Relaxed);
        self.fragments_received.store(0, Ordering::Relaxed);
        self.fragments_invalid.store(0, Ordering::Relaxed);
        self.acks_dropped.store(0, Ordering::Relaxed);
    }
}
