//! The connect-token replay table. A bounded LRU of token MACs binding each
//! token to the single address that first presented it. Capacity is
//! `8 * max_clients`; the scan is linear but constant-size, matching the
//! admission path's deliberately constant-time budget.

use std::net::SocketAddr;

#[derive(Debug, Clone, Copy)]
struct TokenReplayEntry {
    time_added: f64,
    address: Option<SocketAddr>,
    mac: [u8; 16],
}

impl Default for TokenReplayEntry {
    fn default() -> Self {
        TokenReplayEntry { time_added: f64::NEG_INFINITY, address: None, mac: [0u8; 16] }
    }
}

pub struct TokenReplayTable {
    entries: Vec<TokenReplayEntry>,
}

impl TokenReplayTable {
    pub fn new(capacity: usize) -> Self {
        let mut entries = Vec::with_capacity(capacity);
        entries.resize_with(capacity, TokenReplayEntry::default);
        TokenReplayTable { entries }
    }

    /// Read-only membership check used to decide whether a request's
    /// encryption mapping still needs installing, without mutating the
    /// table the way `check_and_insert` does.
    pub fn lookup(&self, mac: [u8; 16]) -> Option<SocketAddr> {
        self.entries.iter().find(|entry| entry.address.is_some() && entry.mac == mac).and_then(|entry| entry.address)
    }

    /// If no entry matches this MAC, evict the oldest and bind it to
    /// `address`. If a matching MAC exists for the same address, accept
    /// (retry-safe). If it exists for a different address, reject: the
    /// token is being replayed from elsewhere.
    pub fn check_and_insert(&mut self, address: SocketAddr, mac: [u8; 16], now: f64) -> bool {
        for entry in self.entries.iter() {
            if entry.address.is_some() && entry.mac == mac {
                return entry.address == Some(address);
            }
        }

        let oldest = self
            .entries
            .iter_mut()
            .min_by(|a, b| a.time_added.partial_cmp(&b.time_added).expect("time is never NaN"))
            .expect("capacity is always > 0");
        *oldest = TokenReplayEntry { time_added: now, address: Some(address), mac };
        true
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }
}
