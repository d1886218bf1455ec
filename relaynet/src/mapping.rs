//! The encryption-mapping table. A bounded, linearly-scanned array of
//! `{address, send_key, receive_key, last_access_time, timeout}`.
//! Deliberately simple: the attacker's reward for filling it is bounded by
//! the timeout, not by complexity here.

use std::net::SocketAddr;

use crate::crypto::Key;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
struct MappingEntry {
    address: Option<SocketAddr>,
    send_key: Key,
    receive_key: Key,
    last_access_time: f64,
    timeout_seconds: f64,
}

impl Default for MappingEntry {
    fn default() -> Self {
        MappingEntry {
            address: None,
            send_key: [0u8; crate::crypto::KEY_SIZE],
            receive_key: [0u8; crate::crypto::KEY_SIZE],
            last_access_time: 0.0,
            timeout_seconds: 0.0,
        }
    }
}

impl MappingEntry {
    fn is_live(&self, now: f64) -> bool {
        self.address.is_some() && self.last_access_time + self.timeout_seconds >= now
    }
}

pub struct EncryptionMappingTable {
    entries: Vec<MappingEntry>,
}

impl EncryptionMappingTable {
    pub fn new(capacity: usize) -> Self {
        let mut entries = Vec::with_capacity(capacity);
        entries.resize_with(capacity, MappingEntry::default);
        EncryptionMappingTable { entries }
    }

    /// Returns `(send_key, receive_key)` iff a live mapping exists for
    /// `address`, refreshing its `last_access_time`.
    pub fn lookup(&mut self, address: SocketAddr, now: f64) -> Option<(Key, Key)> {
        for entry in self.entries.iter_mut() {
            if entry.address == Some(address) {
                if entry.is_live(now) {
                    entry.last_access_time = now;
                    return Some((entry.send_key, entry.receive_key));
                }
                return None;
            }
        }
        None
    }

    /// Updates the existing entry for `address` if one exists, else
    /// overwrites the first expired (or never-used) slot. Errors if the
    /// table has no room.
    pub fn insert(
        &mut self,
        address: SocketAddr,
        send_key: Key,
        receive_key: Key,
        now: f64,
        timeout_seconds: f64,
    ) -> Result<()> {
        for entry in self.entries.iter_mut() {
            if entry.address == Some(address) {
                entry.send_key = send_key;
                entry.receive_key = receive_key;
                entry.last_access_time = now;
                entry.timeout_seconds = timeout_seconds;
                return Ok(());
            }
        }

        for entry in self.entries.iter_mut() {
            if !entry.is_live(now) {
                *entry = MappingEntry {
                    address: Some(address),
                    send_key,
                    receive_key,
                    last_access_time: now,
                    timeout_seconds,
                };
                return Ok(());
            }
        }

        Err(Error::MappingTableFull)
    }

    pub fn remove(&mut self, address: SocketAddr) {
        for entry in self.entries.iter_mut() {
            if entry.address == Some(address) {
                *entry = MappingEntry::default();
            }
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{}", port).parse().unwrap()
    }

    #[test]
    fn insert_then_lookup() {
        let mut table = EncryptionMappingTable::new(4);
        let send = [1u8; 32];
        let recv = [2u8; 32];
        table.insert(addr(1), send, recv, 0.0, 10.0).unwrap();
        assert_eq!(table.lookup(addr(1), 5.0), Some((send, recv)));
    }

    #[test]
    fn expired_entry_is_not_live() {
        let mut table = EncryptionMappingTable::new(4);
        table.insert(addr(1), [1u8; 32], [2u8; 32], 0.0, 10.0).unwrap();
        assert_eq!(table.lookup(addr(1), 11.0), None);
    }

    #[test]
    fn expired_slot_is_reused() {
        let mut table = EncryptionMappingTable::new(1);
        table.insert(addr(1), [1u8; 32], [2u8; 32], 0.0, 1.0).unwrap();
        table.insert(addr(2), [3u8; 32], [4u8; 32], 5.0, 10.0).unwrap();
        assert_eq!(table.lookup(addr(1), 5.0), None);
        assert_eq!(table.lookup(addr(2), 5.0), Some(([3u8; 32], [4u8; 32])));
    }

    #[test]
    fn full_table_of_live_entries_rejects_insert() {
        let mut table = EncryptionMappingTable::new(1);
        table.insert(addr(1), [1u8; 32], [2u8; 32], 0.0, 100.0).unwrap();
        assert_eq!(
            table.insert(addr(2), [3u8; 32], [4u8; 32], 1.0, 100.0),
            Err(Error::MappingTableFull)
        );
    }

    #[test]
    fn remove_clears_entry() {
        let mut table = EncryptionMappingTable::new(1);
        table.insert(addr(1), [1u8; 32], [2u8; 32], 0.0, 10.0).unwrap();
        table.remove(addr(1));
        assert_eq!(table.lookup(addr(1), 0.0), None);
    }
}
