//! Fragment reassembly record. One record per in-flight logical packet,
//! keyed by sequence in a `SequenceBuffer<ReassemblyRecord>`.
//!
//! The owned buffer reserves a fixed prefix (`HEADER_RESERVE`) so that when
//! fragment 0 arrives carrying the full packet header, that header can be
//! written directly into the reserved space and the reassembled packet
//! handed to `receive` as one contiguous slice, header included.

use crate::error::{Error, Result};
use crate::sequence::Sequence;

/// Conservative reserve for the header fragment 0 carries, sized generously
/// above `PacketHeader::MAX_SIZE` (9 bytes) so worst-case allocations stay
/// correct even if a future header field grows it.
pub const HEADER_RESERVE: usize = 12;

/// Hard ceiling on fragments tracked per record; mirrors the `u8`
/// `total_fragments - 1` wire encoding.
pub const MAX_FRAGMENT_SLOTS: usize = 256;

#[derive(Debug)]
pub struct ReassemblyRecord {
    pub sequence: Sequence,
    total_fragments: usize,
    received_count: usize,
    fragment_size: usize,
    header_bytes: usize,
    assembled_payload_bytes: usize,
    per_fragment_received: [bool; MAX_FRAGMENT_SLOTS],
    buffer: Vec<u8>,
}

impl Default for ReassemblyRecord {
    fn default() -> Self {
        ReassemblyRecord {
            sequence: 0,
            total_fragments: 0,
            received_count: 0,
            fragment_size: 0,
            header_bytes: 0,
            assembled_payload_bytes: 0,
            per_fragment_received: [false; MAX_FRAGMENT_SLOTS],
            buffer: Vec::new(),
        }
    }
}

impl ReassemblyRecord {
    /// Allocates (or re-initializes) the record for a fresh logical packet.
    pub fn start(&mut self, sequence: Sequence, total_fragments: usize, fragment_size: usize) {
        self.sequence = sequence;
        self.total_fragments = total_fragments;
        self.received_count = 0;
        self.fragment_size = fragment_size;
        self.header_bytes = 0;
        self.assembled_payload_bytes = 0;
        self.per_fragment_received = [false; MAX_FRAGMENT_SLOTS];
        self.buffer = vec![0u8; HEADER_RESERVE + total_fragments * fragment_size];
    }

    #[inline]
    pub fn total_fragments(&self) -> usize {
        self.total_fragments
    }

    #[inline]
    pub fn is_duplicate(&self, fragment_id: usize) -> bool {
        self.per_fragment_received[fragment_id]
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.received_count == self.total_fragments
    }

    /// Copies a fragment's payload into its slot and records receipt.
    pub fn add_fragment(&mut self, fragment_id: usize, data: &[u8]) -> Result<()> {
        if fragment_id >= self.total_fragments {
            return Err(Error::OutOfRange);
        }
        let offset = HEADER_RESERVE + fragment_id * self.fragment_size;
        if offset + data.len() > self.buffer.len() {
            return Err(Error::Overflow);
        }
        self.buffer[offset..offset + data.len()].copy_from_slice(data);
        self.per_fragment_received[fragment_id] = true;
        self.received_count += 1;
        self.assembled_payload_bytes += data.len();
        Ok(())
    }

    /// Writes fragment 0's carried packet header into the reserved prefix.
    pub fn set_header(&mut self, header: &[u8]) {
        debug_assert!(header.len() <= HEADER_RESERVE);
        self.header_bytes = header.len();
        let start = HEADER_RESERVE - header.len();
        self.buffer[start..HEADER_RESERVE].copy_from_slice(header);
    }

    /// The complete packet: header (if fragment 0 has arrived) followed by
    /// the assembled payload, as one contiguous slice.
    pub fn assembled(&self) -> &[u8] {
        let start = HEADER_RESERVE - self.header_bytes;
        &self.buffer[start..HEADER_RESERVE + self.assembled_payload_bytes]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembles_out_of_order_fragments() {
        let mut record = ReassemblyRecord::default();
        record.start(7, 3, 4);

        record.add_fragment(2, &[8, 9]).unwrap();
        assert!(!record.is_complete());
        record.add_fragment(0, &[0, 1, 2, 3]).unwrap();
        record.set_header(&[0xAB, 0xCD]);
        record.add_fragment(1, &[4, 5, 6, 7]).unwrap();

        assert!(record.is_complete());
        assert_eq!(record.assembled(), &[0xAB, 0xCD, 0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn duplicate_fragment_is_detectable() {
        let mut record = ReassemblyRecord::default();
        record.start(1, 2, 4);
        record.add_fragment(0, &[1, 2, 3, 4]).unwrap();
        assert!(record.is_duplicate(0));
        assert!(!record.is_duplicate(1));
    }

    #[test]
    fn out_of_range_fragment_id_rejected() {
        let mut record = ReassemblyRecord::default();
        record.start(1, 2, 4);
        assert_eq!(record.add_fragment(5, &[1, 2, 3, 4]), Err(Error::OutOfRange));
    }
}
