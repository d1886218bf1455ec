//! Word-at-a-time bit writer.
//!
//! A 64-bit staging register accumulates bits at the current write cursor;
//! whenever 32 or more bits are staged, the low word is flushed out
//! little-endian and the register is shifted down. The byte order on the
//! wire is always little-endian, independent of host endianness.

use byteorder::{LittleEndian, WriteBytesExt};

/// Fixed-capacity bit writer. `capacity_bytes` bounds how many bytes the
/// writer will ever emit; exceeding it asserts in debug builds and in
/// release leaves the writer pinned, with further bits silently dropped
/// rather than corrupting already-written data.
pub struct BitWriter {
    words: Vec<u32>,
    scratch: u64,
    scratch_bits: u32,
    bits_written: usize,
    capacity_bits: usize,
    overflowed: bool,
}

impl BitWriter {
    #[inline]
    pub fn new(capacity_bytes: usize) -> BitWriter {
        let capacity_words = (capacity_bytes + 3) / 4;
        BitWriter {
            words: Vec::with_capacity(capacity_words),
            scratch: 0,
            scratch_bits: 0,
            bits_written: 0,
            capacity_bits: capacity_bytes * 8,
            overflowed: false,
        }
    }

    /// Writes the low `n` bits of `value`. `1 <= n <= 32` and
    /// `value < 2^n` are required invariants (asserted in debug).
    #[inline]
    pub fn write_bits(&mut self, value: u32, n: u32) {
        debug_assert!(n >= 1 && n <= 32);
        debug_assert!(n == 32 || value < (1u32 << n));

        if self.bits_written + n as usize > self.capacity_bits {
            debug_assert!(false, "bit writer overflow");
            self.overflowed = true;
            return;
        }

        self.scratch |= (value as u64) << self.scratch_bits;
        self.scratch_bits += n;
        self.bits_written += n as usize;

        while self.scratch_bits >= 32 {
            self.words.push((self.scratch & 0xFFFF_FFFF) as u32);
            self.scratch >>= 32;
            self.scratch_bits -= 32;
        }
    }

    /// Zero-pads to the next byte boundary.
    #[inline]
    pub fn write_align(&mut self) {
        let remainder = self.bits_written % 8;
        if remainder != 0 {
            let pad = 8 - remainder;
            self.write_bits(0, pad as u32);
        }
    }

    /// Byte-aligned block write. Must be called only when already aligned
    /// (call `write_align` first if not). Fast-paths whole-word copies.
    pub fn write_bytes(&mut self, data: &[u8]) {
        debug_assert_eq!(self.bits_written % 8, 0);

        let mut offset = 0;

        // Byte-write up to 3 bytes to reach a word boundary.
        while offset < data.len() && self.scratch_bits != 0 {
            self.write_bits(data[offset] as u32, 8);
            offset += 1;
        }

        // Whole-word memcpy path: scratch is empty and output is word aligned.
        while offset + 4 <= data.len() {
            let word = u32::from_le_bytes([
                data[offset],
                data[offset + 1],
                data[offset + 2],
                data[offset + 3],
            ]);
            self.words.push(word);
            self.bits_written += 32;
            offset += 4;
        }

        // Tail bytes.
        while offset < data.len() {
            self.write_bits(data[offset] as u32, 8);
            offset += 1;
        }
    }

    /// Flushes the residual staging register as a final partial word.
    #[inline]
    pub fn flush_bits(&mut self) {
        if self.scratch_bits > 0 {
            self.words.push((self.scratch & 0xFFFF_FFFF) as u32);
            self.scratch = 0;
            self.scratch_bits = 0;
        }
    }

    /// Number of bits written so far (before rounding up to bytes).
    #[inline]
    pub fn bits_written(&self) -> usize {
        self.bits_written
    }

    /// `true` if a write was dropped due to insufficient capacity.
    #[inline]
    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    /// Consumes the writer, returning the written bytes. Length is
    /// `ceil(bits_written / 8)` even though memory was laid out as words.
    pub fn finish(mut self) -> Vec<u8> {
        self.flush_bits();
        let byte_len = (self.bits_written + 7) / 8;
        let mut out = Vec::with_capacity(byte_len);
        for word in &self.words {
            out.write_u32::<LittleEndian>(*word).unwrap();
        }
        out.truncate(byte_len);
        out
    }
}
