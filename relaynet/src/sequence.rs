//! 16-bit wrap-aware sequence comparison and the fixed-capacity
//! `SequenceBuffer<T>` that underpins acks, sent/received bookkeeping and
//! fragment reassembly.

pub type Sequence = u16;

/// `true` iff `a` is newer than `b`, accounting for 16-bit wraparound.
#[inline]
pub fn sequence_greater_than(a: Sequence, b: Sequence) -> bool {
    (a > b && a.wrapping_sub(b) <= 32768) || (a < b && b.wrapping_sub(a) > 32768)
}

/// `true` iff `a` is older than `b`.
#[inline]
pub fn sequence_less_than(a: Sequence, b: Sequence) -> bool {
    sequence_greater_than(b, a)
}

const EMPTY: u32 = 0xFFFF_FFFF;

/// Fixed-capacity circular index keyed by 16-bit sequence. Each slot holds
/// an occupancy token (the 16-bit sequence owning it, zero-extended, or
/// `EMPTY`) and a `T`. A slot is valid iff its occupancy token equals the
/// sequence being queried, which auto-invalidates entries a full
/// wraparound old.
pub struct SequenceBuffer<T> {
    entries: Vec<Option<T>>,
    occupancy: Vec<u32>,
    latest: Sequence,
    capacity: usize,
}

impl<T> SequenceBuffer<T> {
    pub fn new(capacity: usize) -> SequenceBuffer<T> {
        let mut entries = Vec::with_capacity(capacity);
        entries.resize_with(capacity, || None);
        SequenceBuffer {
            entries,
            occupancy: vec![EMPTY; capacity],
            latest: 0,
            capacity,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The sequence one past the most recently inserted entry.
    #[inline]
    pub fn latest(&self) -> Sequence {
        self.latest
    }

    #[inline]
    fn index(&self, sequence: Sequence) -> usize {
        (sequence as usize) % self.capacity
    }

    /// `true` iff `sequence` is not older than `latest - capacity`, i.e. an
    /// insert for it would be accepted.
    pub fn test_insert(&self, sequence: Sequence) -> bool {
        !sequence_less_than(
            sequence,
            self.latest.wrapping_sub(self.capacity as Sequence),
        )
    }

    /// Reclaims a slot for `sequence`, advancing `latest` and invoking
    /// `on_evict` for every slot cleared along the way. Returns `None` if
    /// `sequence` is too old for the buffer to track.
    pub fn insert_with<F: FnMut(&mut T)>(
        &mut self,
        sequence: Sequence,
        mut on_evict: F,
    ) -> Option<&mut T>
    where
        T: Default,
    {
        if !self.test_insert(sequence) {
            return None;
        }

        if sequence_greater_than(sequence.wrapping_add(1), self.latest) {
            self.advance(sequence.wrapping_add(1), &mut on_evict);
        }

        let idx = self.index(sequence);
        if let Some(entry) = self.entries[idx].take() {
            let mut entry = entry;
            on_evict(&mut entry);
        }
        self.entries[idx] = Some(T::default());
        self.occupancy[idx] = sequence as u32;
        self.entries[idx].as_mut()
    }

    /// Insert without an eviction callback.
    pub fn insert(&mut self, sequence: Sequence) -> Option<&mut T>
    where
        T: Default,
    {
        self.insert_with(sequence, |_| {})
    }

    fn advance<F: FnMut(&mut T)>(&mut self, new_latest: Sequence, on_evict: &mut F) {
        let span = new_latest.wrapping_sub(self.latest) as usize;

        if span >= self.capacity {
            // A jump farther than the whole buffer clears everything.
            for idx in 0..self.capacity {
                if let Some(mut entry) = self.entries[idx].take() {
                    on_evict(&mut entry);
                }
                self.occupancy[idx] = EMPTY;
            }
        } else {
            let mut seq = self.latest;
            for _ in 0..span {
                let idx = self.index(seq);
                if let Some(mut entry) = self.entries[idx].take() {
                    on_evict(&mut entry);
                }
                self.occupancy[idx] = EMPTY;
                seq = seq.wrapping_add(1);
            }
        }

        self.latest = new_latest;
    }

    /// Advances `latest` to `sequence + 1` if it is newer, evicting any
    /// slots that fall out of the window along the way, without occupying
    /// a slot for `sequence` itself. Used to discard stale partial state
    /// (e.g. reassembly records) up to a newly received sequence.
    pub fn advance_to<F: FnMut(&mut T)>(&mut self, sequence: Sequence, mut on_evict: F) {
        if sequence_greater_than(sequence.wrapping_add(1), self.latest) {
            self.advance(sequence.wrapping_add(1), &mut on_evict);
        }
    }

    /// Pointer to the slot for `sequence` iff its occupancy token matches.
    pub fn find(&self, sequence: Sequence) -> Option<&T> {
        let idx = self.index(sequence);
        if self.occupancy[idx] == sequence as u32 {
            self.entries[idx].as_ref()
        } else {
            None
        }
    }

    pub fn find_mut(&mut self, sequence: Sequence) -> Option<&mut T> {
        let idx = self.index(sequence);
        if self.occupancy[idx] == sequence as u32 {
            self.entries[idx].as_mut()
        } else {
            None
        }
    }

    #[inline]
    pub fn exists(&self, sequence: Sequence) -> bool {
        self.find(sequence).is_some()
    }

    #[inline]
    pub fn available(&self, sequence: Sequence) -> bool {
        let idx = self.index(sequence);
        self.occupancy[idx] == EMPTY
    }

    /// Removes the entry at `sequence`, invoking `on_evict` if present.
    pub fn remove_with<F: FnOnce(&mut T)>(&mut self, sequence: Sequence, on_evict: F) {
        let idx = self.index(sequence);
        if self.occupancy[idx] == sequence as u32 {
            if let Some(mut entry) = self.entries[idx].take() {
                on_evict(&mut entry);
            }
            self.occupancy[idx] = EMPTY;
        }
    }

    pub fn remove(&mut self, sequence: Sequence) {
        self.remove_with(sequence, |_| {});
    }

    /// `ack = latest - 1`; bit `i` of the returned bitfield is 1 iff
    /// `exists(ack - i)` for `i in [0, 32)`.
    pub fn generate_ack_bits(&self) -> (Sequence, u32) {
        let ack = self.latest.wrapping_sub(1);
        let mut ack_bits: u32 = 0;
        for i in 0..32u16 {
            let seq = ack.wrapping_sub(i);
            if self.exists(seq) {
                ack_bits |= 1 << i;
            }
        }
        (ack, ack_bits)
    }

    /// Clears every slot, resetting `latest` to zero. Invokes `on_evict`
    /// for each occupied slot.
    pub fn reset<F: FnMut(&mut T)>(&mut self, mut on_evict: F) {
        for idx in 0..self.capacity {
            if let Some(mut entry) = self.entries[idx].take() {
                on_evict(&mut entry);
            }
            self.occupancy[idx] = EMPTY;
        }
        self.latest = 0;
    }
}
