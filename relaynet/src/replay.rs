//! The 64-wide anti-replay window sitting just inside the AEAD envelope.
//! Distinct from `SequenceBuffer`: it tracks only acceptance, not an
//! associated value, and its slot width (64) is fixed rather than
//! configurable.

const WINDOW_SIZE: u64 = 64;
const HIGH_BIT: u64 = 1 << 63;

/// A sequence with its high bit set is a server-global packet that doesn't
/// follow per-client sequencing and bypasses the window entirely.
#[inline]
pub fn bypasses_window(sequence: u64) -> bool {
    sequence & HIGH_BIT != 0
}

pub struct ReplayWindow {
    most_recent: Option<u64>,
    // `received[i]` holds the sequence that last occupied slot `i`.
    received: [Option<u64>; WINDOW_SIZE as usize],
}

impl Default for ReplayWindow {
    fn default() -> Self {
        ReplayWindow::new()
    }
}

impl ReplayWindow {
    pub fn new() -> Self {
        ReplayWindow {
            most_recent: None,
            received: [None; WINDOW_SIZE as usize],
        }
    }

    #[inline]
    fn slot(sequence: u64) -> usize {
        (sequence % WINDOW_SIZE) as usize
    }

    /// Checks `sequence` against the window and, if accepted, marks it
    /// seen. Sequences with the high bit set always bypass the window.
    pub fn check_and_insert(&mut self, sequence: u64) -> bool {
        if bypasses_window(sequence) {
            return true;
        }

        let most_recent = match self.most_recent {
            None => {
                self.most_recent = Some(sequence);
                self.received[Self::slot(sequence)] = Some(sequence);
                return true;
            }
            Some(m) => m,
        };

        if sequence + WINDOW_SIZE <= most_recent {
            return false;
        }

        if sequence > most_recent {
            let span = sequence - most_recent;
            let clear_from = if span > WINDOW_SIZE { sequence - WINDOW_SIZE + 1 } else { most_recent + 1 };
            let mut s = clear_from;
            while s <= sequence {
                self.received[Self::slot(s)] = None;
                s += 1;
            }
            self.most_recent = Some(sequence);
        }

        let slot = Self::slot(sequence);
        if self.received[slot] == Some(sequence) {
            return false;
        }
        self.received[slot] = Some(sequence);
        true
    }

    #[inline]
    pub fn most_recent(&self) -> Option<u64> {
        self.most_recent
    }
}
