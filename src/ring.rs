//! The pre/post-capture image ring. Frames are addressed by index into a
//! single backing `Vec`, not by pointer, avoiding the manual pointer graphs
//! the legacy ring used.

use crate::frame::{FrameBuf, FrameFlags};

/// Picture-output preview policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewPolicy {
    Off,
    First,
    Best,
    Center,
}

pub struct RingBuffer {
    slots: Vec<FrameBuf>,
    pub ring_in: usize,
    pub ring_out: usize,
    size_norm: usize,
    size_high: Option<usize>,
}

impl RingBuffer {
    pub fn new(capacity: usize, size_norm: usize, size_high: Option<usize>) -> Self {
        let capacity = capacity.max(1);
        let slots = (0..capacity)
            .map(|_| FrameBuf::new(size_norm, size_high))
            .collect();
        RingBuffer {
            slots,
            ring_in: 0,
            ring_out: 0,
            size_norm,
            size_high,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Grows (or shrinks) the ring in place, called only when the ring is
    /// empty or sits exactly at its last slot.
    pub fn resize(&mut self, new_size: usize) {
        let new_size = new_size.max(1);
        if new_size == self.slots.len() {
            return;
        }
        let mut new_slots: Vec<FrameBuf> = (0..new_size)
            .map(|_| FrameBuf::new(self.size_norm, self.size_high))
            .collect();
        let keep = self.slots.len().min(new_slots.len());
        for i in 0..keep {
            std::mem::swap(&mut new_slots[i], &mut self.slots[i]);
        }
        self.slots = new_slots;
        self.ring_in = self.ring_in.min(self.slots.len() - 1);
        self.ring_out = self.ring_out.min(self.slots.len() - 1);
    }

    /// Advances `ring_in`; if it would collide with `ring_out`, the oldest
    /// frame is dropped by advancing `ring_out` too.
    pub fn advance_in(&mut self) -> usize {
        let len = self.slots.len();
        self.ring_in = (self.ring_in + 1) % len;
        if self.ring_in == self.ring_out {
            self.ring_out = (self.ring_out + 1) % len;
        }
        self.ring_in
    }

    pub fn current_mut(&mut self) -> &mut FrameBuf {
        &mut self.slots[self.ring_in]
    }

    pub fn current(&self) -> &FrameBuf {
        &self.slots[self.ring_in]
    }

    pub fn get(&self, index: usize) -> &FrameBuf {
        &self.slots[index]
    }

    pub fn get_mut(&mut self, index: usize) -> &mut FrameBuf {
        &mut self.slots[index]
    }

    /// Number of logical frames currently held between `ring_out` and
    /// `ring_in` inclusive.
    pub fn len(&self) -> usize {
        let cap = self.slots.len();
        if self.ring_in >= self.ring_out {
            self.ring_in - self.ring_out + 1
        } else {
            cap - self.ring_out + self.ring_in + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Iterates slot indices starting at `ring_out` walking forward to (and
    /// including) `ring_in`, in capture order.
    pub fn iter_indices(&self) -> Vec<usize> {
        let cap = self.slots.len();
        let mut out = Vec::with_capacity(self.len());
        let mut i = self.ring_out;
        loop {
            out.push(i);
            if i == self.ring_in {
                break;
            }
            i = (i + 1) % cap;
        }
        out
    }

    /// Counts how many of the last `n` frames (walking backward from
    /// `ring_in`) carry the `MOTION` flag -- the trigger hysteresis check.
    pub fn motion_count_in_last(&self, n: usize) -> usize {
        let cap = self.slots.len();
        let n = n.min(self.len());
        let mut count = 0;
        let mut i = self.ring_in;
        for _ in 0..n {
            if self.slots[i].flags.contains(FrameFlags::MOTION) {
                count += 1;
            }
            i = (i + cap - 1) % cap;
        }
        count
    }

    /// OR's `SAVE` into every currently held frame, used when a trigger
    /// fires and the whole precap window must be captured.
    pub fn mark_all_save(&mut self) {
        for i in self.iter_indices() {
            self.slots[i].flags.insert(FrameFlags::SAVE);
        }
    }

    /// Flushes every `SAVE`-but-not-yet-`SAVED` frame starting at
    /// `ring_out`, invoking `writer` for each, and advances `ring_out` past
    /// them. `writer` returns the candidate's sort key for preview
    /// selection (diffs for "best", negative centre distance for
    /// "center"); the index of the frame `writer` should treat as the new
    /// preview is returned.
    pub fn process_saved<F>(&mut self, policy: PreviewPolicy, mut writer: F) -> Option<usize>
    where
        F: FnMut(&FrameBuf),
    {
        let cap = self.slots.len();
        let mut preview_idx: Option<usize> = None;
        let mut preview_diffs = i64::MIN;
        let mut preview_cent_dist = i64::MAX;

        let mut i = self.ring_out;
        loop {
            let is_save = self.slots[i].flags.contains(FrameFlags::SAVE);
            let is_saved = self.slots[i].flags.contains(FrameFlags::SAVED);
            if !is_save {
                break;
            }
            if !is_saved {
                writer(&self.slots[i]);
                self.slots[i].flags.insert(FrameFlags::SAVED);

                match policy {
                    PreviewPolicy::Best if self.slots[i].diffs > preview_diffs => {
                        preview_diffs = self.slots[i].diffs;
                        preview_idx = Some(i);
                    }
                    PreviewPolicy::Center if self.slots[i].cent_dist < preview_cent_dist => {
                        preview_cent_dist = self.slots[i].cent_dist;
                        preview_idx = Some(i);
                    }
                    PreviewPolicy::First if preview_idx.is_none() => {
                        preview_idx = Some(i);
                    }
                    _ => {}
                }
            }
            if i == self.ring_in {
                self.ring_out = i;
                break;
            }
            self.ring_out = i;
            i = (i + 1) % cap;
        }
        preview_idx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_in_drops_oldest_when_full() {
        let mut ring = RingBuffer::new(3, 8, None);
        assert_eq!(ring.ring_in, 0);
        assert_eq!(ring.ring_out, 0);
        ring.advance_in();
        ring.advance_in();
        assert_eq!(ring.ring_in, 2);
        assert_eq!(ring.ring_out, 0);
        ring.advance_in();
        // wrapped: ring_in caught ring_out, so ring_out advances too
        assert_eq!(ring.ring_in, 0);
        assert_eq!(ring.ring_out, 1);
    }

    #[test]
    fn motion_count_in_last_counts_backward() {
        let mut ring = RingBuffer::new(5, 8, None);
        for i in 0..5 {
            if i != 1 {
                ring.current_mut().flags.insert(FrameFlags::MOTION);
            }
            if i < 4 {
                ring.advance_in();
            }
        }
        assert_eq!(ring.motion_count_in_last(3), 3);
        assert_eq!(ring.motion_count_in_last(5), 4);
    }

    #[test]
    fn saved_implies_save_invariant() {
        let mut ring = RingBuffer::new(4, 8, None);
        ring.current_mut().flags.insert(FrameFlags::SAVE);
        ring.mark_all_save();
        let mut written = Vec::new();
        ring.process_saved(PreviewPolicy::Off, |f| written.push(f.diffs));
        for idx in ring.iter_indices() {
            let f = ring.get(idx);
            if f.flags.contains(FrameFlags::SAVED) {
                assert!(f.flags.contains(FrameFlags::SAVE));
            }
        }
        assert_eq!(written.len(), 1);
    }

    #[test]
    fn resize_preserves_existing_contents() {
        let mut ring = RingBuffer::new(2, 8, None);
        ring.current_mut().image_norm[0] = 7;
        ring.resize(5);
        assert_eq!(ring.capacity(), 5);
        assert_eq!(ring.get(0).image_norm[0], 7);
    }
}
