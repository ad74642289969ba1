use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use ringbuf::{HeapRb, Rb};

/// Samples per channel in one rendered frame.
pub const FRAME_SAMPLES: usize = 64;

/// One fixed size block of non-interleaved stereo audio.
#[derive(Debug, Clone, PartialEq)]
pub struct StereoFrame {
    pub left: [f32; FRAME_SAMPLES],
    pub right: [f32; FRAME_SAMPLES],
}

impl StereoFrame {
    pub const fn silent() -> Self {
        Self {
            left: [0.0; FRAME_SAMPLES],
            right: [0.0; FRAME_SAMPLES],
        }
    }

    pub fn clear(&mut self) {
        self.left.fill(0.0);
        self.right.fill(0.0);
    }

    pub fn is_silent(&self) -> bool {
        self.left.iter().chain(self.right.iter()).all(|s| *s == 0.0)
    }

    /// Adds `left`/`right` sample-wise into the frame. No clipping is applied.
    pub fn mix(&mut self, left: &[f32], right: &[f32]) {
        for (acc, sample) in self.left.iter_mut().zip(left) {
            *acc += *sample;
        }
        for (acc, sample) in self.right.iter_mut().zip(right) {
            *acc += *sample;
        }
    }
}

impl Default for StereoFrame {
    fn default() -> Self {
        Self::silent()
    }
}

/// Result of a push into the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Stored,
    /// The ring was full; the oldest unread frame was discarded to make room.
    Overwrote,
}

/// Bounded, lock protected circular store of stereo frames.
///
/// The producer never blocks: pushing into a full ring evicts the oldest
/// frame. Popping an empty ring reports `false` and leaves the ring untouched.
pub struct RingBuffer {
    ring: Mutex<HeapRb<StereoFrame>>,
    capacity: usize,
    overwrites: AtomicU64,
    underruns: AtomicU64,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ring: Mutex::new(HeapRb::new(capacity)),
            capacity,
            overwrites: AtomicU64::new(0),
            underruns: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn count(&self) -> usize {
        self.ring.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Number of frames evicted by pushes into a full ring since creation.
    pub fn overwrites(&self) -> u64 {
        self.overwrites.load(Ordering::Relaxed)
    }

    /// Number of times a reader found nothing ready and played silence.
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    pub(crate) fn record_underrun(&self) {
        self.underruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn push(&self, frame: &StereoFrame) -> PushOutcome {
        let evicted = self.ring.lock().push_overwrite(frame.clone());
        match evicted {
            Some(_) => {
                self.overwrites.fetch_add(1, Ordering::Relaxed);
                PushOutcome::Overwrote
            }
            None => PushOutcome::Stored,
        }
    }

    /// Moves the oldest frame into `out`. Returns `false` when nothing is ready.
    pub fn pop_into(&self, out: &mut StereoFrame) -> bool {
        match self.ring.lock().pop() {
            Some(frame) => {
                *out = frame;
                true
            }
            None => false,
        }
    }

    pub fn pop(&self) -> Option<StereoFrame> {
        self.ring.lock().pop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(value: f32) -> StereoFrame {
        StereoFrame {
            left: [value; FRAME_SAMPLES],
            right: [-value; FRAME_SAMPLES],
        }
    }

    #[test]
    fn pops_in_push_order() {
        let ring = RingBuffer::new(3);
        ring.push(&frame(1.0));
        ring.push(&frame(2.0));
        assert_eq!(ring.count(), 2);
        assert_eq!(ring.pop().unwrap().left[0], 1.0);
        assert_eq!(ring.pop().unwrap().left[0], 2.0);
        assert!(ring.is_empty());
    }

    #[test]
    fn full_push_evicts_oldest() {
        let ring = RingBuffer::new(3);
        for value in 1..=3 {
            assert_eq!(ring.push(&frame(value as f32)), PushOutcome::Stored);
        }
        assert_eq!(ring.push(&frame(4.0)), PushOutcome::Overwrote);
        assert_eq!(ring.count(), 3);
        assert_eq!(ring.overwrites(), 1);

        let drained: Vec<f32> = std::iter::from_fn(|| ring.pop()).map(|f| f.left[0]).collect();
        assert_eq!(drained, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn empty_pop_leaves_output_and_state_alone() {
        let ring = RingBuffer::new(2);
        let mut out = frame(7.0);
        assert!(!ring.pop_into(&mut out));
        assert_eq!(out, frame(7.0));
        assert_eq!(ring.count(), 0);

        ring.push(&frame(1.0));
        assert_eq!(ring.pop().unwrap().right[0], -1.0);
    }

    #[test]
    fn capacity_is_at_least_one() {
        let ring = RingBuffer::new(0);
        assert_eq!(ring.capacity(), 1);
        ring.push(&frame(1.0));
        assert_eq!(ring.push(&frame(2.0)), PushOutcome::Overwrote);
        assert_eq!(ring.pop().unwrap().left[0], 2.0);
    }

    #[test]
    fn wraps_around_many_times() {
        let ring = RingBuffer::new(2);
        for value in 0..10 {
            ring.push(&frame(value as f32));
            assert_eq!(ring.pop().unwrap().left[0], value as f32);
        }
        assert_eq!(ring.overwrites(), 0);
    }

    #[test]
    fn mix_is_additive_without_clipping() {
        let mut acc = StereoFrame::silent();
        acc.mix(&[0.75; FRAME_SAMPLES], &[0.5; FRAME_SAMPLES]);
        acc.mix(&[0.75; FRAME_SAMPLES], &[0.5; FRAME_SAMPLES]);
        assert_eq!(acc.left[0], 1.5);
        assert_eq!(acc.right[FRAME_SAMPLES - 1], 1.0);
    }
}
