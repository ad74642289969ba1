use std::sync::Arc;

use crossbeam_channel::Sender;

use crate::ring_buffer::{RingBuffer, StereoFrame, FRAME_SAMPLES};

/// Frames requested when the ring is found empty, so the producer catches up.
pub const CATCH_UP_FRAMES: usize = 2;

/// Output side of a render unit, driven by the device callback.
///
/// Each time a new frame is needed it signals the render thread without
/// blocking, then takes whatever frame is ready, falling back to silence.
pub struct FrameConsumer {
    ring: Arc<RingBuffer>,
    requests: Sender<usize>,
    frame: StereoFrame,
    cursor: usize,
}

impl FrameConsumer {
    pub fn new(ring: Arc<RingBuffer>, requests: Sender<usize>) -> Self {
        Self {
            ring,
            requests,
            frame: StereoFrame::silent(),
            cursor: FRAME_SAMPLES,
        }
    }

    /// Frames that had to be replaced by silence. Counted on the ring, so the
    /// total survives the consumer moving into a device callback.
    pub fn underruns(&self) -> u64 {
        self.ring.underruns()
    }

    /// Requests more audio and returns the next ready frame, or silence.
    pub fn next_frame(&mut self) -> &StereoFrame {
        let wanted = if self.ring.is_empty() {
            CATCH_UP_FRAMES
        } else {
            1
        };
        // A full request queue already holds enough pending work.
        let _ = self.requests.try_send(wanted);

        if !self.ring.pop_into(&mut self.frame) {
            self.frame.clear();
            self.ring.record_underrun();
        }
        self.cursor = 0;
        &self.frame
    }

    pub fn next_sample(&mut self) -> (f32, f32) {
        if self.cursor >= FRAME_SAMPLES {
            self.next_frame();
        }
        let sample = (self.frame.left[self.cursor], self.frame.right[self.cursor]);
        self.cursor += 1;
        sample
    }

    /// Fills an interleaved device buffer. The first two channels receive left
    /// and right; any further channels are silent. Mono devices get the mix.
    pub fn fill_interleaved(&mut self, output: &mut [f32], channels: usize) {
        if channels == 0 {
            return;
        }
        for frame in output.chunks_mut(channels) {
            let (left, right) = self.next_sample();
            match frame {
                [mono] => *mono = 0.5 * (left + right),
                [l, r, rest @ ..] => {
                    *l = left;
                    *r = right;
                    rest.fill(0.0);
                }
                [] => {}
            }
        }
    }
}
