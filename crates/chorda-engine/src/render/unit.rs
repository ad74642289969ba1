use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use crossbeam_queue::ArrayQueue;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::consumer::{FrameConsumer, CATCH_UP_FRAMES};
use super::priority;
use super::renderer::Renderer;
use crate::channel::ChannelTable;
use crate::config::SynthConfig;
use crate::error::SynthError;
use crate::font::SoundFont;
use crate::ring_buffer::{RingBuffer, StereoFrame};

/// How long a render thread waits for a request before re-checking its
/// running flag.
const REQUEST_POLL: Duration = Duration::from_millis(20);

/// Font-level operations forwarded to a render unit.
#[derive(Debug, Clone, PartialEq)]
pub enum UnitMessage {
    NoteOn { channel: usize, key: u8, velocity: u8 },
    NoteOff { channel: usize, key: u8 },
    Select { channel: usize, bank: u32, preset: u32 },
    PitchWheel { channel: usize, semitones: f32 },
    PitchRange { channel: usize, semitones: f32 },
    Reset,
}

enum Driver {
    Threaded {
        ring: Arc<RingBuffer>,
        requests: Sender<usize>,
        thread: Option<JoinHandle<()>>,
    },
    /// No render thread; frames are produced on the caller's thread by `pull`.
    Inline(Mutex<Renderer>),
}

/// One soundfont and the machinery rendering it.
pub struct UnitHandle {
    sfont_id: u32,
    queue: Arc<ArrayQueue<UnitMessage>>,
    running: Arc<AtomicBool>,
    driver: Driver,
}

impl UnitHandle {
    /// Starts a render thread for `font`.
    pub fn spawn(
        sfont_id: u32,
        font: Box<dyn SoundFont>,
        channels: Arc<ChannelTable>,
        config: &SynthConfig,
    ) -> Result<Self, SynthError> {
        let queue = Arc::new(ArrayQueue::new(config.queue_capacity.max(1)));
        let running = Arc::new(AtomicBool::new(true));
        let ring = Arc::new(RingBuffer::new(config.ring_depth));
        let (requests, request_rx) = bounded(config.request_depth.max(1));
        let renderer = Renderer::new(sfont_id, font, Arc::clone(&queue), channels);

        let thread = {
            let ring = Arc::clone(&ring);
            let running = Arc::clone(&running);
            thread::Builder::new()
                .name(format!("chorda-render-{sfont_id}"))
                .spawn(move || render_loop(renderer, ring, request_rx, running))
                .map_err(SynthError::ThreadSpawn)?
        };
        info!(sfont_id, ring_depth = config.ring_depth, "render unit started");

        Ok(Self {
            sfont_id,
            queue,
            running,
            driver: Driver::Threaded {
                ring,
                requests,
                thread: Some(thread),
            },
        })
    }

    /// Creates a unit rendered synchronously by [`UnitHandle::pull`].
    pub fn inline(
        sfont_id: u32,
        font: Box<dyn SoundFont>,
        channels: Arc<ChannelTable>,
        config: &SynthConfig,
    ) -> Self {
        let queue = Arc::new(ArrayQueue::new(config.queue_capacity.max(1)));
        let renderer = Renderer::new(sfont_id, font, Arc::clone(&queue), channels);
        info!(sfont_id, "render unit started without a render thread");
        Self {
            sfont_id,
            queue,
            running: Arc::new(AtomicBool::new(true)),
            driver: Driver::Inline(Mutex::new(renderer)),
        }
    }

    pub fn sfont_id(&self) -> u32 {
        self.sfont_id
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Queues a message for the render side without blocking.
    pub fn send(&self, message: UnitMessage) -> Result<(), SynthError> {
        self.queue
            .push(message)
            .map_err(|_| SynthError::QueueFull(self.sfont_id))
    }

    /// Consumer for an output device callback. `None` for inline units.
    pub fn consumer(&self) -> Option<FrameConsumer> {
        match &self.driver {
            Driver::Threaded { ring, requests, .. } => {
                Some(FrameConsumer::new(Arc::clone(ring), requests.clone()))
            }
            Driver::Inline(_) => None,
        }
    }

    /// Fetches the next frame into `out`. Returns `false` when no frame was
    /// ready and `out` was left untouched.
    pub fn pull(&self, out: &mut StereoFrame) -> bool {
        match &self.driver {
            Driver::Inline(renderer) => {
                let mut renderer = renderer.lock();
                renderer.apply_pending();
                out.clone_from(renderer.render_frame());
                true
            }
            Driver::Threaded { ring, requests, .. } => {
                let wanted = if ring.is_empty() { CATCH_UP_FRAMES } else { 1 };
                let _ = requests.try_send(wanted);
                ring.pop_into(out)
            }
        }
    }

    /// Frames the output side replaced with silence. Always zero for inline
    /// units.
    pub fn underruns(&self) -> u64 {
        match &self.driver {
            Driver::Threaded { ring, .. } => ring.underruns(),
            Driver::Inline(_) => 0,
        }
    }

    /// Clears the running flag and joins the render thread.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Driver::Threaded { ring, thread, .. } = &mut self.driver {
            let Some(handle) = thread.take() else {
                return;
            };
            if handle.join().is_err() {
                warn!(sfont_id = self.sfont_id, "render thread panicked");
            }
            info!(
                sfont_id = self.sfont_id,
                overwrites = ring.overwrites(),
                underruns = ring.underruns(),
                "render unit stopped"
            );
        }
    }
}

impl Drop for UnitHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn render_loop(
    mut renderer: Renderer,
    ring: Arc<RingBuffer>,
    requests: Receiver<usize>,
    running: Arc<AtomicBool>,
) {
    priority::promote_current_thread();

    while running.load(Ordering::Acquire) {
        match requests.recv_timeout(REQUEST_POLL) {
            Ok(count) => {
                renderer.apply_pending();
                for _ in 0..count {
                    ring.push(renderer.render_frame());
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                renderer.apply_pending();
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!("render loop exited");
}
