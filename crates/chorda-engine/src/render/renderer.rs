use std::sync::Arc;

use crossbeam_queue::ArrayQueue;
use tracing::warn;

use super::unit::UnitMessage;
use crate::channel::ChannelTable;
use crate::font::{pitch_wheel_value, SoundFont};
use crate::ring_buffer::{StereoFrame, FRAME_SAMPLES};

/// Produces frames for one render unit: applies queued font messages, renders
/// each channel's voices, routes them through that channel's chain and mixes.
pub struct Renderer {
    sfont_id: u32,
    font: Box<dyn SoundFont>,
    queue: Arc<ArrayQueue<UnitMessage>>,
    channels: Arc<ChannelTable>,
    frame: StereoFrame,
}

impl Renderer {
    pub fn new(
        sfont_id: u32,
        font: Box<dyn SoundFont>,
        queue: Arc<ArrayQueue<UnitMessage>>,
        channels: Arc<ChannelTable>,
    ) -> Self {
        Self {
            sfont_id,
            font,
            queue,
            channels,
            frame: StereoFrame::silent(),
        }
    }

    /// Drains the command queue. Returns the number of messages applied.
    pub fn apply_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Some(message) = self.queue.pop() {
            self.apply(message);
            applied += 1;
        }
        applied
    }

    fn apply(&mut self, message: UnitMessage) {
        match message {
            UnitMessage::NoteOn {
                channel,
                key,
                velocity,
            } => self.font.note_on(channel, key, velocity),
            UnitMessage::NoteOff { channel, key } => self.font.note_off(channel, key),
            UnitMessage::Select {
                channel,
                bank,
                preset,
            } => {
                if let Err(err) = self.font.select(channel, bank, preset) {
                    warn!(sfont_id = self.sfont_id, channel, %err, "preset select failed");
                }
            }
            UnitMessage::PitchWheel { channel, semitones } => {
                let value = pitch_wheel_value(semitones, self.font.pitch_range(channel));
                self.font.set_pitch_wheel(channel, value);
            }
            UnitMessage::PitchRange { channel, semitones } => {
                self.font.set_pitch_range(channel, semitones)
            }
            UnitMessage::Reset => self.font.reset(),
        }
    }

    /// Renders one frame. Channel groups are summed without clipping.
    pub fn render_frame(&mut self) -> &StereoFrame {
        let Self {
            font,
            channels,
            frame,
            ..
        } = self;
        frame.clear();
        font.render_voices(FRAME_SAMPLES, &mut |channel, left, right| {
            channels.process(channel, left, right);
            frame.mix(left, right);
        });
        &self.frame
    }
}
