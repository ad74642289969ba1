//! Soundfont boundary.
//!
//! The render engine only sees the [`SoundFont`] trait. [`RustySynthLoader`]
//! backs it with `rustysynth`, giving every bound channel its own synthesizer
//! so that channel's voices can be rendered, and filtered, in isolation.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustysynth::{SoundFont as Sf2, Synthesizer, SynthesizerSettings};
use tracing::warn;

use crate::error::FontError;
use crate::ring_buffer::FRAME_SAMPLES;

/// Pitch wheel centre position.
pub const PITCH_WHEEL_CENTER: u16 = 8192;
/// Largest 14-bit pitch wheel value.
pub const PITCH_WHEEL_MAX: u16 = 16383;
pub const DEFAULT_PITCH_RANGE: f32 = 2.0;

/// Converts a bend of `semitones` into a wheel position for a channel whose
/// bend range is `range` semitones.
pub fn pitch_wheel_value(semitones: f32, range: f32) -> u16 {
    if range <= 0.0 || !semitones.is_finite() {
        return PITCH_WHEEL_CENTER;
    }
    let raw = f32::from(PITCH_WHEEL_CENTER) + (semitones / range) * f32::from(PITCH_WHEEL_CENTER);
    raw.clamp(0.0, f32::from(PITCH_WHEEL_MAX)) as u16
}

/// Receives one channel's isolated voice audio during rendering.
pub type VoiceSink<'a> = dyn FnMut(usize, &mut [f32], &mut [f32]) + 'a;

/// An opaque, loaded soundfont able to play on any number of channels.
pub trait SoundFont: Send {
    fn sample_rate(&self) -> u32;

    fn select(&mut self, channel: usize, bank: u32, preset: u32) -> Result<(), FontError>;

    fn note_on(&mut self, channel: usize, key: u8, velocity: u8);

    fn note_off(&mut self, channel: usize, key: u8);

    fn set_pitch_range(&mut self, channel: usize, semitones: f32);

    fn pitch_range(&self, channel: usize) -> f32;

    fn set_pitch_wheel(&mut self, channel: usize, value: u16);

    /// Silences every voice and forgets all channel state.
    fn reset(&mut self);

    /// Renders `frames` samples of every channel with sounding voices, handing
    /// each channel's audio to `sink` separately. The slices passed to `sink`
    /// start out zeroed for every channel.
    fn render_voices(&mut self, frames: usize, sink: &mut VoiceSink<'_>);
}

/// Opens soundfont files.
pub trait FontLoader: Send + Sync {
    fn load(&self, path: &Path, sample_rate: u32) -> Result<Box<dyn SoundFont>, FontError>;
}

/// [`FontLoader`] backed by `rustysynth`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RustySynthLoader;

impl FontLoader for RustySynthLoader {
    fn load(&self, path: &Path, sample_rate: u32) -> Result<Box<dyn SoundFont>, FontError> {
        Ok(Box::new(RustySynthFont::open(path, sample_rate)?))
    }
}

const MIDI_CC: i32 = 0xB0;
const MIDI_PROGRAM_CHANGE: i32 = 0xC0;
const MIDI_PITCH_BEND: i32 = 0xE0;
const CC_BANK_SELECT: i32 = 0x00;
const CC_DATA_ENTRY: i32 = 0x06;
const CC_DATA_ENTRY_LSB: i32 = 0x26;
const CC_RPN_LSB: i32 = 0x64;
const CC_RPN_MSB: i32 = 0x65;
const PERCUSSION_BANK: u32 = 128;
const PERCUSSION_MIDI_CHANNEL: i32 = 9;

/// Per-channel render buffers, reused for every channel and frame.
#[derive(Debug)]
struct Scratch {
    left: Vec<f32>,
    right: Vec<f32>,
}

impl Scratch {
    fn new(frames: usize) -> Self {
        Self {
            left: vec![0.0; frames],
            right: vec![0.0; frames],
        }
    }

    /// Zeroed `frames`-long views. Only grows when asked for more than it
    /// holds.
    fn zeroed(&mut self, frames: usize) -> (&mut [f32], &mut [f32]) {
        if self.left.len() < frames {
            self.left.resize(frames, 0.0);
            self.right.resize(frames, 0.0);
        }
        let left = &mut self.left[..frames];
        let right = &mut self.right[..frames];
        left.fill(0.0);
        right.fill(0.0);
        (left, right)
    }
}

struct Voice {
    synth: Synthesizer,
    midi_channel: i32,
    pitch_range: f32,
    sounding: bool,
}

/// A soundfont rendered through one `rustysynth` synthesizer per channel.
pub struct RustySynthFont {
    path: PathBuf,
    font: Arc<Sf2>,
    settings: SynthesizerSettings,
    sample_rate: u32,
    voices: BTreeMap<usize, Voice>,
    scratch: Scratch,
}

impl RustySynthFont {
    pub fn open(path: &Path, sample_rate: u32) -> Result<Self, FontError> {
        let file = File::open(path).map_err(|source| FontError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut reader = BufReader::new(file);
        let font = Sf2::new(&mut reader).map_err(|err| FontError::Decode {
            path: path.to_path_buf(),
            reason: format!("{err:?}"),
        })?;

        let mut settings = SynthesizerSettings::new(sample_rate as i32);
        settings.enable_reverb_and_chorus = false;

        Ok(Self {
            path: path.to_path_buf(),
            font: Arc::new(font),
            settings,
            sample_rate,
            voices: BTreeMap::new(),
            scratch: Scratch::new(FRAME_SAMPLES),
        })
    }

    fn has_preset(&self, bank: u32, preset: u32) -> bool {
        self.font.get_presets().iter().any(|p| {
            p.get_bank_number() == bank as i32 && p.get_patch_number() == preset as i32
        })
    }

    fn voice(&mut self, channel: usize) -> Option<&mut Voice> {
        self.voices.get_mut(&channel)
    }
}

impl SoundFont for RustySynthFont {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn select(&mut self, channel: usize, bank: u32, preset: u32) -> Result<(), FontError> {
        if !self.has_preset(bank, preset) {
            return Err(FontError::PresetUnavailable { bank, preset });
        }

        if !self.voices.contains_key(&channel) {
            let synth = Synthesizer::new(&self.font, &self.settings).map_err(|err| {
                FontError::Decode {
                    path: self.path.clone(),
                    reason: format!("{err:?}"),
                }
            })?;
            self.voices.insert(
                channel,
                Voice {
                    synth,
                    midi_channel: 0,
                    pitch_range: DEFAULT_PITCH_RANGE,
                    sounding: false,
                },
            );
        }

        let Some(voice) = self.voice(channel) else {
            return Ok(());
        };
        // The synthesizer only maps bank 128 on its percussion channel.
        let (midi_channel, bank) = if bank >= PERCUSSION_BANK {
            (PERCUSSION_MIDI_CHANNEL, bank - PERCUSSION_BANK)
        } else {
            (0, bank)
        };
        if midi_channel != voice.midi_channel {
            voice.synth.note_off_all(true);
            voice.midi_channel = midi_channel;
            apply_pitch_range(voice);
        }
        voice
            .synth
            .process_midi_message(midi_channel, MIDI_CC, CC_BANK_SELECT, bank as i32);
        voice
            .synth
            .process_midi_message(midi_channel, MIDI_PROGRAM_CHANGE, preset as i32, 0);
        Ok(())
    }

    fn note_on(&mut self, channel: usize, key: u8, velocity: u8) {
        match self.voice(channel) {
            Some(voice) => {
                voice
                    .synth
                    .note_on(voice.midi_channel, i32::from(key), i32::from(velocity));
                voice.sounding = true;
            }
            None => warn!(channel, key, "note on for a channel with no selected preset"),
        }
    }

    fn note_off(&mut self, channel: usize, key: u8) {
        if let Some(voice) = self.voice(channel) {
            voice.synth.note_off(voice.midi_channel, i32::from(key));
        }
    }

    fn set_pitch_range(&mut self, channel: usize, semitones: f32) {
        if let Some(voice) = self.voice(channel) {
            voice.pitch_range = semitones.max(0.0);
            apply_pitch_range(voice);
        }
    }

    fn pitch_range(&self, channel: usize) -> f32 {
        self.voices
            .get(&channel)
            .map_or(DEFAULT_PITCH_RANGE, |voice| voice.pitch_range)
    }

    fn set_pitch_wheel(&mut self, channel: usize, value: u16) {
        if let Some(voice) = self.voice(channel) {
            let value = i32::from(value.min(PITCH_WHEEL_MAX));
            voice.synth.process_midi_message(
                voice.midi_channel,
                MIDI_PITCH_BEND,
                value & 0x7F,
                value >> 7,
            );
        }
    }

    fn reset(&mut self) {
        for voice in self.voices.values_mut() {
            voice.synth.reset();
        }
        self.voices.clear();
    }

    fn render_voices(&mut self, frames: usize, sink: &mut VoiceSink<'_>) {
        let Self { voices, scratch, .. } = self;
        for (&channel, voice) in voices.iter_mut().filter(|(_, v)| v.sounding) {
            let (left, right) = scratch.zeroed(frames);
            voice.synth.render(left, right);
            sink(channel, left, right);
        }
    }
}

fn apply_pitch_range(voice: &mut Voice) {
    let whole = voice.pitch_range.trunc();
    let cents = ((voice.pitch_range - whole) * 100.0).round();
    let ch = voice.midi_channel;
    let synth = &mut voice.synth;
    synth.process_midi_message(ch, MIDI_CC, CC_RPN_MSB, 0);
    synth.process_midi_message(ch, MIDI_CC, CC_RPN_LSB, 0);
    synth.process_midi_message(ch, MIDI_CC, CC_DATA_ENTRY, whole as i32);
    synth.process_midi_message(ch, MIDI_CC, CC_DATA_ENTRY_LSB, cents as i32);
}
