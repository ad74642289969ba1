//! In-process stand-ins for LADSPA libraries and soundfonts.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ladspa_sys as ffi;
use parking_lot::Mutex;

use crate::error::{FilterError, FontError};
use crate::font::{FontLoader, SoundFont, VoiceSink, DEFAULT_PITCH_RANGE};
use crate::host::{AudioPlugin, PluginLoader, PortHint, PortInfo, PortKind};

#[derive(Debug, Default)]
pub struct MockStats {
    loads: AtomicUsize,
    activations: AtomicUsize,
    deactivations: AtomicUsize,
    cleanups: AtomicUsize,
    runs: AtomicUsize,
}

impl MockStats {
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn activations(&self) -> usize {
        self.activations.load(Ordering::SeqCst)
    }

    pub fn deactivations(&self) -> usize {
        self.deactivations.load(Ordering::SeqCst)
    }

    pub fn cleanups(&self) -> usize {
        self.cleanups.load(Ordering::SeqCst)
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

/// Maps audio inputs plus control values to audio outputs.
pub type Process = fn(inputs: &[Vec<f32>], controls: &[f32], outputs: &mut [Vec<f32>]);

fn gain(inputs: &[Vec<f32>], controls: &[f32], outputs: &mut [Vec<f32>]) {
    let gain = controls.first().copied().unwrap_or(1.0);
    for (output, input) in outputs.iter_mut().zip(inputs) {
        for (o, i) in output.iter_mut().zip(input) {
            *o = *i * gain;
        }
    }
}

pub struct MockPlugin {
    label: String,
    ports: Vec<PortInfo>,
    inplace_broken: bool,
    process: Process,
    connections: Vec<*mut f32>,
    stats: Arc<MockStats>,
    cleaned_up: bool,
}

unsafe impl Send for MockPlugin {}

const GAIN_HINT: ffi::LADSPA_PortRangeHintDescriptor =
    ffi::LADSPA_HINT_BOUNDED_BELOW | ffi::LADSPA_HINT_BOUNDED_ABOVE | ffi::LADSPA_HINT_DEFAULT_1;

impl MockPlugin {
    pub fn new(label: &str, ports: Vec<PortInfo>, process: Process) -> Self {
        let connections = vec![std::ptr::null_mut(); ports.len()];
        Self {
            label: label.to_owned(),
            ports,
            inplace_broken: false,
            process,
            connections,
            stats: Arc::default(),
            cleaned_up: false,
        }
    }

    /// Stereo in, stereo out, multiplied by the "Gain" control in [0, 4].
    pub fn stereo_gain() -> Self {
        let audio = PortHint::default();
        Self::new(
            "amp",
            vec![
                PortInfo::new("In L", PortKind::AudioInput, audio),
                PortInfo::new("In R", PortKind::AudioInput, audio),
                PortInfo::new("Out L", PortKind::AudioOutput, audio),
                PortInfo::new("Out R", PortKind::AudioOutput, audio),
                PortInfo::new("Gain", PortKind::ControlInput, PortHint::new(GAIN_HINT, 0.0, 4.0)),
            ],
            gain,
        )
    }

    /// Mono in, mono out, multiplied by the "Gain" control in [0, 4].
    pub fn mono_gain() -> Self {
        let audio = PortHint::default();
        Self::new(
            "mono",
            vec![
                PortInfo::new("In", PortKind::AudioInput, audio),
                PortInfo::new("Out", PortKind::AudioOutput, audio),
                PortInfo::new("Gain", PortKind::ControlInput, PortHint::new(GAIN_HINT, 0.0, 4.0)),
            ],
            gain,
        )
    }

    pub fn inplace_broken(mut self) -> Self {
        self.inplace_broken = true;
        self
    }

    pub fn stats(&self) -> Arc<MockStats> {
        Arc::clone(&self.stats)
    }

    fn ports_of(&self, kind: PortKind) -> impl Iterator<Item = usize> + '_ {
        self.ports
            .iter()
            .enumerate()
            .filter(move |(_, p)| p.kind == Some(kind))
            .map(|(i, _)| i)
    }
}

impl AudioPlugin for MockPlugin {
    fn label(&self) -> &str {
        &self.label
    }

    fn name(&self) -> &str {
        &self.label
    }

    fn ports(&self) -> &[PortInfo] {
        &self.ports
    }

    fn inplace_broken(&self) -> bool {
        self.inplace_broken
    }

    unsafe fn connect_port(&mut self, port: usize, data: *mut f32) {
        self.connections[port] = data;
    }

    fn activate(&mut self) {
        self.stats.activations.fetch_add(1, Ordering::SeqCst);
    }

    fn deactivate(&mut self) {
        self.stats.deactivations.fetch_add(1, Ordering::SeqCst);
    }

    unsafe fn run(&mut self, samples: usize) {
        self.stats.runs.fetch_add(1, Ordering::SeqCst);
        let read = |ptr: *mut f32| {
            if ptr.is_null() {
                vec![0.0; samples]
            } else {
                std::slice::from_raw_parts(ptr, samples).to_vec()
            }
        };
        // Inputs are copied out first since they may share memory with outputs.
        let inputs: Vec<Vec<f32>> = self
            .ports_of(PortKind::AudioInput)
            .map(|p| read(self.connections[p]))
            .collect();
        let controls: Vec<f32> = self
            .ports_of(PortKind::ControlInput)
            .map(|p| {
                let ptr = self.connections[p];
                if ptr.is_null() {
                    0.0
                } else {
                    *ptr
                }
            })
            .collect();
        let output_ports: Vec<usize> = self.ports_of(PortKind::AudioOutput).collect();
        let mut outputs = vec![vec![0.0; samples]; output_ports.len()];
        (self.process)(&inputs, &controls, &mut outputs);

        for (port, data) in output_ports.into_iter().zip(outputs) {
            let ptr = self.connections[port];
            if !ptr.is_null() {
                std::slice::from_raw_parts_mut(ptr, samples).copy_from_slice(&data);
            }
        }
    }

    fn cleanup(&mut self) {
        if !self.cleaned_up {
            self.cleaned_up = true;
            self.stats.cleanups.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Resolves labels to mock plugin factories. Every label has one shared
/// [`MockStats`] covering all instances created for it.
#[derive(Default)]
pub struct MockLoader {
    factories: HashMap<String, (fn() -> MockPlugin, Arc<MockStats>)>,
}

impl MockLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, label: &str, factory: fn() -> MockPlugin) -> Self {
        self.factories
            .insert(label.to_owned(), (factory, Arc::default()));
        self
    }

    pub fn stats(&self, label: &str) -> Arc<MockStats> {
        self.factories
            .get(label)
            .map(|(_, stats)| Arc::clone(stats))
            .unwrap_or_default()
    }
}

impl PluginLoader for MockLoader {
    fn load(
        &self,
        path: &Path,
        label: &str,
        _sample_rate: u32,
    ) -> Result<Box<dyn AudioPlugin>, FilterError> {
        let (factory, stats) = self
            .factories
            .get(label)
            .ok_or_else(|| FilterError::LabelNotFound {
                label: label.to_owned(),
                path: path.to_path_buf(),
            })?;
        stats.loads.fetch_add(1, Ordering::SeqCst);
        let mut plugin = factory();
        plugin.label = label.to_owned();
        plugin.stats = Arc::clone(stats);
        Ok(Box::new(plugin))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FontEvent {
    Select { channel: usize, bank: u32, preset: u32 },
    NoteOn { channel: usize, key: u8, velocity: u8 },
    NoteOff { channel: usize, key: u8 },
    PitchRange { channel: usize, semitones: f32 },
    PitchWheel { channel: usize, value: u16 },
    Reset,
}

#[derive(Default)]
struct FakeChannel {
    held: Vec<u8>,
    pitch_range: Option<f32>,
}

/// Records every call and renders a constant level per held note on each
/// selected channel.
pub struct FakeFont {
    channels: BTreeMap<usize, FakeChannel>,
    log: Arc<Mutex<Vec<FontEvent>>>,
    panic_on_render: bool,
}

impl FakeFont {
    pub const LEVEL: f32 = 0.125;

    pub fn new() -> Self {
        Self {
            channels: BTreeMap::new(),
            log: Arc::default(),
            panic_on_render: false,
        }
    }

    /// A font whose render call panics, taking its render thread down.
    pub fn panicking() -> Self {
        Self {
            panic_on_render: true,
            ..Self::new()
        }
    }

    pub fn log(&self) -> Arc<Mutex<Vec<FontEvent>>> {
        Arc::clone(&self.log)
    }
}

impl SoundFont for FakeFont {
    fn sample_rate(&self) -> u32 {
        44_100
    }

    fn select(&mut self, channel: usize, bank: u32, preset: u32) -> Result<(), FontError> {
        self.channels.entry(channel).or_default();
        self.log.lock().push(FontEvent::Select {
            channel,
            bank,
            preset,
        });
        Ok(())
    }

    fn note_on(&mut self, channel: usize, key: u8, velocity: u8) {
        if let Some(state) = self.channels.get_mut(&channel) {
            state.held.push(key);
        }
        self.log.lock().push(FontEvent::NoteOn {
            channel,
            key,
            velocity,
        });
    }

    fn note_off(&mut self, channel: usize, key: u8) {
        if let Some(state) = self.channels.get_mut(&channel) {
            state.held.retain(|k| *k != key);
        }
        self.log.lock().push(FontEvent::NoteOff { channel, key });
    }

    fn set_pitch_range(&mut self, channel: usize, semitones: f32) {
        self.channels.entry(channel).or_default().pitch_range = Some(semitones);
        self.log
            .lock()
            .push(FontEvent::PitchRange { channel, semitones });
    }

    fn pitch_range(&self, channel: usize) -> f32 {
        self.channels
            .get(&channel)
            .and_then(|c| c.pitch_range)
            .unwrap_or(DEFAULT_PITCH_RANGE)
    }

    fn set_pitch_wheel(&mut self, channel: usize, value: u16) {
        self.log.lock().push(FontEvent::PitchWheel { channel, value });
    }

    fn reset(&mut self) {
        self.channels.clear();
        self.log.lock().push(FontEvent::Reset);
    }

    fn render_voices(&mut self, frames: usize, sink: &mut VoiceSink<'_>) {
        if self.panic_on_render {
            panic!("render failure");
        }
        let mut left = vec![0.0; frames];
        let mut right = vec![0.0; frames];
        for (&channel, state) in self.channels.iter().filter(|(_, c)| !c.held.is_empty()) {
            let level = Self::LEVEL * state.held.len() as f32;
            left.fill(level);
            right.fill(level);
            sink(channel, &mut left, &mut right);
        }
    }
}

#[derive(Default)]
pub struct FakeFontLoader {
    loads: AtomicUsize,
}

impl FakeFontLoader {
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl FontLoader for FakeFontLoader {
    fn load(&self, _path: &Path, _sample_rate: u32) -> Result<Box<dyn SoundFont>, FontError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeFont::new()))
    }
}
