#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chorda_engine::font::VoiceSink;
use chorda_engine::ladspa_sys as ffi;
use chorda_engine::{
    AudioPlugin, FilterError, FontError, FontLoader, PluginLoader, PortHint, PortInfo, PortKind,
    SoundFont, Synth, SynthConfig,
};

/// Level rendered per held note by [`LevelFont`].
pub const LEVEL: f32 = 0.2;

/// Stereo plugin with one "Decay" control in [0, 2]; divides its input by
/// `1 + decay`.
pub struct Reverb {
    ports: Vec<PortInfo>,
    connections: Vec<*mut f32>,
}

unsafe impl Send for Reverb {}

impl Reverb {
    pub fn new() -> Self {
        let audio = PortHint::default();
        let decay = PortHint::new(
            ffi::LADSPA_HINT_BOUNDED_BELOW
                | ffi::LADSPA_HINT_BOUNDED_ABOVE
                | ffi::LADSPA_HINT_DEFAULT_1,
            0.0,
            2.0,
        );
        let ports = vec![
            PortInfo::new("Input L", PortKind::AudioInput, audio),
            PortInfo::new("Input R", PortKind::AudioInput, audio),
            PortInfo::new("Output L", PortKind::AudioOutput, audio),
            PortInfo::new("Output R", PortKind::AudioOutput, audio),
            PortInfo::new("Decay", PortKind::ControlInput, decay),
        ];
        let connections = vec![std::ptr::null_mut(); ports.len()];
        Self { ports, connections }
    }
}

impl AudioPlugin for Reverb {
    fn label(&self) -> &str {
        "reverb"
    }

    fn name(&self) -> &str {
        "Test Reverb"
    }

    fn ports(&self) -> &[PortInfo] {
        &self.ports
    }

    fn inplace_broken(&self) -> bool {
        false
    }

    unsafe fn connect_port(&mut self, port: usize, data: *mut f32) {
        self.connections[port] = data;
    }

    fn activate(&mut self) {}

    fn deactivate(&mut self) {}

    unsafe fn run(&mut self, samples: usize) {
        let scale = 1.0 / (1.0 + *self.connections[4]);
        for (input, output) in [(0, 2), (1, 3)] {
            let source: Vec<f32> =
                std::slice::from_raw_parts(self.connections[input], samples).to_vec();
            let target = std::slice::from_raw_parts_mut(self.connections[output], samples);
            for (t, s) in target.iter_mut().zip(source) {
                *t = s * scale;
            }
        }
    }

    fn cleanup(&mut self) {}
}

/// Serves [`Reverb`] for the label "reverb" and counts loads.
#[derive(Default)]
pub struct ReverbLoader {
    loads: AtomicUsize,
}

impl ReverbLoader {
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl PluginLoader for ReverbLoader {
    fn load(
        &self,
        path: &Path,
        label: &str,
        _sample_rate: u32,
    ) -> Result<Box<dyn AudioPlugin>, FilterError> {
        if label != "reverb" {
            return Err(FilterError::LabelNotFound {
                label: label.to_owned(),
                path: path.to_path_buf(),
            });
        }
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(Reverb::new()))
    }
}

/// Renders a constant [`LEVEL`] per held note on every selected channel.
#[derive(Default)]
pub struct LevelFont {
    held: std::collections::BTreeMap<usize, usize>,
}

impl SoundFont for LevelFont {
    fn sample_rate(&self) -> u32 {
        44_100
    }

    fn select(&mut self, channel: usize, _bank: u32, _preset: u32) -> Result<(), FontError> {
        self.held.entry(channel).or_insert(0);
        Ok(())
    }

    fn note_on(&mut self, channel: usize, _key: u8, _velocity: u8) {
        if let Some(held) = self.held.get_mut(&channel) {
            *held += 1;
        }
    }

    fn note_off(&mut self, channel: usize, _key: u8) {
        if let Some(held) = self.held.get_mut(&channel) {
            *held = held.saturating_sub(1);
        }
    }

    fn set_pitch_range(&mut self, _channel: usize, _semitones: f32) {}

    fn pitch_range(&self, _channel: usize) -> f32 {
        2.0
    }

    fn set_pitch_wheel(&mut self, _channel: usize, _value: u16) {}

    fn reset(&mut self) {
        self.held.clear();
    }

    fn render_voices(&mut self, frames: usize, sink: &mut VoiceSink<'_>) {
        for (&channel, &held) in self.held.iter().filter(|(_, held)| **held > 0) {
            let mut left = vec![LEVEL * held as f32; frames];
            let mut right = vec![LEVEL * held as f32; frames];
            sink(channel, &mut left, &mut right);
        }
    }
}

pub struct LevelFontLoader;

impl FontLoader for LevelFontLoader {
    fn load(&self, _path: &Path, _sample_rate: u32) -> Result<Box<dyn SoundFont>, FontError> {
        Ok(Box::<LevelFont>::default())
    }
}

/// A headless engine over one placeholder soundfont file.
pub struct Fixture {
    pub synth: Synth,
    pub plugins: Arc<ReverbLoader>,
    _dir: tempfile::TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let font: PathBuf = dir.path().join("piano.sf2");
        std::fs::write(&font, b"placeholder").expect("write soundfont");

        let config = SynthConfig::default().with_soundfonts([font]).headless();
        let plugins = Arc::new(ReverbLoader::default());
        let synth = Synth::with_loaders(config, Arc::new(LevelFontLoader), plugins.clone())
            .expect("engine");
        Self {
            synth,
            plugins,
            _dir: dir,
        }
    }
}
