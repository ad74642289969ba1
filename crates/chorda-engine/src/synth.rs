use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::command::{Command, ControlRef, TimedCommand};
use crate::config::{OutputMode, SynthConfig};
use crate::error::SynthError;
use crate::font::{FontLoader, RustySynthLoader};
use crate::host::{ControlInfo, LadspaLoader, PluginLoader};
use crate::render::UnitHandle;
use crate::ring_buffer::StereoFrame;
use crate::scheduler::{EventId, Scheduler};
use crate::state::{EngineEpoch, EngineState};

/// The engine facade: owns the shared state, the event dispatcher and, while
/// running, the output streams.
pub struct Synth {
    state: Arc<EngineState>,
    scheduler: Scheduler,
    fonts: Arc<dyn FontLoader>,
    #[cfg(feature = "native")]
    streams: Vec<cpal::Stream>,
}

impl Synth {
    /// Engine using `rustysynth` for soundfonts and LADSPA for filters.
    pub fn new(config: SynthConfig) -> Result<Self, SynthError> {
        Self::with_loaders(config, Arc::new(RustySynthLoader), Arc::new(LadspaLoader))
    }

    pub fn with_loaders(
        config: SynthConfig,
        fonts: Arc<dyn FontLoader>,
        plugins: Arc<dyn PluginLoader>,
    ) -> Result<Self, SynthError> {
        config.validate()?;
        let state = Arc::new(EngineState::new(config, plugins));
        let scheduler = Scheduler::new(Arc::clone(&state))?;
        Ok(Self {
            state,
            scheduler,
            fonts,
            #[cfg(feature = "native")]
            streams: Vec::new(),
        })
    }

    pub fn state(&self) -> &Arc<EngineState> {
        &self.state
    }

    pub fn config(&self) -> &SynthConfig {
        self.state.config()
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    pub fn epoch(&self) -> EngineEpoch {
        self.state.epoch()
    }

    /// Loads every soundfont, starts one render unit per font (soundfont id =
    /// position + 1) and, in device mode, one output stream per unit. Any
    /// failure tears down what was started and leaves the engine stopped.
    pub fn start(&mut self) -> Result<EngineEpoch, SynthError> {
        if self.state.is_running() {
            return Err(SynthError::AlreadyRunning);
        }

        let config = self.state.config().clone();
        if let Some(missing) = config.sfpaths.iter().find(|path| !path.exists()) {
            return Err(SynthError::SoundFontMissing(missing.clone()));
        }

        let mut units = Vec::with_capacity(config.sfpaths.len());
        for (index, path) in config.sfpaths.iter().enumerate() {
            let sfont_id = index as u32 + 1;
            let font = self.fonts.load(path, config.sample_rate)?;
            info!(sfont_id, path = %path.display(), "soundfont loaded");
            let channels = Arc::clone(self.state.channels());
            let unit = match config.output {
                OutputMode::Device => UnitHandle::spawn(sfont_id, font, channels, &config)?,
                OutputMode::Headless => UnitHandle::inline(sfont_id, font, channels, &config),
            };
            units.push(unit);
        }

        if config.output == OutputMode::Device {
            self.open_streams(&units, &config)?;
        }

        Ok(self.state.begin_run(units))
    }

    #[cfg(feature = "native")]
    fn open_streams(&mut self, units: &[UnitHandle], config: &SynthConfig) -> Result<(), SynthError> {
        for unit in units {
            let Some(consumer) = unit.consumer() else {
                continue;
            };
            match crate::render::device::open_output(
                config.device.as_deref(),
                config.sample_rate,
                consumer,
            ) {
                Ok(stream) => self.streams.push(stream),
                Err(err) => {
                    self.streams.clear();
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    #[cfg(not(feature = "native"))]
    fn open_streams(&mut self, _units: &[UnitHandle], _config: &SynthConfig) -> Result<(), SynthError> {
        Err(SynthError::Device(
            "built without native audio output; use headless mode".into(),
        ))
    }

    /// Stops output, joins every render thread, clears channel bindings and
    /// removes every filter. Pending scheduled events become stale.
    pub fn stop(&mut self) {
        #[cfg(feature = "native")]
        self.streams.clear();
        let units = self.state.end_run();
        drop(units);
    }

    pub fn execute(&self, command: &Command) -> Result<(), SynthError> {
        self.state.execute(command)
    }

    pub fn schedule(&self, command: Command, delay: Duration) -> EventId {
        self.scheduler.schedule(command, delay)
    }

    pub fn schedule_batch(&self, batch: Vec<TimedCommand>) -> Vec<EventId> {
        self.scheduler.schedule_batch(batch)
    }

    pub fn cancel_channel_events(&self, channel: usize) -> Result<(), SynthError> {
        self.state.channels().channel(channel)?;
        self.scheduler.cancel_channel_events(channel);
        Ok(())
    }

    /// Takes the next frame of unit `sfont_id` into `out`. In headless mode the
    /// frame is rendered on the calling thread. Returns `false` when no frame
    /// was ready.
    pub fn pull(&self, sfont_id: u32, out: &mut StereoFrame) -> Result<bool, SynthError> {
        if !self.state.is_running() {
            return Err(SynthError::NotRunning);
        }
        self.state.with_unit(sfont_id, |unit| unit.pull(out))
    }

    pub fn select(&self, channel: usize, sfont_id: u32, bank: u32, preset: u32) -> Result<(), SynthError> {
        self.state.select(channel, sfont_id, bank, preset)
    }

    pub fn note_on(&self, channel: usize, key: u8, velocity: u8) -> Result<(), SynthError> {
        self.state.note_on(channel, key, velocity)
    }

    pub fn note_off(&self, channel: usize, key: u8) -> Result<(), SynthError> {
        self.state.note_off(channel, key)
    }

    pub fn pitch_wheel(&self, channel: usize, semitones: f32) -> Result<(), SynthError> {
        self.state.pitch_wheel(channel, semitones)
    }

    pub fn pitch_range(&self, channel: usize, semitones: f32) -> Result<(), SynthError> {
        self.state.pitch_range(channel, semitones)
    }

    pub fn reset(&self) -> Result<(), SynthError> {
        self.state.reset()
    }

    pub fn add_filter(&self, channel: usize, path: impl AsRef<Path>, label: &str) -> Result<(), SynthError> {
        self.state.add_filter(channel, path.as_ref(), label)
    }

    pub fn remove_filter(&self, channel: usize, label: Option<&str>) -> Result<usize, SynthError> {
        self.state.remove_filter(channel, label)
    }

    pub fn enable_filter(&self, channel: usize, label: &str) -> Result<(), SynthError> {
        self.state.enable_filter(channel, label)
    }

    pub fn disable_filter(&self, channel: usize, label: &str) -> Result<(), SynthError> {
        self.state.disable_filter(channel, label)
    }

    pub fn set_control(
        &self,
        channel: usize,
        label: &str,
        control: impl Into<ControlRef>,
        value: f32,
    ) -> Result<f32, SynthError> {
        self.state.set_control(channel, label, &control.into(), value)
    }

    pub fn get_control_value(
        &self,
        channel: usize,
        label: &str,
        control: impl Into<ControlRef>,
    ) -> Result<f32, SynthError> {
        self.state.get_control_value(channel, label, &control.into())
    }

    pub fn set_gain(&self, channel: usize, gain: f32) -> Result<(), SynthError> {
        self.state.set_gain(channel, gain)
    }

    pub fn filter_labels(&self, channel: usize) -> Result<Vec<String>, SynthError> {
        self.state.filter_labels(channel)
    }

    pub fn chain_len(&self, channel: usize) -> Result<usize, SynthError> {
        self.state.chain_len(channel)
    }

    pub fn filter_is_enabled(&self, channel: usize) -> Result<bool, SynthError> {
        self.state.filter_is_enabled(channel)
    }

    pub fn query_filter(&self, path: impl AsRef<Path>, label: &str) -> Result<Vec<ControlInfo>, SynthError> {
        self.state.query_filter(path.as_ref(), label)
    }
}

impl Drop for Synth {
    fn drop(&mut self) {
        if self.state.is_running() {
            self.stop();
        }
        self.scheduler.shutdown();
    }
}
