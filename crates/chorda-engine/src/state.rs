use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info};

use crate::channel::ChannelTable;
use crate::command::{Command, ControlRef};
use crate::config::SynthConfig;
use crate::error::SynthError;
use crate::host::{query_filter, ControlInfo, PluginLoader};
use crate::render::{UnitHandle, UnitMessage};

/// Identifies one run of the engine. A new epoch begins on every start, so a
/// value captured earlier can be compared to tell whether a restart happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EngineEpoch(u64);

impl EngineEpoch {
    pub const INITIAL: EngineEpoch = EngineEpoch(0);

    pub fn id(self) -> u64 {
        self.0
    }

    pub fn next(self) -> EngineEpoch {
        EngineEpoch(self.0.wrapping_add(1))
    }
}

/// All engine state shared between the API, the event dispatcher and the
/// render threads.
pub struct EngineState {
    config: SynthConfig,
    channels: Arc<ChannelTable>,
    units: RwLock<Vec<UnitHandle>>,
    /// Channel to soundfont id binding; `None` while unbound.
    allocation: Mutex<Vec<Option<u32>>>,
    running: AtomicBool,
    epoch: AtomicU64,
    /// Held for writing while starting or stopping, for reading while a
    /// deferred command checks its epoch and executes.
    lifecycle: RwLock<()>,
    plugins: Arc<dyn PluginLoader>,
}

impl EngineState {
    pub fn new(config: SynthConfig, plugins: Arc<dyn PluginLoader>) -> Self {
        let channels = Arc::new(ChannelTable::new(config.num_channels));
        let allocation = Mutex::new(vec![None; config.num_channels]);
        Self {
            config,
            channels,
            units: RwLock::new(Vec::new()),
            allocation,
            running: AtomicBool::new(false),
            epoch: AtomicU64::new(EngineEpoch::INITIAL.id()),
            lifecycle: RwLock::new(()),
            plugins,
        }
    }

    pub fn config(&self) -> &SynthConfig {
        &self.config
    }

    pub fn channels(&self) -> &Arc<ChannelTable> {
        &self.channels
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn epoch(&self) -> EngineEpoch {
        EngineEpoch(self.epoch.load(Ordering::Acquire))
    }

    /// Installs freshly started units and opens a new epoch.
    pub(crate) fn begin_run(&self, units: Vec<UnitHandle>) -> EngineEpoch {
        let _guard = self.lifecycle.write();
        *self.units.write() = units;
        let epoch = self.epoch().next();
        self.epoch.store(epoch.id(), Ordering::Release);
        self.running.store(true, Ordering::Release);
        info!(epoch = epoch.id(), "engine started");
        epoch
    }

    /// Marks the engine stopped and hands back its units for shutdown. Channel
    /// bindings and every filter are cleared.
    pub(crate) fn end_run(&self) -> Vec<UnitHandle> {
        let _guard = self.lifecycle.write();
        self.running.store(false, Ordering::Release);
        let units = std::mem::take(&mut *self.units.write());
        self.allocation.lock().fill(None);
        self.channels.clear_all();
        if !units.is_empty() {
            info!(epoch = self.epoch().id(), "engine stopped");
        }
        units
    }

    /// Runs `command` only if the engine is running in `epoch`. Returns `None`
    /// when the command was discarded as stale.
    pub fn execute_in_epoch(
        &self,
        epoch: EngineEpoch,
        command: &Command,
    ) -> Option<Result<(), SynthError>> {
        let _guard = self.lifecycle.read();
        if !should_fire(epoch, self.is_running(), self.epoch()) {
            return None;
        }
        Some(self.execute(command))
    }

    pub fn execute(&self, command: &Command) -> Result<(), SynthError> {
        debug!(kind = command.kind(), channel = ?command.channel(), "executing command");
        match command {
            Command::NoteOn {
                channel,
                key,
                velocity,
            } => self.note_on(*channel, *key, *velocity),
            Command::NoteOff { channel, key } => self.note_off(*channel, *key),
            Command::Select {
                channel,
                sfont_id,
                bank,
                preset,
            } => self.select(*channel, *sfont_id, *bank, *preset),
            Command::PitchWheel { channel, semitones } => self.pitch_wheel(*channel, *semitones),
            Command::PitchRange { channel, semitones } => self.pitch_range(*channel, *semitones),
            Command::Reset => self.reset(),
            Command::FilterAdd {
                channel,
                path,
                label,
            } => self.add_filter(*channel, path, label),
            Command::FilterRemove { channel, label } => {
                self.remove_filter(*channel, label.as_deref()).map(|_| ())
            }
            Command::FilterEnable { channel, label } => self.enable_filter(*channel, label),
            Command::FilterDisable { channel, label } => self.disable_filter(*channel, label),
            Command::FilterControl {
                channel,
                label,
                control,
                value,
            } => self.set_control(*channel, label, control, *value).map(|_| ()),
            Command::Gain { channel, gain } => self.set_gain(*channel, *gain),
        }
    }

    fn check_channel(&self, channel: usize) -> Result<(), SynthError> {
        if channel < self.channels.len() {
            Ok(())
        } else {
            Err(SynthError::InvalidChannel(channel))
        }
    }

    /// Soundfont id the channel is bound to, if any.
    pub fn bound_soundfont(&self, channel: usize) -> Option<u32> {
        self.allocation.lock().get(channel).copied().flatten()
    }

    fn send_to_unit(&self, sfont_id: u32, message: UnitMessage) -> Result<(), SynthError> {
        let units = self.units.read();
        let unit = units
            .iter()
            .find(|u| u.sfont_id() == sfont_id)
            .ok_or(SynthError::UnknownSoundFont(sfont_id))?;
        unit.send(message)
    }

    fn send_to_channel_unit(&self, channel: usize, message: UnitMessage) -> Result<(), SynthError> {
        self.check_channel(channel)?;
        let sfont_id = self
            .bound_soundfont(channel)
            .ok_or(SynthError::UnboundChannel(channel))?;
        self.send_to_unit(sfont_id, message)
    }

    /// Binds `channel` to the unit rendering `sfont_id` if it is not bound yet,
    /// then selects `bank`/`preset` on the bound unit. Existing bindings are
    /// never moved to another unit.
    pub fn select(&self, channel: usize, sfont_id: u32, bank: u32, preset: u32) -> Result<(), SynthError> {
        self.check_channel(channel)?;
        let bound = {
            let mut allocation = self.allocation.lock();
            match allocation[channel] {
                Some(bound) => bound,
                None => {
                    let known = self.units.read().iter().any(|u| u.sfont_id() == sfont_id);
                    if !known {
                        return Err(SynthError::UnknownSoundFont(sfont_id));
                    }
                    allocation[channel] = Some(sfont_id);
                    debug!(channel, sfont_id, "channel bound to render unit");
                    sfont_id
                }
            }
        };
        self.send_to_unit(bound, UnitMessage::Select { channel, bank, preset })
    }

    pub fn note_on(&self, channel: usize, key: u8, velocity: u8) -> Result<(), SynthError> {
        self.send_to_channel_unit(channel, UnitMessage::NoteOn { channel, key, velocity })
    }

    pub fn note_off(&self, channel: usize, key: u8) -> Result<(), SynthError> {
        self.send_to_channel_unit(channel, UnitMessage::NoteOff { channel, key })
    }

    pub fn pitch_wheel(&self, channel: usize, semitones: f32) -> Result<(), SynthError> {
        self.send_to_channel_unit(channel, UnitMessage::PitchWheel { channel, semitones })
    }

    pub fn pitch_range(&self, channel: usize, semitones: f32) -> Result<(), SynthError> {
        self.send_to_channel_unit(channel, UnitMessage::PitchRange { channel, semitones })
    }

    /// Resets every unit's font and forgets all channel bindings.
    pub fn reset(&self) -> Result<(), SynthError> {
        let mut result = Ok(());
        for unit in self.units.read().iter() {
            if let Err(err) = unit.send(UnitMessage::Reset) {
                result = Err(err);
            }
        }
        self.allocation.lock().fill(None);
        result
    }

    pub fn add_filter(&self, channel: usize, path: &Path, label: &str) -> Result<(), SynthError> {
        self.channels.channel(channel)?.add_filter(
            self.plugins.as_ref(),
            path,
            label,
            self.config.sample_rate,
        )?;
        Ok(())
    }

    pub fn remove_filter(&self, channel: usize, label: Option<&str>) -> Result<usize, SynthError> {
        Ok(self.channels.channel(channel)?.remove_filter(label)?)
    }

    pub fn remove_all_filters(&self) {
        self.channels.clear_all();
    }

    pub fn enable_filter(&self, channel: usize, label: &str) -> Result<(), SynthError> {
        Ok(self.channels.channel(channel)?.enable_filter(label)?)
    }

    pub fn disable_filter(&self, channel: usize, label: &str) -> Result<(), SynthError> {
        Ok(self.channels.channel(channel)?.disable_filter(label)?)
    }

    pub fn set_control(
        &self,
        channel: usize,
        label: &str,
        control: &ControlRef,
        value: f32,
    ) -> Result<f32, SynthError> {
        self.channels.channel(channel)?.set_control(label, control, value)
    }

    pub fn get_control_value(
        &self,
        channel: usize,
        label: &str,
        control: &ControlRef,
    ) -> Result<f32, SynthError> {
        self.channels.channel(channel)?.control_value(label, control)
    }

    pub fn set_gain(&self, channel: usize, gain: f32) -> Result<(), SynthError> {
        self.channels.channel(channel)?.set_gain(gain);
        Ok(())
    }

    pub fn filter_labels(&self, channel: usize) -> Result<Vec<String>, SynthError> {
        Ok(self.channels.channel(channel)?.labels())
    }

    pub fn chain_len(&self, channel: usize) -> Result<usize, SynthError> {
        Ok(self.channels.channel(channel)?.len())
    }

    /// `true` when the channel has at least one enabled filter.
    pub fn filter_is_enabled(&self, channel: usize) -> Result<bool, SynthError> {
        Ok(self.channels.channel(channel)?.has_enabled_filter())
    }

    pub fn query_filter(&self, path: &Path, label: &str) -> Result<Vec<ControlInfo>, SynthError> {
        Ok(query_filter(
            self.plugins.as_ref(),
            path,
            label,
            self.config.sample_rate,
        )?)
    }

    pub(crate) fn with_unit<R>(
        &self,
        sfont_id: u32,
        f: impl FnOnce(&UnitHandle) -> R,
    ) -> Result<R, SynthError> {
        let units = self.units.read();
        let unit = units
            .iter()
            .find(|u| u.sfont_id() == sfont_id)
            .ok_or(SynthError::UnknownSoundFont(sfont_id))?;
        Ok(f(unit))
    }
}

/// Fire-time check for deferred commands: the engine must be running and still
/// be in the epoch the command was scheduled in.
pub fn should_fire(scheduled: EngineEpoch, running: bool, current: EngineEpoch) -> bool {
    running && scheduled == current
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring_buffer::StereoFrame;
    use crate::testing::{FakeFont, MockLoader, MockPlugin};

    fn state_with_units(ids: &[u32]) -> EngineState {
        let config = SynthConfig {
            num_channels: 8,
            ..SynthConfig::default()
        };
        let loader = MockLoader::new().with("amp", MockPlugin::stereo_gain);
        let state = EngineState::new(config, Arc::new(loader));
        let units = ids
            .iter()
            .map(|id| {
                UnitHandle::inline(
                    *id,
                    Box::new(FakeFont::new()),
                    Arc::clone(state.channels()),
                    state.config(),
                )
            })
            .collect();
        state.begin_run(units);
        state
    }

    #[test]
    fn epoch_advances_per_run() {
        let state = state_with_units(&[1]);
        let first = state.epoch();
        assert!(state.is_running());
        drop(state.end_run());
        assert!(!state.is_running());
        state.begin_run(Vec::new());
        assert_eq!(state.epoch(), first.next());
    }

    #[test]
    fn fire_check_requires_running_and_matching_epoch() {
        let epoch = EngineEpoch::INITIAL.next();
        assert!(should_fire(epoch, true, epoch));
        assert!(!should_fire(epoch, false, epoch));
        assert!(!should_fire(epoch, true, epoch.next()));
    }

    #[test]
    fn note_on_requires_binding() {
        let state = state_with_units(&[1]);
        assert!(matches!(
            state.note_on(2, 60, 100),
            Err(SynthError::UnboundChannel(2))
        ));
        assert!(matches!(
            state.note_on(99, 60, 100),
            Err(SynthError::InvalidChannel(99))
        ));
    }

    #[test]
    fn select_binds_once_and_never_moves() {
        let state = state_with_units(&[1, 2]);
        state.select(0, 2, 0, 0).unwrap();
        assert_eq!(state.bound_soundfont(0), Some(2));
        state.select(0, 1, 0, 3).unwrap();
        assert_eq!(state.bound_soundfont(0), Some(2));
        assert!(matches!(
            state.select(1, 9, 0, 0),
            Err(SynthError::UnknownSoundFont(9))
        ));
        assert_eq!(state.bound_soundfont(1), None);
    }

    #[test]
    fn reset_clears_bindings() {
        let state = state_with_units(&[1]);
        state.select(3, 1, 0, 0).unwrap();
        state.reset().unwrap();
        assert_eq!(state.bound_soundfont(3), None);
    }

    #[test]
    fn stop_clears_filters_and_bindings() {
        let state = state_with_units(&[1]);
        state.select(3, 1, 0, 0).unwrap();
        state.add_filter(3, Path::new("amp.so"), "amp").unwrap();
        drop(state.end_run());
        assert_eq!(state.chain_len(3).unwrap(), 0);
        assert_eq!(state.bound_soundfont(3), None);
    }

    #[test]
    fn executes_filter_commands() {
        let state = state_with_units(&[1]);
        state
            .execute(&Command::FilterAdd {
                channel: 4,
                path: "amp.so".into(),
                label: "amp".into(),
            })
            .unwrap();
        state
            .execute(&Command::FilterEnable {
                channel: 4,
                label: "amp".into(),
            })
            .unwrap();
        state
            .execute(&Command::FilterControl {
                channel: 4,
                label: "amp".into(),
                control: ControlRef::Name("Gain".into()),
                value: 2.5,
            })
            .unwrap();
        assert!(state.filter_is_enabled(4).unwrap());
        assert_eq!(
            state
                .get_control_value(4, "amp", &ControlRef::Index(0))
                .unwrap(),
            2.5
        );
    }

    #[test]
    fn stale_epoch_commands_are_discarded() {
        let state = state_with_units(&[1]);
        let stale = state.epoch();
        drop(state.end_run());
        state.begin_run(Vec::new());
        let outcome = state.execute_in_epoch(stale, &Command::Gain { channel: 0, gain: 1.0 });
        assert!(outcome.is_none());
        assert_eq!(state.channels().channel(0).unwrap().gain(), 0.0);
    }

    #[test]
    fn pull_renders_bound_channel() {
        let state = state_with_units(&[1]);
        state.select(0, 1, 0, 0).unwrap();
        state.note_on(0, 64, 90).unwrap();
        let mut frame = StereoFrame::silent();
        assert!(state.with_unit(1, |u| u.pull(&mut frame)).unwrap());
        assert!(!frame.is_silent());
    }
}
