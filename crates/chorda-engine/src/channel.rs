use std::path::Path;

use parking_lot::{Mutex, MutexGuard};
use tracing::info;

use crate::command::ControlRef;
use crate::error::{FilterError, SynthError};
use crate::host::{Filter, PluginLoader};
use crate::ring_buffer::FRAME_SAMPLES;

/// Filter chain and gain of one logical channel.
#[derive(Debug, Default)]
pub struct ChannelState {
    filters: Vec<Filter>,
    gain: f32,
}

impl ChannelState {
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn has_enabled_filter(&self) -> bool {
        self.filters.iter().any(Filter::is_enabled)
    }

    fn position(&self, label: &str) -> Option<usize> {
        self.filters.iter().position(|f| f.label() == label)
    }

    fn filter_mut(&mut self, label: &str) -> Result<&mut Filter, FilterError> {
        self.filters
            .iter_mut()
            .find(|f| f.label() == label)
            .ok_or_else(|| FilterError::NotFound(label.to_owned()))
    }

    /// Applies gain and every enabled filter, in insertion order. Does nothing
    /// unless at least one filter is enabled.
    pub fn run_chain(&mut self, left: &mut [f32], right: &mut [f32]) {
        if !self.has_enabled_filter() {
            return;
        }
        if self.gain != 0.0 {
            let scale = 1.0 + self.gain;
            for sample in left.iter_mut().chain(right.iter_mut()) {
                *sample *= scale;
            }
        }
        for filter in self.filters.iter_mut() {
            filter.run_stereo(left, right);
        }
    }
}

/// One logical channel. All access to the chain goes through the channel lock,
/// which the render path also takes while running the chain.
#[derive(Debug, Default)]
pub struct Channel {
    state: Mutex<ChannelState>,
}

impl Channel {
    pub fn lock(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock()
    }

    /// Loads `label` from `path` and appends it to the chain, disabled.
    ///
    /// The plugin is loaded without holding the lock; the duplicate check is
    /// repeated before insertion so at most one filter per label ever exists.
    pub fn add_filter(
        &self,
        loader: &dyn PluginLoader,
        path: &Path,
        label: &str,
        sample_rate: u32,
    ) -> Result<(), FilterError> {
        if self.lock().position(label).is_some() {
            return Err(FilterError::Duplicate(label.to_owned()));
        }

        let plugin = loader.load(path, label, sample_rate)?;
        let filter = Filter::new(plugin, sample_rate, FRAME_SAMPLES);

        let mut state = self.lock();
        if state.position(label).is_some() {
            drop(state);
            drop(filter);
            return Err(FilterError::Duplicate(label.to_owned()));
        }
        state.filters.push(filter);
        info!(label, path = %path.display(), chain_len = state.filters.len(), "filter added");
        Ok(())
    }

    /// Removes the labelled filter, or every filter when `label` is `None`.
    /// Returns how many filters were removed.
    pub fn remove_filter(&self, label: Option<&str>) -> Result<usize, FilterError> {
        let removed: Vec<Filter> = {
            let mut state = self.lock();
            match label {
                None => std::mem::take(&mut state.filters),
                Some(label) => {
                    let index = state
                        .position(label)
                        .ok_or_else(|| FilterError::NotFound(label.to_owned()))?;
                    vec![state.filters.remove(index)]
                }
            }
        };
        // Filters deactivate and unload on drop, outside the lock.
        let count = removed.len();
        drop(removed);
        Ok(count)
    }

    pub fn enable_filter(&self, label: &str) -> Result<(), FilterError> {
        self.lock().filter_mut(label)?.enable();
        Ok(())
    }

    pub fn disable_filter(&self, label: &str) -> Result<(), FilterError> {
        self.lock().filter_mut(label)?.disable();
        Ok(())
    }

    pub fn has_enabled_filter(&self) -> bool {
        self.lock().has_enabled_filter()
    }

    pub fn set_gain(&self, gain: f32) {
        self.lock().gain = gain;
    }

    pub fn gain(&self) -> f32 {
        self.lock().gain
    }

    pub fn set_control(
        &self,
        label: &str,
        control: &ControlRef,
        value: f32,
    ) -> Result<f32, SynthError> {
        let mut state = self.lock();
        let filter = state.filter_mut(label)?;
        Ok(filter.set_control(control, value)?)
    }

    pub fn control_value(&self, label: &str, control: &ControlRef) -> Result<f32, SynthError> {
        let mut state = self.lock();
        let filter = state.filter_mut(label)?;
        Ok(filter.control_value(control)?)
    }

    pub fn labels(&self) -> Vec<String> {
        self.lock()
            .filters
            .iter()
            .map(|f| f.label().to_owned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn run_chain(&self, left: &mut [f32], right: &mut [f32]) {
        self.lock().run_chain(left, right);
    }

    /// Removes every filter and resets the gain.
    pub fn clear(&self) {
        let removed = {
            let mut state = self.lock();
            state.gain = 0.0;
            std::mem::take(&mut state.filters)
        };
        drop(removed);
    }
}

/// Fixed set of channels, created up front.
#[derive(Debug)]
pub struct ChannelTable {
    channels: Box<[Channel]>,
}

impl ChannelTable {
    pub fn new(num_channels: usize) -> Self {
        Self {
            channels: (0..num_channels).map(|_| Channel::default()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channel(&self, channel: usize) -> Result<&Channel, SynthError> {
        self.channels
            .get(channel)
            .ok_or(SynthError::InvalidChannel(channel))
    }

    /// Render path entry point: runs the channel's chain over one block of
    /// isolated voice audio. Out-of-range channels pass through untouched.
    pub fn process(&self, channel: usize, left: &mut [f32], right: &mut [f32]) {
        if let Some(channel) = self.channels.get(channel) {
            channel.run_chain(left, right);
        }
    }

    pub fn clear_all(&self) {
        for channel in self.channels.iter() {
            channel.clear();
        }
    }
}
