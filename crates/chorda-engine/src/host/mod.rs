//! Native effect plugin hosting.
//!
//! [`AudioPlugin`] is the seam between host logic and a plugin ABI. The
//! [`Filter`] type does port classification, buffer ownership and control
//! bookkeeping against that trait, while [`LadspaPlugin`] is the only code that
//! touches the raw LADSPA descriptor table.

mod control;
mod filter;
mod ladspa;

use std::path::Path;

use ladspa_sys as ffi;

pub use control::{default_value, Control, ControlInfo};
pub use filter::Filter;
pub use ladspa::{LadspaLoader, LadspaPlugin};

use crate::error::FilterError;
use crate::ring_buffer::FRAME_SAMPLES;

/// Role of a single plugin port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    AudioInput,
    AudioOutput,
    ControlInput,
    ControlOutput,
}

impl PortKind {
    pub fn from_descriptor(descriptor: ffi::LADSPA_PortDescriptor) -> Option<Self> {
        let input = ffi::is_port_input(descriptor);
        let output = ffi::is_port_output(descriptor);
        if ffi::is_port_audio(descriptor) {
            match (input, output) {
                (true, false) => Some(PortKind::AudioInput),
                (false, true) => Some(PortKind::AudioOutput),
                _ => None,
            }
        } else if ffi::is_port_control(descriptor) {
            match (input, output) {
                (true, false) => Some(PortKind::ControlInput),
                (false, true) => Some(PortKind::ControlOutput),
                _ => None,
            }
        } else {
            None
        }
    }

    pub fn is_control(self) -> bool {
        matches!(self, PortKind::ControlInput | PortKind::ControlOutput)
    }
}

/// Range hint attached to a port, in LADSPA terms.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PortHint {
    pub descriptor: ffi::LADSPA_PortRangeHintDescriptor,
    pub lower: f32,
    pub upper: f32,
}

impl PortHint {
    pub fn new(descriptor: ffi::LADSPA_PortRangeHintDescriptor, lower: f32, upper: f32) -> Self {
        Self {
            descriptor,
            lower,
            upper,
        }
    }
}

/// Description of one plugin port.
#[derive(Debug, Clone, PartialEq)]
pub struct PortInfo {
    pub name: String,
    /// `None` for ports whose descriptor is neither a valid audio nor control port.
    pub kind: Option<PortKind>,
    pub hint: PortHint,
}

impl PortInfo {
    pub fn new(name: impl Into<String>, kind: PortKind, hint: PortHint) -> Self {
        Self {
            name: name.into(),
            kind: Some(kind),
            hint,
        }
    }
}

/// Instance of a loaded effect plugin.
///
/// Implementations own the plugin instance and whatever library handle keeps
/// its code mapped; dropping the value must release both.
pub trait AudioPlugin: Send {
    fn label(&self) -> &str;

    fn name(&self) -> &str;

    fn ports(&self) -> &[PortInfo];

    /// Plugin declares that input and output ports must not share a buffer.
    fn inplace_broken(&self) -> bool;

    /// Connects `port` to the memory at `data`.
    ///
    /// # Safety
    /// `data` must point at a buffer large enough for every subsequent
    /// [`AudioPlugin::run`] call (or a single `f32` for control ports) and stay
    /// valid until the port is reconnected or the plugin is dropped.
    unsafe fn connect_port(&mut self, port: usize, data: *mut f32);

    fn activate(&mut self);

    fn deactivate(&mut self);

    /// Processes `samples` frames.
    ///
    /// # Safety
    /// Every port must be connected to valid memory holding at least `samples`
    /// values.
    unsafe fn run(&mut self, samples: usize);

    /// Releases the plugin instance. Called at most once, before drop.
    fn cleanup(&mut self);
}

/// Creates plugin instances by library path and label.
pub trait PluginLoader: Send + Sync {
    fn load(
        &self,
        path: &Path,
        label: &str,
        sample_rate: u32,
    ) -> Result<Box<dyn AudioPlugin>, FilterError>;
}

/// Loads `label` from `path`, reports its controls and unloads it again.
pub fn query_filter(
    loader: &dyn PluginLoader,
    path: &Path,
    label: &str,
    sample_rate: u32,
) -> Result<Vec<ControlInfo>, FilterError> {
    let plugin = loader.load(path, label, sample_rate)?;
    let filter = Filter::new(plugin, sample_rate, FRAME_SAMPLES);
    Ok(filter
        .controls()
        .iter()
        .enumerate()
        .map(|(index, control)| ControlInfo::new(index, control))
        .collect())
}
