use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Addresses a filter control either by its name or by its position among
/// the filter's controls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ControlRef {
    Index(usize),
    Name(String),
}

impl From<&str> for ControlRef {
    fn from(name: &str) -> Self {
        ControlRef::Name(name.to_owned())
    }
}

impl From<usize> for ControlRef {
    fn from(index: usize) -> Self {
        ControlRef::Index(index)
    }
}

impl fmt::Display for ControlRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlRef::Index(index) => write!(f, "#{index}"),
            ControlRef::Name(name) => f.write_str(name),
        }
    }
}

/// A single engine operation, executable immediately or at a later time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    NoteOn {
        channel: usize,
        #[serde(alias = "midi_code")]
        key: u8,
        velocity: u8,
    },
    NoteOff {
        channel: usize,
        #[serde(alias = "midi_code")]
        key: u8,
    },
    /// Binds the channel to the unit rendering `sfont_id` and selects a preset.
    Select {
        channel: usize,
        sfont_id: u32,
        #[serde(default)]
        bank: u32,
        #[serde(default)]
        preset: u32,
    },
    /// Bends the channel by `semitones` relative to its current pitch range.
    PitchWheel {
        channel: usize,
        #[serde(alias = "pitch_change")]
        semitones: f32,
    },
    PitchRange {
        channel: usize,
        semitones: f32,
    },
    Reset,
    FilterAdd {
        channel: usize,
        #[serde(alias = "plugin_path")]
        path: PathBuf,
        #[serde(alias = "plugin_label")]
        label: String,
    },
    /// Removes one filter, or every filter on the channel when `label` is absent.
    FilterRemove {
        channel: usize,
        #[serde(default, alias = "plugin_label")]
        label: Option<String>,
    },
    FilterEnable {
        channel: usize,
        #[serde(alias = "plugin_label")]
        label: String,
    },
    FilterDisable {
        channel: usize,
        #[serde(alias = "plugin_label")]
        label: String,
    },
    FilterControl {
        channel: usize,
        #[serde(alias = "plugin_label")]
        label: String,
        control: ControlRef,
        value: f32,
    },
    Gain {
        channel: usize,
        gain: f32,
    },
}

impl Command {
    /// Channel the command targets. `None` for engine-wide commands.
    pub fn channel(&self) -> Option<usize> {
        match self {
            Command::Reset => None,
            Command::NoteOn { channel, .. }
            | Command::NoteOff { channel, .. }
            | Command::Select { channel, .. }
            | Command::PitchWheel { channel, .. }
            | Command::PitchRange { channel, .. }
            | Command::FilterAdd { channel, .. }
            | Command::FilterRemove { channel, .. }
            | Command::FilterEnable { channel, .. }
            | Command::FilterDisable { channel, .. }
            | Command::FilterControl { channel, .. }
            | Command::Gain { channel, .. } => Some(*channel),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Command::NoteOn { .. } => "note_on",
            Command::NoteOff { .. } => "note_off",
            Command::Select { .. } => "select",
            Command::PitchWheel { .. } => "pitch_wheel",
            Command::PitchRange { .. } => "pitch_range",
            Command::Reset => "reset",
            Command::FilterAdd { .. } => "filter_add",
            Command::FilterRemove { .. } => "filter_remove",
            Command::FilterEnable { .. } => "filter_enable",
            Command::FilterDisable { .. } => "filter_disable",
            Command::FilterControl { .. } => "filter_control",
            Command::Gain { .. } => "gain",
        }
    }
}

/// A command paired with a delay, in milliseconds from the time it is handed
/// to the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedCommand {
    #[serde(default)]
    pub when: u64,
    #[serde(flatten)]
    pub command: Command,
}
