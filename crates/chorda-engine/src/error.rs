use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading, addressing or unloading a hosted filter.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("failed to open plugin library {path}: {source}")]
    LibraryOpen {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },
    #[error("plugin library {path} does not export ladspa_descriptor: {source}")]
    MissingSymbol {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },
    #[error("no plugin labelled {label} in {path}")]
    LabelNotFound { label: String, path: PathBuf },
    #[error("plugin {label} failed to instantiate")]
    Instantiate { label: String },
    #[error("plugin {label} is missing the {entry} entry point")]
    MissingEntryPoint { label: String, entry: &'static str },
    #[error("duplicate plugin label {0} not allowed on a channel")]
    Duplicate(String),
    #[error("no filter labelled {0} on this channel")]
    NotFound(String),
}

/// Rejections produced when writing a control value.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ControlError {
    #[error("no control named {0}")]
    NoSuchName(String),
    #[error("no control at index {0}")]
    NoSuchIndex(usize),
    #[error("{name}: value {value} is above the upper bound {upper}")]
    AboveBounds { name: String, value: f32, upper: f32 },
    #[error("{name}: value {value} is below the lower bound {lower}")]
    BelowBounds { name: String, value: f32, lower: f32 },
    #[error("{name}: value {value} is not a number")]
    NotFinite { name: String, value: f32 },
    #[error("{0} is an output control and cannot be written")]
    ReadOnly(String),
}

impl ControlError {
    /// `true` for the "addressed control does not exist" outcomes.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ControlError::NoSuchName(_) | ControlError::NoSuchIndex(_))
    }
}

/// Errors reported by the soundfont boundary.
#[derive(Debug, Error)]
pub enum FontError {
    #[error("failed to read soundfont {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode soundfont {path}: {reason}")]
    Decode { path: PathBuf, reason: String },
    #[error("bank {bank} preset {preset} is not available")]
    PresetUnavailable { bank: u32, preset: u32 },
}

/// Configuration validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(&'static str),
    #[error("too many soundfonts: {count} (at most {max})")]
    TooManySoundFonts { count: usize, max: usize },
}

/// Top level error type for engine operations.
#[derive(Debug, Error)]
pub enum SynthError {
    #[error("channel {0} is out of range")]
    InvalidChannel(usize),
    #[error("channel {0} is not bound to a render unit")]
    UnboundChannel(usize),
    #[error("no render unit for soundfont id {0}")]
    UnknownSoundFont(u32),
    #[error("render unit {0} command queue is full")]
    QueueFull(u32),
    #[error("engine is not running")]
    NotRunning,
    #[error("engine is already running")]
    AlreadyRunning,
    #[error("soundfont file ({0}) not found")]
    SoundFontMissing(PathBuf),
    #[error("audio device error: {0}")]
    Device(String),
    #[error("failed to spawn render thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error(transparent)]
    Control(#[from] ControlError),
    #[error(transparent)]
    Font(#[from] FontError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
