use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Most soundfonts (and therefore render units) a single engine may load.
pub const MAX_SOUNDFONTS: usize = 13;
pub const DEFAULT_NUM_CHANNELS: usize = 64;
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;
pub const DEFAULT_RING_DEPTH: usize = 4;
pub const DEFAULT_REQUEST_DEPTH: usize = 8;
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Where rendered frames go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Open an output stream per render unit.
    #[default]
    Device,
    /// No device; the host pulls frames through [`crate::Synth::pull`].
    Headless,
}

/// Engine start-up configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    /// Soundfont files in load order. The soundfont id of an entry is its
    /// position plus one.
    pub sfpaths: Vec<PathBuf>,
    pub num_channels: usize,
    pub sample_rate: u32,
    /// Frames held by each unit's ring buffer.
    pub ring_depth: usize,
    /// Capacity of the frames-requested signal queue.
    pub request_depth: usize,
    /// Capacity of each unit's command queue.
    pub queue_capacity: usize,
    pub output: OutputMode,
    /// Output device name; the host default device is used when absent.
    pub device: Option<String>,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            sfpaths: Vec::new(),
            num_channels: DEFAULT_NUM_CHANNELS,
            sample_rate: DEFAULT_SAMPLE_RATE,
            ring_depth: DEFAULT_RING_DEPTH,
            request_depth: DEFAULT_REQUEST_DEPTH,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            output: OutputMode::Device,
            device: None,
        }
    }
}

impl SynthConfig {
    pub fn with_soundfonts<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.sfpaths = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn headless(mut self) -> Self {
        self.output = OutputMode::Headless;
        self
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: SynthConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_channels == 0 {
            return Err(ConfigError::Invalid("num_channels must be at least 1"));
        }
        if self.sample_rate == 0 {
            return Err(ConfigError::Invalid("sample_rate must be non-zero"));
        }
        if self.ring_depth == 0 {
            return Err(ConfigError::Invalid("ring_depth must be at least 1"));
        }
        if self.request_depth == 0 || self.queue_capacity == 0 {
            return Err(ConfigError::Invalid("queue capacities must be non-zero"));
        }
        if self.sfpaths.len() > MAX_SOUNDFONTS {
            return Err(ConfigError::TooManySoundFonts {
                count: self.sfpaths.len(),
                max: MAX_SOUNDFONTS,
            });
        }
        Ok(())
    }
}
