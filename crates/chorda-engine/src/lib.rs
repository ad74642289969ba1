//! Chorda Engine
//! =============
//! Soundfont voice rendering with per-channel LADSPA effect chains and a
//! deferred event dispatcher.
//!
//! One render unit runs per loaded soundfont. Each unit owns a high priority
//! render thread that produces fixed size stereo frames into a ring buffer,
//! while the output device callback drains that buffer at the hardware
//! cadence. Channel filter chains are shared between all units and guarded per
//! channel.

pub mod channel;
pub mod command;
pub mod config;
pub mod error;
pub mod font;
pub mod host;
pub mod render;
pub mod ring_buffer;
pub mod scheduler;
pub mod state;
pub mod synth;

#[cfg(test)]
pub(crate) mod testing;

pub use ladspa_sys;

pub use channel::{Channel, ChannelState, ChannelTable};
pub use command::{Command, ControlRef, TimedCommand};
pub use config::{OutputMode, SynthConfig};
pub use error::{ConfigError, ControlError, FilterError, FontError, SynthError};
pub use font::{FontLoader, RustySynthFont, RustySynthLoader, SoundFont};
pub use host::{
    query_filter, AudioPlugin, Control, ControlInfo, Filter, LadspaLoader, LadspaPlugin,
    PluginLoader, PortHint, PortInfo, PortKind,
};
pub use render::{FrameConsumer, UnitHandle, UnitMessage};
pub use ring_buffer::{RingBuffer, StereoFrame, FRAME_SAMPLES};
pub use scheduler::{EventId, ScheduledEvent, Scheduler};
pub use state::{should_fire, EngineEpoch, EngineState};
pub use synth::Synth;
