//! Render units: one per soundfont, each with its command queue, render
//! thread, ring buffer and output consumer.

pub mod consumer;
#[cfg(feature = "native")]
pub mod device;
pub mod priority;
mod renderer;
pub mod unit;

pub use consumer::FrameConsumer;
pub use priority::{promote_current_thread, Promotion};
pub use renderer::Renderer;
pub use unit::{UnitHandle, UnitMessage};
