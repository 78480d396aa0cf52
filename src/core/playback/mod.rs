//! Audio playback abstractions.
//!
//! The crossfade player shapes gain envelopes and drives an output
//! backend through the [`PlaybackSink`] trait; the production sink is
//! cpal-backed, tests capture samples in memory.

mod crossfade;
mod output;

use async_trait::async_trait;

use super::audio::AudioError;

pub use crossfade::{CrossfadeConfig, CrossfadePlayer, PlaybackHandle};
pub use output::CpalOutputSink;

/// Mutable playback volume, independent of fade envelopes.
///
/// The session reuse guard mutes through this seam while preserving the
/// pre-guard volume.
pub trait VolumeControl: Send + Sync {
    fn volume(&self) -> f32;
    fn set_volume(&self, volume: f32);
}

/// Output backend for shaped PCM.
#[async_trait]
pub trait PlaybackSink: Send + Sync {
    /// Queue a chunk for output; applies backpressure when the device
    /// queue is full.
    async fn write(&self, chunk: Vec<f32>, sample_rate: u32) -> Result<(), AudioError>;

    /// Wait until everything queued has been played out.
    async fn drain(&self) -> Result<(), AudioError>;

    /// Drop queued-but-unplayed audio immediately.
    fn flush(&self);
}
