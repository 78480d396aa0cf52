//! Audio input abstractions and PCM helpers.
//!
//! The VAD segmenter and the conversational loop consume audio through
//! the [`AudioSource`] trait so detection logic stays independent of the
//! capture backend. The production source is [`MicrophoneSource`]
//! (cpal); tests script frames directly.

mod mic;
mod wav;

use async_trait::async_trait;

pub use mic::MicrophoneSource;
pub use wav::{decode_wav, encode_wav};

/// A chunk of mono PCM audio.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Samples in the range [-1.0, 1.0].
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// A complete mono PCM clip (decoded synthesis output, captured segment).
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioClip {
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.samples.len() as u64 * 1000) / self.sample_rate as u64
    }
}

/// Error types for audio device operations.
///
/// Device failures carry a cause-specific remediation hint that is
/// surfaced to the user; the conversational loop does not proceed until
/// the condition is resolved.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AudioError {
    #[error("Microphone access denied: {hint}")]
    Denied { hint: String },
    #[error("No audio device available: {hint}")]
    Unavailable { hint: String },
    #[error("Audio device busy: {hint}")]
    Busy { hint: String },
    #[error("Audio backend error: {0}")]
    Backend(String),
}

/// Source of live audio frames.
#[async_trait]
pub trait AudioSource: Send {
    /// Receive the next captured frame; `None` means the stream ended.
    async fn next_frame(&mut self) -> Result<Option<AudioFrame>, AudioError>;

    /// Sample rate of frames produced by this source.
    fn sample_rate(&self) -> u32;

    /// Drop any frames captured but not yet consumed.
    ///
    /// Called when a listen cycle starts, so audio captured while the
    /// assistant was speaking never reaches calibration.
    fn discard_pending(&mut self) {}
}

/// Short-time root-mean-square energy of a sample window.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
