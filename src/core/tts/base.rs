//! Base trait abstraction for speech synthesis providers.

use async_trait::async_trait;

use crate::core::audio::AudioClip;

/// Configuration for synthesis providers.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct SynthesisConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    /// Default voice id when the caller does not override it.
    pub voice_id: String,
    /// Requested container format; providers decode to PCM internally.
    pub audio_format: String,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "tts-1".to_string(),
            voice_id: "alloy".to_string(),
            audio_format: "wav".to_string(),
        }
    }
}

/// Error types for synthesis operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SynthesisError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("Provider error: {0}")]
    ProviderError(String),
    #[error("Audio decode error: {0}")]
    DecodeError(String),
}

/// Base trait for speech synthesis providers.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` with the given voice into a PCM clip.
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<AudioClip, SynthesisError>;

    fn provider_name(&self) -> &'static str;
}
