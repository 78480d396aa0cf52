//! Base trait abstraction for transcription providers.
//!
//! The conversational loop only depends on this contract: a validated
//! audio segment goes in, text (possibly empty) comes out. Wire formats
//! live entirely inside provider implementations.

use async_trait::async_trait;

use crate::core::vad::SpeechSegment;

/// Configuration for transcription providers.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct TranscriptionConfig {
    /// Base URL of the transcription endpoint.
    pub base_url: String,
    /// API key for the provider.
    pub api_key: String,
    /// Model to use for transcription.
    pub model: String,
    /// Language code hint (e.g. "en").
    pub language: String,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "whisper-1".to_string(),
            language: "en".to_string(),
        }
    }
}

/// Error types for transcription operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TranscriptionError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("Provider error: {0}")]
    ProviderError(String),
    #[error("Invalid audio: {0}")]
    InvalidAudio(String),
}

/// Base trait for transcription providers.
#[async_trait]
pub trait TranscriptionService: Send + Sync {
    /// Transcribe one utterance segment.
    ///
    /// An empty string is a valid result (the provider heard nothing
    /// usable); the caller decides what to do with it.
    async fn transcribe(&self, segment: &SpeechSegment) -> Result<String, TranscriptionError>;

    /// Provider-specific information.
    fn provider_name(&self) -> &'static str;
}
