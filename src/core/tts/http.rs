//! OpenAI-compatible HTTP synthesis provider.

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::core::audio::{decode_wav, AudioClip};

use super::base::{SpeechSynthesizer, SynthesisConfig, SynthesisError};

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

/// Synthesizes speech through a `/audio/speech` endpoint.
pub struct HttpSynthesizer {
    client: reqwest::Client,
    config: SynthesisConfig,
}

impl HttpSynthesizer {
    pub fn new(config: SynthesisConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSynthesizer {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<AudioClip, SynthesisError> {
        let request = SpeechRequest {
            model: &self.config.model,
            input: text,
            voice: voice_id,
            response_format: &self.config.audio_format,
        };

        debug!(voice_id, chars = text.len(), "Requesting speech synthesis");

        let response = self
            .client
            .post(format!("{}/audio/speech", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| SynthesisError::ConnectionFailed(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(SynthesisError::AuthenticationFailed(
                "synthesis endpoint rejected the API key".to_string(),
            ));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SynthesisError::ProviderError(format!(
                "status {status}: {body}"
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SynthesisError::ConnectionFailed(e.to_string()))?;
        decode_wav(&bytes).map_err(|e| SynthesisError::DecodeError(e.to_string()))
    }

    fn provider_name(&self) -> &'static str {
        "http-synthesizer"
    }
}
