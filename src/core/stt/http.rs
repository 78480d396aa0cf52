//! OpenAI-compatible HTTP transcription provider.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::core::audio::encode_wav;
use crate::core::vad::SpeechSegment;

use super::base::{TranscriptionConfig, TranscriptionError, TranscriptionService};

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Transcribes segments through a `/audio/transcriptions` endpoint.
pub struct HttpTranscriber {
    client: reqwest::Client,
    config: TranscriptionConfig,
}

impl HttpTranscriber {
    pub fn new(config: TranscriptionConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl TranscriptionService for HttpTranscriber {
    async fn transcribe(&self, segment: &SpeechSegment) -> Result<String, TranscriptionError> {
        if segment.samples.is_empty() {
            return Err(TranscriptionError::InvalidAudio(
                "empty segment".to_string(),
            ));
        }

        let wav = encode_wav(&segment.samples, segment.sample_rate);
        debug!(
            bytes = wav.len(),
            duration_ms = segment.duration_ms,
            "Uploading segment for transcription"
        );

        let part = reqwest::multipart::Part::bytes(wav)
            .file_name("utterance.wav")
            .mime_str("audio/wav")
            .map_err(|e| TranscriptionError::ProviderError(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .text("model", self.config.model.clone())
            .text("language", self.config.language.clone())
            .part("file", part);

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| TranscriptionError::ConnectionFailed(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(TranscriptionError::AuthenticationFailed(
                "transcription endpoint rejected the API key".to_string(),
            ));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TranscriptionError::ProviderError(format!(
                "status {status}: {body}"
            )));
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| TranscriptionError::ProviderError(e.to_string()))?;
        Ok(parsed.text.trim().to_string())
    }

    fn provider_name(&self) -> &'static str {
        "http-transcriber"
    }
}
