//! Base trait abstraction for reply generation.

use async_trait::async_trait;

use crate::timeline::Role;

/// One prior exchange handed to the reply service.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatTurn {
    pub role: Role,
    pub text: String,
}

/// Configuration for reply providers.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct ReplyConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    /// System prompt framing the agent's persona.
    pub system_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            system_prompt: "You are a helpful voice assistant. Respond concisely and \
                naturally; your replies are spoken aloud."
                .to_string(),
            max_tokens: 256,
            temperature: 0.7,
        }
    }
}

/// Error types for reply generation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ReplyError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("Provider error: {0}")]
    ProviderError(String),
    #[error("Empty reply")]
    EmptyReply,
}

/// Base trait for reply-generation providers.
#[async_trait]
pub trait ReplyService: Send + Sync {
    /// Generate a reply to `message` given the bounded recent history
    /// and an optional scenario context id.
    async fn reply(
        &self,
        message: &str,
        history: &[ChatTurn],
        scenario_id: Option<&str>,
    ) -> Result<String, ReplyError>;

    fn provider_name(&self) -> &'static str;
}
