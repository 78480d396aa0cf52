//! OpenAI-compatible chat-completions reply provider.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::timeline::Role;

use super::base::{ChatTurn, ReplyConfig, ReplyError, ReplyService};

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

/// Generates replies through a `/chat/completions` endpoint.
pub struct HttpReplyService {
    client: reqwest::Client,
    config: ReplyConfig,
}

impl HttpReplyService {
    pub fn new(config: ReplyConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl ReplyService for HttpReplyService {
    async fn reply(
        &self,
        message: &str,
        history: &[ChatTurn],
        scenario_id: Option<&str>,
    ) -> Result<String, ReplyError> {
        let system_prompt = match scenario_id {
            Some(id) => format!("{}\nScenario: {id}", self.config.system_prompt),
            None => self.config.system_prompt.clone(),
        };

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage {
            role: "system",
            content: &system_prompt,
        });
        for turn in history {
            messages.push(ChatMessage {
                role: match turn.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                },
                content: &turn.text,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: message,
        });

        debug!(
            history_turns = history.len(),
            "Requesting reply generation"
        );

        let request = ChatRequest {
            model: &self.config.model,
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ReplyError::ConnectionFailed(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ReplyError::AuthenticationFailed(
                "reply endpoint rejected the API key".to_string(),
            ));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReplyError::ProviderError(format!("status {status}: {body}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ReplyError::ProviderError(e.to_string()))?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(ReplyError::EmptyReply);
        }
        Ok(text)
    }

    fn provider_name(&self) -> &'static str {
        "http-reply"
    }
}
