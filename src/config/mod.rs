//! Configuration for the parley voice agent.
//!
//! Loaded from environment variables with sensible defaults; a `.env`
//! file is honored when present. Validation runs at load time so a
//! misconfigured agent fails fast instead of mid-conversation.

mod env;
mod validation;

use crate::core::conversation::ConversationConfig;
use crate::core::reply::ReplyConfig;
use crate::core::stt::TranscriptionConfig;
use crate::core::tts::SynthesisConfig;

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Transcription provider settings.
    pub stt: TranscriptionConfig,
    /// Reply-generation provider settings.
    pub reply: ReplyConfig,
    /// Speech-synthesis provider settings.
    pub tts: SynthesisConfig,
    /// Loop-driven conversational mode settings.
    pub conversation: ConversationConfig,
    /// Optional realtime event transport endpoint (ws:// or wss://).
    pub realtime_url: Option<String>,
    /// Bound for the reused-session guard's self-healing release (ms).
    pub guard_auto_release_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            stt: TranscriptionConfig::default(),
            reply: ReplyConfig::default(),
            tts: SynthesisConfig::default(),
            conversation: ConversationConfig::default(),
            realtime_url: None,
            guard_auto_release_ms: 8_000,
        }
    }
}
