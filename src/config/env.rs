use std::env;

use super::validation::{validate_bounds, validate_realtime_url};
use super::AgentConfig;

impl AgentConfig {
    /// Load configuration from environment variables.
    ///
    /// Reads configuration from environment variables, with sensible
    /// defaults. Also loads from a .env file if present using dotenvy.
    ///
    /// # Errors
    /// Returns an error if a variable is malformed or validation fails.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let mut config = AgentConfig::default();

        // One key/base pair serves all three OpenAI-compatible
        // providers unless overridden per service.
        if let Ok(base_url) = env::var("PARLEY_API_BASE_URL") {
            config.stt.base_url = base_url.clone();
            config.reply.base_url = base_url.clone();
            config.tts.base_url = base_url;
        }
        if let Ok(api_key) = env::var("PARLEY_API_KEY") {
            config.stt.api_key = api_key.clone();
            config.reply.api_key = api_key.clone();
            config.tts.api_key = api_key;
        }

        if let Ok(model) = env::var("PARLEY_STT_MODEL") {
            config.stt.model = model;
        }
        if let Ok(language) = env::var("PARLEY_LANGUAGE") {
            config.stt.language = language;
        }
        if let Ok(model) = env::var("PARLEY_REPLY_MODEL") {
            config.reply.model = model;
        }
        if let Ok(prompt) = env::var("PARLEY_SYSTEM_PROMPT") {
            config.reply.system_prompt = prompt;
        }
        if let Ok(model) = env::var("PARLEY_TTS_MODEL") {
            config.tts.model = model;
        }
        if let Ok(voice) = env::var("PARLEY_VOICE_ID") {
            config.tts.voice_id = voice.clone();
            config.conversation.voice_id = voice;
        }

        config.conversation.scenario_id = env::var("PARLEY_SCENARIO_ID").ok();
        if let Ok(pairs) = env::var("PARLEY_MAX_HISTORY_PAIRS") {
            config.conversation.max_history_pairs = pairs
                .parse::<usize>()
                .map_err(|e| format!("Invalid PARLEY_MAX_HISTORY_PAIRS: {e}"))?;
        }

        config.realtime_url = env::var("PARLEY_REALTIME_URL").ok();
        if let Ok(ms) = env::var("PARLEY_GUARD_AUTO_RELEASE_MS") {
            config.guard_auto_release_ms = ms
                .parse::<u64>()
                .map_err(|e| format!("Invalid PARLEY_GUARD_AUTO_RELEASE_MS: {e}"))?;
        }

        validate_realtime_url(&config.realtime_url)?;
        validate_bounds(
            config.guard_auto_release_ms,
            config.conversation.max_history_pairs,
        )?;

        Ok(config)
    }
}
