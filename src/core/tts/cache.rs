//! Session-scoped synthesis cache.
//!
//! Repeated lines (greetings, confirmations) are cached per session
//! keyed by (voice id, text). The cache lives and dies with the
//! session; nothing is persisted.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::core::audio::AudioClip;

use super::base::{SpeechSynthesizer, SynthesisError};

/// Caching decorator over any synthesizer.
pub struct CachedSynthesizer {
    inner: Arc<dyn SpeechSynthesizer>,
    cache: Mutex<HashMap<(String, String), Arc<AudioClip>>>,
}

impl CachedSynthesizer {
    pub fn new(inner: Arc<dyn SpeechSynthesizer>) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Drop all cached clips (session reset).
    pub fn clear(&self) {
        let mut cache = self.cache.lock();
        let entries = cache.len();
        cache.clear();
        debug!(entries_cleared = entries, "Synthesis cache cleared");
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }
}

#[async_trait]
impl SpeechSynthesizer for CachedSynthesizer {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<AudioClip, SynthesisError> {
        let key = (voice_id.to_string(), text.to_string());
        if let Some(clip) = self.cache.lock().get(&key) {
            debug!(voice_id, "Synthesis cache hit");
            return Ok(AudioClip::clone(clip));
        }

        let clip = self.inner.synthesize(text, voice_id).await?;
        self.cache
            .lock()
            .insert(key, Arc::new(clip.clone()));
        Ok(clip)
    }

    fn provider_name(&self) -> &'static str {
        self.inner.provider_name()
    }
}
