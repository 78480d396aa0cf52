//! The conversational loop: listen → transcribe → respond → speak.
//!
//! An explicit state machine driven by one loop, with a single
//! cancellation token threaded through every suspension point so
//! cancellation is auditable: toggling the mode off unwinds all phases
//! within one scheduling tick.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::audio::AudioSource;
use crate::core::playback::CrossfadePlayer;
use crate::core::reply::{ChatTurn, ReplyService};
use crate::core::stt::TranscriptionService;
use crate::core::tts::SpeechSynthesizer;
use crate::core::vad::VadSegmenter;
use crate::errors::AppResult;
use crate::timeline::{Role, TranscriptTimeline, UtteranceSource};
use crate::utils::now_ms;

use super::filters;

/// Phase of the loop-driven conversational mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Listening,
    Transcribing,
    Responding,
    Speaking,
}

/// Settings for the loop-driven conversational mode.
#[derive(Debug, Clone)]
pub struct ConversationConfig {
    /// Voice id handed to the synthesizer.
    pub voice_id: String,
    /// Scenario context id handed to the reply service.
    pub scenario_id: Option<String>,
    /// Bounded history: user/assistant exchange pairs sent per request.
    pub max_history_pairs: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            voice_id: "alloy".to_string(),
            scenario_id: None,
            max_history_pairs: 8,
        }
    }
}

/// Orchestrates VAD, transcription, reply generation, and playback.
///
/// Exactly one cycle runs per session: a second `run` while one is in
/// flight is a no-op.
pub struct ConversationDriver {
    vad: VadSegmenter,
    transcriber: Arc<dyn TranscriptionService>,
    replier: Arc<dyn ReplyService>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    player: Arc<CrossfadePlayer>,
    timeline: Arc<TranscriptTimeline>,
    config: ConversationConfig,
    running: AtomicBool,
    state: Mutex<DriverState>,
}

impl ConversationDriver {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        vad: VadSegmenter,
        transcriber: Arc<dyn TranscriptionService>,
        replier: Arc<dyn ReplyService>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        player: Arc<CrossfadePlayer>,
        timeline: Arc<TranscriptTimeline>,
        config: ConversationConfig,
    ) -> Self {
        Self {
            vad,
            transcriber,
            replier,
            synthesizer,
            player,
            timeline,
            config,
            running: AtomicBool::new(false),
            state: Mutex::new(DriverState::Idle),
        }
    }

    pub fn state(&self) -> DriverState {
        *self.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run conversation cycles until the token is cancelled.
    ///
    /// The caller owns the audio source; it is released at the caller's
    /// single drop site on every exit path.
    pub async fn run(
        &self,
        source: &mut dyn AudioSource,
        cancel: &CancellationToken,
    ) -> AppResult<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            warn!("Conversation cycle already running; start ignored");
            return Ok(());
        }

        let result = self.run_cycles(source, cancel).await;

        self.player.stop();
        self.set_state(DriverState::Idle);
        self.running.store(false, Ordering::Release);
        result
    }

    async fn run_cycles(
        &self,
        source: &mut dyn AudioSource,
        cancel: &CancellationToken,
    ) -> AppResult<()> {
        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }

            // Listening: one fresh VAD session per cycle.
            self.set_state(DriverState::Listening);
            source.discard_pending();
            let segment = self.vad.next_utterance(source, cancel).await?;
            if cancel.is_cancelled() {
                return Ok(());
            }
            let Some(segment) = segment else {
                // No-speech timeout: straight back to Listening.
                continue;
            };

            self.set_state(DriverState::Transcribing);
            let transcript = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                result = self.transcriber.transcribe(&segment) => match result {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, "Transcription failed; abandoning turn");
                        continue;
                    }
                },
            };

            if filters::is_non_speech(&transcript) {
                debug!(transcript = %transcript, "Transcript rejected as non-speech");
                continue;
            }
            if let Some(last_reply) = self.timeline.last_final_text(Role::Assistant) {
                if filters::is_probable_echo(&transcript, &last_reply) {
                    info!(transcript = %transcript, "Transcript rejected as assistant echo");
                    continue;
                }
            }

            // History excludes the turn being answered.
            let history: Vec<ChatTurn> = self
                .timeline
                .recent_turns(self.config.max_history_pairs)
                .into_iter()
                .map(|(role, text)| ChatTurn { role, text })
                .collect();
            let started_at = now_ms().saturating_sub(segment.duration_ms);
            self.timeline
                .push_finalized(Role::User, &transcript, UtteranceSource::Audio, started_at);

            self.set_state(DriverState::Responding);
            let reply = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                result = self.replier.reply(
                    &transcript,
                    &history,
                    self.config.scenario_id.as_deref(),
                ) => match result {
                    Ok(reply) => reply,
                    Err(e) => {
                        warn!(error = %e, "Reply generation failed; abandoning turn");
                        continue;
                    }
                },
            };
            self.timeline
                .push_finalized(Role::Assistant, &reply, UtteranceSource::History, now_ms());

            self.set_state(DriverState::Speaking);
            let clip = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                result = self.synthesizer.synthesize(&reply, &self.config.voice_id) => match result {
                    Ok(clip) => clip,
                    Err(e) => {
                        warn!(error = %e, "Synthesis failed; skipping playback");
                        continue;
                    }
                },
            };

            // Suspend until playback ends: reopening the microphone
            // while the assistant's voice is audible would feed it back
            // into the next cycle.
            let handle = self.player.play(clip);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.player.stop();
                    return Ok(());
                }
                _ = handle.wait() => {}
            }

            self.set_state(DriverState::Idle);
        }
    }

    fn set_state(&self, next: DriverState) {
        let mut state = self.state.lock();
        if *state != next {
            debug!(from = ?*state, to = ?next, "Conversation state transition");
            *state = next;
        }
    }
}
