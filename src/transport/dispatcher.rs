//! Event dispatch: one handler per family behind a single entry point.
//!
//! Handlers are short and non-blocking; all shared state is touched
//! from the dispatching thread of control. The dispatcher must tolerate
//! arbitrary reordering of transport events — the reconciliation lives
//! in the endpointing flags, not in sequence numbers.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::core::playback::VolumeControl;
use crate::core::turn::{
    AssistantStreamAggregator, ConversationItemTracker, EndpointingCoordinator, SessionState,
    TurnState,
};
use crate::timeline::{Role, TranscriptTimeline, UtteranceSource};
use crate::utils::now_ms;

use super::classifier::{classify, EventFamily};

/// Routes classified transport events to the turn-taking components.
pub struct EventDispatcher {
    timeline: Arc<TranscriptTimeline>,
    endpointing: Arc<EndpointingCoordinator>,
    session: Arc<SessionState>,
    aggregator: AssistantStreamAggregator,
    item_tracker: ConversationItemTracker,
}

impl EventDispatcher {
    pub fn new(
        timeline: Arc<TranscriptTimeline>,
        session: Arc<SessionState>,
        volume: Arc<dyn VolumeControl>,
        guard_auto_release: Duration,
    ) -> Self {
        let endpointing = Arc::new(EndpointingCoordinator::new());
        let aggregator = AssistantStreamAggregator::new(
            Arc::clone(&timeline),
            Arc::clone(&endpointing),
            Arc::clone(&session),
            volume,
            guard_auto_release,
        );
        let item_tracker = ConversationItemTracker::new(
            Arc::clone(&timeline),
            Arc::clone(&endpointing),
            Arc::clone(&session),
        );
        Self {
            timeline,
            endpointing,
            session,
            aggregator,
            item_tracker,
        }
    }

    pub fn endpointing(&self) -> &Arc<EndpointingCoordinator> {
        &self.endpointing
    }

    /// Classify and dispatch one transport event. Never panics on
    /// malformed input: unknown shapes are logged and dropped.
    pub fn dispatch(&self, raw_type: &str, payload: &Value) {
        let event = classify(raw_type, payload);
        match event.family {
            EventFamily::Session => self.handle_session(raw_type, payload),
            EventFamily::Speech => self.handle_speech(raw_type),
            EventFamily::Transcription => self.handle_transcription(raw_type, payload),
            EventFamily::Assistant => self.handle_assistant(raw_type, payload),
            EventFamily::ConversationItem => self.handle_conversation_item(raw_type, payload),
            EventFamily::Error => {
                warn!(event_type = raw_type, "Transport reported an error event");
            }
            EventFamily::Unknown => {
                debug!(event_type = raw_type, "Ignoring unknown transport event");
            }
        }
    }

    fn handle_session(&self, raw_type: &str, payload: &Value) {
        match raw_type {
            "session.created" | "session.updated" => {
                if session_is_reused(payload) {
                    self.session.mark_reused();
                }
                debug!(event_type = raw_type, "Session lifecycle event");
            }
            "session.failed" | "session.expired" => {
                warn!(event_type = raw_type, "Session ended abnormally");
            }
            _ => debug!(event_type = raw_type, "Unhandled session event"),
        }
    }

    fn handle_speech(&self, raw_type: &str) {
        if raw_type.ends_with("speech_started") {
            self.endpointing.begin_turn();
            self.session.note_user_spoke();
            if !self.timeline.has_open(Role::User) {
                self.timeline
                    .open(Role::User, UtteranceSource::Delta, now_ms(), None);
            }
            self.session.set_turn_state(TurnState::UserSpeaking);
        } else if raw_type.ends_with("speech_stopped") {
            self.endpointing.note_speech_stopped();
            self.session.set_turn_state(TurnState::UserPendingCommit);
        } else if raw_type.ends_with("committed") {
            self.endpointing.note_committed();
        } else {
            debug!(event_type = raw_type, "Unhandled speech event");
        }
    }

    fn handle_transcription(&self, raw_type: &str, payload: &Value) {
        if raw_type.ends_with(".delta") {
            if let Some(fragment) = delta_text(payload) {
                self.endpointing.note_delta();
                self.timeline.append(Role::User, fragment);
            }
        } else if raw_type.ends_with(".completed") || raw_type.ends_with(".done") {
            let transcript = payload
                .get("transcript")
                .and_then(Value::as_str)
                .map(str::to_string);
            let finalized = match transcript {
                Some(text) => self.timeline.finalize_with(Role::User, &text),
                None => self.timeline.finalize(Role::User),
            };
            if finalized {
                self.endpointing.note_finalized();
                self.session.set_turn_state(TurnState::Idle);
            }
        } else if raw_type.ends_with(".failed") {
            // ServiceError: abandon the turn with whatever text arrived.
            warn!(event_type = raw_type, "Transcription failed; abandoning turn");
            if self.timeline.finalize(Role::User) {
                self.endpointing.note_finalized();
            }
            self.session.set_turn_state(TurnState::Idle);
        } else {
            debug!(event_type = raw_type, "Unhandled transcription event");
        }
    }

    fn handle_assistant(&self, raw_type: &str, payload: &Value) {
        if raw_type == "response.created" {
            self.aggregator.on_response_created();
        } else if raw_type.ends_with(".delta") {
            if raw_type.contains("audio_transcript") {
                if let Some(fragment) = delta_text(payload) {
                    self.aggregator.on_audio_transcript_delta(fragment);
                }
            } else if raw_type.contains(".audio") {
                // Raw audio frames play out on the remote element;
                // nothing to aggregate into the transcript.
                debug!(event_type = raw_type, "Ignoring raw audio delta");
            } else if let Some(fragment) = delta_text(payload) {
                self.aggregator.on_text_delta(fragment);
            }
        } else if raw_type.ends_with(".done") || raw_type.ends_with(".completed") {
            self.aggregator.on_response_done();
        } else {
            debug!(event_type = raw_type, "Unhandled assistant event");
        }
    }

    fn handle_conversation_item(&self, raw_type: &str, payload: &Value) {
        if raw_type.ends_with(".created") {
            let item = payload.get("item").unwrap_or(payload);
            let item_id = item.get("id").and_then(Value::as_str).unwrap_or_default();
            match item.get("role").and_then(Value::as_str) {
                Some("user") => self.item_tracker.on_item_created(Role::User, item_id),
                Some("assistant") => {
                    self.item_tracker.on_item_created(Role::Assistant, item_id)
                }
                other => {
                    debug!(role = ?other, "Conversation item with unhandled role");
                }
            }
        } else if raw_type.ends_with(".truncated") {
            let item_id = payload
                .get("item_id")
                .and_then(Value::as_str)
                .unwrap_or_default();
            self.item_tracker.on_item_truncated(item_id);
        } else {
            debug!(event_type = raw_type, "Unhandled conversation-item event");
        }
    }
}

fn session_is_reused(payload: &Value) -> bool {
    payload
        .get("reused")
        .or_else(|| payload.get("session").and_then(|s| s.get("reused")))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn delta_text(payload: &Value) -> Option<&str> {
    payload
        .get("delta")
        .or_else(|| payload.get("text"))
        .and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct TestVolume {
        bits: AtomicU32,
    }

    impl TestVolume {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                bits: AtomicU32::new(1.0f32.to_bits()),
            })
        }
    }

    impl VolumeControl for TestVolume {
        fn volume(&self) -> f32 {
            f32::from_bits(self.bits.load(Ordering::Acquire))
        }

        fn set_volume(&self, volume: f32) {
            self.bits.store(volume.to_bits(), Ordering::Release);
        }
    }

    fn build() -> (EventDispatcher, Arc<TranscriptTimeline>, Arc<SessionState>) {
        let timeline = Arc::new(TranscriptTimeline::new());
        let session = Arc::new(SessionState::new());
        let dispatcher = EventDispatcher::new(
            Arc::clone(&timeline),
            Arc::clone(&session),
            TestVolume::new() as Arc<dyn VolumeControl>,
            Duration::from_secs(8),
        );
        (dispatcher, timeline, session)
    }

    #[tokio::test]
    async fn test_ordinary_turn_sequence() {
        let (dispatcher, timeline, _) = build();
        let empty = json!({});

        dispatcher.dispatch("input_audio_buffer.speech_started", &empty);
        dispatcher.dispatch("input_audio_buffer.speech_stopped", &empty);
        dispatcher.dispatch("input_audio_buffer.committed", &empty);
        dispatcher.dispatch(
            "conversation.item.input_audio_transcription.delta",
            &json!({"delta": "my knee "}),
        );
        dispatcher.dispatch(
            "conversation.item.input_audio_transcription.delta",
            &json!({"delta": "hurts"}),
        );
        dispatcher.dispatch(
            "conversation.item.input_audio_transcription.completed",
            &json!({"transcript": "my knee hurts"}),
        );

        assert_eq!(
            timeline.last_final_text(Role::User).as_deref(),
            Some("my knee hurts")
        );
    }

    #[tokio::test]
    async fn test_response_created_before_transcription_completed() {
        // The race the endpointing table exists for: speech stopped,
        // deltas arrived, and the assistant starts before the
        // transcription-completed event lands.
        let (dispatcher, timeline, _) = build();
        let empty = json!({});

        dispatcher.dispatch("input_audio_buffer.speech_started", &empty);
        dispatcher.dispatch("input_audio_buffer.speech_stopped", &empty);
        dispatcher.dispatch(
            "conversation.item.input_audio_transcription.delta",
            &json!({"delta": "hello there"}),
        );
        dispatcher.dispatch("response.created", &empty);

        // User turn closed from deltas.
        assert_eq!(
            timeline.last_final_text(Role::User).as_deref(),
            Some("hello there")
        );

        // The late completion cannot reopen the finalized turn.
        dispatcher.dispatch(
            "conversation.item.input_audio_transcription.completed",
            &json!({"transcript": "hello there!"}),
        );
        let finals: Vec<_> = timeline
            .snapshot()
            .into_iter()
            .filter(|u| u.role == Role::User && u.is_final)
            .collect();
        assert_eq!(finals.len(), 1);
        assert_eq!(finals[0].text, "hello there");
    }

    #[tokio::test]
    async fn test_greeting_race_leaves_pending_turn_alone() {
        let (dispatcher, timeline, _) = build();
        let empty = json!({});

        dispatcher.dispatch("input_audio_buffer.speech_started", &empty);
        dispatcher.dispatch("input_audio_buffer.speech_stopped", &empty);
        dispatcher.dispatch("response.created", &empty);

        // wait-for-pending: the user turn stays open for its own
        // transcription path.
        assert!(timeline.has_open(Role::User));

        dispatcher.dispatch(
            "conversation.item.input_audio_transcription.delta",
            &json!({"delta": "still mine"}),
        );
        dispatcher.dispatch(
            "conversation.item.input_audio_transcription.completed",
            &json!({"transcript": "still mine"}),
        );
        assert_eq!(
            timeline.last_final_text(Role::User).as_deref(),
            Some("still mine")
        );
    }

    #[tokio::test]
    async fn test_assistant_first_session() {
        let (dispatcher, timeline, _) = build();
        let empty = json!({});

        dispatcher.dispatch("response.created", &empty);
        dispatcher.dispatch("response.output_text.delta", &json!({"delta": "Welcome!"}));
        dispatcher.dispatch("response.output_text.done", &empty);

        let snapshot = timeline.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot[0].text.is_empty() && snapshot[0].is_final);
        assert_eq!(snapshot[1].text, "Welcome!");
        assert!(snapshot[1].is_final);
    }

    #[tokio::test]
    async fn test_malformed_events_never_crash_dispatch() {
        let (dispatcher, _, _) = build();
        dispatcher.dispatch("", &json!(null));
        dispatcher.dispatch("response.output_text.delta", &json!({"delta": 42}));
        dispatcher.dispatch("conversation.item.created", &json!({"item": "not an object"}));
        dispatcher.dispatch("error", &json!({"message": "boom"}));
        dispatcher.dispatch("input_audio_buffer.unknown_kind", &json!({}));
    }

    #[tokio::test]
    async fn test_barge_in_truncation() {
        let (dispatcher, timeline, _) = build();
        let empty = json!({});

        dispatcher.dispatch("response.created", &empty);
        dispatcher.dispatch(
            "response.audio_transcript.delta",
            &json!({"delta": "Let me explain the full"}),
        );
        dispatcher.dispatch(
            "conversation.item.truncated",
            &json!({"item_id": "item_42"}),
        );

        let last = timeline.snapshot().pop().unwrap();
        assert!(last.is_final);
        assert_eq!(last.text, "Let me explain the full");
    }

    #[tokio::test]
    async fn test_raw_audio_deltas_do_not_pollute_transcript() {
        let (dispatcher, timeline, _) = build();
        let empty = json!({});

        dispatcher.dispatch("response.created", &empty);
        dispatcher.dispatch("response.audio.delta", &json!({"delta": "UklGRiQAAABXQVZF"}));
        dispatcher.dispatch(
            "response.audio_transcript.delta",
            &json!({"delta": "Hello there"}),
        );
        dispatcher.dispatch("response.audio.done", &empty);

        assert_eq!(
            timeline.last_final_text(Role::Assistant).as_deref(),
            Some("Hello there")
        );
    }

    #[tokio::test]
    async fn test_reused_session_arms_guard() {
        let (dispatcher, _, session) = build();
        dispatcher.dispatch("session.created", &json!({"session": {"reused": true}}));
        assert!(session.is_reused());
        assert!(session.guard().is_armed());
    }
}
