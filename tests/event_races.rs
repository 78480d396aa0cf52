//! Race-ordering tests for the event-driven path.
//!
//! The transport guarantees no causal order, so these tests replay the
//! nasty interleavings end-to-end through the dispatcher:
//! 1. response-created racing ahead of transcription-completed
//! 2. assistant-first sessions (greeting before any user speech)
//! 3. reused-session guard engagement, auto-release, and used-once
//! 4. server-side user item regeneration restarting the turn

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use serde_json::json;

use parley::core::playback::VolumeControl;
use parley::core::turn::SessionState;
use parley::timeline::{Role, TranscriptTimeline};
use parley::transport::EventDispatcher;

struct TestVolume {
    bits: AtomicU32,
}

impl TestVolume {
    fn new(volume: f32) -> Arc<Self> {
        Arc::new(Self {
            bits: AtomicU32::new(volume.to_bits()),
        })
    }

    fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Acquire))
    }
}

impl VolumeControl for TestVolume {
    fn volume(&self) -> f32 {
        self.get()
    }

    fn set_volume(&self, volume: f32) {
        self.bits.store(volume.to_bits(), Ordering::Release);
    }
}

struct Rig {
    dispatcher: EventDispatcher,
    timeline: Arc<TranscriptTimeline>,
    session: Arc<SessionState>,
    volume: Arc<TestVolume>,
}

fn rig(guard_auto_release: Duration) -> Rig {
    let timeline = Arc::new(TranscriptTimeline::new());
    let session = Arc::new(SessionState::new());
    let volume = TestVolume::new(1.0);
    let dispatcher = EventDispatcher::new(
        Arc::clone(&timeline),
        Arc::clone(&session),
        Arc::clone(&volume) as Arc<dyn VolumeControl>,
        guard_auto_release,
    );
    Rig {
        dispatcher,
        timeline,
        session,
        volume,
    }
}

#[tokio::test]
async fn test_late_transcription_completion_cannot_reopen_turn() {
    let r = rig(Duration::from_secs(8));
    let empty = json!({});

    r.dispatcher.dispatch("input_audio_buffer.speech_started", &empty);
    r.dispatcher.dispatch("input_audio_buffer.speech_stopped", &empty);
    r.dispatcher.dispatch(
        "conversation.item.input_audio_transcription.delta",
        &json!({"delta": "turn the lights off"}),
    );

    // Assistant races ahead: the turn closes from deltas.
    r.dispatcher.dispatch("response.created", &empty);
    assert_eq!(
        r.timeline.last_final_text(Role::User).as_deref(),
        Some("turn the lights off")
    );

    // The straggler completion must not reopen or duplicate the turn.
    r.dispatcher.dispatch(
        "conversation.item.input_audio_transcription.completed",
        &json!({"transcript": "turn the lights off please"}),
    );
    let user_finals: Vec<_> = r
        .timeline
        .snapshot()
        .into_iter()
        .filter(|u| u.role == Role::User && u.is_final)
        .collect();
    assert_eq!(user_finals.len(), 1);
    assert_eq!(user_finals[0].text, "turn the lights off");
}

#[tokio::test]
async fn test_greeting_race_with_pending_speech() {
    let r = rig(Duration::from_secs(8));
    let empty = json!({});

    r.dispatcher.dispatch("input_audio_buffer.speech_started", &empty);
    r.dispatcher.dispatch("input_audio_buffer.speech_stopped", &empty);

    // No delta yet: wait-for-pending, the user turn stays open.
    r.dispatcher.dispatch("response.created", &empty);
    r.dispatcher.dispatch(
        "response.output_text.delta",
        &json!({"delta": "Hello! How can I help?"}),
    );
    r.dispatcher.dispatch("response.done", &empty);

    assert!(r.timeline.has_open(Role::User));

    // The user's own transcription path finishes later.
    r.dispatcher.dispatch(
        "conversation.item.input_audio_transcription.delta",
        &json!({"delta": "hi there"}),
    );
    r.dispatcher.dispatch(
        "conversation.item.input_audio_transcription.completed",
        &json!({"transcript": "hi there"}),
    );
    assert_eq!(
        r.timeline.last_final_text(Role::User).as_deref(),
        Some("hi there")
    );
    assert_eq!(
        r.timeline.last_final_text(Role::Assistant).as_deref(),
        Some("Hello! How can I help?")
    );
}

#[tokio::test(start_paused = true)]
async fn test_reused_session_guard_engages_and_auto_releases() {
    let r = rig(Duration::from_secs(4));
    let empty = json!({});

    r.dispatcher.dispatch("session.created", &json!({"session": {"reused": true}}));
    assert!(r.session.guard().is_armed());

    // The replayed initial response is muted.
    r.dispatcher.dispatch("response.created", &empty);
    assert_eq!(r.volume.get(), 0.0);
    assert!(r.session.guard().was_used());

    // No explicit release event arrives; the timer self-heals.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(r.volume.get(), 1.0);
    assert!(!r.session.guard().is_active());

    // Later responses never re-engage the used guard.
    r.dispatcher.dispatch("response.created", &empty);
    assert_eq!(r.volume.get(), 1.0);
}

#[tokio::test]
async fn test_second_response_releases_active_guard() {
    let r = rig(Duration::from_secs(60));
    let empty = json!({});

    r.dispatcher.dispatch("session.created", &json!({"reused": true}));
    r.dispatcher.dispatch("response.created", &empty);
    assert_eq!(r.volume.get(), 0.0);

    // A second response is presumed real: audible immediately.
    r.dispatcher.dispatch("response.created", &empty);
    assert_eq!(r.volume.get(), 1.0);
}

#[tokio::test]
async fn test_fresh_session_never_engages_guard() {
    let r = rig(Duration::from_secs(8));
    let empty = json!({});

    r.dispatcher.dispatch("session.created", &json!({"session": {"reused": false}}));
    r.dispatcher.dispatch("response.created", &empty);
    assert_eq!(r.volume.get(), 1.0);
    assert!(!r.session.guard().was_used());
}

#[tokio::test]
async fn test_user_item_regeneration_restarts_turn() {
    let r = rig(Duration::from_secs(8));
    let empty = json!({});

    r.dispatcher.dispatch("input_audio_buffer.speech_started", &empty);
    r.dispatcher.dispatch(
        "conversation.item.created",
        &json!({"item": {"id": "item_1", "role": "user"}}),
    );
    r.dispatcher.dispatch(
        "conversation.item.input_audio_transcription.delta",
        &json!({"delta": "first try"}),
    );

    // The backend regenerates the item under a new id.
    r.dispatcher.dispatch(
        "conversation.item.created",
        &json!({"item": {"id": "item_2", "role": "user"}}),
    );

    // A fresh empty non-final utterance is open; no timeline gap.
    assert!(r.timeline.has_open(Role::User));
    assert_eq!(r.timeline.open_text(Role::User).as_deref(), Some(""));
    let last = r.timeline.snapshot().pop().unwrap();
    assert_eq!(last.item_id.as_deref(), Some("item_2"));

    // Deltas for the regenerated item accumulate normally.
    r.dispatcher.dispatch(
        "conversation.item.input_audio_transcription.delta",
        &json!({"delta": "second try"}),
    );
    r.dispatcher.dispatch(
        "conversation.item.input_audio_transcription.completed",
        &json!({"transcript": "second try"}),
    );
    assert_eq!(
        r.timeline.last_final_text(Role::User).as_deref(),
        Some("second try")
    );
}

#[tokio::test]
async fn test_unordered_noise_is_survivable() {
    // A burst of out-of-order, malformed, and unknown events must
    // leave the dispatcher consistent.
    let r = rig(Duration::from_secs(8));

    r.dispatcher.dispatch("response.done", &json!({}));
    r.dispatcher.dispatch(
        "conversation.item.truncated",
        &json!({"item_id": "nope"}),
    );
    r.dispatcher.dispatch("input_audio_buffer.committed", &json!({}));
    r.dispatcher.dispatch("garbage.event", &json!({"nested": {"warning": true}}));
    r.dispatcher.dispatch("", &json!(null));

    // A normal turn still works afterwards.
    r.dispatcher.dispatch("input_audio_buffer.speech_started", &json!({}));
    r.dispatcher.dispatch(
        "conversation.item.input_audio_transcription.delta",
        &json!({"delta": "still alive"}),
    );
    r.dispatcher.dispatch(
        "conversation.item.input_audio_transcription.completed",
        &json!({"transcript": "still alive"}),
    );
    assert_eq!(
        r.timeline.last_final_text(Role::User).as_deref(),
        Some("still alive")
    );
}
