//! Assistant response stream aggregation.
//!
//! Accumulates streamed assistant output into timeline utterances,
//! engages the reused-session initial guard when a response starts, and
//! executes the endpointing decision for the current user turn.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::debug;

use crate::core::playback::VolumeControl;
use crate::timeline::{Role, TranscriptTimeline, UtteranceSource};
use crate::utils::now_ms;

use super::endpointing::{EndpointAction, EndpointingCoordinator};
use super::session::SessionState;
use super::TurnState;

pub struct AssistantStreamAggregator {
    timeline: Arc<TranscriptTimeline>,
    endpointing: Arc<EndpointingCoordinator>,
    session: Arc<SessionState>,
    volume: Arc<dyn VolumeControl>,
    guard_auto_release: Duration,
    saw_text_delta: AtomicBool,
    saw_audio_delta: AtomicBool,
    mixed_delta_logged: AtomicBool,
}

impl AssistantStreamAggregator {
    pub fn new(
        timeline: Arc<TranscriptTimeline>,
        endpointing: Arc<EndpointingCoordinator>,
        session: Arc<SessionState>,
        volume: Arc<dyn VolumeControl>,
        guard_auto_release: Duration,
    ) -> Self {
        Self {
            timeline,
            endpointing,
            session,
            volume,
            guard_auto_release,
            saw_text_delta: AtomicBool::new(false),
            saw_audio_delta: AtomicBool::new(false),
            mixed_delta_logged: AtomicBool::new(false),
        }
    }

    /// A new assistant response is starting.
    pub fn on_response_created(&self) {
        // A second response while the guard is active is presumed real:
        // release before anything else so it is audible.
        if self.session.guard().is_active() {
            self.session.release_guard(self.volume.as_ref());
        } else {
            self.session
                .try_engage_guard(Arc::clone(&self.volume), self.guard_auto_release);
        }

        match self.endpointing.prepare_assistant_response_start() {
            EndpointAction::None => {}
            EndpointAction::FinalizeFromDeltas => {
                self.timeline.finalize(Role::User);
                self.endpointing.note_finalized();
            }
            EndpointAction::WaitForPending | EndpointAction::WaitForCommit => {
                // The user turn finishes on its own transcription path.
            }
            EndpointAction::FinalizeEmpty => {
                self.timeline
                    .push_finalized(Role::User, "", UtteranceSource::Delta, now_ms());
                self.endpointing.note_finalized();
            }
        }

        self.saw_text_delta.store(false, Ordering::Release);
        self.saw_audio_delta.store(false, Ordering::Release);
        self.mixed_delta_logged.store(false, Ordering::Release);
        self.timeline
            .open(Role::Assistant, UtteranceSource::Delta, now_ms(), None);
        self.session.set_turn_state(TurnState::AssistantResponding);
    }

    /// A plain text delta for the active response.
    pub fn on_text_delta(&self, fragment: &str) {
        self.saw_text_delta.store(true, Ordering::Release);
        self.log_if_mixed();
        self.timeline.append(Role::Assistant, fragment);
    }

    /// An audio-transcript delta for the active response.
    pub fn on_audio_transcript_delta(&self, fragment: &str) {
        self.saw_audio_delta.store(true, Ordering::Release);
        self.log_if_mixed();
        self.timeline.append(Role::Assistant, fragment);
    }

    /// The response finished (any of the done/completed events).
    pub fn on_response_done(&self) {
        if self.timeline.finalize(Role::Assistant) {
            self.session.set_turn_state(TurnState::Idle);
        }
    }

    fn log_if_mixed(&self) {
        // Text and audio-transcript deltas are assumed mutually
        // exclusive per response; make the mixed case visible once.
        if self.saw_text_delta.load(Ordering::Acquire)
            && self.saw_audio_delta.load(Ordering::Acquire)
            && !self.mixed_delta_logged.swap(true, Ordering::AcqRel)
        {
            debug!("Both text and audio-transcript deltas observed for one response");
        }
    }
}
