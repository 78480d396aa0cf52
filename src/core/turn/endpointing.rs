//! Endpointing: reconciling local speech boundaries with remote
//! response/transcription lifecycle events.
//!
//! The transport gives no causal-order guarantee, so a response-created
//! event can arrive before the prior turn's transcription completed.
//! The coordinator tracks four per-turn flags and resolves each newly
//! starting assistant response against them — no sequence numbers.

use parking_lot::RwLock;
use tracing::{debug, info};

/// How the aggregator must treat the current user turn when an
/// assistant response starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointAction {
    /// Turn already finalized; nothing to do.
    None,
    /// Close the partial transcript using accumulated delta text; the
    /// transcription-completed event lost the race.
    FinalizeFromDeltas,
    /// Speech stopped but no text exists yet: the response is presumed
    /// unrelated (e.g. an initial greeting). Do not finalize.
    WaitForPending,
    /// Audio committed, transcription not yet started. Do not finalize.
    WaitForCommit,
    /// No user activity at all: the assistant speaks first. Close an
    /// empty placeholder turn so stray late transcription events cannot
    /// reopen it.
    FinalizeEmpty,
}

#[derive(Debug, Default, Clone, Copy)]
struct TurnFlags {
    finalized: bool,
    has_delta: bool,
    speech_pending: bool,
    awaiting_commit: bool,
}

/// Tracks the current user turn's flags and decides endpointing actions.
#[derive(Default)]
pub struct EndpointingCoordinator {
    flags: RwLock<TurnFlags>,
    last_user_item: RwLock<Option<String>>,
}

impl EndpointingCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh user turn began (locally detected speech onset).
    pub fn begin_turn(&self) {
        *self.flags.write() = TurnFlags::default();
        debug!("Endpointing flags reset for new user turn");
    }

    /// Speech stopped locally; transcription has produced nothing yet.
    pub fn note_speech_stopped(&self) {
        let mut flags = self.flags.write();
        if !flags.has_delta && !flags.awaiting_commit {
            flags.speech_pending = true;
        }
    }

    /// The audio buffer was committed upstream.
    pub fn note_committed(&self) {
        let mut flags = self.flags.write();
        flags.awaiting_commit = true;
        flags.speech_pending = false;
    }

    /// A transcription delta arrived for the current turn.
    pub fn note_delta(&self) {
        let mut flags = self.flags.write();
        flags.has_delta = true;
        flags.speech_pending = false;
        flags.awaiting_commit = false;
    }

    /// The current turn was finalized (by whichever path won).
    pub fn note_finalized(&self) {
        let mut flags = self.flags.write();
        flags.finalized = true;
        flags.has_delta = false;
        flags.speech_pending = false;
        flags.awaiting_commit = false;
    }

    pub fn is_finalized(&self) -> bool {
        self.flags.read().finalized
    }

    /// Decide how a newly starting assistant response reconciles with
    /// the current user turn. Pure with respect to the flags; executing
    /// the action (and updating flags) is the caller's job.
    pub fn prepare_assistant_response_start(&self) -> EndpointAction {
        let flags = *self.flags.read();
        let action = if flags.finalized {
            EndpointAction::None
        } else if flags.has_delta {
            EndpointAction::FinalizeFromDeltas
        } else if flags.speech_pending {
            EndpointAction::WaitForPending
        } else if flags.awaiting_commit {
            EndpointAction::WaitForCommit
        } else {
            EndpointAction::FinalizeEmpty
        };

        info!(
            action = ?action,
            finalized = flags.finalized,
            has_delta = flags.has_delta,
            speech_pending = flags.speech_pending,
            awaiting_commit = flags.awaiting_commit,
            "Endpointing decision for assistant response start"
        );
        action
    }

    /// The transport reported a user conversation item.
    ///
    /// Returns true when a *distinct* item was created server-side
    /// (e.g. after a regeneration path) and the current turn must
    /// restart. On restart the superseded bookkeeping is cleared and
    /// the new item becomes the tracked one.
    pub fn handle_backend_user_item(&self, item_id: &str) -> bool {
        let mut last = self.last_user_item.write();
        match last.as_deref() {
            Some(previous) if previous == item_id => false,
            Some(previous) => {
                info!(
                    previous_item = previous,
                    new_item = item_id,
                    "Server created a distinct user item; restarting turn"
                );
                *last = Some(item_id.to_string());
                true
            }
            None => {
                *last = Some(item_id.to_string());
                false
            }
        }
    }

    /// Forget item bookkeeping (session reset).
    pub fn clear_item_bookkeeping(&self) {
        *self.last_user_item.write() = None;
    }
}
