//! Reactions to server-side conversation-item lifecycle.

use std::sync::Arc;

use tracing::{debug, info};

use crate::timeline::{Role, TranscriptTimeline, UtteranceSource};
use crate::utils::now_ms;

use super::endpointing::EndpointingCoordinator;
use super::session::SessionState;
use super::TurnState;

pub struct ConversationItemTracker {
    timeline: Arc<TranscriptTimeline>,
    endpointing: Arc<EndpointingCoordinator>,
    session: Arc<SessionState>,
}

impl ConversationItemTracker {
    pub fn new(
        timeline: Arc<TranscriptTimeline>,
        endpointing: Arc<EndpointingCoordinator>,
        session: Arc<SessionState>,
    ) -> Self {
        Self {
            timeline,
            endpointing,
            session,
        }
    }

    /// The backend created a conversation item.
    pub fn on_item_created(&self, role: Role, item_id: &str) {
        match role {
            Role::User => {
                if self.endpointing.handle_backend_user_item(item_id) {
                    // Distinct server-side item (e.g. a regeneration
                    // path): restart the turn with a fresh empty
                    // utterance so the timeline shows no gap.
                    self.endpointing.begin_turn();
                    self.timeline.open(
                        Role::User,
                        UtteranceSource::Delta,
                        now_ms(),
                        Some(item_id.to_string()),
                    );
                    self.session.set_turn_state(TurnState::UserPendingCommit);
                } else {
                    debug!(item_id, "User item acknowledged");
                }
            }
            Role::Assistant => {
                // Some transports create the item before any delta
                // arrives; make sure an utterance is open for it.
                if !self.timeline.has_open(Role::Assistant) {
                    self.timeline.open(
                        Role::Assistant,
                        UtteranceSource::Delta,
                        now_ms(),
                        Some(item_id.to_string()),
                    );
                }
            }
        }
    }

    /// The backend truncated an item (barge-in cancelled the assistant
    /// mid-stream). Finalize immediately so the partial marker clears.
    pub fn on_item_truncated(&self, item_id: &str) {
        if self.timeline.finalize(Role::Assistant) {
            info!(item_id, "Assistant response truncated by barge-in; finalized as interrupted");
            self.session.set_turn_state(TurnState::Idle);
        } else {
            debug!(item_id, "Truncation for an already-final item ignored");
        }
    }
}
