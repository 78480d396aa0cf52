//! Timeline storage and change notification.

use parking_lot::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::utils::now_ms;

use super::{Role, TimelineObserver, TimelineUpdate, Utterance, UtteranceSource};

/// Ordered transcript of the conversation.
///
/// At most one non-final utterance exists per role at a time. Opening a
/// new utterance for a role that already has one in progress finalizes
/// the stale entry first, so the invariant holds even under reordered
/// transport events.
#[derive(Default)]
pub struct TranscriptTimeline {
    entries: RwLock<Vec<Utterance>>,
    observers: RwLock<Vec<TimelineObserver>>,
}

impl TranscriptTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer and replay the current timeline to it,
    /// so late-joining observers of the session see the full history.
    pub fn subscribe(&self, observer: TimelineObserver) {
        let snapshot = self.snapshot();
        for entry in &snapshot {
            observer(Self::update_for(entry));
        }
        self.observers.write().push(observer);
    }

    /// Open a new in-progress utterance and return its id.
    pub fn open(
        &self,
        role: Role,
        source: UtteranceSource,
        started_at: u64,
        item_id: Option<String>,
    ) -> String {
        let id = Uuid::new_v4().to_string();
        let opened = Utterance {
            id: id.clone(),
            role,
            started_at,
            text: String::new(),
            is_final: false,
            source,
            item_id,
        };
        let open_update = Self::update_for(&opened);
        let stale = {
            let mut entries = self.entries.write();
            let stale = Self::close_open_entry(&mut entries, role);
            entries.push(opened);
            stale
        };
        if let Some(update) = stale {
            warn!(role = ?role, "Opened utterance while one was in progress; finalized stale entry");
            self.notify(update);
        }
        self.notify(open_update);
        id
    }

    /// Append a streamed fragment to the role's open utterance,
    /// opening one if necessary. Finalized entries are never touched.
    pub fn append(&self, role: Role, fragment: &str) {
        let update = {
            let mut entries = self.entries.write();
            match entries.iter_mut().rev().find(|u| u.role == role && !u.is_final) {
                Some(entry) => {
                    entry.text.push_str(fragment);
                    Some(Self::update_for(entry))
                }
                None => None,
            }
        };
        match update {
            Some(update) => self.notify(update),
            None => {
                let started = now_ms();
                self.open(role, UtteranceSource::Delta, started, None);
                self.append(role, fragment);
            }
        }
    }

    /// Finalize the role's open utterance, keeping its accumulated text.
    ///
    /// Returns false when no utterance was open; finalization is
    /// irreversible and repeated calls are no-ops.
    pub fn finalize(&self, role: Role) -> bool {
        self.finalize_inner(role, None)
    }

    /// Finalize the role's open utterance, replacing its text with the
    /// authoritative transcript (e.g. a transcription-completed event).
    pub fn finalize_with(&self, role: Role, text: &str) -> bool {
        self.finalize_inner(role, Some(text))
    }

    fn finalize_inner(&self, role: Role, text: Option<&str>) -> bool {
        let update = {
            let mut entries = self.entries.write();
            match entries.iter_mut().rev().find(|u| u.role == role && !u.is_final) {
                Some(entry) => {
                    if let Some(text) = text {
                        entry.text = text.to_string();
                    }
                    entry.is_final = true;
                    Some(Self::update_for(entry))
                }
                None => None,
            }
        };
        match update {
            Some(update) => {
                self.notify(update);
                true
            }
            None => {
                debug!(role = ?role, "finalize called with no open utterance");
                false
            }
        }
    }

    /// Push an already-complete utterance (loop-driven path, or the
    /// finalize-empty endpointing action).
    pub fn push_finalized(
        &self,
        role: Role,
        text: &str,
        source: UtteranceSource,
        started_at: u64,
    ) -> String {
        let id = self.open(role, source, started_at, None);
        if !text.is_empty() {
            self.append(role, text);
        }
        self.finalize(role);
        id
    }

    /// Whether the role currently has an in-progress utterance.
    pub fn has_open(&self, role: Role) -> bool {
        self.entries
            .read()
            .iter()
            .any(|u| u.role == role && !u.is_final)
    }

    /// Accumulated text of the role's open utterance, if any.
    pub fn open_text(&self, role: Role) -> Option<String> {
        self.entries
            .read()
            .iter()
            .rev()
            .find(|u| u.role == role && !u.is_final)
            .map(|u| u.text.clone())
    }

    /// Text of the role's most recent finalized utterance.
    pub fn last_final_text(&self, role: Role) -> Option<String> {
        self.entries
            .read()
            .iter()
            .rev()
            .find(|u| u.role == role && u.is_final)
            .map(|u| u.text.clone())
    }

    /// The most recent finalized turns, oldest first, bounded to
    /// `max_pairs` user/assistant exchanges.
    pub fn recent_turns(&self, max_pairs: usize) -> Vec<(Role, String)> {
        let entries = self.entries.read();
        let mut turns: Vec<(Role, String)> = entries
            .iter()
            .rev()
            .filter(|u| u.is_final && !u.text.is_empty())
            .take(max_pairs * 2)
            .map(|u| (u.role, u.text.clone()))
            .collect();
        turns.reverse();
        turns
    }

    /// Full copy of the timeline (frozen and in-progress entries).
    pub fn snapshot(&self) -> Vec<Utterance> {
        self.entries.read().clone()
    }

    /// Archive all entries (session reset).
    pub fn clear(&self) {
        let cleared = {
            let mut entries = self.entries.write();
            let count = entries.len();
            entries.clear();
            count
        };
        debug!(entries_cleared = cleared, "Timeline cleared");
    }

    fn close_open_entry(entries: &mut [Utterance], role: Role) -> Option<TimelineUpdate> {
        entries
            .iter_mut()
            .rev()
            .find(|u| u.role == role && !u.is_final)
            .map(|entry| {
                entry.is_final = true;
                Self::update_for(entry)
            })
    }

    fn update_for(entry: &Utterance) -> TimelineUpdate {
        TimelineUpdate {
            role: entry.role,
            text: entry.text.clone(),
            is_final: entry.is_final,
            timestamp: entry.started_at,
            item_id: entry.item_id.clone(),
            source: entry.source,
        }
    }

    fn notify(&self, update: TimelineUpdate) {
        let observers = self.observers.read().clone();
        for observer in observers {
            observer(update.clone());
        }
    }
}
