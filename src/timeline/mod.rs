//! Transcript timeline shared by the event-driven and loop-driven paths.
//!
//! The timeline is an ordered, append-mostly sequence of utterances.
//! In-progress entries are mutated in place until finalized, then frozen;
//! change notifications go out to registered observers and late joiners
//! receive a snapshot replay on subscription.

mod store;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use store::TranscriptTimeline;

/// Speaker role of an utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// How an utterance's text came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UtteranceSource {
    /// Accumulated from streamed transport deltas.
    Delta,
    /// Produced from a locally captured audio segment.
    Audio,
    /// Whole-text entry (non-streamed reply, restored history).
    History,
}

/// One logical speech contribution bounded by detected silence.
///
/// `is_final` transitions false→true exactly once and the entry is
/// immutable afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct Utterance {
    pub id: String,
    pub role: Role,
    /// Milliseconds since Unix epoch.
    pub started_at: u64,
    pub text: String,
    pub is_final: bool,
    pub source: UtteranceSource,
    /// Backend conversation-item id, when the transport reported one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
}

/// Change notification emitted to timeline observers.
#[derive(Debug, Clone, Serialize)]
pub struct TimelineUpdate {
    pub role: Role,
    pub text: String,
    pub is_final: bool,
    pub timestamp: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    pub source: UtteranceSource,
}

/// Callback type for timeline change notifications.
pub type TimelineObserver = Arc<dyn Fn(TimelineUpdate) + Send + Sync>;
