//! Event-family classification for realtime transport events.
//!
//! Classification is a pure, total function of the event type string
//! (and, for the error family only, the serialized payload): identical
//! inputs always produce identical outputs, and no mutable state is
//! involved. Families are checked in a fixed priority order; the first
//! match wins.

use serde_json::Value;

/// Closed set of event families used for dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventFamily {
    /// Session created/updated/failed/expired.
    Session,
    /// Input-audio-buffer speech started/stopped/committed.
    Speech,
    /// Input audio transcription deltas/completions/failures.
    Transcription,
    /// Response lifecycle: created, text/audio-transcript deltas, done.
    Assistant,
    /// Conversation item created/truncated.
    ConversationItem,
    /// Anything naming an error or warning not caught above.
    Error,
    /// Default for unrecognized types.
    Unknown,
}

/// A transport event tagged with its family. Derived, never persisted.
#[derive(Debug, Clone)]
pub struct ClassifiedEvent {
    pub family: EventFamily,
    pub raw_type: String,
    pub payload: Value,
}

/// Classify a raw transport event.
///
/// The `error` family is checked *after* the assistant family, so an
/// assistant event whose payload text happens to mention "error" keeps
/// its assistant classification.
pub fn classify(raw_type: &str, payload: &Value) -> ClassifiedEvent {
    let family = family_of(raw_type, payload);
    ClassifiedEvent {
        family,
        raw_type: raw_type.to_string(),
        payload: payload.clone(),
    }
}

fn family_of(raw_type: &str, payload: &Value) -> EventFamily {
    if raw_type.starts_with("session.") {
        return EventFamily::Session;
    }
    if raw_type.starts_with("input_audio_buffer.") {
        return EventFamily::Speech;
    }
    if raw_type.contains("input_audio_transcription") || raw_type.starts_with("transcription.") {
        return EventFamily::Transcription;
    }
    if raw_type.starts_with("response.") {
        return EventFamily::Assistant;
    }
    if raw_type.starts_with("conversation.item") {
        return EventFamily::ConversationItem;
    }
    if mentions_error(raw_type) || payload_mentions_error(payload) {
        return EventFamily::Error;
    }
    EventFamily::Unknown
}

fn mentions_error(text: &str) -> bool {
    text.contains("error") || text.contains("warning")
}

fn payload_mentions_error(payload: &Value) -> bool {
    match payload {
        Value::String(s) => mentions_error(s),
        Value::Object(map) => map.keys().any(|k| mentions_error(k))
            || map.values().any(payload_mentions_error),
        Value::Array(items) => items.iter().any(payload_mentions_error),
        _ => false,
    }
}
