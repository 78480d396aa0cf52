//! Transcript filters: non-speech rejection and echo rejection.
//!
//! Short-burst transcriptions of ambient noise and the assistant's own
//! voice leaking back through the microphone both arrive looking like
//! legitimate user turns; these filters drop them before any reply is
//! generated.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static PUNCT_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s'-]").unwrap());

static WHITESPACE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Stock phrases speech models hallucinate from silence or noise.
const STOCK_MISHEARD: &[&str] = &[
    "thanks for watching",
    "thank you for watching",
    "please subscribe",
    "subtitles by the amara org community",
    "you",
];

/// Lowercase, strip punctuation except apostrophes and hyphens,
/// collapse whitespace.
pub fn normalize(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let text = text.to_lowercase();
    let text = PUNCT_REGEX.replace_all(&text, " ");
    let text = WHITESPACE_REGEX.replace_all(&text, " ");
    text.trim().to_string()
}

/// Whether a transcript looks like noise rather than speech.
pub fn is_non_speech(transcript: &str) -> bool {
    let trimmed = transcript.trim();
    if trimmed.is_empty() {
        return true;
    }

    let normalized = normalize(transcript);
    if normalized.is_empty() {
        return true;
    }

    let words = normalized.split_whitespace().count();
    if words <= 1 && trimmed.len() < 6 {
        return true;
    }

    let letters = trimmed.chars().filter(|c| c.is_alphabetic()).count();
    if letters < 3 {
        return true;
    }

    if STOCK_MISHEARD.contains(&normalized.as_str()) {
        debug!(transcript = trimmed, "Stock mishear phrase rejected");
        return true;
    }

    false
}

/// Whether a transcript is probably an echo of the preceding assistant
/// reply picked up by the microphone.
///
/// Case/punctuation-normalized containment in either direction; only
/// applied to replies longer than 10 normalized characters, so short
/// confirmations never shadow legitimate user turns.
pub fn is_probable_echo(transcript: &str, last_reply: &str) -> bool {
    let reply = normalize(last_reply);
    if reply.len() <= 10 {
        return false;
    }
    let heard = normalize(transcript);
    if heard.is_empty() {
        return false;
    }
    reply.contains(&heard) || heard.contains(&reply)
}
