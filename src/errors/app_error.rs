use std::fmt;

use crate::core::audio::AudioError;
use crate::core::reply::ReplyError;
use crate::core::stt::TranscriptionError;
use crate::core::tts::SynthesisError;

/// Application error type.
///
/// Converges the per-component error enums at the binary boundary.
/// None of these are fatal to the process: conversational mode is
/// always resumable by toggling it, which recalibrates from scratch.
#[derive(Debug)]
pub enum AppError {
    /// Microphone or speaker failure; carries a remediation hint.
    Device(AudioError),
    /// Realtime transport failure (connection, malformed frame).
    Transport(String),
    /// A collaborator service call failed; the current turn is abandoned.
    Service(String),
    /// Invalid or incomplete configuration.
    Config(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Device(err) => write!(f, "Audio device error: {err}"),
            AppError::Transport(msg) => write!(f, "Transport error: {msg}"),
            AppError::Service(msg) => write!(f, "Service error: {msg}"),
            AppError::Config(msg) => write!(f, "Configuration error: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<AudioError> for AppError {
    fn from(err: AudioError) -> Self {
        AppError::Device(err)
    }
}

impl From<TranscriptionError> for AppError {
    fn from(err: TranscriptionError) -> Self {
        AppError::Service(err.to_string())
    }
}

impl From<ReplyError> for AppError {
    fn from(err: ReplyError) -> Self {
        AppError::Service(err.to_string())
    }
}

impl From<SynthesisError> for AppError {
    fn from(err: SynthesisError) -> Self {
        AppError::Service(err.to_string())
    }
}

// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;
