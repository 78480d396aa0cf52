pub mod audio;
pub mod conversation;
pub mod playback;
pub mod reply;
pub mod stt;
pub mod tts;
pub mod turn;
pub mod vad;

// Re-export commonly used types for convenience
pub use audio::{AudioClip, AudioError, AudioFrame, AudioSource, MicrophoneSource};
pub use conversation::{ConversationConfig, ConversationDriver, DriverState};
pub use playback::{CpalOutputSink, CrossfadeConfig, CrossfadePlayer, PlaybackSink, VolumeControl};
pub use reply::{ChatTurn, ReplyConfig, ReplyError, ReplyService};
pub use stt::{TranscriptionConfig, TranscriptionError, TranscriptionService};
pub use tts::{CachedSynthesizer, SpeechSynthesizer, SynthesisConfig, SynthesisError};
pub use turn::{EndpointAction, EndpointingCoordinator, SessionState, TurnState};
pub use vad::{SpeechSegment, VadConfig, VadSegmenter};
