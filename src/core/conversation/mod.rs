//! Loop-driven conversational mode.

pub mod driver;
pub mod filters;

pub use driver::{ConversationConfig, ConversationDriver, DriverState};
pub use filters::{is_non_speech, is_probable_echo};
