pub mod base;
pub mod http;

pub use base::{TranscriptionConfig, TranscriptionError, TranscriptionService};
pub use http::HttpTranscriber;
