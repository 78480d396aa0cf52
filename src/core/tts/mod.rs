pub mod base;
pub mod cache;
pub mod http;

pub use base::{SpeechSynthesizer, SynthesisConfig, SynthesisError};
pub use cache::CachedSynthesizer;
pub use http::HttpSynthesizer;
