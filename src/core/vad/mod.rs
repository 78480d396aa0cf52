//! Energy-based voice activity detection and utterance segmentation.

pub mod calibration;
pub mod config;
pub mod segmenter;

pub use calibration::{NoiseProfile, Thresholds};
pub use config::VadConfig;
pub use segmenter::{SpeechSegment, VadSegmenter};
