//! Configuration for the energy-based VAD segmenter.

/// Tunables for calibration, detection, and the validity gate.
///
/// Defaults are calibrated for conversational speech on a consumer
/// microphone at 16kHz; the floors keep a silent channel from producing
/// a hypersensitive detector when the measured deviation is near zero.
#[derive(Debug, Clone)]
pub struct VadConfig {
    /// RMS analysis window length (ms).
    pub frame_ms: u64,

    /// Ambient-noise sampling period before detection starts (ms).
    pub calibration_ms: u64,

    /// Start threshold margin above the noise mean, in standard deviations.
    pub start_margin_sigmas: f32,

    /// Stop threshold margin above the noise mean, in standard deviations.
    pub stop_margin_sigmas: f32,

    /// Lower bound for the start threshold.
    pub start_floor: f32,

    /// Lower bound for the stop threshold.
    pub stop_floor: f32,

    /// Consecutive loud frames required to enter the speaking phase.
    /// Rejects clicks and pops shorter than `start_consecutive_frames * frame_ms`.
    pub start_consecutive_frames: u32,

    /// Continuous silence that finalizes an utterance (ms).
    pub silence_finalize_ms: u64,

    /// Hard cap on utterance duration (ms).
    pub max_utterance_ms: u64,

    /// Give up when no speech starts within this window after calibration (ms).
    pub no_speech_timeout_ms: u64,

    /// Validity gate: minimum utterance duration (ms).
    pub min_utterance_ms: u64,

    /// Validity gate: minimum voiced frame count.
    pub min_voiced_frames: u32,

    /// Validity gate: minimum voiced-to-total frame ratio.
    pub min_voiced_ratio: f32,

    /// Waiting-phase frames kept so the utterance includes its onset.
    pub preroll_frames: usize,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            frame_ms: 50,
            calibration_ms: 400,
            start_margin_sigmas: 3.0,
            stop_margin_sigmas: 1.5,
            start_floor: 0.02,
            stop_floor: 0.012,
            start_consecutive_frames: 3,
            silence_finalize_ms: 800,
            max_utterance_ms: 15_000,
            no_speech_timeout_ms: 5_000,
            min_utterance_ms: 400,
            min_voiced_frames: 6,
            min_voiced_ratio: 0.2,
            preroll_frames: 4,
        }
    }
}

impl VadConfig {
    pub fn with_no_speech_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.no_speech_timeout_ms = timeout_ms;
        self
    }

    pub fn with_silence_finalize_ms(mut self, silence_ms: u64) -> Self {
        self.silence_finalize_ms = silence_ms;
        self
    }

    pub fn with_max_utterance_ms(mut self, max_ms: u64) -> Self {
        self.max_utterance_ms = max_ms;
        self
    }
}
