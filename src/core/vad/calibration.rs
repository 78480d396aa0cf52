//! Ambient-noise calibration and threshold derivation.

use tracing::info;

use super::config::VadConfig;

/// Noise statistics gathered during the calibration window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseProfile {
    pub mean: f32,
    pub std_dev: f32,
}

impl NoiseProfile {
    /// Compute mean and standard deviation of per-frame RMS energies.
    pub fn from_frame_energies(energies: &[f32]) -> Self {
        if energies.is_empty() {
            return Self {
                mean: 0.0,
                std_dev: 0.0,
            };
        }
        let mean = energies.iter().sum::<f32>() / energies.len() as f32;
        let variance = energies
            .iter()
            .map(|e| {
                let d = e - mean;
                d * d
            })
            .sum::<f32>()
            / energies.len() as f32;
        Self {
            mean,
            std_dev: variance.sqrt(),
        }
    }
}

/// Detection thresholds derived from a noise profile.
///
/// Invariant: `start >= stop >= configured floors`, for every profile.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub start: f32,
    pub stop: f32,
}

impl Thresholds {
    pub fn derive(profile: &NoiseProfile, config: &VadConfig) -> Self {
        let start =
            (profile.mean + config.start_margin_sigmas * profile.std_dev).max(config.start_floor);
        let stop =
            (profile.mean + config.stop_margin_sigmas * profile.std_dev).max(config.stop_floor);
        // A pathological config (stop floor above start floor) must not
        // invert the pair.
        let stop = stop.min(start);

        info!(
            noise_mean = profile.mean,
            noise_std_dev = profile.std_dev,
            start_threshold = start,
            stop_threshold = stop,
            "VAD calibrated"
        );

        Self { start, stop }
    }
}
