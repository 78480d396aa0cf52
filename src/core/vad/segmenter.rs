//! Energy-based utterance segmentation.
//!
//! Each call to [`VadSegmenter::next_utterance`] runs one full listen
//! cycle: calibrate against ambient noise, wait for a speech onset,
//! record until sustained silence or the hard cap, and apply the
//! validity gate. Time is derived from consumed sample counts rather
//! than a wall clock, so detection is deterministic under test and
//! tracks real time against a live microphone.
//!
//! ```text
//! [Calibrating] ──~400ms──► [Waiting] ── N consecutive loud frames ──► [Speaking]
//!      │                        │  ▲                                       │
//!      │                 5s no-speech │ invalid segment                    │
//!      ▼                        ▼  └──────────────────────── 800ms silence │
//!   (frames not recorded)     None                            or 15s cap ──┘
//!                                                                │
//!                                                   validity gate ├─► Some(segment)
//! ```

use std::collections::VecDeque;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::audio::{rms, AudioError, AudioSource};

use super::calibration::{NoiseProfile, Thresholds};
use super::config::VadConfig;

/// A validated utterance-audio segment.
#[derive(Debug, Clone)]
pub struct SpeechSegment {
    /// Mono samples from onset (including pre-roll) to last loud frame.
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub duration_ms: u64,
    pub voiced_frames: u32,
    pub total_frames: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Waiting,
    Speaking,
}

/// Detection state for one listen cycle. Never reused across cycles,
/// since ambient noise drifts.
struct VadSession {
    thresholds: Thresholds,
    phase: Phase,
    /// Frame time since calibration ended (ms).
    elapsed_ms: u64,
    consecutive_loud: u32,
    preroll: VecDeque<(Vec<f32>, bool)>,
    recorded: Vec<f32>,
    total_frames: u32,
    voiced_frames: u32,
    utterance_ms: u64,
    ms_since_last_loud: u64,
}

/// Segments a live audio source into validated utterances.
pub struct VadSegmenter {
    config: VadConfig,
}

impl VadSegmenter {
    pub fn new(config: VadConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &VadConfig {
        &self.config
    }

    /// Produce the next validated utterance from the source.
    ///
    /// Returns `Ok(None)` on the no-speech timeout, on cancellation, or
    /// when the source ends without a valid segment pending. The caller
    /// owns the source, so every exit path leaves the device release to
    /// a single drop site.
    pub async fn next_utterance(
        &self,
        source: &mut dyn AudioSource,
        cancel: &CancellationToken,
    ) -> Result<Option<SpeechSegment>, AudioError> {
        let sample_rate = source.sample_rate();
        let window =
            ((sample_rate as u64 * self.config.frame_ms) / 1000).max(1) as usize;
        let mut pending: Vec<f32> = Vec::with_capacity(window * 2);

        // Calibration: sample RMS without recording.
        let calibration_frames =
            (self.config.calibration_ms / self.config.frame_ms).max(1) as usize;
        let mut energies = Vec::with_capacity(calibration_frames);
        while energies.len() < calibration_frames {
            match read_window(source, &mut pending, window, cancel).await? {
                Some(frame) => energies.push(rms(&frame)),
                None => return Ok(None),
            }
        }
        let profile = NoiseProfile::from_frame_energies(&energies);
        let thresholds = Thresholds::derive(&profile, &self.config);

        let mut session = VadSession {
            thresholds,
            phase: Phase::Waiting,
            elapsed_ms: 0,
            consecutive_loud: 0,
            preroll: VecDeque::with_capacity(self.config.preroll_frames + 1),
            recorded: Vec::new(),
            total_frames: 0,
            voiced_frames: 0,
            utterance_ms: 0,
            ms_since_last_loud: 0,
        };

        loop {
            let frame = match read_window(source, &mut pending, window, cancel).await? {
                Some(frame) => frame,
                None => {
                    // Source ended (or cancelled): finalize what we have.
                    if session.phase == Phase::Speaking {
                        return Ok(self.finish(&mut session, sample_rate));
                    }
                    return Ok(None);
                }
            };

            let energy = rms(&frame);
            session.elapsed_ms += self.config.frame_ms;

            match session.phase {
                Phase::Waiting => {
                    let loud = energy >= session.thresholds.start;
                    session.consecutive_loud =
                        if loud { session.consecutive_loud + 1 } else { 0 };
                    session.preroll.push_back((frame, loud));
                    while session.preroll.len() > self.config.preroll_frames {
                        session.preroll.pop_front();
                    }

                    if session.consecutive_loud >= self.config.start_consecutive_frames {
                        self.enter_speaking(&mut session);
                    } else if session.elapsed_ms >= self.config.no_speech_timeout_ms {
                        debug!(
                            elapsed_ms = session.elapsed_ms,
                            "No speech before timeout"
                        );
                        return Ok(None);
                    }
                }
                Phase::Speaking => {
                    let voiced = energy >= session.thresholds.stop;
                    session.recorded.extend_from_slice(&frame);
                    session.total_frames += 1;
                    session.utterance_ms += self.config.frame_ms;
                    if voiced {
                        session.voiced_frames += 1;
                        session.ms_since_last_loud = 0;
                    } else {
                        session.ms_since_last_loud += self.config.frame_ms;
                    }

                    let silence_done =
                        session.ms_since_last_loud >= self.config.silence_finalize_ms;
                    let capped = session.utterance_ms >= self.config.max_utterance_ms;
                    if silence_done || capped {
                        match self.finish(&mut session, sample_rate) {
                            Some(segment) => return Ok(Some(segment)),
                            None => {
                                // Invalid segment: back to waiting. The
                                // no-speech deadline keeps running from
                                // calibration end.
                                session.phase = Phase::Waiting;
                                session.consecutive_loud = 0;
                                session.preroll.clear();
                                if session.elapsed_ms >= self.config.no_speech_timeout_ms {
                                    return Ok(None);
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    fn enter_speaking(&self, session: &mut VadSession) {
        session.phase = Phase::Speaking;
        session.recorded.clear();
        session.total_frames = 0;
        session.voiced_frames = 0;
        session.utterance_ms = 0;
        session.ms_since_last_loud = 0;
        for (frame, loud) in session.preroll.drain(..) {
            session.recorded.extend_from_slice(&frame);
            session.total_frames += 1;
            session.utterance_ms += self.config.frame_ms;
            if loud {
                session.voiced_frames += 1;
            }
        }
        debug!(
            preroll_ms = session.utterance_ms,
            "Speech onset detected"
        );
    }

    /// Trim the trailing silence and apply the validity gate.
    fn finish(&self, session: &mut VadSession, sample_rate: u32) -> Option<SpeechSegment> {
        let window = ((sample_rate as u64 * self.config.frame_ms) / 1000).max(1) as usize;
        let trailing_frames = (session.ms_since_last_loud / self.config.frame_ms) as usize;
        let kept_frames = (session.total_frames as usize).saturating_sub(trailing_frames);
        let duration_ms = kept_frames as u64 * self.config.frame_ms;

        session.recorded.truncate(kept_frames * window);

        let total = kept_frames as u32;
        let voiced = session.voiced_frames;
        let ratio = if total == 0 {
            0.0
        } else {
            voiced as f32 / total as f32
        };

        let valid = duration_ms >= self.config.min_utterance_ms
            && voiced >= self.config.min_voiced_frames
            && ratio >= self.config.min_voiced_ratio;

        if !valid {
            debug!(
                duration_ms,
                voiced_frames = voiced,
                voiced_ratio = ratio,
                "Segment failed validity gate; discarded"
            );
            return None;
        }

        debug!(
            duration_ms,
            voiced_frames = voiced,
            total_frames = total,
            "Utterance finalized"
        );

        Some(SpeechSegment {
            samples: std::mem::take(&mut session.recorded),
            sample_rate,
            duration_ms,
            voiced_frames: voiced,
            total_frames: total,
        })
    }
}

/// Assemble one fixed-size analysis window from the source.
///
/// Returns `Ok(None)` when the source ends or the token is cancelled.
async fn read_window(
    source: &mut dyn AudioSource,
    pending: &mut Vec<f32>,
    window: usize,
    cancel: &CancellationToken,
) -> Result<Option<Vec<f32>>, AudioError> {
    while pending.len() < window {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(None),
            frame = source.next_frame() => match frame? {
                Some(frame) => pending.extend_from_slice(&frame.samples),
                None => return Ok(None),
            },
        }
    }
    let rest = pending.split_off(window);
    Ok(Some(std::mem::replace(pending, rest)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::audio::AudioFrame;
    use async_trait::async_trait;

    const RATE: u32 = 16_000;
    const FRAME: usize = 800; // 50ms at 16kHz

    struct ScriptedSource {
        frames: VecDeque<AudioFrame>,
    }

    impl ScriptedSource {
        fn new(frames: Vec<AudioFrame>) -> Self {
            Self {
                frames: frames.into(),
            }
        }
    }

    #[async_trait]
    impl AudioSource for ScriptedSource {
        async fn next_frame(&mut self) -> Result<Option<AudioFrame>, AudioError> {
            Ok(self.frames.pop_front())
        }

        fn sample_rate(&self) -> u32 {
            RATE
        }
    }

    fn quiet(count: usize) -> Vec<AudioFrame> {
        (0..count)
            .map(|_| AudioFrame {
                samples: vec![0.001; FRAME],
                sample_rate: RATE,
            })
            .collect()
    }

    fn loud(count: usize) -> Vec<AudioFrame> {
        (0..count)
            .map(|_| AudioFrame {
                samples: vec![0.3; FRAME],
                sample_rate: RATE,
            })
            .collect()
    }

    fn script(parts: Vec<Vec<AudioFrame>>) -> ScriptedSource {
        ScriptedSource::new(parts.into_iter().flatten().collect())
    }

    #[tokio::test]
    async fn test_speech_then_silence_yields_one_utterance() {
        // 400ms calibration, 500ms speech, 900ms silence.
        let mut source = script(vec![quiet(8), loud(10), quiet(18)]);
        let segmenter = VadSegmenter::new(VadConfig::default());
        let cancel = CancellationToken::new();

        let segment = segmenter
            .next_utterance(&mut source, &cancel)
            .await
            .unwrap()
            .expect("expected a valid utterance");

        // Onset pre-roll plus 500ms of speech, trailing silence trimmed.
        assert!(segment.duration_ms >= 500 && segment.duration_ms <= 600);
        assert!(segment.voiced_frames >= 10);
        assert_eq!(segment.sample_rate, RATE);
        assert_eq!(
            segment.samples.len(),
            segment.total_frames as usize * FRAME
        );

        // Nothing further in the cycle: a second call times out.
        let next = segmenter.next_utterance(&mut source, &cancel).await.unwrap();
        assert!(next.is_none());
    }

    #[tokio::test]
    async fn test_short_burst_fails_gate_then_times_out() {
        // A 200ms burst opens the speaking phase but cannot pass the
        // validity gate; the cycle ends in the no-speech timeout.
        let mut source = script(vec![quiet(8), loud(4), quiet(100)]);
        let segmenter = VadSegmenter::new(VadConfig::default());
        let cancel = CancellationToken::new();

        let segment = segmenter.next_utterance(&mut source, &cancel).await.unwrap();
        assert!(segment.is_none());
    }

    #[tokio::test]
    async fn test_two_loud_frames_never_start_speech() {
        let mut source = script(vec![quiet(8), loud(2), quiet(100)]);
        let segmenter = VadSegmenter::new(VadConfig::default());
        let cancel = CancellationToken::new();

        let segment = segmenter.next_utterance(&mut source, &cancel).await.unwrap();
        assert!(segment.is_none());
    }

    #[tokio::test]
    async fn test_silence_only_times_out() {
        let mut source = script(vec![quiet(8 + 100)]);
        let segmenter = VadSegmenter::new(VadConfig::default());
        let cancel = CancellationToken::new();

        let segment = segmenter.next_utterance(&mut source, &cancel).await.unwrap();
        assert!(segment.is_none());
    }

    #[tokio::test]
    async fn test_max_utterance_cap_finalizes() {
        // 16 seconds of continuous speech hits the 15s hard cap.
        let mut source = script(vec![quiet(8), loud(320)]);
        let segmenter = VadSegmenter::new(VadConfig::default());
        let cancel = CancellationToken::new();

        let segment = segmenter
            .next_utterance(&mut source, &cancel)
            .await
            .unwrap()
            .expect("capped utterance should be valid");
        assert!(segment.duration_ms >= 14_900 && segment.duration_ms <= 15_100);
    }

    #[tokio::test]
    async fn test_cancellation_stops_the_cycle() {
        let mut source = script(vec![quiet(8), loud(10), quiet(18)]);
        let segmenter = VadSegmenter::new(VadConfig::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let segment = segmenter.next_utterance(&mut source, &cancel).await.unwrap();
        assert!(segment.is_none());
    }

    #[tokio::test]
    async fn test_mid_utterance_pause_does_not_split() {
        // 300ms pause (under the 800ms finalize threshold) inside speech.
        let mut source = script(vec![quiet(8), loud(8), quiet(6), loud(8), quiet(18)]);
        let segmenter = VadSegmenter::new(VadConfig::default());
        let cancel = CancellationToken::new();

        let segment = segmenter
            .next_utterance(&mut source, &cancel)
            .await
            .unwrap()
            .expect("paused utterance should stay whole");
        // 400 + 300 + 400 ms of content, give or take the pre-roll.
        assert!(segment.duration_ms >= 1_100 && segment.duration_ms <= 1_250);
        assert!(segment.voiced_frames >= 16);
    }
}
