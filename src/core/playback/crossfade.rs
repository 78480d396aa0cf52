//! Gain-ramped playback.
//!
//! Starting, stopping, and replacing audio all pass through short gain
//! ramps so the output never clicks. Stopping cancels the feeder task
//! at the next chunk boundary, flushes the sink, and emits a brief
//! settle tail.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::audio::AudioClip;

use super::{PlaybackSink, VolumeControl};

/// Tunables for the crossfade envelopes.
#[derive(Debug, Clone)]
pub struct CrossfadeConfig {
    /// Ramp length applied when audio starts or ends (ms).
    pub fade_ms: u64,
    /// Feeder chunk size; also the stop-latency bound (ms).
    pub chunk_ms: u64,
}

impl Default for CrossfadeConfig {
    fn default() -> Self {
        Self {
            fade_ms: 40,
            chunk_ms: 20,
        }
    }
}

struct ActivePlayback {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Plays clips through a sink with fade-in/fade-out envelopes.
///
/// At most one clip plays at a time; starting a new one replaces the
/// current clip (which is cut at its next chunk boundary).
pub struct CrossfadePlayer {
    sink: Arc<dyn PlaybackSink>,
    config: CrossfadeConfig,
    /// Master volume as f32 bits; independent of fade envelopes.
    master_volume: Arc<AtomicU32>,
    active: Mutex<Option<ActivePlayback>>,
}

/// Await handle for a playing clip.
pub struct PlaybackHandle {
    done: oneshot::Receiver<()>,
}

impl PlaybackHandle {
    /// Resolve when the clip finishes or is stopped/replaced.
    pub async fn wait(self) {
        let _ = self.done.await;
    }
}

impl CrossfadePlayer {
    pub fn new(sink: Arc<dyn PlaybackSink>, config: CrossfadeConfig) -> Self {
        Self {
            sink,
            config,
            master_volume: Arc::new(AtomicU32::new(1.0f32.to_bits())),
            active: Mutex::new(None),
        }
    }

    /// Start playing a clip, replacing whatever is currently playing.
    pub fn play(&self, clip: AudioClip) -> PlaybackHandle {
        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = oneshot::channel();

        // Replace: cancel the previous feeder; its settle tail happens
        // in the task before it exits.
        if let Some(previous) = self.active.lock().take() {
            previous.cancel.cancel();
            debug!("Replacing active playback");
        }

        let sink = Arc::clone(&self.sink);
        let config = self.config.clone();
        let master = Arc::clone(&self.master_volume);
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            feed_clip(sink, config, master, clip, task_cancel).await;
            let _ = done_tx.send(());
        });

        *self.active.lock() = Some(ActivePlayback { cancel, task });
        PlaybackHandle { done: done_rx }
    }

    /// Stop playback, unblocking any waiter within one chunk boundary.
    pub fn stop(&self) {
        if let Some(active) = self.active.lock().take() {
            active.cancel.cancel();
            debug!("Playback stop requested");
        } else {
            // Nothing playing; make sure the sink holds no stale audio.
            self.sink.flush();
        }
    }

    /// Whether a clip is currently being fed to the sink.
    pub fn is_playing(&self) -> bool {
        self.active
            .lock()
            .as_ref()
            .map(|active| !active.task.is_finished())
            .unwrap_or(false)
    }
}

impl VolumeControl for CrossfadePlayer {
    fn volume(&self) -> f32 {
        f32::from_bits(self.master_volume.load(Ordering::Acquire))
    }

    fn set_volume(&self, volume: f32) {
        let clamped = volume.clamp(0.0, 1.0);
        self.master_volume
            .store(clamped.to_bits(), Ordering::Release);
        debug!(volume = clamped, "Playback volume set");
    }
}

/// Feed one clip to the sink in small chunks, shaping the gain
/// envelope sample by sample.
async fn feed_clip(
    sink: Arc<dyn PlaybackSink>,
    config: CrossfadeConfig,
    master: Arc<AtomicU32>,
    clip: AudioClip,
    cancel: CancellationToken,
) {
    let rate = clip.sample_rate.max(1);
    let chunk_len = ((rate as u64 * config.chunk_ms) / 1000).max(1) as usize;
    let fade_len = ((rate as u64 * config.fade_ms) / 1000).max(1) as usize;
    let total = clip.samples.len();
    let fade_out_start = total.saturating_sub(fade_len);

    let mut position = 0usize;
    let mut last_gain = 0.0f32;
    while position < total {
        if cancel.is_cancelled() {
            sink.flush();
            // Settle window: the queue was flushed, so the tail is
            // silence; it gives the device a ramp-down period instead
            // of an abrupt queue cut.
            if last_gain > f32::EPSILON {
                let _ = sink.write(vec![0.0; fade_len], rate).await;
            }
            debug!("Playback cancelled mid-clip");
            return;
        }

        let end = (position + chunk_len).min(total);
        let mut chunk = Vec::with_capacity(end - position);
        let master_gain = f32::from_bits(master.load(Ordering::Acquire));
        for (offset, sample) in clip.samples[position..end].iter().enumerate() {
            let index = position + offset;
            let fade_in = (index as f32 / fade_len as f32).min(1.0);
            let fade_out = if index >= fade_out_start {
                (total - index) as f32 / fade_len as f32
            } else {
                1.0
            };
            let gain = fade_in.min(fade_out) * master_gain;
            last_gain = gain;
            chunk.push(sample * gain);
        }

        if sink.write(chunk, rate).await.is_err() {
            return;
        }
        position = end;
    }

    let _ = sink.drain().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::audio::AudioError;
    use async_trait::async_trait;

    #[derive(Default)]
    struct MemorySink {
        written: Mutex<Vec<f32>>,
        flushed: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl PlaybackSink for MemorySink {
        async fn write(&self, chunk: Vec<f32>, _sample_rate: u32) -> Result<(), AudioError> {
            self.written.lock().extend(chunk);
            // Yield so cancellation has a chance to interleave.
            tokio::task::yield_now().await;
            Ok(())
        }

        async fn drain(&self) -> Result<(), AudioError> {
            Ok(())
        }

        fn flush(&self) {
            self.flushed
                .store(true, std::sync::atomic::Ordering::SeqCst);
        }
    }

    fn constant_clip(len: usize) -> AudioClip {
        AudioClip {
            samples: vec![1.0; len],
            sample_rate: 16_000,
        }
    }

    #[tokio::test]
    async fn test_fade_in_and_out_envelopes() {
        let sink = Arc::new(MemorySink::default());
        let player = CrossfadePlayer::new(
            Arc::clone(&sink) as Arc<dyn PlaybackSink>,
            CrossfadeConfig::default(),
        );

        // 1 second at 16kHz; 40ms fade = 640 samples.
        player.play(constant_clip(16_000)).wait().await;

        let written = sink.written.lock();
        assert_eq!(written.len(), 16_000);
        assert!(written[0].abs() < 0.01, "start must be near-silent");
        assert!(written[320] > 0.4 && written[320] < 0.6, "mid-ramp");
        assert!((written[8_000] - 1.0).abs() < 1e-3, "plateau at unity");
        assert!(written[15_999].abs() < 0.01, "end must ramp back down");
    }

    #[tokio::test]
    async fn test_master_volume_scales_plateau() {
        let sink = Arc::new(MemorySink::default());
        let player = CrossfadePlayer::new(
            Arc::clone(&sink) as Arc<dyn PlaybackSink>,
            CrossfadeConfig::default(),
        );
        player.set_volume(0.25);
        player.play(constant_clip(16_000)).wait().await;

        let written = sink.written.lock();
        assert!((written[8_000] - 0.25).abs() < 1e-3);
    }

    #[tokio::test]
    async fn test_stop_halts_and_flushes() {
        let sink = Arc::new(MemorySink::default());
        let player = CrossfadePlayer::new(
            Arc::clone(&sink) as Arc<dyn PlaybackSink>,
            CrossfadeConfig::default(),
        );

        let handle = player.play(constant_clip(160_000)); // 10s
        tokio::task::yield_now().await;
        player.stop();
        handle.wait().await;

        assert!(sink.flushed.load(std::sync::atomic::Ordering::SeqCst));
        // Far less than the whole clip was fed.
        assert!(sink.written.lock().len() < 160_000);
        assert!(!player.is_playing());
    }

    #[tokio::test]
    async fn test_replacement_cancels_previous_clip() {
        let sink = Arc::new(MemorySink::default());
        let player = CrossfadePlayer::new(
            Arc::clone(&sink) as Arc<dyn PlaybackSink>,
            CrossfadeConfig::default(),
        );

        let first = player.play(constant_clip(160_000));
        tokio::task::yield_now().await;
        let second = player.play(constant_clip(3_200));

        first.wait().await;
        second.wait().await;
        assert!(!player.is_playing());
    }

    #[test]
    fn test_volume_control_clamps() {
        let sink = Arc::new(MemorySink::default());
        let player = CrossfadePlayer::new(
            sink as Arc<dyn PlaybackSink>,
            CrossfadeConfig::default(),
        );
        player.set_volume(3.0);
        assert_eq!(player.volume(), 1.0);
        player.set_volume(-1.0);
        assert_eq!(player.volume(), 0.0);
    }
}
