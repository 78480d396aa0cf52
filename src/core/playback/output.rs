//! Speaker output backed by cpal.
//!
//! Mirrors the capture side: the stream lives on its own thread and
//! consumes from a shared sample queue. The device opens lazily on the
//! first write and re-opens if the source sample rate changes.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::core::audio::AudioError;

use super::PlaybackSink;

struct StreamWorker {
    device_rate: u32,
    stop: Arc<AtomicBool>,
    join: Option<std::thread::JoinHandle<()>>,
}

impl Drop for StreamWorker {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// cpal-backed playback sink.
pub struct CpalOutputSink {
    queue: Arc<Mutex<VecDeque<f32>>>,
    worker: Mutex<Option<StreamWorker>>,
}

impl Default for CpalOutputSink {
    fn default() -> Self {
        Self::new()
    }
}

impl CpalOutputSink {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            worker: Mutex::new(None),
        }
    }

    fn ensure_stream(&self) -> Result<u32, AudioError> {
        let mut worker = self.worker.lock();
        if let Some(existing) = worker.as_ref() {
            return Ok(existing.device_rate);
        }

        let (init_tx, init_rx) = std::sync::mpsc::channel::<Result<u32, AudioError>>();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_thread = Arc::clone(&stop);
        let queue = Arc::clone(&self.queue);

        let join = std::thread::Builder::new()
            .name("parley-speaker".to_string())
            .spawn(move || playback_thread(init_tx, queue, stop_thread))
            .map_err(|e| AudioError::Backend(format!("failed to spawn playback thread: {e}")))?;

        match init_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Ok(device_rate)) => {
                *worker = Some(StreamWorker {
                    device_rate,
                    stop,
                    join: Some(join),
                });
                debug!(device_rate, "Speaker output started");
                Ok(device_rate)
            }
            Ok(Err(err)) => {
                stop.store(true, Ordering::Release);
                let _ = join.join();
                Err(err)
            }
            Err(_) => {
                stop.store(true, Ordering::Release);
                Err(AudioError::Backend(
                    "timed out waiting for the playback thread to start".to_string(),
                ))
            }
        }
    }
}

#[async_trait]
impl PlaybackSink for CpalOutputSink {
    async fn write(&self, chunk: Vec<f32>, sample_rate: u32) -> Result<(), AudioError> {
        let device_rate = self.ensure_stream()?;
        let samples = if sample_rate == device_rate {
            chunk
        } else {
            resample_linear(&chunk, sample_rate, device_rate)
        };

        // Backpressure: hold at most ~500ms of queued audio.
        let high_water = (device_rate / 2) as usize;
        loop {
            if self.queue.lock().len() <= high_water {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        self.queue.lock().extend(samples);
        Ok(())
    }

    async fn drain(&self) -> Result<(), AudioError> {
        loop {
            if self.queue.lock().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        // Device-internal buffer grace period.
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(())
    }

    fn flush(&self) {
        let dropped = {
            let mut queue = self.queue.lock();
            let len = queue.len();
            queue.clear();
            len
        };
        if dropped > 0 {
            debug!(samples_dropped = dropped, "Playback queue flushed");
        }
    }
}

fn playback_thread(
    init_tx: std::sync::mpsc::Sender<Result<u32, AudioError>>,
    queue: Arc<Mutex<VecDeque<f32>>>,
    stop: Arc<AtomicBool>,
) {
    let host = cpal::default_host();
    let device = match host.default_output_device() {
        Some(device) => device,
        None => {
            let _ = init_tx.send(Err(AudioError::Unavailable {
                hint: "no default output device; connect speakers or headphones".to_string(),
            }));
            return;
        }
    };

    let supported = match device.default_output_config() {
        Ok(supported) => supported,
        Err(err) => {
            let _ = init_tx.send(Err(AudioError::Backend(format!(
                "failed to query output configuration: {err}"
            ))));
            return;
        }
    };

    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    let channels = config.channels.max(1) as usize;
    let device_rate = config.sample_rate.0;

    let error_cb = |err: cpal::StreamError| {
        warn!("Output stream error: {err}");
    };

    let stream = match sample_format {
        cpal::SampleFormat::F32 => {
            let queue = Arc::clone(&queue);
            device.build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut queue = queue.lock();
                    for frame in data.chunks_mut(channels) {
                        let sample = queue.pop_front().unwrap_or(0.0);
                        for slot in frame {
                            *slot = sample;
                        }
                    }
                },
                error_cb,
                None,
            )
        }
        cpal::SampleFormat::I16 => {
            let queue = Arc::clone(&queue);
            device.build_output_stream(
                &config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    let mut queue = queue.lock();
                    for frame in data.chunks_mut(channels) {
                        let sample = queue.pop_front().unwrap_or(0.0);
                        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                        for slot in frame {
                            *slot = value;
                        }
                    }
                },
                error_cb,
                None,
            )
        }
        cpal::SampleFormat::U16 => {
            let queue = Arc::clone(&queue);
            device.build_output_stream(
                &config,
                move |data: &mut [u16], _: &cpal::OutputCallbackInfo| {
                    let mut queue = queue.lock();
                    for frame in data.chunks_mut(channels) {
                        let sample = queue.pop_front().unwrap_or(0.0);
                        let value =
                            ((sample.clamp(-1.0, 1.0) * 0.5 + 0.5) * u16::MAX as f32) as u16;
                        for slot in frame {
                            *slot = value;
                        }
                    }
                },
                error_cb,
                None,
            )
        }
        other => {
            let _ = init_tx.send(Err(AudioError::Backend(format!(
                "unsupported output sample format: {other:?}"
            ))));
            return;
        }
    };

    let stream = match stream {
        Ok(stream) => stream,
        Err(err) => {
            let _ = init_tx.send(Err(AudioError::Backend(format!(
                "failed to build output stream: {err}"
            ))));
            return;
        }
    };

    if let Err(err) = stream.play() {
        let _ = init_tx.send(Err(AudioError::Backend(format!(
            "failed to start output stream: {err}"
        ))));
        return;
    }

    let _ = init_tx.send(Ok(device_rate));

    while !stop.load(Ordering::Acquire) {
        std::thread::sleep(Duration::from_millis(25));
    }

    drop(stream);
    debug!("Speaker output stopped");
}

/// Nearest-sample linear resampling for rate-mismatched devices.
fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if samples.is_empty() || from_rate == 0 || to_rate == 0 {
        return Vec::new();
    }
    let out_len =
        ((samples.len() as u64 * to_rate as u64) / from_rate as u64).max(1) as usize;
    let step = samples.len() as f64 / out_len as f64;
    (0..out_len)
        .map(|i| {
            let position = i as f64 * step;
            let index = position as usize;
            let next = (index + 1).min(samples.len() - 1);
            let frac = (position - index as f64) as f32;
            samples[index] * (1.0 - frac) + samples[next] * frac
        })
        .collect()
}
