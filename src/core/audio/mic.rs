//! Microphone capture backed by cpal.
//!
//! cpal streams are not `Send`, so the stream lives on a dedicated
//! capture thread that forwards mono f32 frames into a tokio channel.
//! Dropping the source stops the thread and releases the device, which
//! is what makes "never leak an open device" hold on every exit path.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{AudioError, AudioFrame, AudioSource};

/// Frames buffered between the capture thread and the consumer.
const FRAME_CHANNEL_CAPACITY: usize = 64;

/// Live microphone input.
pub struct MicrophoneSource {
    rx: mpsc::Receiver<AudioFrame>,
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
    sample_rate: u32,
}

impl MicrophoneSource {
    /// Open the default input device and start capturing.
    ///
    /// # Errors
    /// Returns a device error with a remediation hint when the
    /// microphone is denied, missing, or held by another application.
    pub fn open() -> Result<Self, AudioError> {
        let (init_tx, init_rx) = std::sync::mpsc::channel::<Result<u32, AudioError>>();
        let (frame_tx, frame_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_thread = Arc::clone(&stop);

        let join = std::thread::Builder::new()
            .name("parley-mic".to_string())
            .spawn(move || capture_thread(init_tx, frame_tx, stop_thread))
            .map_err(|e| AudioError::Backend(format!("failed to spawn capture thread: {e}")))?;

        match init_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Ok(sample_rate)) => {
                debug!(sample_rate, "Microphone capture started");
                Ok(Self {
                    rx: frame_rx,
                    stop,
                    join: Some(join),
                    sample_rate,
                })
            }
            Ok(Err(err)) => {
                stop.store(true, Ordering::Release);
                let _ = join.join();
                Err(err)
            }
            Err(_) => {
                stop.store(true, Ordering::Release);
                Err(AudioError::Backend(
                    "timed out waiting for the capture thread to start".to_string(),
                ))
            }
        }
    }
}

#[async_trait]
impl AudioSource for MicrophoneSource {
    async fn next_frame(&mut self) -> Result<Option<AudioFrame>, AudioError> {
        Ok(self.rx.recv().await)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn discard_pending(&mut self) {
        let mut dropped = 0usize;
        while self.rx.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!(frames_dropped = dropped, "Discarded stale captured frames");
        }
    }
}

impl Drop for MicrophoneSource {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

fn capture_thread(
    init_tx: std::sync::mpsc::Sender<Result<u32, AudioError>>,
    frame_tx: mpsc::Sender<AudioFrame>,
    stop: Arc<AtomicBool>,
) {
    let host = cpal::default_host();
    let device = match host.default_input_device() {
        Some(device) => device,
        None => {
            let _ = init_tx.send(Err(AudioError::Unavailable {
                hint: "no default input device; connect a microphone or select one in system settings"
                    .to_string(),
            }));
            return;
        }
    };

    let supported = match device.default_input_config() {
        Ok(supported) => supported,
        Err(err) => {
            let _ = init_tx.send(Err(map_config_error(err)));
            return;
        }
    };

    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    let channels = config.channels.max(1) as usize;
    let sample_rate = config.sample_rate.0;

    let error_cb = |err: cpal::StreamError| {
        warn!("Input stream error: {err}");
    };

    let stream = match sample_format {
        cpal::SampleFormat::F32 => {
            let tx = frame_tx.clone();
            device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    forward_frame(&tx, downmix(data.iter().copied(), channels), sample_rate);
                },
                error_cb,
                None,
            )
        }
        cpal::SampleFormat::I16 => {
            let tx = frame_tx.clone();
            device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let converted = data.iter().map(|s| *s as f32 / 32768.0);
                    forward_frame(&tx, downmix(converted, channels), sample_rate);
                },
                error_cb,
                None,
            )
        }
        cpal::SampleFormat::U16 => {
            let tx = frame_tx.clone();
            device.build_input_stream(
                &config,
                move |data: &[u16], _: &cpal::InputCallbackInfo| {
                    let converted = data.iter().map(|s| (*s as f32 - 32768.0) / 32768.0);
                    forward_frame(&tx, downmix(converted, channels), sample_rate);
                },
                error_cb,
                None,
            )
        }
        other => {
            let _ = init_tx.send(Err(AudioError::Backend(format!(
                "unsupported input sample format: {other:?}"
            ))));
            return;
        }
    };

    let stream = match stream {
        Ok(stream) => stream,
        Err(err) => {
            let _ = init_tx.send(Err(map_build_error(err)));
            return;
        }
    };

    if let Err(err) = stream.play() {
        let _ = init_tx.send(Err(AudioError::Backend(format!(
            "failed to start input stream: {err}"
        ))));
        return;
    }

    let _ = init_tx.send(Ok(sample_rate));

    while !stop.load(Ordering::Acquire) {
        std::thread::sleep(Duration::from_millis(25));
    }

    // Dropping the stream releases the device.
    drop(stream);
    debug!("Microphone capture stopped");
}

fn downmix(samples: impl Iterator<Item = f32>, channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.collect();
    }
    let interleaved: Vec<f32> = samples.collect();
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

fn forward_frame(tx: &mpsc::Sender<AudioFrame>, samples: Vec<f32>, sample_rate: u32) {
    if samples.is_empty() {
        return;
    }
    // Dropping a frame under backpressure is preferable to blocking the
    // audio callback.
    let _ = tx.try_send(AudioFrame {
        samples,
        sample_rate,
    });
}

fn map_config_error(err: cpal::DefaultStreamConfigError) -> AudioError {
    match err {
        cpal::DefaultStreamConfigError::DeviceNotAvailable => AudioError::Busy {
            hint: "the input device disappeared or is held by another application".to_string(),
        },
        cpal::DefaultStreamConfigError::StreamTypeNotSupported => AudioError::Backend(
            "the input device does not support a usable stream configuration".to_string(),
        ),
        cpal::DefaultStreamConfigError::BackendSpecific { err } => classify_backend(err.description),
    }
}

fn map_build_error(err: cpal::BuildStreamError) -> AudioError {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable => AudioError::Busy {
            hint: "the input device disappeared or is held by another application".to_string(),
        },
        cpal::BuildStreamError::StreamConfigNotSupported => AudioError::Backend(
            "the negotiated stream configuration was rejected by the device".to_string(),
        ),
        cpal::BuildStreamError::InvalidArgument => {
            AudioError::Backend("invalid stream configuration".to_string())
        }
        cpal::BuildStreamError::BackendSpecific { err } => classify_backend(err.description),
        other => AudioError::Backend(other.to_string()),
    }
}

fn classify_backend(description: String) -> AudioError {
    let lowered = description.to_lowercase();
    if lowered.contains("denied") || lowered.contains("permission") || lowered.contains("access") {
        AudioError::Denied {
            hint: format!(
                "grant microphone permission to this application and retry ({description})"
            ),
        }
    } else {
        AudioError::Backend(description)
    }
}
