//! Streaming audio playback to system speakers via cpal.

use super::{AudioOutput, AudioSink};
use crate::config::AudioConfig;
use crate::error::{Result, SpeechError};
use crate::pipeline::messages::AudioFrame;
use async_trait::async_trait;
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, info};

/// Poll interval while waiting for the device to drain.
const DRAIN_POLL: Duration = Duration::from_millis(10);

/// Speaker output. Each reply gets its own device stream.
#[derive(Debug, Clone, Default)]
pub struct SpeakerOutput {
    output_device: Option<String>,
}

impl SpeakerOutput {
    /// Create a speaker output from audio settings.
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            output_device: config.output_device.clone(),
        }
    }

    /// List available output devices.
    ///
    /// # Errors
    ///
    /// Returns an error if devices cannot be enumerated.
    pub fn list_output_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .output_devices()
            .map_err(|e| SpeechError::Audio(format!("cannot enumerate devices: {e}")))?;

        let mut names = Vec::new();
        for device in devices {
            if let Ok(desc) = device.description() {
                names.push(desc.name().to_owned());
            }
        }
        Ok(names)
    }
}

#[async_trait]
impl AudioOutput for SpeakerOutput {
    async fn open_sink(&self, sample_rate: u32) -> Result<Box<dyn AudioSink>> {
        let queue = Arc::new(Mutex::new(PlaybackQueue::default()));
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();
        let device_name = self.output_device.clone();
        let thread_queue = Arc::clone(&queue);

        std::thread::Builder::new()
            .name("perceptra-playback".into())
            .spawn(move || {
                let stream = match open_stream(device_name.as_deref(), sample_rate, thread_queue) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if ready_tx.send(Ok(())).is_err() {
                    return;
                }
                let _ = stop_rx.recv();
                drop(stream);
                debug!("audio playback stopped");
            })
            .map_err(|e| SpeechError::Audio(format!("failed to spawn playback thread: {e}")))?;

        match ready_rx.await {
            Ok(Ok(())) => Ok(Box::new(SpeakerSink {
                queue,
                _stop: stop_tx,
            })),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(SpeechError::Audio(
                "playback thread exited before the stream started".into(),
            )),
        }
    }
}

fn open_stream(
    name: Option<&str>,
    sample_rate: u32,
    queue: Arc<Mutex<PlaybackQueue>>,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();

    let device = if let Some(name) = name {
        host.output_devices()
            .map_err(|e| SpeechError::Audio(format!("cannot enumerate devices: {e}")))?
            .find(|d| {
                d.description()
                    .ok()
                    .map(|desc| desc.name() == name)
                    .unwrap_or(false)
            })
            .ok_or_else(|| SpeechError::Audio(format!("output device '{name}' not found")))?
    } else {
        host.default_output_device()
            .ok_or_else(|| SpeechError::Audio("no default output device".into()))?
    };

    let device_name = device
        .description()
        .map(|d| d.name().to_owned())
        .unwrap_or_else(|_| "<unknown>".into());
    info!("using output device: {device_name}");

    let stream_config = StreamConfig {
        channels: 1,
        sample_rate,
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                let mut queue = match queue.lock() {
                    Ok(q) => q,
                    Err(_) => return,
                };
                for sample in data.iter_mut() {
                    *sample = queue.samples.pop_front().unwrap_or(0.0);
                }
            },
            move |err| {
                error!("audio output stream error: {err}");
            },
            None,
        )
        .map_err(|e| SpeechError::Audio(format!("failed to build output stream: {e}")))?;

    stream
        .play()
        .map_err(|e| SpeechError::Audio(format!("failed to start output stream: {e}")))?;

    Ok(stream)
}

/// Samples waiting for the output callback.
#[derive(Debug, Default)]
struct PlaybackQueue {
    samples: VecDeque<f32>,
}

/// Live speaker stream for one reply. Dropping it cuts playback short.
struct SpeakerSink {
    queue: Arc<Mutex<PlaybackQueue>>,
    _stop: std::sync::mpsc::Sender<()>,
}

#[async_trait]
impl AudioSink for SpeakerSink {
    fn write(&mut self, frame: &AudioFrame) -> Result<()> {
        let mut queue = self
            .queue
            .lock()
            .map_err(|e| SpeechError::Audio(format!("playback buffer lock poisoned: {e}")))?;
        queue.samples.extend(frame.samples.iter().copied());
        Ok(())
    }

    async fn finish(self: Box<Self>) -> Result<()> {
        loop {
            let remaining = self
                .queue
                .lock()
                .map_err(|e| SpeechError::Audio(format!("playback buffer lock poisoned: {e}")))?
                .samples
                .len();
            if remaining == 0 {
                break;
            }
            tokio::time::sleep(DRAIN_POLL).await;
        }
        // Let the device play out its last hardware buffer.
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(())
    }
}
