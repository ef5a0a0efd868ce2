//! Microphone audio capture using cpal.
//!
//! Each listening window owns its own input stream. The cpal stream lives on
//! a dedicated thread; the async side receives fixed-size mono chunks at the
//! configured sample rate and stops the thread by dropping the window.

use crate::config::AudioConfig;
use crate::error::{Result, SpeechError};
use crate::pipeline::messages::AudioFrame;
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

/// Chunks buffered between the audio thread and the recognizer.
const CHUNK_CHANNEL_CAPACITY: usize = 64;

/// Opens microphone capture windows.
#[derive(Debug, Clone)]
pub struct MicrophoneCapture {
    input_device: Option<String>,
    target_sample_rate: u32,
    chunk_frames: usize,
}

impl MicrophoneCapture {
    /// Create a capture factory from audio settings.
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            input_device: config.input_device.clone(),
            target_sample_rate: config.sample_rate_hz,
            chunk_frames: config.chunk_frames,
        }
    }

    /// Sample rate of delivered chunks.
    pub fn sample_rate(&self) -> u32 {
        self.target_sample_rate
    }

    /// Start capturing. Audio flows until the returned window is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be opened or the stream fails to start.
    pub async fn start(&self) -> Result<MicrophoneWindow> {
        let (chunk_tx, chunk_rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();
        let settings = self.clone();

        std::thread::Builder::new()
            .name("perceptra-capture".into())
            .spawn(move || settings.capture_thread(chunk_tx, ready_tx, stop_rx))
            .map_err(|e| SpeechError::Audio(format!("failed to spawn capture thread: {e}")))?;

        match ready_rx.await {
            Ok(Ok(())) => Ok(MicrophoneWindow {
                chunks: chunk_rx,
                _stop: stop_tx,
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(SpeechError::Audio(
                "capture thread exited before the stream started".into(),
            )),
        }
    }

    fn capture_thread(
        self,
        chunk_tx: mpsc::Sender<AudioFrame>,
        ready_tx: oneshot::Sender<Result<()>>,
        stop_rx: std::sync::mpsc::Receiver<()>,
    ) {
        let stream = match self.open_stream(chunk_tx) {
            Ok(stream) => stream,
            Err(e) => {
                let _ = ready_tx.send(Err(e));
                return;
            }
        };

        if ready_tx.send(Ok(())).is_err() {
            return;
        }

        // Blocks until the window drops its sender.
        let _ = stop_rx.recv();
        drop(stream);
        debug!("audio capture stopped");
    }

    fn open_stream(&self, chunk_tx: mpsc::Sender<AudioFrame>) -> Result<cpal::Stream> {
        let device = find_input_device(self.input_device.as_deref())?;

        let default_config = device
            .default_input_config()
            .map_err(|e| SpeechError::Audio(format!("no default input config: {e}")))?;

        let native_rate = default_config.sample_rate();
        let native_channels = default_config.channels();
        let stream_config = StreamConfig {
            channels: native_channels,
            sample_rate: native_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        let target_rate = self.target_sample_rate;
        let chunk_frames = self.chunk_frames.max(1);
        let mut pending: Vec<f32> = Vec::with_capacity(chunk_frames * 2);

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    let mono = if native_channels > 1 {
                        to_mono(data, native_channels)
                    } else {
                        data.to_vec()
                    };
                    pending.extend(downsample(&mono, native_rate, target_rate));

                    while pending.len() >= chunk_frames {
                        let samples: Vec<f32> = pending.drain(..chunk_frames).collect();
                        let frame = AudioFrame {
                            samples,
                            sample_rate: target_rate,
                        };
                        // Never block the audio thread.
                        if chunk_tx.try_send(frame).is_err() {
                            debug!("audio channel full, dropping chunk");
                        }
                    }
                },
                move |err| {
                    error!("audio input stream error: {err}");
                },
                None,
            )
            .map_err(|e| SpeechError::Audio(format!("failed to build input stream: {e}")))?;

        stream
            .play()
            .map_err(|e| SpeechError::Audio(format!("failed to start input stream: {e}")))?;

        info!(
            native_rate,
            native_channels, target_rate, chunk_frames, "audio capture started"
        );
        Ok(stream)
    }

    /// List available input devices.
    ///
    /// # Errors
    ///
    /// Returns an error if devices cannot be enumerated.
    pub fn list_input_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
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

/// One open microphone window. Dropping it stops capture.
pub struct MicrophoneWindow {
    chunks: mpsc::Receiver<AudioFrame>,
    _stop: std::sync::mpsc::Sender<()>,
}

impl MicrophoneWindow {
    /// Next captured chunk, or `None` once the device stream has gone away.
    pub async fn next_chunk(&mut self) -> Option<AudioFrame> {
        self.chunks.recv().await
    }
}

fn find_input_device(name: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();

    let device = if let Some(name) = name {
        host.input_devices()
            .map_err(|e| SpeechError::Audio(format!("cannot enumerate devices: {e}")))?
            .find(|d| {
                d.description()
                    .ok()
                    .map(|desc| desc.name() == name)
                    .unwrap_or(false)
            })
            .ok_or_else(|| SpeechError::Audio(format!("input device '{name}' not found")))?
    } else {
        host.default_input_device()
            .ok_or_else(|| SpeechError::Audio("no default input device".into()))?
    };

    let device_name = device
        .description()
        .map(|d| d.name().to_owned())
        .unwrap_or_else(|_| "<unknown>".into());
    debug!("using input device: {device_name}");
    Ok(device)
}

/// Convert interleaved multi-channel audio to mono by averaging channels.
fn to_mono(data: &[f32], channels: u16) -> Vec<f32> {
    let ch = channels as usize;
    data.chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

/// Linear-interpolation resampler, sufficient for speech band audio.
fn downsample(samples: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate == dst_rate || samples.is_empty() || dst_rate == 0 {
        return samples.to_vec();
    }

    let ratio = src_rate as f64 / dst_rate as f64;
    let out_len = (samples.len() as f64 / ratio) as usize;
    let mut output = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let src_pos = i as f64 * ratio;
        let idx = src_pos as usize;
        let frac = src_pos - idx as f64;

        let sample = if idx + 1 < samples.len() {
            samples[idx] as f64 * (1.0 - frac) + samples[idx + 1] as f64 * frac
        } else {
            samples[idx.min(samples.len() - 1)] as f64
        };

        output.push(sample as f32);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stereo_mixes_to_mono() {
        let mono = to_mono(&[0.5, -0.5, 1.0, 0.0], 2);
        assert_eq!(mono, vec![0.0, 0.5]);
    }

    #[test]
    fn downsample_halves_length() {
        let input: Vec<f32> = (0..480).map(|i| i as f32 / 480.0).collect();
        let output = downsample(&input, 48_000, 16_000);
        assert_eq!(output.len(), 160);
        assert!((output[1] - input[3]).abs() < 1e-6);
    }

    #[test]
    fn downsample_same_rate_is_identity() {
        let input = vec![0.1, 0.2, 0.3];
        assert_eq!(downsample(&input, 16_000, 16_000), input);
    }

    #[test]
    fn capture_uses_configured_rate() {
        let config = AudioConfig {
            sample_rate_hz: 8_000,
            ..AudioConfig::default()
        };
        assert_eq!(MicrophoneCapture::new(&config).sample_rate(), 8_000);
    }
}
