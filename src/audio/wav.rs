//! WAV file output for synthesized replies.

use super::{AudioOutput, AudioSink};
use crate::error::{Result, SpeechError};
use crate::pipeline::messages::{AudioFrame, f32_to_i16};
use async_trait::async_trait;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::info;

/// Writes each spoken reply to a mono 16-bit WAV file, replacing the
/// previous reply.
#[derive(Debug, Clone)]
pub struct WavRecorder {
    path: PathBuf,
}

impl WavRecorder {
    /// Record replies to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Destination file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AudioOutput for WavRecorder {
    async fn open_sink(&self, sample_rate: u32) -> Result<Box<dyn AudioSink>> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(&self.path, spec)
            .map_err(|e| SpeechError::Audio(format!("cannot create {}: {e}", self.path.display())))?;
        Ok(Box::new(WavSink {
            writer,
            path: self.path.clone(),
            samples: 0,
        }))
    }
}

struct WavSink {
    writer: hound::WavWriter<BufWriter<File>>,
    path: PathBuf,
    samples: u64,
}

#[async_trait]
impl AudioSink for WavSink {
    fn write(&mut self, frame: &AudioFrame) -> Result<()> {
        for &sample in &frame.samples {
            self.writer
                .write_sample(f32_to_i16(sample))
                .map_err(|e| SpeechError::Audio(format!("WAV write failed: {e}")))?;
        }
        self.samples += frame.samples.len() as u64;
        Ok(())
    }

    async fn finish(self: Box<Self>) -> Result<()> {
        let WavSink {
            writer,
            path,
            samples,
        } = *self;
        writer
            .finalize()
            .map_err(|e| SpeechError::Audio(format!("WAV finalize failed: {e}")))?;
        info!(path = %path.display(), samples, "reply written to WAV");
        Ok(())
    }
}
