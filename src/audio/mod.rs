//! Audio capture and output.

pub mod capture;
pub mod playback;
pub mod wav;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::pipeline::messages::AudioFrame;

pub use capture::{MicrophoneCapture, MicrophoneWindow};
pub use playback::SpeakerOutput;
pub use wav::WavRecorder;

/// One reply's worth of audio output.
///
/// Frames are pushed as soon as they are synthesized. Dropping a sink
/// without calling [`finish`](AudioSink::finish) abandons playback.
#[async_trait]
pub trait AudioSink: Send {
    /// Queue a frame for output.
    ///
    /// # Errors
    ///
    /// Returns [`SpeechError::Audio`](crate::SpeechError::Audio) when the device or file rejects the frame.
    fn write(&mut self, frame: &AudioFrame) -> Result<()>;

    /// Wait until every queued frame has been delivered, then release the sink.
    async fn finish(self: Box<Self>) -> Result<()>;
}

/// Destination for synthesized speech.
#[async_trait]
pub trait AudioOutput: Send + Sync {
    /// Open a sink for one reply at `sample_rate`.
    async fn open_sink(&self, sample_rate: u32) -> Result<Box<dyn AudioSink>>;
}

/// Fans every frame out to several outputs. With no outputs it discards audio.
#[derive(Clone, Default)]
pub struct TeeOutput {
    outputs: Vec<Arc<dyn AudioOutput>>,
}

impl TeeOutput {
    /// Create an empty tee.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an output.
    pub fn with(mut self, output: Arc<dyn AudioOutput>) -> Self {
        self.outputs.push(output);
        self
    }

    /// Number of outputs.
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    /// Whether audio is discarded.
    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

#[async_trait]
impl AudioOutput for TeeOutput {
    async fn open_sink(&self, sample_rate: u32) -> Result<Box<dyn AudioSink>> {
        let mut sinks = Vec::with_capacity(self.outputs.len());
        for output in &self.outputs {
            sinks.push(output.open_sink(sample_rate).await?);
        }
        Ok(Box::new(TeeSink { sinks }))
    }
}

struct TeeSink {
    sinks: Vec<Box<dyn AudioSink>>,
}

#[async_trait]
impl AudioSink for TeeSink {
    fn write(&mut self, frame: &AudioFrame) -> Result<()> {
        for sink in &mut self.sinks {
            sink.write(frame)?;
        }
        Ok(())
    }

    async fn finish(self: Box<Self>) -> Result<()> {
        for sink in self.sinks {
            sink.finish().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[tokio::test]
    async fn empty_tee_discards_audio() {
        let tee = TeeOutput::new();
        assert!(tee.is_empty());
        let mut sink = tee.open_sink(16_000).await.unwrap();
        sink.write(&AudioFrame {
            samples: vec![0.0; 8],
            sample_rate: 16_000,
        })
        .unwrap();
        sink.finish().await.unwrap();
    }

    #[tokio::test]
    async fn tee_writes_to_every_output() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.wav");
        let b = dir.path().join("b.wav");
        let tee = TeeOutput::new()
            .with(Arc::new(WavRecorder::new(&a)))
            .with(Arc::new(WavRecorder::new(&b)));
        assert_eq!(tee.len(), 2);

        let mut sink = tee.open_sink(16_000).await.unwrap();
        sink.write(&AudioFrame {
            samples: vec![0.25; 32],
            sample_rate: 16_000,
        })
        .unwrap();
        sink.finish().await.unwrap();

        for path in [a, b] {
            assert_eq!(hound::WavReader::open(path).unwrap().len(), 32);
        }
    }
}
