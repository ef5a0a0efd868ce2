//! Speech synthesis.
//!
//! A [`SpeechSynthesizer`] turns reply text into a stream of audio frames.
//! One-shot backends yield a single frame; streaming backends yield frames
//! as they are produced. The duty cycle treats both the same way.

pub mod http;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use crate::error::Result;
use crate::pipeline::messages::AudioFrame;

pub use http::HttpSynthesizer;

/// Synthesized audio of one reply.
pub type AudioFrameStream = Pin<Box<dyn Stream<Item = Result<AudioFrame>> + Send>>;

/// A text-to-speech backend.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Sample rate of produced frames.
    fn sample_rate(&self) -> u32;

    /// Start synthesizing `text`.
    ///
    /// # Errors
    ///
    /// Returns [`SpeechError::Synthesis`](crate::SpeechError::Synthesis) when the backend
    /// rejects the request. Failures after the first frame surface as stream items.
    async fn synthesize(&self, text: &str) -> Result<AudioFrameStream>;
}
