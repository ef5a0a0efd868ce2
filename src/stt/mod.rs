//! Streaming speech recognition.
//!
//! A [`TranscriptionSource`] opens one listening window at a time and yields
//! incremental [`RecognitionEvent`]s. The [`finalizer`] collapses a window's
//! events into a single [`Transcript`](crate::pipeline::messages::Transcript).

pub mod finalizer;
pub mod streaming;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use crate::error::Result;
use crate::pipeline::messages::RecognitionEvent;

pub use finalizer::TranscriptFinalizer;
pub use streaming::StreamingRecognizer;

/// Recognition events of one listening window.
///
/// Dropping the stream closes the window and releases its audio resources.
pub type RecognitionStream = Pin<Box<dyn Stream<Item = Result<RecognitionEvent>> + Send>>;

/// A backend that turns live audio into recognition events.
#[async_trait]
pub trait TranscriptionSource: Send + Sync {
    /// Open a new listening window.
    ///
    /// # Errors
    ///
    /// Returns [`SpeechError::TranscriptionTransport`](crate::SpeechError::TranscriptionTransport)
    /// or [`SpeechError::Audio`](crate::SpeechError::Audio) when the window cannot be opened.
    async fn open_window(&self) -> Result<RecognitionStream>;
}
