//! Collapse one listening window into a final transcript.

use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::Result;
use crate::pipeline::messages::{RecognitionEvent, Transcript};

/// Finalizes recognition windows of a fixed duration.
#[derive(Debug, Clone, Copy)]
pub struct TranscriptFinalizer {
    window: Duration,
}

impl TranscriptFinalizer {
    /// Create a finalizer for windows of `window` duration.
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    /// The configured window duration.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Finalize a window that starts now.
    pub async fn finalize_window<S>(&self, events: S) -> Transcript
    where
        S: Stream<Item = Result<RecognitionEvent>> + Unpin,
    {
        finalize(events, Instant::now() + self.window).await
    }
}

/// Consume recognition events until a final result or the deadline.
///
/// - The first event that is final and carries alternatives wins
///   immediately; nothing after it is read.
/// - Events without alternatives are skipped.
/// - At the deadline, or when the stream ends first, the most recent
///   non-empty text is returned.
/// - A stream error is logged and yields an empty transcript.
pub async fn finalize<S>(mut events: S, deadline: Instant) -> Transcript
where
    S: Stream<Item = Result<RecognitionEvent>> + Unpin,
{
    let started = Instant::now();
    let mut best_effort = String::new();
    let mut last_logged_secs = None;

    let text = loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let remaining_secs = remaining.as_secs();
        if last_logged_secs != Some(remaining_secs) {
            debug!(remaining_secs, "listening");
            last_logged_secs = Some(remaining_secs);
        }

        let next = match tokio::time::timeout_at(deadline, events.next()).await {
            Ok(next) => next,
            Err(_elapsed) => {
                debug!(chars = best_effort.len(), "window deadline reached");
                break best_effort;
            }
        };

        match next {
            Some(Ok(event)) => {
                if !event.has_alternatives {
                    continue;
                }
                if event.is_final {
                    debug!("final recognition result");
                    break event.text;
                }
                if !event.text.trim().is_empty() {
                    best_effort = event.text;
                }
            }
            Some(Err(e)) => {
                warn!(error = %e, "recognition stream failed, discarding window");
                break String::new();
            }
            None => {
                debug!("recognition stream ended before deadline");
                break best_effort;
            }
        }
    };

    Transcript::new(
        text.trim(),
        started.elapsed().as_millis().min(u64::MAX as u128) as u64,
    )
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::error::SpeechError;
    use futures_util::stream;

    fn ok(event: RecognitionEvent) -> Result<RecognitionEvent> {
        Ok(event)
    }

    fn deadline_in(ms: u64) -> Instant {
        Instant::now() + Duration::from_millis(ms)
    }

    #[tokio::test]
    async fn deadline_returns_latest_interim_text() {
        let events = stream::iter(vec![
            ok(RecognitionEvent::interim("hel")),
            ok(RecognitionEvent::interim("hello")),
        ])
        .chain(stream::pending());

        let transcript = finalize(Box::pin(events), deadline_in(50)).await;
        assert_eq!(transcript.text, "hello");
        assert!(transcript.window_duration_ms >= 40);
    }

    #[tokio::test]
    async fn final_result_returns_immediately() {
        let events = stream::iter(vec![
            ok(RecognitionEvent::interim("what")),
            ok(RecognitionEvent::final_result("what time is it")),
            ok(RecognitionEvent::interim("ignored")),
        ])
        .chain(stream::pending());

        let started = Instant::now();
        let transcript = finalize(Box::pin(events), deadline_in(5_000)).await;
        assert_eq!(transcript.text, "what time is it");
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn events_without_alternatives_are_skipped() {
        let events = stream::iter(vec![
            ok(RecognitionEvent::interim("turn on")),
            ok(RecognitionEvent::empty(true)),
            ok(RecognitionEvent::empty(false)),
        ])
        .chain(stream::pending());

        let transcript = finalize(Box::pin(events), deadline_in(50)).await;
        assert_eq!(transcript.text, "turn on");
    }

    #[tokio::test]
    async fn empty_interims_do_not_erase_best_effort() {
        let events = stream::iter(vec![
            ok(RecognitionEvent::interim("lights")),
            ok(RecognitionEvent::interim("")),
        ]);

        let transcript = finalize(Box::pin(events), deadline_in(5_000)).await;
        assert_eq!(transcript.text, "lights");
    }

    #[tokio::test]
    async fn silence_yields_empty_transcript() {
        let events = stream::pending::<Result<RecognitionEvent>>();
        let transcript = finalize(Box::pin(events), deadline_in(30)).await;
        assert!(transcript.is_empty());
    }

    #[tokio::test]
    async fn stream_error_yields_empty_transcript() {
        let events = stream::iter(vec![
            ok(RecognitionEvent::interim("partial")),
            Err(SpeechError::TranscriptionTransport("connection reset".into())),
        ]);

        let transcript = finalize(Box::pin(events), deadline_in(5_000)).await;
        assert!(transcript.is_empty());
    }

    #[tokio::test]
    async fn finalizer_applies_configured_window() {
        let finalizer = TranscriptFinalizer::new(Duration::from_millis(40));
        let events = stream::iter(vec![ok(RecognitionEvent::interim("ok"))]).chain(stream::pending());
        let transcript = finalizer.finalize_window(Box::pin(events)).await;
        assert_eq!(transcript.text, "ok");
        assert_eq!(finalizer.window(), Duration::from_millis(40));
    }
}
