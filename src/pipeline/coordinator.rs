//! Duty-cycle controller: listen → think → speak → listen.
//!
//! One cycle runs at a time. Any error or panic inside a cycle is caught at
//! the cycle boundary, logged, and followed by a backoff pause; only a
//! shutdown phrase or the cancellation token stops the loop. Synthesis and
//! playback failures only skip that turn's audio. Cancellation drops the
//! in-flight cycle, which releases the listening window and the audio sink.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{FutureExt, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::agent::router::{ConversationRouter, RoutingOutcome};
use crate::audio::AudioOutput;
use crate::config::SpeechConfig;
use crate::error::Result;
use crate::shutdown::ShutdownDetector;
use crate::stt::{TranscriptFinalizer, TranscriptionSource};
use crate::tts::SpeechSynthesizer;

/// Controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DutyState {
    /// A listening window is open.
    Listening,
    /// The router is working on a transcript.
    Routing,
    /// A reply is being synthesized and played.
    Speaking,
    /// Terminal.
    Stopped,
}

/// What one cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing was said, or the reply was empty.
    Idle,
    /// A reply was spoken.
    Spoke,
    /// Routing aborted; nothing was spoken.
    Aborted,
    /// A reply was ready but synthesis or playback failed.
    Unspoken,
    /// A shutdown phrase was heard.
    Stopped,
}

/// Collaborators of the duty cycle.
pub struct DutyCycleParts {
    /// Source of listening windows.
    pub source: Arc<dyn TranscriptionSource>,
    /// Conversation router.
    pub router: ConversationRouter,
    /// Speech synthesizer.
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    /// Where synthesized speech goes.
    pub output: Arc<dyn AudioOutput>,
}

/// Top-level listen/think/speak loop.
pub struct DutyCycleController {
    source: Arc<dyn TranscriptionSource>,
    finalizer: TranscriptFinalizer,
    shutdown: ShutdownDetector,
    router: ConversationRouter,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    output: Arc<dyn AudioOutput>,
    failure_backoff: Duration,
    state: DutyState,
    cycles: u64,
    cancel: CancellationToken,
}

impl DutyCycleController {
    /// Build a controller from settings and collaborators.
    pub fn new(config: &SpeechConfig, parts: DutyCycleParts) -> Self {
        Self {
            source: parts.source,
            finalizer: TranscriptFinalizer::new(Duration::from_millis(config.asr.window_ms)),
            shutdown: ShutdownDetector::from_config(&config.shutdown),
            router: parts.router,
            synthesizer: parts.synthesizer,
            output: parts.output,
            failure_backoff: Duration::from_millis(config.session.failure_backoff_ms),
            state: DutyState::Listening,
            cycles: 0,
            cancel: CancellationToken::new(),
        }
    }

    /// Get a cancellation token that stops the loop. Cancelling it is the
    /// external interrupt.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Current state.
    pub fn state(&self) -> DutyState {
        self.state
    }

    /// Cycles started so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// The router, for inspecting history.
    pub fn router(&self) -> &ConversationRouter {
        &self.router
    }

    /// Run one listen → think → speak cycle.
    ///
    /// # Errors
    ///
    /// Returns errors raised while opening the listening window. The caller
    /// decides whether to back off and retry. Synthesis and playback failures
    /// only skip this turn's audio.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome> {
        self.state = DutyState::Listening;
        let events = self.source.open_window().await?;
        let transcript = self.finalizer.finalize_window(events).await;

        if transcript.is_empty() {
            debug!(window_ms = transcript.window_duration_ms, "nothing heard");
            return Ok(CycleOutcome::Idle);
        }
        info!(transcript = %transcript.text, "transcript finalized");

        if self.shutdown.is_shutdown(&transcript) {
            info!("shutdown phrase heard");
            self.state = DutyState::Stopped;
            return Ok(CycleOutcome::Stopped);
        }

        self.state = DutyState::Routing;
        let reply = match self.router.route(&transcript).await {
            RoutingOutcome::FinalReply(reply) => reply,
            RoutingOutcome::Aborted(reason) => {
                warn!(reason = %reason, "routing aborted, nothing to say");
                self.state = DutyState::Listening;
                return Ok(CycleOutcome::Aborted);
            }
        };

        if reply.is_empty() {
            debug!("empty reply, nothing to say");
            self.state = DutyState::Listening;
            return Ok(CycleOutcome::Idle);
        }
        info!(reply = %reply, "speaking");

        self.state = DutyState::Speaking;
        let spoken = self.speak(&reply).await;
        self.state = DutyState::Listening;
        match spoken {
            Ok(()) => Ok(CycleOutcome::Spoke),
            Err(e) => {
                warn!(error = %e, "reply not delivered, skipping audio for this turn");
                Ok(CycleOutcome::Unspoken)
            }
        }
    }

    async fn speak(&self, text: &str) -> Result<()> {
        let mut frames = self.synthesizer.synthesize(text).await?;
        let mut sink = self.output.open_sink(self.synthesizer.sample_rate()).await?;
        while let Some(frame) = frames.next().await {
            sink.write(&frame?)?;
        }
        sink.finish().await
    }

    /// Run cycles until a shutdown phrase is heard or the token is cancelled.
    ///
    /// Never fails because of a backend: cycle errors and panics are logged
    /// and followed by the configured backoff.
    pub async fn run(&mut self) -> Result<()> {
        let cancel = self.cancel.clone();
        info!("duty cycle started");

        loop {
            if cancel.is_cancelled() {
                break;
            }
            self.cycles += 1;
            let span = info_span!("duty_cycle", cycle = self.cycles);

            let outcome = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("interrupted, stopping");
                    break;
                }
                outcome = AssertUnwindSafe(self.run_cycle()).catch_unwind().instrument(span.clone()) => outcome,
            };

            let failed = match outcome {
                Ok(Ok(CycleOutcome::Stopped)) => break,
                Ok(Ok(outcome)) => {
                    debug!(parent: &span, ?outcome, "cycle complete");
                    false
                }
                Ok(Err(e)) => {
                    warn!(parent: &span, error = %e, "cycle failed");
                    true
                }
                Err(panic) => {
                    error!(parent: &span, panic = panic_message(&panic), "cycle panicked");
                    self.router.discard_open_turn();
                    true
                }
            };

            if failed {
                self.state = DutyState::Listening;
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.failure_backoff) => {}
                }
            }
        }

        // A cancelled cycle may have left a half-routed turn behind.
        self.router.discard_open_turn();
        self.state = DutyState::Stopped;
        info!(cycles = self.cycles, "duty cycle stopped");
        Ok(())
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_message_extracts_text() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&payload), "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&payload), "bang");
        let payload: Box<dyn std::any::Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(&payload), "non-string panic payload");
    }
}
