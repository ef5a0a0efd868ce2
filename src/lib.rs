//! Perceptra: a voice-driven conversational agent.
//!
//! The agent runs a duty cycle:
//! Microphone → streaming ASR → transcript → reasoning (+ tools) → TTS → Speaker
//!
//! # Architecture
//!
//! - **STT**: Streams microphone audio to a WebSocket recognizer and
//!   finalizes one transcript per fixed listening window
//! - **Shutdown**: Matches transcripts against configured exit phrases
//! - **Agent**: Routes the transcript through a reasoning backend, running
//!   requested tools until a final reply is produced
//! - **Tools**: Registry of sync tools invoked with a timeout on the blocking pool
//! - **TTS**: Synthesizes the reply over HTTP, batch or streaming
//! - **Audio**: Captures from the microphone and plays or records replies via `cpal` and `hound`
//! - **Pipeline**: The duty-cycle controller tying the stages together

pub mod agent;
pub mod audio;
pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod shutdown;
pub mod stt;
pub mod tools;
pub mod tts;

pub use agent::{ConversationRouter, RoutingOutcome};
pub use config::SpeechConfig;
pub use error::{Result, SpeechError};
pub use pipeline::{CycleOutcome, DutyCycleController, DutyCycleParts, DutyState};
pub use shutdown::ShutdownDetector;
pub use stt::TranscriptFinalizer;
pub use tools::ToolInvoker;
