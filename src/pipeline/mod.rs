//! The duty cycle and the messages passed through it.

pub mod coordinator;
pub mod messages;

pub use coordinator::{CycleOutcome, DutyCycleController, DutyCycleParts, DutyState};
pub use messages::{AudioFrame, RecognitionEvent, Transcript};
