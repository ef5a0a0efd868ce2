//! Error types for the perceptra agent.

/// Top-level error type for the voice agent.
///
/// Every variant except [`SpeechError::Config`] is recoverable: the component
/// that produces it converts it to a benign value (empty transcript, aborted
/// routing, failed tool result) or the duty cycle logs it and resumes
/// listening.
#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    /// Speech-recognition connection dropped or the stream failed.
    #[error("transcription transport error: {0}")]
    TranscriptionTransport(String),

    /// Reasoning backend call failed (network, auth, rate limit, malformed reply).
    #[error("reasoning backend error: {0}")]
    ReasoningBackend(String),

    /// A tool raised an error, panicked or timed out.
    #[error("tool execution error: {0}")]
    ToolExecution(String),

    /// Speech-synthesis backend failed.
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Audio device or stream error.
    #[error("audio error: {0}")]
    Audio(String),

    /// Missing credentials or invalid settings. Fatal at startup.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SpeechError {
    /// Whether this error should stop the process instead of being recovered.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, SpeechError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_config_errors_are_fatal() {
        assert!(SpeechError::Config("missing key".into()).is_fatal());
        assert!(!SpeechError::ReasoningBackend("503".into()).is_fatal());
        assert!(!SpeechError::TranscriptionTransport("reset".into()).is_fatal());
        assert!(!SpeechError::Synthesis("refused".into()).is_fatal());
    }

    #[test]
    fn display_carries_class_prefix() {
        let err = SpeechError::ToolExecution("boom".into());
        assert_eq!(err.to_string(), "tool execution error: boom");
    }
}
