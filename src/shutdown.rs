//! Spoken shutdown phrase detection.
//!
//! Checked on every finalized transcript before it reaches the router. A
//! transcript stops the agent only when, after trimming and case folding, it
//! is exactly one of the configured phrases: "please exit the menu" does not
//! match "exit".

use std::collections::HashSet;

use crate::config::ShutdownConfig;
use crate::pipeline::messages::Transcript;

/// Exact-match detector over a closed phrase set.
#[derive(Debug, Clone)]
pub struct ShutdownDetector {
    phrases: HashSet<String>,
}

impl ShutdownDetector {
    /// Build a detector from raw phrases. Phrases are normalized on load and
    /// blank ones are dropped.
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let phrases = phrases
            .into_iter()
            .map(|p| normalize(p.as_ref()))
            .filter(|p| !p.is_empty())
            .collect();
        Self { phrases }
    }

    /// Build a detector from configuration.
    pub fn from_config(config: &ShutdownConfig) -> Self {
        Self::new(&config.phrases)
    }

    /// Whether the transcript is a shutdown command.
    pub fn is_shutdown(&self, transcript: &Transcript) -> bool {
        self.matches(&transcript.text)
    }

    /// Whether raw text is a shutdown command.
    pub fn matches(&self, text: &str) -> bool {
        let normalized = normalize(text);
        !normalized.is_empty() && self.phrases.contains(&normalized)
    }

    /// Number of distinct phrases.
    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    /// Whether no phrases are configured.
    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }
}

impl Default for ShutdownDetector {
    fn default() -> Self {
        Self::from_config(&ShutdownConfig::default())
    }
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcript(text: &str) -> Transcript {
        Transcript::new(text, 5000)
    }

    #[test]
    fn default_phrases_match_after_trim_and_case_fold() {
        let detector = ShutdownDetector::default();
        assert!(detector.is_shutdown(&transcript("EXIT ")));
        assert!(detector.is_shutdown(&transcript("  Shut Down")));
        assert!(detector.is_shutdown(&transcript("shutdown")));
        assert!(detector.is_shutdown(&transcript("Close")));
        assert!(detector.is_shutdown(&transcript("switch off\n")));
    }

    #[test]
    fn phrase_inside_a_sentence_does_not_match() {
        let detector = ShutdownDetector::default();
        assert!(!detector.is_shutdown(&transcript("please exit the menu")));
        assert!(!detector.is_shutdown(&transcript("close the door")));
        assert!(!detector.is_shutdown(&transcript("exit.")));
    }

    #[test]
    fn empty_transcript_never_matches() {
        let detector = ShutdownDetector::new(["exit", "  "]);
        assert_eq!(detector.len(), 1);
        assert!(!detector.is_shutdown(&transcript("")));
        assert!(!detector.is_shutdown(&transcript("   ")));
    }

    #[test]
    fn configured_phrases_are_normalized_on_load() {
        let detector = ShutdownDetector::new(["  Good Night  ", "STOP"]);
        assert!(detector.matches("good night"));
        assert!(detector.matches("stop"));
        assert!(!detector.matches("exit"));
    }
}
