//! Message types passed between duty-cycle stages.

/// One incremental result from the streaming recognizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionEvent {
    /// Best-alternative text, possibly empty.
    pub text: String,
    /// Whether the recognizer considers this result final.
    pub is_final: bool,
    /// Whether the result carried any recognition alternative.
    pub has_alternatives: bool,
}

impl RecognitionEvent {
    /// A non-final result with one alternative.
    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
            has_alternatives: true,
        }
    }

    /// A final result with one alternative.
    pub fn final_result(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
            has_alternatives: true,
        }
    }

    /// A result without alternatives (e.g. an endpointing marker).
    pub fn empty(is_final: bool) -> Self {
        Self {
            text: String::new(),
            is_final,
            has_alternatives: false,
        }
    }
}

/// The finalized text of one listening window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    /// Recognized text; empty means nothing was said.
    pub text: String,
    /// How long the window was open, in milliseconds.
    pub window_duration_ms: u64,
}

impl Transcript {
    /// Create a transcript.
    pub fn new(text: impl Into<String>, window_duration_ms: u64) -> Self {
        Self {
            text: text.into(),
            window_duration_ms,
        }
    }

    /// Whether nothing (or only whitespace) was recognized.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// A block of mono audio samples.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Mono f32 samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl AudioFrame {
    /// Decode little-endian signed 16-bit PCM.
    ///
    /// A trailing odd byte is ignored; streaming callers carry it into the
    /// next chunk themselves.
    pub fn from_pcm16_le(bytes: &[u8], sample_rate: u32) -> Self {
        let samples = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / i16::MAX as f32)
            .collect();
        Self {
            samples,
            sample_rate,
        }
    }

    /// Encode as little-endian signed 16-bit PCM, clamping out-of-range samples.
    pub fn to_pcm16_le(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.samples.len() * 2);
        for &sample in &self.samples {
            bytes.extend_from_slice(&f32_to_i16(sample).to_le_bytes());
        }
        bytes
    }

    /// Duration of the frame in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / self.sample_rate as u64
    }
}

/// Convert an f32 sample to i16 PCM.
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}
