//! HTTP speech-synthesis client.
//!
//! Talks to a synthesis server that returns raw little-endian PCM16 mono
//! audio. Batch mode posts to `/v1/tts/synthesize` and yields the whole
//! reply as one frame; streaming mode posts to `/v1/tts/synthesize_online`
//! and yields frames as response chunks arrive.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Serialize;
use tracing::{debug, info};

use super::{AudioFrameStream, SpeechSynthesizer};
use crate::config::TtsConfig;
use crate::error::{Result, SpeechError};
use crate::pipeline::messages::AudioFrame;

/// Request body accepted by the synthesis server.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SynthesisRequest {
    /// Text to speak.
    pub text: String,
    /// Voice name, omitted for the server default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    /// BCP-47 language code.
    pub language_code: String,
    /// Requested PCM sample rate.
    pub sample_rate_hz: u32,
    /// Quality hint.
    pub quality: u32,
}

/// HTTP synthesizer.
pub struct HttpSynthesizer {
    config: TtsConfig,
    base_url: String,
    client: reqwest::Client,
}

impl HttpSynthesizer {
    /// Create a synthesizer from settings.
    ///
    /// # Errors
    ///
    /// Returns [`SpeechError::Config`] if the HTTP client cannot be built.
    pub fn new(config: &TtsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
            .map_err(|e| SpeechError::Config(format!("cannot build TTS client: {e}")))?;
        Ok(Self {
            base_url: config.base_url(),
            config: config.clone(),
            client,
        })
    }

    /// Override the base URL (useful for testing with mock servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Build the request body for `text`.
    pub fn request_for(&self, text: &str) -> SynthesisRequest {
        SynthesisRequest {
            text: text.to_owned(),
            voice: self.config.voice.clone(),
            language_code: self.config.language_code.clone(),
            sample_rate_hz: self.config.sample_rate_hz,
            quality: self.config.quality,
        }
    }

    async fn post(&self, endpoint: &str, text: &str) -> Result<reqwest::Response> {
        let url = format!("{}{endpoint}", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&self.request_for(text))
            .send()
            .await
            .map_err(|e| SpeechError::Synthesis(format!("connection error: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read body".into());
            let detail: String = body.chars().take(300).collect();
            return Err(SpeechError::Synthesis(format!("HTTP {status}: {detail}")));
        }
        Ok(response)
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSynthesizer {
    fn sample_rate(&self) -> u32 {
        self.config.sample_rate_hz
    }

    async fn synthesize(&self, text: &str) -> Result<AudioFrameStream> {
        let sample_rate = self.config.sample_rate_hz;
        let started = Instant::now();

        if !self.config.streaming {
            let response = self.post("/v1/tts/synthesize", text).await?;
            let body = response
                .bytes()
                .await
                .map_err(|e| SpeechError::Synthesis(format!("failed to read audio: {e}")))?;
            let frame = AudioFrame::from_pcm16_le(&body, sample_rate);
            info!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                audio_ms = frame.duration_ms(),
                "batch synthesis complete"
            );
            return Ok(Box::pin(futures_util::stream::iter([Ok::<_, SpeechError>(frame)])));
        }

        let response = self.post("/v1/tts/synthesize_online", text).await?;
        let mut chunks = response.bytes_stream();

        let frames = async_stream::stream! {
            let mut carry: Option<u8> = None;
            let mut first = true;

            while let Some(chunk) = chunks.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(SpeechError::Synthesis(format!("audio stream error: {e}")));
                        return;
                    }
                };
                let (pcm, next_carry) = align_pcm16(carry.take(), &chunk);
                carry = next_carry;
                if pcm.is_empty() {
                    continue;
                }
                if first {
                    first = false;
                    info!(
                        time_to_first_audio_ms = started.elapsed().as_millis() as u64,
                        "streaming synthesis started"
                    );
                }
                yield Ok(AudioFrame::from_pcm16_le(&pcm, sample_rate));
            }

            if carry.is_some() {
                debug!("dropping trailing odd PCM byte");
            }
        };

        Ok(Box::pin(frames))
    }
}

/// Join a carried byte with a new chunk and split off a trailing odd byte.
fn align_pcm16(carry: Option<u8>, chunk: &[u8]) -> (Vec<u8>, Option<u8>) {
    let mut pcm = Vec::with_capacity(chunk.len() + 1);
    if let Some(byte) = carry {
        pcm.push(byte);
    }
    pcm.extend_from_slice(chunk);
    let next = if pcm.len() % 2 == 1 { pcm.pop() } else { None };
    (pcm, next)
}
