//! WebSocket streaming recognizer.
//!
//! Each listening window opens its own socket: a JSON config message goes out
//! first, then microphone audio as binary PCM16-LE frames. The server answers
//! with JSON text messages carrying recognition results.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::{RecognitionStream, TranscriptionSource};
use crate::audio::{MicrophoneCapture, MicrophoneWindow};
use crate::config::AsrConfig;
use crate::error::{Result, SpeechError};
use crate::pipeline::messages::RecognitionEvent;

/// Events buffered between the socket pump and the finalizer.
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Session configuration sent as the first message of every window.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RecognitionConfig {
    /// Sample encoding of the binary frames, e.g. `LINEAR_PCM`.
    pub encoding: &'static str,
    /// Capture rate of the streamed audio.
    pub sample_rate_hertz: u32,
    /// Channels per frame. Capture is mixed down to mono.
    pub audio_channel_count: u16,
    /// BCP-47 language tag, e.g. `en-US`.
    pub language_code: String,
    /// Hypotheses per result. Only the first is used.
    pub max_alternatives: u16,
    /// Ask the server to insert punctuation.
    pub enable_automatic_punctuation: bool,
    /// Keep disfluencies and profanity as spoken.
    pub verbatim_transcripts: bool,
    /// Send partial hypotheses before the final result.
    pub interim_results: bool,
}

#[derive(Debug, Deserialize)]
struct ServerMessage {
    #[serde(default)]
    results: Vec<ServerResult>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ServerResult {
    #[serde(default)]
    is_final: bool,
    #[serde(default)]
    alternatives: Vec<ServerAlternative>,
}

#[derive(Debug, Deserialize)]
struct ServerAlternative {
    #[serde(default)]
    transcript: String,
}

/// Streams microphone audio to a WebSocket recognizer.
pub struct StreamingRecognizer {
    endpoint: String,
    config: RecognitionConfig,
    capture: MicrophoneCapture,
}

impl StreamingRecognizer {
    /// Create a recognizer that listens through `capture`.
    pub fn new(config: &AsrConfig, capture: MicrophoneCapture) -> Self {
        let config_message = RecognitionConfig {
            encoding: "LINEAR_PCM",
            sample_rate_hertz: capture.sample_rate(),
            audio_channel_count: 1,
            language_code: config.language_code.clone(),
            max_alternatives: 1,
            enable_automatic_punctuation: config.automatic_punctuation,
            verbatim_transcripts: config.verbatim_transcripts,
            interim_results: true,
        };
        Self {
            endpoint: config.endpoint_url(),
            config: config_message,
            capture,
        }
    }

    /// Override the endpoint URL.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// The config message sent at the start of each window.
    pub fn recognition_config(&self) -> &RecognitionConfig {
        &self.config
    }
}

#[async_trait]
impl TranscriptionSource for StreamingRecognizer {
    async fn open_window(&self) -> Result<RecognitionStream> {
        let (socket, _) = connect_async(self.endpoint.as_str())
            .await
            .map_err(|e| SpeechError::TranscriptionTransport(format!("connect {}: {e}", self.endpoint)))?;
        let (mut write, read) = socket.split();

        let config_json = serde_json::to_string(&self.config)
            .map_err(|e| SpeechError::TranscriptionTransport(format!("encode config: {e}")))?;
        write
            .send(Message::Text(config_json))
            .await
            .map_err(|e| SpeechError::TranscriptionTransport(format!("send config: {e}")))?;

        let window = self.capture.start().await?;
        info!(endpoint = %self.endpoint, "listening window opened");

        let (event_tx, mut event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let pump = tokio::spawn(pump_window(window, write, read, event_tx));
        let guard = PumpGuard(pump.abort_handle());

        Ok(Box::pin(async_stream::stream! {
            let _guard = guard;
            while let Some(item) = event_rx.recv().await {
                yield item;
            }
        }))
    }
}

/// Aborts the socket pump, and with it the microphone window, on drop.
struct PumpGuard(AbortHandle);

impl Drop for PumpGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn pump_window<W, R>(
    mut window: MicrophoneWindow,
    mut write: W,
    mut read: R,
    events: mpsc::Sender<Result<RecognitionEvent>>,
) where
    W: futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
    R: futures_util::Stream<Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>
        + Unpin,
{
    let mut frames_sent: u64 = 0;
    loop {
        tokio::select! {
            chunk = window.next_chunk() => {
                let Some(frame) = chunk else {
                    let _ = events
                        .send(Err(SpeechError::Audio("microphone stream ended".into())))
                        .await;
                    break;
                };
                if let Err(e) = write.send(Message::Binary(frame.to_pcm16_le())).await {
                    let _ = events
                        .send(Err(SpeechError::TranscriptionTransport(format!("send audio: {e}"))))
                        .await;
                    break;
                }
                frames_sent += 1;
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let parsed = parse_results(&text);
                        let failed = parsed.is_err();
                        let batch = match parsed {
                            Ok(batch) => batch.into_iter().map(Ok).collect::<Vec<_>>(),
                            Err(e) => vec![Err(e)],
                        };
                        for item in batch {
                            if events.send(item).await.is_err() {
                                return;
                            }
                        }
                        if failed {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(frames_sent, "recognizer closed the stream");
                        break;
                    }
                    Some(Err(e)) => {
                        let _ = events
                            .send(Err(SpeechError::TranscriptionTransport(format!("read: {e}"))))
                            .await;
                        break;
                    }
                    _ => {} // Binary, Ping/Pong frames handled by tungstenite.
                }
            }
            _ = events.closed() => break,
        }
    }

    if let Err(e) = write.close().await {
        debug!(error = %e, "socket close failed");
    }
}

/// Decode one server message into recognition events, one per result.
///
/// # Errors
///
/// Returns [`SpeechError::TranscriptionTransport`] for malformed JSON or a
/// server-reported error.
pub fn parse_results(text: &str) -> Result<Vec<RecognitionEvent>> {
    let message: ServerMessage = serde_json::from_str(text)
        .map_err(|e| SpeechError::TranscriptionTransport(format!("malformed server message: {e}")))?;

    if let Some(error) = message.error {
        warn!(error = %error, "recognizer reported an error");
        return Err(SpeechError::TranscriptionTransport(error));
    }

    Ok(message
        .results
        .into_iter()
        .map(|result| match result.alternatives.into_iter().next() {
            Some(best) => RecognitionEvent {
                text: best.transcript,
                is_final: result.is_final,
                has_alternatives: true,
            },
            None => RecognitionEvent::empty(result.is_final),
        })
        .collect())
}
