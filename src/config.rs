//! Configuration types for the voice agent.
//!
//! All settings are read once at startup and stay immutable for the
//! lifetime of the process. Every section deserializes with defaults so a
//! partial TOML file is valid.

use crate::error::{Result, SpeechError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration for the agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Audio capture/playback settings.
    pub audio: AudioConfig,
    /// Streaming speech-recognition settings.
    pub asr: AsrConfig,
    /// Speech-synthesis settings.
    pub tts: TtsConfig,
    /// Reasoning backend settings.
    pub llm: LlmConfig,
    /// Conversation routing settings.
    pub router: RouterConfig,
    /// Spoken shutdown phrases.
    pub shutdown: ShutdownConfig,
    /// Duty-cycle settings.
    pub session: SessionConfig,
}

/// Audio I/O configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Capture sample rate in Hz sent to the recognizer.
    pub sample_rate_hz: u32,
    /// Samples per chunk streamed to the recognizer.
    pub chunk_frames: usize,
    /// Input device name (None = system default).
    pub input_device: Option<String>,
    /// Output device name (None = system default).
    pub output_device: Option<String>,
    /// Play synthesized speech through the speakers.
    pub play_audio: bool,
    /// Also write each spoken reply to this WAV file.
    pub output_wav: Option<PathBuf>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 16_000,
            chunk_frames: 1600,
            input_device: None,
            output_device: None,
            play_audio: true,
            output_wav: None,
        }
    }
}

/// Streaming speech-recognition configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AsrConfig {
    /// Recognizer `host:port`.
    pub server: String,
    /// Use `wss://` instead of `ws://`.
    pub use_tls: bool,
    /// Streaming endpoint path on the server.
    pub path: String,
    /// BCP-47 language code.
    pub language_code: String,
    /// Ask the recognizer to insert punctuation.
    pub automatic_punctuation: bool,
    /// Ask for verbatim transcripts (no inverse text normalization).
    pub verbatim_transcripts: bool,
    /// Duration of one listening window in milliseconds.
    pub window_ms: u64,
}

impl Default for AsrConfig {
    fn default() -> Self {
        Self {
            server: "localhost:50051".into(),
            use_tls: false,
            path: "/v1/asr/stream".into(),
            language_code: "en-US".into(),
            automatic_punctuation: true,
            verbatim_transcripts: true,
            window_ms: 5_000,
        }
    }
}

impl AsrConfig {
    /// Full WebSocket URL of the streaming endpoint.
    pub fn endpoint_url(&self) -> String {
        let scheme = if self.use_tls { "wss" } else { "ws" };
        format!("{scheme}://{}{}", self.server, self.path)
    }
}

/// Speech-synthesis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Synthesizer `host:port`.
    pub server: String,
    /// Use `https://` instead of `http://`.
    pub use_tls: bool,
    /// Voice name (None = server default).
    pub voice: Option<String>,
    /// BCP-47 language code.
    pub language_code: String,
    /// Sample rate of the synthesized PCM in Hz.
    pub sample_rate_hz: u32,
    /// Stream audio as it is synthesized instead of waiting for the whole reply.
    pub streaming: bool,
    /// Synthesis quality hint passed to the server.
    pub quality: u32,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            server: "localhost:50052".into(),
            use_tls: false,
            voice: None,
            language_code: "en-US".into(),
            sample_rate_hz: 44_100,
            streaming: false,
            quality: 20,
            request_timeout_secs: 60,
        }
    }
}

impl TtsConfig {
    /// Base HTTP URL of the synthesizer.
    pub fn base_url(&self) -> String {
        let scheme = if self.use_tls { "https" } else { "http" };
        format!("{scheme}://{}", self.server)
    }
}

/// Reasoning backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// API base URL.
    pub base_url: String,
    /// Model identifier.
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Maximum tokens to generate per reply.
    pub max_tokens: usize,
    /// System prompt prepended to every request.
    pub system_prompt: String,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.anthropic.com".into(),
            model: "claude-3-5-sonnet-20241022".into(),
            api_key_env: "ANTHROPIC_API_KEY".into(),
            max_tokens: 1024,
            system_prompt: "You are a seasoned and a smart voice assistant. \
                Do not perform any action without be specifically requested for"
                .into(),
            request_timeout_secs: 60,
        }
    }
}

/// Conversation routing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Offer registered tools to the reasoning backend.
    pub tools_enabled: bool,
    /// Maximum reasoning rounds per user turn.
    pub max_tool_rounds: usize,
    /// Character limit applied to every turn sent to the backend.
    pub max_turn_chars: usize,
    /// Keep at most this many turns of history (None = unbounded).
    pub max_history_turns: Option<usize>,
    /// Per-tool execution timeout in seconds.
    pub tool_timeout_secs: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            tools_enabled: true,
            max_tool_rounds: 5,
            max_turn_chars: 1_000,
            max_history_turns: None,
            tool_timeout_secs: 30,
        }
    }
}

/// Shutdown phrase configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Phrases that stop the agent when spoken on their own.
    pub phrases: Vec<String>,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            phrases: ["shut down", "shutdown", "exit", "close", "switch off"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Duty-cycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Pause after a failed cycle before listening again, in milliseconds.
    pub failure_backoff_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            failure_backoff_ms: 1_000,
        }
    }
}

impl SpeechConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| SpeechError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| SpeechError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/perceptra/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("perceptra").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("perceptra")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/perceptra-config/config.toml")
        }
    }

    /// Check settings that would make the agent unusable.
    ///
    /// # Errors
    ///
    /// Returns [`SpeechError::Config`] describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate_hz == 0 {
            return Err(SpeechError::Config("audio.sample_rate_hz must be > 0".into()));
        }
        if self.audio.chunk_frames == 0 {
            return Err(SpeechError::Config("audio.chunk_frames must be > 0".into()));
        }
        if self.asr.window_ms == 0 {
            return Err(SpeechError::Config("asr.window_ms must be > 0".into()));
        }
        if self.tts.sample_rate_hz == 0 {
            return Err(SpeechError::Config("tts.sample_rate_hz must be > 0".into()));
        }
        if self.router.max_tool_rounds == 0 {
            return Err(SpeechError::Config("router.max_tool_rounds must be > 0".into()));
        }
        if self.router.max_turn_chars == 0 {
            return Err(SpeechError::Config("router.max_turn_chars must be > 0".into()));
        }
        if self.router.max_history_turns == Some(0) {
            return Err(SpeechError::Config(
                "router.max_history_turns must be > 0 when set".into(),
            ));
        }
        if self.shutdown.phrases.iter().all(|p| p.trim().is_empty()) {
            return Err(SpeechError::Config(
                "shutdown.phrases must contain at least one phrase".into(),
            ));
        }

        for (field, endpoint) in [
            ("asr.server", self.asr.endpoint_url()),
            ("tts.server", self.tts.base_url()),
            ("llm.base_url", self.llm.base_url.clone()),
        ] {
            url::Url::parse(&endpoint)
                .map_err(|e| SpeechError::Config(format!("{field} is not a valid endpoint: {e}")))?;
        }

        Ok(())
    }

    /// Read the reasoning backend API key from the configured environment variable.
    ///
    /// # Errors
    ///
    /// Returns [`SpeechError::Config`] when the variable is unset or blank.
    pub fn resolve_api_key(&self) -> Result<String> {
        match std::env::var(&self.llm.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_owned()),
            _ => Err(SpeechError::Config(format!(
                "{} environment variable is not set",
                self.llm.api_key_env
            ))),
        }
    }
}
