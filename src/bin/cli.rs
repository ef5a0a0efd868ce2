//! CLI binary for perceptra.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use perceptra::audio::{AudioOutput, MicrophoneCapture, SpeakerOutput, TeeOutput, WavRecorder};
use perceptra::llm::{AnthropicBackend, AnthropicConfig};
use perceptra::stt::StreamingRecognizer;
use perceptra::tools::builtin_registry;
use perceptra::tts::HttpSynthesizer;
use perceptra::{ConversationRouter, DutyCycleController, DutyCycleParts, SpeechConfig, ToolInvoker};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Perceptra: voice-driven conversational agent.
#[derive(Parser)]
#[command(name = "perceptra", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Speech-recognition server `host:port`.
    #[arg(long)]
    asr_server: Option<String>,

    /// Speech-synthesis server `host:port`.
    #[arg(long)]
    tts_server: Option<String>,

    /// Input device name.
    #[arg(long)]
    input_device: Option<String>,

    /// Output device name.
    #[arg(long)]
    output_device: Option<String>,

    /// Capture sample rate in Hz.
    #[arg(long)]
    sample_rate_hz: Option<u32>,

    /// Samples per streamed audio chunk.
    #[arg(long)]
    file_streaming_chunk: Option<usize>,

    /// Synthesis voice name.
    #[arg(long)]
    voice: Option<String>,

    /// Use streaming synthesis.
    #[arg(long)]
    stream: bool,

    /// Write each spoken reply to this WAV file.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Answer without tools.
    #[arg(long)]
    no_tools: bool,

    /// Listening window length in seconds.
    #[arg(long)]
    window_secs: Option<u64>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Start the voice agent.
    Run,

    /// List available audio devices.
    Devices,

    /// Print the effective configuration as TOML.
    PrintConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Missing .env is fine.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("perceptra=info,hyper=warn,reqwest=warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_agent(config).await,
        Command::Devices => list_devices(),
        Command::PrintConfig => {
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<SpeechConfig> {
    let mut config = if let Some(ref path) = cli.config {
        SpeechConfig::from_file(path)?
    } else {
        let default_path = SpeechConfig::default_config_path();
        if default_path.is_file() {
            SpeechConfig::from_file(&default_path)?
        } else {
            SpeechConfig::default()
        }
    };

    if let Some(ref server) = cli.asr_server {
        config.asr.server = server.clone();
    }
    if let Some(ref server) = cli.tts_server {
        config.tts.server = server.clone();
    }
    if let Some(ref device) = cli.input_device {
        config.audio.input_device = Some(device.clone());
    }
    if let Some(ref device) = cli.output_device {
        config.audio.output_device = Some(device.clone());
    }
    if let Some(rate) = cli.sample_rate_hz {
        config.audio.sample_rate_hz = rate;
    }
    if let Some(frames) = cli.file_streaming_chunk {
        config.audio.chunk_frames = frames;
    }
    if let Some(ref voice) = cli.voice {
        config.tts.voice = Some(voice.clone());
    }
    if cli.stream {
        config.tts.streaming = true;
    }
    if let Some(ref path) = cli.output {
        config.audio.output_wav = Some(path.clone());
    }
    if cli.no_tools {
        config.router.tools_enabled = false;
    }
    if let Some(secs) = cli.window_secs {
        config.asr.window_ms = secs.saturating_mul(1000);
    }

    Ok(config)
}

async fn run_agent(config: SpeechConfig) -> anyhow::Result<()> {
    config.validate()?;
    let api_key = config.resolve_api_key()?;

    println!("Perceptra v{}", env!("CARGO_PKG_VERSION"));

    let backend = AnthropicBackend::new(AnthropicConfig::from_settings(&config.llm, api_key))?;
    let invoker = config.router.tools_enabled.then(|| {
        ToolInvoker::new(
            Arc::new(builtin_registry()),
            Duration::from_secs(config.router.tool_timeout_secs),
        )
    });
    let router = ConversationRouter::new(Arc::new(backend), invoker, config.router.clone());

    let capture = MicrophoneCapture::new(&config.audio);
    let recognizer = StreamingRecognizer::new(&config.asr, capture);
    let synthesizer = HttpSynthesizer::new(&config.tts)?;

    let mut output = TeeOutput::new();
    if config.audio.play_audio {
        output = output.with(Arc::new(SpeakerOutput::new(&config.audio)));
    }
    if let Some(ref path) = config.audio.output_wav {
        output = output.with(Arc::new(WavRecorder::new(path.clone())));
    }
    let output: Arc<dyn AudioOutput> = Arc::new(output);

    let mut controller = DutyCycleController::new(
        &config,
        DutyCycleParts {
            source: Arc::new(recognizer),
            router,
            synthesizer: Arc::new(synthesizer),
            output,
        },
    );
    let cancel = controller.cancel_token();

    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, shutting down...");
            cancel_clone.cancel();
        }
    });

    info!("I'm listening!");
    println!("\nSpeak into your microphone. Say \"exit\" or press Ctrl+C to stop.\n");

    let task = tokio::spawn(async move { controller.run().await });
    task.await??;

    info!("shutting down");
    Ok(())
}

fn list_devices() -> anyhow::Result<()> {
    println!("Input devices:");
    for name in MicrophoneCapture::list_input_devices()? {
        println!("  - {name}");
    }

    println!("\nOutput devices:");
    for name in SpeakerOutput::list_output_devices()? {
        println!("  - {name}");
    }

    Ok(())
}
