//! CLI binary for warcry.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::info;
use tracing_subscriber::EnvFilter;
use warcry::audio::capture::{CpalCapture, list_input_devices};
use warcry::engine::batch::BatchEngine;
use warcry::engine::command_transcriber::CommandTranscriber;
use warcry::engine::console::ConsoleRecognizer;
use warcry::engine::streaming::StreamingEngine;
use warcry::engine::{EngineRegistry, ListeningState};
use warcry::feedback::ConsoleSynthesizer;
use warcry::learning::LearningStore;
use warcry::learning::kv::FileKeyValueStore;
use warcry::matcher::PatternMatcher;
use warcry::pipeline::confirmation::ConfirmationCoordinator;
use warcry::{RuntimeEvent, VoiceConfig, VoiceDispatcher};

/// Warcry: voice commands for a wave-based defense game.
#[derive(Parser)]
#[command(name = "warcry", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Listen for commands and print them as they are dispatched.
    Listen {
        /// Engine to use instead of the configured one.
        #[arg(short, long)]
        engine: Option<String>,
    },

    /// Show how a transcript would be interpreted.
    Match {
        /// Transcript text.
        text: String,
        /// Recogniser confidence for the transcript.
        #[arg(long, default_value_t = 1.0)]
        confidence: f32,
    },

    /// List registered recognition engines.
    Engines,

    /// List available audio input devices.
    Devices,

    /// Show learned phrases.
    Learned,

    /// Forget a learned phrase.
    Forget {
        /// Phrase to forget.
        phrase: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warcry=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(VoiceConfig::default_config_path);
    let config = if config_path.exists() {
        VoiceConfig::from_file(&config_path)?
    } else {
        VoiceConfig::default()
    };

    match cli.command.unwrap_or(Command::Listen { engine: None }) {
        Command::Listen { engine } => run_listen(config, engine).await,
        Command::Match { text, confidence } => run_match(&config, &text, confidence),
        Command::Engines => {
            let registry = build_registry(&config);
            for engine in registry.available(Some(&config.recognition.engine)) {
                let marker = if engine.is_current { "*" } else { " " };
                println!("{marker} {:<10} {}", engine.id, engine.name);
            }
            Ok(())
        }
        Command::Devices => {
            let devices = list_input_devices()?;
            if devices.is_empty() {
                println!("  (none)");
            }
            for name in devices {
                println!("  {name}");
            }
            Ok(())
        }
        Command::Learned => {
            let store = open_learning(&config);
            let learned = store.learned_patterns();
            if learned.is_empty() {
                println!("No learned phrases yet.");
            }
            for (phrase, command) in learned {
                println!("  {phrase:<30} -> {command}");
            }
            println!("{} candidate phrases tracked", store.candidate_count());
            Ok(())
        }
        Command::Forget { phrase } => {
            let mut store = open_learning(&config);
            if store.forget(&phrase) {
                println!("Forgot \"{phrase}\".");
            } else {
                println!("\"{phrase}\" was not known.");
            }
            Ok(())
        }
    }
}

fn open_learning(config: &VoiceConfig) -> LearningStore {
    let kv = FileKeyValueStore::new(config.learning.resolved_store_dir());
    LearningStore::load(Box::new(kv), &config.learning)
}

/// Typed console input is always available; the offline engine only when a
/// transcriber command is configured.
fn build_registry(config: &VoiceConfig) -> EngineRegistry {
    let mut registry = EngineRegistry::new();

    let restart_delay = std::time::Duration::from_millis(config.recognition.restart_delay_ms);
    let console = Arc::new(ConsoleRecognizer::new());
    registry.register("console", "Typed console input", move |ctx| {
        Box::new(
            StreamingEngine::new(
                "console",
                "Typed console input",
                console.clone(),
                ctx.events,
                ctx.settings,
            )
            .with_restart_delay(restart_delay),
        )
    });

    if let Ok(transcriber) = CommandTranscriber::new(&config.offline) {
        let transcriber = Arc::new(transcriber);
        let capture = Arc::new(CpalCapture::new(&config.audio));
        let vad = config.vad.clone();
        registry.register("offline", "Offline microphone", move |ctx| {
            Box::new(
                BatchEngine::new(
                    "offline",
                    "Offline microphone",
                    capture.clone(),
                    transcriber.clone(),
                    ctx.events,
                )
                .with_vad_config(vad.clone())
                .with_suppression(ctx.suppress_capture),
            )
        });
    }

    registry
}

fn run_match(config: &VoiceConfig, text: &str, confidence: f32) -> anyhow::Result<()> {
    let store = open_learning(config);
    let matcher = PatternMatcher::new(&config.matcher)?;
    let confirmation = ConfirmationCoordinator::new(&config.confirmation)?;

    let result = matcher.match_text(text, confidence, store.learned_patterns());
    if result.is_empty() {
        println!("No command recognised.");
        for s in matcher.suggest(text) {
            println!("  did you mean {} (\"{}\", {:.2})?", s.command, s.keyword, s.score);
        }
        return Ok(());
    }

    let names: Vec<&str> = result.commands.iter().map(|c| c.as_str()).collect();
    println!("commands: {}", names.join(" -> "));
    println!("source:   {:?}", result.source);
    if confirmation.requires_confirmation(&result) {
        println!("needs confirmation at confidence {confidence:.2}");
    }
    Ok(())
}

async fn run_listen(mut config: VoiceConfig, engine: Option<String>) -> anyhow::Result<()> {
    println!("Warcry v{}", env!("CARGO_PKG_VERSION"));
    if let Some(engine) = engine {
        config.recognition.engine = engine;
    }

    let registry = build_registry(&config);
    let learning = open_learning(&config);
    let handle = VoiceDispatcher::new(config, registry, learning)
        .with_synthesizer(Arc::new(ConsoleSynthesizer))
        .spawn()?;
    let mut events = handle.subscribe();

    if !handle.start().await {
        // The reason was published before start returned.
        while let Ok(event) = events.try_recv() {
            if let RuntimeEvent::Error { message, .. } = event {
                eprintln!("error: {message}");
            }
        }
        handle.shutdown().await;
        anyhow::bail!("could not start listening");
    }
    println!("\nListening. Type or speak a command. Press Ctrl+C to stop.\n");

    let mut fatal = false;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("received Ctrl+C, shutting down...");
                break;
            }
            event = events.recv() => match event {
                Ok(event) => {
                    match &event {
                        RuntimeEvent::Error { should_restart: false, .. } => fatal = true,
                        RuntimeEvent::Status(ListeningState::Stopped) if fatal => {
                            print_event(&event);
                            break;
                        }
                        _ => {}
                    }
                    print_event(&event);
                }
                Err(RecvError::Lagged(n)) => eprintln!("(missed {n} events)"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    handle.stop().await;
    handle.shutdown().await;
    Ok(())
}

fn print_event(event: &RuntimeEvent) {
    match event {
        RuntimeEvent::Command {
            command,
            original_text,
        } => println!("> {command}  (\"{original_text}\")"),
        RuntimeEvent::CommandQueue(commands) => {
            let names: Vec<&str> = commands.iter().map(|c| c.as_str()).collect();
            println!("  queued: {}", names.join(" -> "));
        }
        RuntimeEvent::ConfirmationRequest {
            interpreted_command,
            confidence,
            ..
        } => println!("? {interpreted_command} ({confidence:.2})"),
        RuntimeEvent::UserLearning {
            new_pattern,
            command,
            ..
        } => println!("  learned \"{new_pattern}\" -> {command}"),
        RuntimeEvent::Status(state) => println!("  [{state:?}]"),
        RuntimeEvent::Error { message, code, .. } => eprintln!("  error ({code}): {message}"),
        // Prompts go through the synthesizer.
        RuntimeEvent::Prompt(_)
        | RuntimeEvent::Transcript(_)
        | RuntimeEvent::ConfirmationResolved(_)
        | RuntimeEvent::Unrecognized { .. } => {}
    }
}
