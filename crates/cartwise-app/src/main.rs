//! Cartwise application binary - composition root.
//!
//! Ties the Cartwise crates into a terminal client:
//! 1. Parse CLI args and load configuration from TOML
//! 2. Initialize tracing
//! 3. Build the session store, HTTP transport, clip microphone and player
//! 4. Run the requested command (one-shot ask, history, voice clip, or chat)

mod cli;
mod clip;
mod terminal;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::{JoinHandle, JoinSet};

use cartwise_audio::{CommandAudioSink, PlaybackOutcome, StartOutcome};
use cartwise_chat::{
    ChatError, ConversationController, FileSessionBackend, HttpTransport, SessionStore,
    VoiceOutcome,
};
use cartwise_core::config::{expand_home, CartwiseConfig};
use cartwise_core::error::CartwiseError;
use cartwise_core::events::ConversationEvent;
use cartwise_core::types::Message;

use cli::{CliArgs, Command};
use clip::ClipMicrophone;
use terminal::{render_message, render_notice, render_pending, ChatInput, HELP};

type Controller = ConversationController<HttpTransport, ClipMicrophone, CommandAudioSink>;

fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn build_controller(config: &CartwiseConfig, mic: ClipMicrophone) -> Result<Controller, ChatError> {
    let transport = HttpTransport::new(&config.backend)?;
    let sessions = SessionStore::new(FileSessionBackend::new(
        config.session_store_path(),
        config.session.key.clone(),
    ));
    let scratch_dir = expand_home(&config.general.data_dir).join("playback");
    let sink = CommandAudioSink::from_config(&config.audio, scratch_dir);
    Ok(ConversationController::new(
        transport, sessions, mic, sink, config,
    ))
}

// =============================================================================
// Output
// =============================================================================

fn print_message(controller: &Controller, message: &Message) {
    let number = controller
        .snapshot()
        .iter()
        .position(|m| m.id == message.id)
        .map(|i| i + 1)
        .unwrap_or(0);
    println!("{}", render_message(number, message));
}

fn print_notice(controller: &Controller) {
    if let Some(notice) = controller.take_notice() {
        eprintln!("{}", render_notice(notice));
    }
}

/// Print the loading indicator whenever the number of in-flight requests
/// changes.
fn spawn_pending_indicator(controller: &Controller) -> JoinHandle<()> {
    let mut events = controller.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ConversationEvent::PendingChanged { pending }) => {
                    if let Some(line) = render_pending(pending) {
                        eprintln!("{}", line);
                    }
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
    })
}

// =============================================================================
// Commands
// =============================================================================

/// Save `config` to `path` unless a file is already there.
///
/// Returns whether the file was written.
fn write_config(config: &CartwiseConfig, path: &Path, force: bool) -> Result<bool, CartwiseError> {
    if path.exists() && !force {
        return Ok(false);
    }
    config.save(path)?;
    Ok(true)
}

fn run_init(config: &CartwiseConfig, path: &Path, force: bool) -> Result<(), CartwiseError> {
    if write_config(config, path, force)? {
        println!("Wrote {}", path.display());
    } else {
        eprintln!("! {} already exists; use --force to replace it", path.display());
    }
    Ok(())
}

async fn run_ask(controller: &Controller, query: &str) {
    if let Some(reply) = controller.submit_text(query).await {
        print_message(controller, &reply);
    }
    print_notice(controller);
}

async fn run_history(controller: &Controller) {
    let session = controller.init().await;
    let log = controller.snapshot();
    if log.is_empty() {
        println!("(no history for session {})", session.id);
    }
    for (i, message) in log.iter().enumerate() {
        println!("{}", render_message(i + 1, message));
    }
}

/// Replay `path` through the capture state machine and send it.
///
/// With `wait_for_playback` the call returns only after an autoplayed reply
/// has finished.
async fn run_voice(
    controller: &Controller,
    mic: &ClipMicrophone,
    path: PathBuf,
    wait_for_playback: bool,
) {
    mic.select(path);
    match controller.start_recording().await {
        StartOutcome::Started => {}
        StartOutcome::DeviceUnavailable(reason) => {
            eprintln!("! Could not read the clip: {}", reason);
            return;
        }
        StartOutcome::AlreadyActive(state) => {
            eprintln!("! A recording is already {}", state);
            return;
        }
        StartOutcome::PermissionDenied | StartOutcome::Abandoned => {
            print_notice(controller);
            return;
        }
    }

    match controller.stop_recording().await {
        VoiceOutcome::Answered {
            transcript,
            reply,
            playback,
        } => {
            print_message(controller, &transcript);
            print_message(controller, &reply);
            if let Some(PlaybackOutcome::Started { handle, .. }) = playback {
                if wait_for_playback {
                    handle.wait().await;
                }
            }
        }
        VoiceOutcome::Failed(message) => print_message(controller, &message),
        VoiceOutcome::NoAudioCaptured | VoiceOutcome::NotRecording => {}
    }
    print_notice(controller);
}

async fn run_play(controller: &Controller, number: usize) {
    let Some(message) = controller.snapshot().into_iter().nth(number - 1) else {
        eprintln!("! No message {}", number);
        return;
    };
    match controller.play(&message.id).await {
        Some(PlaybackOutcome::Started { .. }) => {}
        Some(PlaybackOutcome::Blocked { .. }) => print_notice(controller),
        None => eprintln!("! Message {} has no audio", number),
    }
}

/// Interactive loop. Typed queries run as background exchanges so the next
/// line can be entered while a reply is outstanding; replies print in
/// completion order.
async fn run_chat(controller: Arc<Controller>, mic: &ClipMicrophone) -> std::io::Result<()> {
    let session = controller.init().await;
    if controller.is_session_degraded() {
        eprintln!("! Session could not be saved; this conversation will not be resumable.");
    }
    tracing::info!(session_id = %session.id, "Chat started");

    let log = controller.snapshot();
    for (i, message) in log.iter().enumerate() {
        println!("{}", render_message(i + 1, message));
    }
    println!("{}", HELP);

    let indicator = spawn_pending_indicator(&controller);
    let mut exchanges = JoinSet::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        match ChatInput::parse(&line) {
            ChatInput::Empty => {}
            ChatInput::Query(query) => {
                let controller = Arc::clone(&controller);
                exchanges.spawn(async move { run_ask(&controller, &query).await });
            }
            ChatInput::Voice(path) => run_voice(&controller, mic, path, false).await,
            ChatInput::Play(number) => run_play(&controller, number).await,
            ChatInput::Reset => {
                controller.reset();
                println!("(conversation cleared)");
            }
            ChatInput::Help => println!("{}", HELP),
            ChatInput::Invalid(reason) => eprintln!("! {}", reason),
            ChatInput::Quit => break,
        }
    }

    while exchanges.join_next().await.is_some() {}
    indicator.abort();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let loaded = CartwiseConfig::load_optional(&config_file);
    let mut config = match loaded {
        Ok(Some(ref config)) => config.clone(),
        _ => CartwiseConfig::default(),
    };

    // Tracing.
    init_tracing(&args.resolve_log_level(&config.general.log_level));
    tracing::info!("Starting Cartwise v{}", env!("CARGO_PKG_VERSION"));
    match loaded {
        Ok(Some(_)) => tracing::info!(path = %config_file.display(), "Configuration loaded"),
        Err(e) => tracing::warn!(
            path = %config_file.display(),
            error = %e,
            "Failed to load config, using defaults"
        ),
        Ok(None) => tracing::debug!(path = %config_file.display(), "No config file, using defaults"),
    }
    args.apply_overrides(&mut config);
    tracing::info!(backend = %config.backend.base_url, "Backend configured");

    if let Command::Init { force } = args.command() {
        run_init(&config, &config_file, force)?;
        return Ok(());
    }

    let mic = ClipMicrophone::new();
    let controller = Arc::new(build_controller(&config, mic.clone())?);

    match args.command() {
        Command::Ask { query } => run_ask(&controller, &query.join(" ")).await,
        Command::History => run_history(&controller).await,
        Command::Voice { file } => run_voice(&controller, &mic, file, true).await,
        Command::Chat => run_chat(Arc::clone(&controller), &mic).await?,
        Command::Init { .. } => {}
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_config_round_trips_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cartwise").join("config.toml");
        let mut config = CartwiseConfig::default();
        config.backend.base_url = "http://10.0.0.5:8000/shop".to_string();

        assert!(write_config(&config, &path, false).unwrap());
        let saved = CartwiseConfig::load_optional(&path).unwrap().unwrap();
        assert_eq!(saved.backend.base_url, "http://10.0.0.5:8000/shop");
    }

    #[test]
    fn test_write_config_keeps_existing_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[general]\nlog_level = \"warn\"\n").unwrap();

        assert!(!write_config(&CartwiseConfig::default(), &path, false).unwrap());
        assert_eq!(
            CartwiseConfig::load(&path).unwrap().general.log_level,
            "warn"
        );

        assert!(write_config(&CartwiseConfig::default(), &path, true).unwrap());
        assert_eq!(
            CartwiseConfig::load(&path).unwrap().general.log_level,
            "info"
        );
    }
}
