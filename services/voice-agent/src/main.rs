mod config;
mod meter;
mod prompt_loader;
mod terminal;

use crate::config::Config;
use crate::terminal::{TerminalLessonControls, TerminalNavigator};
use anyhow::{Context, Result};
use clap::Parser;
use live_voice::types::{Content, LiveConfig, Modality};
use live_voice::{ClientConfig, LiveSession, Status};
use live_voice_utils::playback::CpalPlayback;
use live_voice_utils::recorder::AudioRecorder;
use live_voice_utils::streamer::{AudioStreamer, StreamerEvent, spawn_player};
use secrecy::ExposeSecret;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::fmt::time::ChronoLocal;
use voice_command_core::app::{HttpPreferenceSync, InMemoryCatalog};
use voice_command_core::settings::JsonFileSettings;
use voice_command_core::tools::function_declarations;
use voice_command_core::{CommandDispatcher, ControllerOptions, SettingsStore, VoiceAgentController};

#[derive(Parser)]
#[command(version, about = "Voice commands for the learning app over a live audio session")]
struct Cli {
    /// Print the audio devices and exit
    #[arg(long)]
    list_devices: bool,
    /// Microphone to use instead of the default
    #[arg(long)]
    input_device: Option<String>,
    /// Speaker to use instead of the default
    #[arg(long)]
    output_device: Option<String>,
    /// Start listening right away
    #[arg(long)]
    listen: bool,
    /// Show microphone and model levels on stderr
    #[arg(long)]
    meter: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load application configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    let args = Cli::parse();
    if args.list_devices {
        println!("Inputs:\n{}", live_voice_utils::device::get_available_inputs()?);
        println!("Outputs:\n{}", live_voice_utils::device::get_available_outputs()?);
        return Ok(());
    }

    // --- 3. Settings and Prompts ---
    let settings = SettingsStore::open(Box::new(JsonFileSettings::new(&config.settings_path)))
        .with_context(|| format!("Failed to open settings at {}", config.settings_path.display()))?;
    let prompts = prompt_loader::load_prompts(&config.prompts_dir).context("Failed to load prompts")?;
    tracing::info!("Loaded {} prompts successfully.", prompts.len());
    let instruction = prompt_loader::system_instruction(&prompts, &settings.get().language)?;

    let mut live_config = LiveConfig::builder()
        .with_response_modality(Modality::Audio)
        .with_system_instruction(&instruction)
        .with_tools(function_declarations())
        .with_input_transcription()
        .with_output_transcription();
    if let Some(voice) = config.voice.as_deref() {
        live_config = live_config.with_voice(voice);
    }
    let live_config = live_config.build();

    // --- 4. Command Dispatcher ---
    let catalog = InMemoryCatalog::load(&config.catalog_path)
        .with_context(|| format!("Failed to load lesson catalog from {}", config.catalog_path.display()))?;
    let mut dispatcher = CommandDispatcher::new(
        Arc::new(TerminalNavigator::new("/")),
        Arc::new(catalog),
        Arc::new(TerminalLessonControls::default()),
        settings.clone(),
    );
    if let Some((base_url, user_id)) = config.preference_sync() {
        tracing::info!("Syncing language preference for user {}", user_id);
        let sync = HttpPreferenceSync::new(base_url, user_id, config.api_token.clone())
            .context("Failed to set up language sync")?;
        dispatcher = dispatcher.with_preference_sync(Arc::new(sync));
    }

    // --- 5. Audio ---
    let playback = CpalPlayback::start(args.output_device.clone()).context("Failed to start audio output")?;
    tracing::info!("Output running at {} Hz", playback.sample_rate());
    let clock = playback.clock();
    let mut streamer = AudioStreamer::new(clock, playback);
    let output_tap = args.meter.then(|| streamer.add_tap(8));
    let mut playback_events = streamer.subscribe();
    let playback_log = tokio::spawn(async move {
        while let Ok(StreamerEvent::Complete) = playback_events.recv().await {
            tracing::debug!("model finished speaking");
        }
    });
    let (player, player_task) = spawn_player(streamer);
    let recorder = Arc::new(AudioRecorder::new(args.input_device.clone()));
    let level_meter = output_tap.map(|tap| meter::spawn_meter(recorder.level(), tap));

    // --- 6. Session and Controller ---
    let session = LiveSession::new(
        ClientConfig::builder()
            .with_api_key(config.gemini_api_key.expose_secret())
            .build(),
    );
    let controller = VoiceAgentController::new(
        session.clone(),
        recorder,
        Arc::new(dispatcher),
        player,
        ControllerOptions::new(&config.live_model, live_config),
    );
    let event_loop = controller.spawn_event_loop();
    let auto_start = controller.spawn_auto_start();

    if args.listen {
        if let Err(e) = controller.start_listening().await {
            tracing::error!("Could not start listening: {}", e);
        }
    }

    println!("Enter toggles listening, any other line is sent as text, \"q\" quits.");
    let console = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!("Failed to read stdin: {}", e);
                        break;
                    }
                };
                match line.trim() {
                    "q" | "quit" => break,
                    "" => match controller.toggle_listening().await {
                        Ok(listening) => tracing::info!("Listening: {}", listening),
                        Err(e) => tracing::error!("Toggle failed: {}", e),
                    },
                    text if session.status() == Status::Connected => {
                        session.send_content(vec![Content::user_text(text)], true);
                    }
                    _ => tracing::warn!("Not connected, start listening first"),
                }
            }
        })
    };

    tokio::select! {
        _ = console => {},
        _ = event_loop => {},
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl-C, shutting down...");
        }
    }

    tracing::info!("Shutting down...");
    auto_start.abort();
    if let Some(level_meter) = level_meter {
        level_meter.abort();
    }
    controller.shutdown().await;
    settings.close();
    player_task.abort();
    playback_log.abort();
    Ok(())
}
