use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use interview_core::Command;
use interview_core::generic_types::{MODEL_CATALOG, PromptStyle, SessionConfig};
use interview_core::orchestrator::InterviewOrchestrator;
use interview_core::speech_capture::{CaptureOutput, SpeechCapture};
use interview_core::utterance::UtterancePlayer;
use interview_service::config::Config;
use interview_service::microphone::MicrophoneEngine;
use interview_service::speech_command::SpeechCommand;
use interview_service::terminal::{HELP, Input, TranscriptPrinter};
use interview_service::{prompt_loader, providers};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::fmt::time::ChronoLocal;

/// Rehearse a job interview against a conversational AI.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Mode>,

    /// Model to interview with (see `models`)
    #[arg(long, default_value = "gemini-2.5-flash")]
    model: String,

    /// Interview style: technical or behavioral
    #[arg(long, default_value = "technical", value_parser = parse_style)]
    style: PromptStyle,

    /// The role being interviewed for
    #[arg(long, default_value = "Software Engineer")]
    role: String,

    /// The main topic of the interview
    #[arg(long, default_value = "System Design")]
    topic: String,

    /// Candidate name used by the interviewer
    #[arg(long, default_value = "Candidate")]
    name: String,

    /// Do not speak the interviewer's replies
    #[arg(long)]
    no_tts: bool,
}

#[derive(Subcommand)]
enum Mode {
    /// List the supported models
    Models,
    /// List audio input devices
    Devices,
    /// Transcribe a WAV file and exit
    Transcribe { file: PathBuf },
}

fn parse_style(value: &str) -> Result<PromptStyle, String> {
    value.parse()
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load application configuration")?;

    // --- 2. Initialize Logging ---
    // stdout carries the transcript.
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    // --- 3. Parse Command-Line Arguments ---
    let cli = Cli::parse();

    match cli.command {
        Some(Mode::Models) => {
            for info in MODEL_CATALOG {
                println!(
                    "{:<28} {:<18} {:<10} {}",
                    info.id.as_str(),
                    info.name,
                    info.id.provider().as_str(),
                    info.description
                );
            }
            Ok(())
        }
        Some(Mode::Devices) => {
            println!("{}", interview_native_utils::device::get_available_inputs()?);
            Ok(())
        }
        Some(Mode::Transcribe { file }) => transcribe_file(&config, &file).await,
        None => {
            let session = SessionConfig {
                model: cli.model,
                style: cli.style,
                role: cli.role,
                topic: cli.topic,
                candidate_name: cli.name,
            };
            run_interview(&config, session, !cli.no_tts).await
        }
    }
}

async fn transcribe_file(config: &Config, file: &Path) -> Result<()> {
    let transcriber =
        providers::transcriber(config).context("OPENAI_API_KEY is required for transcription")?;
    let wav = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    println!("{}", transcriber.transcribe(wav).await?);
    Ok(())
}

async fn run_interview(config: &Config, session: SessionConfig, tts: bool) -> Result<()> {
    // --- 4. Load Prompts and Providers ---
    let prompts = prompt_loader::prompt_book(config.prompts_dir.as_deref())
        .context("Failed to load prompt templates")?;
    let conversation = providers::conversation(config, prompts);

    // --- 5. Wire the Orchestrator ---
    let (command_tx, mut command_rx) = mpsc::channel::<Command>(64);
    let mut orchestrator = InterviewOrchestrator::new(conversation, command_tx);

    let mut capture_rx = None;
    match providers::transcriber(config) {
        Some(transcriber) => {
            let engine = MicrophoneEngine::new(
                config.input_device.clone(),
                config.segment_length,
                transcriber,
            );
            let (capture, rx) = SpeechCapture::spawn(engine);
            orchestrator = orchestrator.with_capture(capture);
            capture_rx = Some(rx);
        }
        None => tracing::warn!("OPENAI_API_KEY not set, speech input is disabled"),
    }

    if tts {
        let speech = SpeechCommand::parse(&config.tts_command)?;
        tracing::info!(program = speech.program(), "spoken replies enabled");
        orchestrator = orchestrator.with_player(UtterancePlayer::new(Arc::new(speech)));
    }

    // This task renders orchestrator updates, decoupled from the session logic.
    let renderer = tokio::spawn(async move {
        let mut printer = TranscriptPrinter::new(std::io::stdout());
        while let Some(command) = command_rx.recv().await {
            if let Err(e) = printer.apply(&command) {
                tracing::error!("Failed to write transcript: {}", e);
            }
        }
    });

    println!("{HELP}\n");
    tracing::info!(model = %session.model, style = ?session.style, "starting interview");
    if let Err(e) = orchestrator.begin(session).await {
        if !orchestrator.conversation().is_started() {
            return Err(e).context("Failed to start the interview");
        }
    }

    // --- 6. Event Loop ---
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read from stdin")? else {
                    break;
                };
                if !handle_input(&mut orchestrator, Input::parse(&line)).await {
                    break;
                }
            }
            Some(output) = next_capture(&mut capture_rx) => {
                orchestrator.handle_capture(output).await;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }
    }

    // Nothing reads capture output past this point.
    drop(capture_rx);
    orchestrator.end().await;
    drop(orchestrator);
    renderer.await.context("Transcript renderer failed")?;
    Ok(())
}

// Returns false when the interview should end.
async fn handle_input(orchestrator: &mut InterviewOrchestrator, input: Input) -> bool {
    let result = match input {
        Input::Answer(text) => {
            orchestrator.append_input(&text).await;
            orchestrator.submit_input().await.map(|_| ())
        }
        Input::Send => orchestrator.submit_input().await.map(|_| ()),
        Input::ToggleMic => {
            orchestrator.toggle_listening().await;
            Ok(())
        }
        Input::ToggleTts => {
            let on = orchestrator.toggle_tts();
            println!("-- spoken replies {}", if on { "on" } else { "off" });
            Ok(())
        }
        Input::Clear => {
            orchestrator.clear_input().await;
            Ok(())
        }
        Input::Help => {
            println!("{HELP}");
            Ok(())
        }
        Input::Unknown(command) => {
            println!("Unknown command {command}, try /help");
            Ok(())
        }
        Input::End => return false,
    };

    // Already shown to the candidate; the interview goes on.
    if let Err(e) = result {
        tracing::debug!("turn not completed: {}", e);
    }
    true
}

async fn next_capture(rx: &mut Option<mpsc::Receiver<CaptureOutput>>) -> Option<CaptureOutput> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
