//! Transcribe a single audio file in-process, without the server.
//!
//! The engine is initialized on every run, so this is meant for quick checks of the
//! engine configuration rather than for repeated use.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use whisper_service::config::AppConfig;
use whisper_service::telemetry::init_tracing;
use whisper_service::transcription::{CommandTranscriber, Transcriber};

#[derive(Parser, Debug)]
#[command(name = "transcribe-local", about = "Transcribe an audio recording without the server")]
struct CliArgs {
    /// Path to the audio file
    #[arg(short, long)]
    file: PathBuf,
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing()?;

    let args = CliArgs::parse();

    let config = AppConfig::load()?;
    config.validate()?;

    let engine = CommandTranscriber::new(config.whisper)?;

    match engine.transcribe(&args.file) {
        Ok(transcription) => tracing::info!("transcription: \"{}\"", transcription),
        Err(err) => {
            tracing::error!(error = ?err, "Failed to transcribe {}", args.file.display());
            return Err(err.into());
        }
    }

    Ok(())
}
