//! Send audio files to a running transcription server.
//!
//! Files are sent in order with random pauses between them, so several requests are
//! usually in flight at once. Useful to see real-world response times under a
//! steady request load.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use whisper_service::config::AppConfig;
use whisper_service::dispatcher::Dispatcher;
use whisper_service::telemetry::init_tracing;

#[derive(Parser, Debug)]
#[command(
    name = "transcribe",
    about = "Send audio file(s) to the transcription server",
    long_about = "Send audio file(s) to the transcription server. Multiple files are sent \
                  in sequence with random intervals between them, while earlier requests \
                  are still running."
)]
struct CliArgs {
    /// Paths to audio files; repeat the flag or list several after it
    #[arg(short, long = "files", num_args = 1.., required = true)]
    files: Vec<PathBuf>,

    /// Base URL of the server (overrides client.server_url)
    #[arg(long)]
    server_url: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing()?;

    let args = CliArgs::parse();

    let mut config = AppConfig::load()?;
    if let Some(server_url) = args.server_url {
        config.client.server_url = server_url;
    }
    config.validate()?;

    let dispatcher = Dispatcher::new(&config.client)?;
    tracing::info!("Sending requests to {}", dispatcher.endpoint());

    let report = dispatcher
        .dispatch_all(&args.files)
        .await
        .context("no requests were sent")?;

    tracing::info!(
        "{} of {} transcriptions succeeded",
        report.succeeded,
        report.scheduled
    );

    Ok(())
}
