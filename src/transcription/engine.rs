//! # Command Transcription Engine
//!
//! Runs an external whisper program (for example whisper.cpp's `whisper-cli`) on a
//! stored audio file and returns whatever it prints to stdout.
//!
//! ## Key Responsibilities:
//! - **Startup checks**: resolve the engine program once, before the server accepts traffic
//! - **Argument templating**: substitute model, language, chunking and input path
//! - **Timing**: log start, finish and elapsed time of every transcription

use crate::config::WhisperConfig;
use crate::transcription::{Transcriber, TranscriptionError};
use anyhow::{anyhow, Result};
use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

/// Engine backed by an external speech-to-text program.
///
/// ## Lifetime:
/// Built once at startup and shared behind an `Arc` by every request handler.
/// It holds no mutable state, so concurrent calls spawn independent processes.
#[derive(Debug, Clone)]
pub struct CommandTranscriber {
    /// Resolved location of the engine program
    program: PathBuf,

    /// Engine parameters used to fill the argument template
    config: WhisperConfig,
}

impl CommandTranscriber {
    /// Prepare the engine for transcription.
    ///
    /// Fails if the configured program cannot be found, so a misconfigured server
    /// never starts accepting uploads.
    pub fn new(config: WhisperConfig) -> Result<Self> {
        tracing::info!(
            program = %config.program,
            model = %config.model,
            language = %config.language,
            chunk_length_s = config.chunk_length_s,
            stride_length_s = config.stride_length_s,
            "Initializing transcription engine"
        );

        let program = resolve_program(&config.program)
            .ok_or_else(|| anyhow!("Transcription engine program not found: {}", config.program))?;

        tracing::info!("Using transcription engine at {}", program.display());

        Ok(Self { program, config })
    }

    /// Build the argument list for one input file.
    fn render_args(&self, input: &Path) -> Vec<String> {
        let input = input.to_string_lossy();
        let chunk_length = self.config.chunk_length_s.to_string();
        let stride_length = self.config.stride_length_s.to_string();

        self.config
            .args
            .iter()
            .map(|arg| {
                arg.replace("{input}", &input)
                    .replace("{model}", &self.config.model)
                    .replace("{language}", &self.config.language)
                    .replace("{chunk_length}", &chunk_length)
                    .replace("{stride_length}", &stride_length)
            })
            .collect()
    }
}

impl Transcriber for CommandTranscriber {
    fn transcribe(&self, path: &Path) -> Result<String, TranscriptionError> {
        if path.as_os_str().is_empty() || !path.is_file() {
            return Err(TranscriptionError::MissingInput(path.to_path_buf()));
        }

        tracing::info!("Starting transcribing \"{}\"", path.display());
        let start_time = Instant::now();

        let output = Command::new(&self.program)
            .args(self.render_args(path))
            .output()
            .map_err(|e| TranscriptionError::Spawn(e.to_string()))?;

        if !output.status.success() {
            return Err(TranscriptionError::EngineFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let text = String::from_utf8(output.stdout)
            .map_err(|e| TranscriptionError::InvalidOutput(e.to_string()))?;

        tracing::info!(
            "Finished transcribing \"{}\". elapsed: {:.2}s",
            path.display(),
            start_time.elapsed().as_secs_f64()
        );

        Ok(text.trim().to_string())
    }

    fn name(&self) -> &str {
        &self.config.program
    }
}

/// Locate an executable: paths are taken as-is, bare names are searched on `PATH`.
fn resolve_program(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    let search_path = env::var_os("PATH")?;
    env::split_paths(&search_path)
        .map(|dir| dir.join(program))
        .find(|path| path.is_file())
}
