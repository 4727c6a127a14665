//! # Transcription Module
//!
//! The speech-to-text engine is an external collaborator: this module only defines
//! the seam the server talks to and one concrete engine that shells out to a
//! whisper command-line program.
//!
//! ## Key Components:
//! - **Transcriber**: synchronous, blocking `path -> text` contract
//! - **TranscriptionError**: every way a single transcription can fail
//! - **CommandTranscriber**: runs the configured engine program once per file
//!
//! ## Blocking calls:
//! `Transcriber::transcribe` blocks the calling thread for the whole inference.
//! The HTTP handler runs it on actix's blocking pool (`web::block`), never on an
//! async worker.

pub mod engine;

use std::fmt;
use std::path::{Path, PathBuf};

pub use engine::CommandTranscriber;

/// A speech-to-text engine.
///
/// One instance is built at process start and shared by every request, so
/// implementations must be `Send + Sync` and keep per-call state on the stack.
pub trait Transcriber: Send + Sync {
    /// Transcribe the audio file at `path`. No retries: a failure is surfaced as-is.
    fn transcribe(&self, path: &Path) -> Result<String, TranscriptionError>;

    /// Returns the name of this engine for logging and health reporting.
    fn name(&self) -> &str;
}

/// Errors produced by a transcription engine.
#[derive(Debug)]
pub enum TranscriptionError {
    /// The input path was empty or the file does not exist
    MissingInput(PathBuf),

    /// The engine program could not be started
    Spawn(String),

    /// The engine ran but reported failure.
    ///
    /// `stderr` is for the server log; `Display` leaves it out because engines print
    /// model paths and tracebacks there.
    EngineFailed { status: String, stderr: String },

    /// The engine produced output that is not text
    InvalidOutput(String),
}

impl fmt::Display for TranscriptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranscriptionError::MissingInput(path) => {
                write!(f, "could not find the file for transcription: \"{}\"", path.display())
            }
            TranscriptionError::Spawn(msg) => write!(f, "failed to start transcription engine: {}", msg),
            TranscriptionError::EngineFailed { status, .. } => {
                write!(f, "transcription engine exited with {}", status)
            }
            TranscriptionError::InvalidOutput(msg) => {
                write!(f, "transcription engine produced invalid output: {}", msg)
            }
        }
    }
}

impl std::error::Error for TranscriptionError {}
