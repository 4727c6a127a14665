//! # Whisper Service
//!
//! Upload-and-transcribe HTTP service plus a load-generating client for it.
//!
//! ## Application Architecture:
//! - **config**: Application configuration (TOML file + environment variables)
//! - **error**: Server error type and its HTTP rendering
//! - **state**: Shared application state, engine handle and metrics
//! - **storage**: Per-upload files in the upload directory
//! - **transcription**: The speech-to-text engine seam and its command-line engine
//! - **handlers**: HTTP request handlers and route table
//! - **middleware**: Request logging and metrics interceptors
//! - **health**: Health and metrics endpoints
//! - **dispatcher**: Concurrent client that submits files with randomized spacing
//! - **telemetry**: Logging setup shared by every binary

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod state;
pub mod storage;
pub mod telemetry;
pub mod transcription;
