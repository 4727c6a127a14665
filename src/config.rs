//! # Configuration Management
//!
//! This module handles loading and managing application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix, `__` between nested keys)
//! - Default values (built into the code)
//!
//! The same file configures both sides of the system: the `server`, `files` and
//! `whisper` sections drive the transcription endpoint, the `client` section drives
//! the `transcribe` dispatcher.
//!
//! ## Configuration Priority (highest to lowest):
//! 1. `HOST` / `PORT` (deployment platform shorthands)
//! 2. Environment variables (APP_SERVER__PORT, APP_FILES__DELETE_AFTER_TRANSCRIPTION, etc.)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Main application configuration that contains all settings.
///
/// ## Why separate config structs:
/// Breaking configuration into logical groups (server, files, whisper, client)
/// keeps each consumer looking at only the settings it needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub files: FilesConfig,
    pub whisper: WhisperConfig,
    pub client: ClientConfig,
}

/// Server-specific configuration settings.
///
/// ## Fields:
/// - `host`: IP address or hostname to bind the server to (e.g., "127.0.0.1", "0.0.0.0")
/// - `port`: TCP port number to listen on
/// - `workers`: number of actix worker threads; `None` keeps actix's default (one per core)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub workers: Option<usize>,
}

/// Where uploaded audio is stored while it is being transcribed.
///
/// ## Fields:
/// - `dir_path`: directory receiving one file per upload
/// - `delete_after_transcription`: remove the stored file once the engine returns,
///   whether it succeeded or not. Set to `false` only for debugging, the files are
///   then kept for manual inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesConfig {
    pub dir_path: String,
    pub delete_after_transcription: bool,
}

/// Speech-to-text engine settings.
///
/// ## Fields:
/// - `model`: model identifier handed to the engine (e.g. a HuggingFace repo or a ggml file)
/// - `language`: ISO 639-1 language code forced on the decoder
/// - `chunk_length_s` / `stride_length_s`: long-form chunking parameters, in seconds
/// - `program`: external engine executable, either a path or a name looked up on `PATH`
/// - `args`: argument template; `{input}`, `{model}`, `{language}`, `{chunk_length}`
///   and `{stride_length}` are substituted for every call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhisperConfig {
    pub model: String,
    pub language: String,
    pub chunk_length_s: u32,
    pub stride_length_s: u32,
    pub program: String,
    pub args: Vec<String>,
}

/// Dispatcher (load generator) settings.
///
/// ## Fields:
/// - `server_url`: base URL of a running transcription server; `/transcribe` is appended
/// - `connect_timeout_secs`: upper bound on connection establishment per request
/// - `request_timeout_secs`: upper bound on the whole request, upload to response
/// - `min_delay_secs` / `max_delay_secs`: bounds of the uniformly random pause between
///   two successive submissions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub server_url: String,
    pub connect_timeout_secs: f64,
    pub request_timeout_secs: f64,
    pub min_delay_secs: f64,
    pub max_delay_secs: f64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),  // Localhost only (safe for development)
                port: 8000,
                workers: None,
            },
            files: FilesConfig {
                dir_path: "data/uploads".to_string(),
                delete_after_transcription: true,
            },
            whisper: WhisperConfig {
                model: "ales/whisper-small-belarusian".to_string(),
                language: "be".to_string(),
                chunk_length_s: 8,
                stride_length_s: 1,
                program: "whisper-cli".to_string(),
                args: vec![
                    "--model".to_string(),
                    "{model}".to_string(),
                    "--language".to_string(),
                    "{language}".to_string(),
                    "--no-timestamps".to_string(),
                    "--file".to_string(),
                    "{input}".to_string(),
                ],
            },
            client: ClientConfig {
                server_url: "http://127.0.0.1:8000".to_string(),
                connect_timeout_secs: 3.0,
                request_timeout_secs: 120.0,
                min_delay_secs: 0.5,
                max_delay_secs: 4.0,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Configuration Loading Process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from config.toml (if it exists)
    /// 3. Override with environment variables prefixed with APP_
    /// 4. Handle special cases for HOST and PORT environment variables
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__PORT=9000`: Override server port
    /// - `APP_FILES__DELETE_AFTER_TRANSCRIPTION=false`: Keep uploads (debug)
    /// - `APP_CLIENT__SERVER_URL=http://10.0.0.5:8000`: Point the dispatcher elsewhere
    /// - `PORT=3000`: Special case for deployment platforms
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            // required(false) means "don't error if missing"
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## Why validate:
    /// Catching configuration errors at startup gives a clear message instead of
    /// a failure on the first upload or the first dispatched request.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow!("Server port cannot be 0"));
        }

        if self.server.workers == Some(0) {
            return Err(anyhow!("Server workers must be greater than 0"));
        }

        if self.files.dir_path.trim().is_empty() {
            return Err(anyhow!("Upload directory path cannot be empty"));
        }

        self.whisper.validate()?;
        self.client.validate()?;

        Ok(())
    }
}

impl WhisperConfig {
    fn validate(&self) -> Result<()> {
        if self.program.trim().is_empty() {
            return Err(anyhow!("Transcription engine program cannot be empty"));
        }

        if self.chunk_length_s == 0 {
            return Err(anyhow!("Chunk length must be greater than 0"));
        }

        if self.stride_length_s >= self.chunk_length_s {
            return Err(anyhow!(
                "Stride length ({}s) must be shorter than chunk length ({}s)",
                self.stride_length_s,
                self.chunk_length_s
            ));
        }

        Ok(())
    }
}

impl ClientConfig {
    fn validate(&self) -> Result<()> {
        let settings = [
            ("connect_timeout_secs", self.connect_timeout_secs),
            ("request_timeout_secs", self.request_timeout_secs),
            ("min_delay_secs", self.min_delay_secs),
            ("max_delay_secs", self.max_delay_secs),
        ];
        if let Some((name, value)) = settings.iter().find(|(_, value)| !value.is_finite()) {
            return Err(anyhow!("Client setting {} must be a finite number, got {}", name, value));
        }

        if self.connect_timeout_secs <= 0.0 || self.request_timeout_secs <= 0.0 {
            return Err(anyhow!("Client timeouts must be greater than 0"));
        }

        if self.connect_timeout_secs > self.request_timeout_secs {
            return Err(anyhow!(
                "Connect timeout ({}s) cannot exceed request timeout ({}s)",
                self.connect_timeout_secs,
                self.request_timeout_secs
            ));
        }

        if self.min_delay_secs < 0.0 || self.max_delay_secs < self.min_delay_secs {
            return Err(anyhow!(
                "Invalid delay range [{}s, {}s)",
                self.min_delay_secs,
                self.max_delay_secs
            ));
        }

        // Finite but too large for a Duration
        self.request_timeout()?;
        self.max_delay()?;

        Ok(())
    }

    /// Full URL of the transcription endpoint.
    pub fn transcribe_url(&self) -> String {
        format!("{}/transcribe", self.server_url.trim_end_matches('/'))
    }

    pub fn connect_timeout(&self) -> Result<Duration> {
        seconds("connect_timeout_secs", self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Result<Duration> {
        seconds("request_timeout_secs", self.request_timeout_secs)
    }

    pub fn min_delay(&self) -> Result<Duration> {
        seconds("min_delay_secs", self.min_delay_secs)
    }

    pub fn max_delay(&self) -> Result<Duration> {
        seconds("max_delay_secs", self.max_delay_secs)
    }
}

fn seconds(name: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value).map_err(|e| anyhow!("Client setting {} ({}) is not a valid duration: {}", name, value, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8000);
        assert!(config.files.delete_after_transcription);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_client_bounds() {
        let client = AppConfig::default().client;
        assert_eq!(client.connect_timeout().unwrap(), Duration::from_secs(3));
        assert_eq!(client.request_timeout().unwrap(), Duration::from_secs(120));
        assert_eq!(client.min_delay_secs, 0.5);
        assert_eq!(client.max_delay_secs, 4.0);
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.whisper.stride_length_s = config.whisper.chunk_length_s;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.client.connect_timeout_secs = 200.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.client.min_delay_secs = 5.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.files.dir_path = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_client_timings_must_be_finite() {
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let mut config = AppConfig::default();
            config.client.max_delay_secs = value;
            assert!(config.validate().is_err(), "max_delay_secs = {} accepted", value);

            let mut config = AppConfig::default();
            config.client.min_delay_secs = value;
            assert!(config.validate().is_err(), "min_delay_secs = {} accepted", value);

            let mut config = AppConfig::default();
            config.client.request_timeout_secs = value;
            assert!(config.validate().is_err(), "request_timeout_secs = {} accepted", value);

            let mut config = AppConfig::default();
            config.client.connect_timeout_secs = value;
            assert!(config.validate().is_err(), "connect_timeout_secs = {} accepted", value);
        }

        let mut config = AppConfig::default();
        config.client.request_timeout_secs = 1e30;
        assert!(config.validate().is_err());

        let mut client = AppConfig::default().client;
        client.max_delay_secs = f64::NAN;
        assert!(client.max_delay().is_err());
    }

    #[test]
    fn test_transcribe_url_strips_trailing_slash() {
        let mut client = AppConfig::default().client;
        client.server_url = "http://localhost:9000/".to_string();
        assert_eq!(client.transcribe_url(), "http://localhost:9000/transcribe");
    }
}
