//! # Application State Management
//!
//! Shared state handed to every HTTP request handler through `web::Data<AppState>`.
//!
//! ## What lives here:
//! - **config**: the configuration the server was started with
//! - **transcriber**: the one engine instance, built at startup and reused by every request
//! - **store**: the upload directory and its retention policy
//! - **metrics**: request counters plus the number of transcriptions in flight
//!
//! ## Arc<RwLock<T>> Pattern
//! - **Arc**: Multiple ownership (every worker's copy of `AppState` points at the same data)
//! - **RwLock**: Many concurrent readers or one writer
//!
//! Only `metrics` is mutated after startup; the engine and the store are immutable
//! and shared through plain `Arc`s.

use crate::config::AppConfig;
use crate::storage::UploadStore;
use crate::transcription::Transcriber;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// The main application state that's shared across all HTTP request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Configuration the server was started with
    pub config: Arc<AppConfig>,

    /// The speech-to-text engine, constructed once in `main`
    pub transcriber: Arc<dyn Transcriber>,

    /// Where uploads are stored while they are transcribed
    pub store: UploadStore,

    /// Counters updated by the middleware and the transcription handler
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// When the server started (never changes, so no lock needed)
    pub start_time: Instant,
}

/// Counters collected across all HTTP requests.
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Total number of 4xx/5xx responses or failed requests since server start
    pub error_count: u64,

    /// Transcriptions currently running (upload stored, engine not yet returned)
    pub active_transcriptions: u32,

    /// Per-endpoint statistics, keyed by e.g. "POST /transcribe"
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Detailed performance metrics for a specific API endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    pub fn new(config: AppConfig, transcriber: Arc<dyn Transcriber>, store: UploadStore) -> Self {
        Self {
            config: Arc::new(config),
            transcriber,
            store,
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        }
    }

    /// Write access to the metrics.
    ///
    /// A panic while the lock is held only ever leaves counters half-updated, so a
    /// poisoned lock is recovered instead of propagated.
    fn metrics_mut(&self) -> std::sync::RwLockWriteGuard<'_, AppMetrics> {
        self.metrics.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn increment_request_count(&self) {
        self.metrics_mut().request_count += 1;
    }

    pub fn increment_error_count(&self) {
        self.metrics_mut().error_count += 1;
    }

    /// Record one finished request for `endpoint` (e.g. "POST /transcribe").
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics_mut();
        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;
        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Mark a transcription as running until the returned guard is dropped.
    pub fn begin_transcription(&self) -> ActiveTranscription {
        self.metrics_mut().active_transcriptions += 1;
        ActiveTranscription { state: self.clone() }
    }

    fn end_transcription(&self) {
        let mut metrics = self.metrics_mut();
        // Underflow protection
        if metrics.active_transcriptions > 0 {
            metrics.active_transcriptions -= 1;
        }
    }

    /// Get a snapshot of current metrics (used for /health and /metrics).
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.metrics
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

/// Keeps `active_transcriptions` incremented while alive.
pub struct ActiveTranscription {
    state: AppState,
}

impl Drop for ActiveTranscription {
    fn drop(&mut self) {
        self.state.end_transcription();
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Error rate between 0.0 and 1.0.
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilesConfig;
    use crate::transcription::TranscriptionError;
    use std::path::Path;

    struct EchoTranscriber;

    impl Transcriber for EchoTranscriber {
        fn transcribe(&self, path: &Path) -> Result<String, TranscriptionError> {
            Ok(path.display().to_string())
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    fn state(dir: &Path) -> AppState {
        let store = UploadStore::new(&FilesConfig {
            dir_path: dir.to_string_lossy().into_owned(),
            delete_after_transcription: true,
        })
        .unwrap();
        AppState::new(AppConfig::default(), Arc::new(EchoTranscriber), store)
    }

    #[test]
    fn test_active_transcription_guard() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());

        let first = state.begin_transcription();
        let second = state.begin_transcription();
        assert_eq!(state.get_metrics_snapshot().active_transcriptions, 2);

        drop(first);
        assert_eq!(state.get_metrics_snapshot().active_transcriptions, 1);
        drop(second);
        assert_eq!(state.get_metrics_snapshot().active_transcriptions, 0);
    }

    #[test]
    fn test_endpoint_metrics() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());

        state.record_endpoint_request("POST /transcribe", 100, false);
        state.record_endpoint_request("POST /transcribe", 300, true);

        let metrics = state.get_metrics_snapshot();
        let endpoint = &metrics.endpoint_metrics["POST /transcribe"];
        assert_eq!(endpoint.request_count, 2);
        assert_eq!(endpoint.average_duration_ms(), 200.0);
        assert_eq!(endpoint.error_rate(), 0.5);
    }
}
