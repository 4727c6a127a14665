//! # Dispatcher
//!
//! Sends a batch of audio files to a running transcription server, one request per
//! file, to see how the server behaves under realistic concurrent load.
//!
//! ## Scheduling model:
//! - Files are submitted in input order, each as its own tokio task
//! - Between two submissions the scheduling loop sleeps for a random delay drawn
//!   uniformly from `[min_delay, max_delay)`; requests already in flight keep running
//! - Once everything is scheduled, the dispatcher waits for every task to finish
//!
//! ## Failure isolation:
//! Each task owns its request, its timeouts and its logging. A failed, timed-out or
//! even panicking task only ever marks itself as failed in the registry; it never
//! cancels or delays its siblings, and it never aborts the batch.

use crate::config::ClientConfig;
use crate::handlers::{TranscriptionResponse, FILE_FIELD};
use rand::Rng;
use reqwest::multipart::{Form, Part};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{error, info, warn};

/// Errors seen by the dispatcher, either for the whole batch (`Validation`) or for
/// a single request (everything else).
#[derive(Debug)]
pub enum DispatchError {
    /// An input path does not point at an existing file; nothing was sent
    Validation(PathBuf),

    /// Client settings that cannot be turned into timeouts or delays
    Config(String),

    /// The audio file could not be read
    Io { path: PathBuf, message: String },

    /// Connecting or the whole request took longer than allowed
    Timeout(String),

    /// Any other transport failure (connection refused, reset, TLS, ...)
    Network(String),

    /// The server answered with a non-success status
    Status { status: u16, detail: String },

    /// The server answered 2xx but the body was not a transcription
    Decode(String),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::Validation(path) => write!(f, "file not found: {}", path.display()),
            DispatchError::Config(msg) => write!(f, "invalid client settings: {}", msg),
            DispatchError::Io { path, message } => {
                write!(f, "failed to read {}: {}", path.display(), message)
            }
            DispatchError::Timeout(msg) => write!(f, "request timed out: {}", msg),
            DispatchError::Network(msg) => write!(f, "network error: {}", msg),
            DispatchError::Status { status, detail } => write!(f, "server returned {}: {}", status, detail),
            DispatchError::Decode(msg) => write!(f, "invalid response body: {}", msg),
        }
    }
}

impl std::error::Error for DispatchError {}

impl From<reqwest::Error> for DispatchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DispatchError::Timeout(err.to_string())
        } else if err.is_decode() {
            DispatchError::Decode(err.to_string())
        } else {
            DispatchError::Network(err.to_string())
        }
    }
}

/// Range the pause between two submissions is drawn from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayRange {
    min: Duration,
    max: Duration,
}

impl DelayRange {
    /// `max` below `min` collapses the range to `min`.
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max: max.max(min) }
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Uniform sample from `[min, max)`, or `min` if the range is empty.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        Duration::from_secs_f64(rng.gen_range(self.min.as_secs_f64()..self.max.as_secs_f64()))
    }
}

/// Outcome of a whole batch. `succeeded + failed == scheduled` once
/// `dispatch_all` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchReport {
    pub scheduled: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// A submission that has been handed to the runtime and not yet finished.
#[derive(Debug)]
struct ScheduledTask {
    path: PathBuf,
    started_at: Instant,
}

#[derive(Debug, Default)]
struct RegistryInner {
    next_id: usize,
    in_flight: HashMap<usize, ScheduledTask>,
    succeeded: usize,
    failed: usize,
}

/// The set of in-flight tasks.
///
/// Tasks remove themselves when they finish, so the registry only ever holds
/// what is still running; finished tasks leave nothing but a counter behind.
#[derive(Debug, Default)]
struct TaskRegistry {
    inner: Mutex<RegistryInner>,
    idle: Notify,
}

impl TaskRegistry {
    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn register(self: &Arc<Self>, path: PathBuf) -> Registration {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.in_flight.insert(
            id,
            ScheduledTask {
                path,
                started_at: Instant::now(),
            },
        );

        Registration {
            registry: Arc::clone(self),
            id,
            succeeded: None,
        }
    }

    fn deregister(&self, id: usize, succeeded: Option<bool>) {
        let mut inner = self.lock();
        if let Some(task) = inner.in_flight.remove(&id) {
            match succeeded {
                Some(true) => inner.succeeded += 1,
                Some(false) => inner.failed += 1,
                None => {
                    warn!(
                        "task for \"{}\" ended without reporting an outcome after {:.2}s",
                        task.path.display(),
                        task.started_at.elapsed().as_secs_f64()
                    );
                    inner.failed += 1;
                }
            }
        }

        let idle = inner.in_flight.is_empty();
        drop(inner);

        if idle {
            self.idle.notify_waiters();
        }
    }

    fn in_flight(&self) -> usize {
        self.lock().in_flight.len()
    }

    /// Resolve once no task is in flight.
    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            // Register interest before checking, so a wake-up between the check
            // and the await is not lost.
            notified.as_mut().enable();

            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }

    fn report(&self, scheduled: usize) -> DispatchReport {
        let inner = self.lock();
        DispatchReport {
            scheduled,
            succeeded: inner.succeeded,
            failed: inner.failed,
        }
    }
}

/// A task's membership in the registry.
///
/// Dropping it deregisters the task, so a task that panics still reaches a
/// terminal (failed) state.
struct Registration {
    registry: Arc<TaskRegistry>,
    id: usize,
    succeeded: Option<bool>,
}

impl Registration {
    fn finish(mut self, succeeded: bool) {
        self.succeeded = Some(succeeded);
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.deregister(self.id, self.succeeded);
    }
}

/// Load generator for a transcription server.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    client: reqwest::Client,
    endpoint: String,
    delays: DelayRange,
}

impl Dispatcher {
    /// Build a dispatcher with the connect/total timeouts and delay range from `config`.
    pub fn new(config: &ClientConfig) -> Result<Self, DispatchError> {
        let setting = |value: anyhow::Result<Duration>| value.map_err(|e| DispatchError::Config(e.to_string()));

        let client = reqwest::Client::builder()
            .connect_timeout(setting(config.connect_timeout())?)
            .timeout(setting(config.request_timeout())?)
            .build()?;

        Ok(Self {
            client,
            endpoint: config.transcribe_url(),
            delays: DelayRange::new(setting(config.min_delay())?, setting(config.max_delay())?),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Submit every file and wait until each submission has finished.
    ///
    /// Fails with `DispatchError::Validation` before sending anything if any path
    /// is not an existing file. Per-file failures are logged and counted in the
    /// report; they never make this function fail.
    pub async fn dispatch_all(&self, paths: &[PathBuf]) -> Result<DispatchReport, DispatchError> {
        validate_paths(paths)?;

        info!("will send requests to transcribe {} files", paths.len());

        let registry = Arc::new(TaskRegistry::default());

        for (ix, path) in paths.iter().enumerate() {
            let number = ix + 1;
            let registration = registry.register(path.clone());

            let client = self.client.clone();
            let endpoint = self.endpoint.clone();
            let path = path.clone();
            tokio::spawn(async move {
                let result = submit_one(&client, &endpoint, &path).await;
                registration.finish(result.is_ok());
            });

            info!("scheduled a task for file #{}", number);

            if number < paths.len() {
                let delay = self.delays.sample(&mut rand::thread_rng());
                info!("will wait for {:.2}s before sending the next request", delay.as_secs_f64());
                tokio::time::sleep(delay).await;
            }
        }

        registry.wait_idle().await;

        let report = registry.report(paths.len());
        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            "all {} transcription tasks gathered",
            report.scheduled
        );

        Ok(report)
    }
}

/// Every path must name an existing regular file.
pub fn validate_paths(paths: &[PathBuf]) -> Result<(), DispatchError> {
    match paths.iter().find(|path| !path.is_file()) {
        Some(missing) => Err(DispatchError::Validation(missing.clone())),
        None => Ok(()),
    }
}

/// Upload one file and log the outcome with the elapsed wall-clock time.
pub async fn submit_one(
    client: &reqwest::Client,
    endpoint: &str,
    path: &Path,
) -> Result<TranscriptionResponse, DispatchError> {
    info!("sending request to transcribe \"{}\"", path.display());
    let start_time = Instant::now();

    let result = send_file(client, endpoint, path).await;
    let elapsed = start_time.elapsed().as_secs_f64();

    match &result {
        Ok(response) => info!(
            "response for \"{}\" received: {{\"transcription\": {:?}}}. elapsed: {:.2}s",
            path.display(),
            response.transcription,
            elapsed
        ),
        Err(err) => error!(
            error = ?err,
            "failed to retrieve response for \"{}\". elapsed: {:.2}s",
            path.display(),
            elapsed
        ),
    }

    result
}

async fn send_file(
    client: &reqwest::Client,
    endpoint: &str,
    path: &Path,
) -> Result<TranscriptionResponse, DispatchError> {
    let audio = tokio::fs::read(path).await.map_err(|e| DispatchError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "audio".to_string());

    let form = Form::new().part(FILE_FIELD, Part::bytes(audio).file_name(filename));

    let response = client.post(endpoint).multipart(form).send().await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(DispatchError::Status {
            status: status.as_u16(),
            detail: error_detail(&body),
        });
    }

    Ok(response.json::<TranscriptionResponse>().await?)
}

/// Pull `detail` out of a `{"detail": "..."}` error body, falling back to the raw body.
fn error_detail(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.get("detail").and_then(|d| d.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}
