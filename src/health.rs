use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;
use std::path::Path;

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let uptime_seconds = state.get_uptime_seconds();
    let storage = storage_status(state.store.dir(), state.store.deletes_after_transcription());

    let status = if storage["writable"].as_bool().unwrap_or(false) {
        "healthy"
    } else {
        "degraded"
    };

    HttpResponse::Ok().json(json!({
        "status": status,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "service": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "host": state.config.server.host,
            "port": state.config.server.port
        },
        "engine": {
            "name": state.transcriber.name(),
            "model": state.config.whisper.model,
            "language": state.config.whisper.language
        },
        "storage": storage,
        "metrics": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "active_transcriptions": metrics.active_transcriptions
        }
    }))
}

pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let uptime_seconds = state.get_uptime_seconds();

    let mut endpoint_stats: Vec<_> = metrics
        .endpoint_metrics
        .iter()
        .map(|(endpoint, metric)| {
            json!({
                "endpoint": endpoint,
                "request_count": metric.request_count,
                "error_count": metric.error_count,
                "error_rate": metric.error_rate(),
                "average_duration_ms": metric.average_duration_ms(),
                "total_duration_ms": metric.total_duration_ms
            })
        })
        .collect();
    endpoint_stats.sort_by(|a, b| a["endpoint"].as_str().cmp(&b["endpoint"].as_str()));

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "overall": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": if metrics.request_count > 0 {
                metrics.error_count as f64 / metrics.request_count as f64
            } else {
                0.0
            },
            "active_transcriptions": metrics.active_transcriptions
        },
        "endpoints": endpoint_stats
    }))
}

fn storage_status(dir: &Path, delete_after_transcription: bool) -> serde_json::Value {
    let exists = dir.is_dir();
    let writable = exists && can_create_files_in(dir);

    json!({
        "upload_dir": dir.display().to_string(),
        "exists": exists,
        "writable": writable,
        "delete_after_transcription": delete_after_transcription
    })
}

/// Create and remove a scratch file, the same operations an upload needs.
fn can_create_files_in(dir: &Path) -> bool {
    let scratch = dir.join(format!(".health-{}", uuid::Uuid::new_v4()));
    match std::fs::File::create(&scratch) {
        Ok(file) => {
            drop(file);
            std::fs::remove_file(&scratch).is_ok()
        }
        Err(e) => {
            tracing::warn!(error = %e, "Upload directory {} is not writable", dir.display());
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, FilesConfig};
    use crate::middleware::MetricsMiddleware;
    use crate::storage::UploadStore;
    use crate::transcription::{Transcriber, TranscriptionError};
    use actix_web::{test, App};
    use std::sync::Arc;

    struct Silent;

    impl Transcriber for Silent {
        fn transcribe(&self, _path: &Path) -> Result<String, TranscriptionError> {
            Ok(String::new())
        }

        fn name(&self) -> &str {
            "silent"
        }
    }

    #[actix_web::test]
    async fn test_health_and_metrics_report_requests() {
        let dir = tempfile::tempdir().unwrap();
        let files = FilesConfig {
            dir_path: dir.path().to_string_lossy().into_owned(),
            delete_after_transcription: true,
        };
        let store = UploadStore::new(&files).unwrap();
        let state = AppState::new(AppConfig { files, ..AppConfig::default() }, Arc::new(Silent), store);

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .wrap(MetricsMiddleware)
                .configure(crate::handlers::configure),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let health: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(health["status"], "healthy");
        assert_eq!(health["engine"]["name"], "silent");
        assert_eq!(health["storage"]["delete_after_transcription"], true);

        let req = test::TestRequest::get().uri("/metrics").to_request();
        let metrics: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        // The /health call has finished, the /metrics call is in flight.
        assert_eq!(metrics["overall"]["total_requests"], 2);
        assert_eq!(metrics["endpoints"][0]["endpoint"], "GET /health");
    }

    #[::core::prelude::v1::test]
    fn test_storage_status_probes_the_directory() {
        let dir = tempfile::tempdir().unwrap();

        let status = storage_status(dir.path(), false);
        assert_eq!(status["exists"], true);
        assert_eq!(status["writable"], true);
        // The scratch file is gone again.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        let missing = dir.path().join("gone");
        let status = storage_status(&missing, true);
        assert_eq!(status["exists"], false);
        assert_eq!(status["writable"], false);

        // A regular file in place of the directory cannot hold uploads.
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();
        assert_eq!(storage_status(&file, true)["writable"], false);
    }
}
