//! # Whisper Service - Server Entry Point
//!
//! Starts the Actix-web server that accepts audio uploads on `POST /transcribe`.
//!
//! ## Startup sequence:
//! 1. **Load configuration** from `.env`, `config.toml` and `APP_*` variables
//! 2. **Set up logging** for debugging and monitoring
//! 3. **Prepare the upload directory** and **initialize the engine**, once
//! 4. **Serve requests** until SIGINT/SIGTERM, then shut down gracefully
//!
//! Engine initialization can be slow; the server only logs that it is ready once
//! the listener is bound.

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info};
use whisper_service::config::AppConfig;
use whisper_service::handlers;
use whisper_service::middleware::{MetricsMiddleware, RequestLogging};
use whisper_service::state::AppState;
use whisper_service::storage::UploadStore;
use whisper_service::telemetry::init_tracing;
use whisper_service::transcription::{CommandTranscriber, Transcriber};

#[actix_web::main]
async fn main() -> Result<()> {
    // It's fine if there's no .env file
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!(
        "Initializing {} v{}. Please wait for the message that the server is ready to accept requests",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let store = UploadStore::new(&config.files)?;
    info!(
        upload_dir = %store.dir().display(),
        delete_after_transcription = store.deletes_after_transcription(),
        "Upload directory ready"
    );

    // Built exactly once; every request shares this instance.
    let transcriber: Arc<dyn Transcriber> = Arc::new(CommandTranscriber::new(config.whisper.clone())?);

    let app_state = AppState::new(config.clone(), transcriber, store);
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    let mut server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            // Middleware executes in reverse order of registration for requests
            .wrap(cors)
            .wrap(MetricsMiddleware)
            .wrap(RequestLogging)
            .configure(handlers::configure)
    });

    if let Some(workers) = config.server.workers {
        server = server.workers(workers);
    }

    let server = server.bind(&bind_addr)?.run();
    info!("Server started on {} and is ready to accept requests", bind_addr);

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            // Let in-flight transcriptions finish and clean up their uploads
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Resolve on the first SIGTERM or SIGINT (Ctrl+C elsewhere).
#[cfg(unix)]
async fn wait_for_shutdown() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigterm, mut sigint) = match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
        _ => {
            error!("Failed to install signal handlers, falling back to Ctrl+C");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM"),
        _ = sigint.recv() => info!("Received SIGINT"),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Received Ctrl+C");
    }
}
