pub mod transcribe;

pub use transcribe::*;

use crate::health;
use actix_web::web;

/// Register every route of the service.
///
/// Shared by `main` and the in-process tests, so both serve the same surface.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/transcribe", web::post().to(transcribe::transcribe_audio))
        .route("/health", web::get().to(health::health_check))
        .route("/metrics", web::get().to(health::detailed_metrics));
}
