//! # Transcription Endpoint
//!
//! `POST /transcribe` accepts a multipart form with one file field named `file`,
//! stores it, runs the engine on the stored copy and answers with the text.
//!
//! ## Request lifecycle:
//! 1. Find the `file` part and its original filename (400 if there is none)
//! 2. Allocate `<upload dir>/<uuid><ext>` and stream the part into it
//! 3. Run the engine on actix's blocking pool
//! 4. Release the stored file once the engine has returned, success or not
//! 5. `200 {"transcription": "..."}` or `500 {"detail": "..."}`

use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::storage::StoredArtifact;
use actix_multipart::{Field, Multipart};
use actix_web::{web, HttpResponse};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};

/// Name of the multipart field carrying the audio.
pub const FILE_FIELD: &str = "file";

/// Success body of `POST /transcribe`.
#[derive(Debug, Serialize, Deserialize)]
pub struct TranscriptionResponse {
    pub transcription: String,
}

pub async fn transcribe_audio(
    state: web::Data<AppState>,
    mut payload: Multipart,
) -> AppResult<HttpResponse> {
    let (mut field, original_filename) = next_file_field(&mut payload).await?;

    let _active = state.begin_transcription();
    let artifact = state.store.allocate(&original_filename);

    let (outcome, artifact) = store_and_transcribe(&state, artifact, &mut field).await;
    let released = match artifact {
        Some(artifact) => artifact.release().await,
        // Lost with a crashed worker; dropping it already applied the retention policy
        None => Ok(false),
    };

    let result = match (outcome, released) {
        (Ok(text), Ok(_)) => Ok(text),
        (Err(err), released) => {
            if let Err(cleanup_err) = released {
                tracing::warn!(error = %cleanup_err, "Failed to delete stored upload");
            }
            Err(err)
        }
        (Ok(_), Err(cleanup_err)) => Err(AppError::from(cleanup_err)),
    };

    match result {
        Ok(transcription) => Ok(HttpResponse::Ok().json(TranscriptionResponse { transcription })),
        Err(err) => {
            tracing::error!(
                error = ?err,
                filename = %original_filename,
                "Transcription failed"
            );
            Err(err)
        }
    }
}

/// Steps 2 and 3: copy the upload to disk, then run the engine on it.
///
/// The artifact moves into the blocking task and comes back with the result, so a
/// cancelled request cannot drop it while the engine is still reading the file.
async fn store_and_transcribe(
    state: &AppState,
    artifact: StoredArtifact,
    field: &mut Field,
) -> (AppResult<String>, Option<StoredArtifact>) {
    match artifact.write(field).await {
        Ok(bytes) => tracing::debug!("Stored {} bytes at {}", bytes, artifact),
        Err(e) => return (Err(e.into()), Some(artifact)),
    }

    let transcriber = state.transcriber.clone();
    let finished = web::block(move || {
        let result = transcriber.transcribe(artifact.path());
        (result, artifact)
    })
    .await;

    match finished {
        Ok((result, artifact)) => {
            let result = result.map_err(|err| {
                tracing::error!(error = ?err, "Engine failed on {}", artifact);
                AppError::from(err)
            });
            (result, Some(artifact))
        }
        Err(e) => (
            Err(AppError::Internal(format!("transcription worker failed: {}", e))),
            None,
        ),
    }
}

/// Advance the form to the audio part, skipping any other fields.
async fn next_file_field(payload: &mut Multipart) -> AppResult<(Field, String)> {
    while let Some(item) = payload.next().await {
        let mut field =
            item.map_err(|e| AppError::BadRequest(format!("Invalid multipart form: {}", e)))?;

        let filename = field
            .content_disposition()
            .filter(|cd| cd.get_name() == Some(FILE_FIELD))
            .map(|cd| cd.get_filename().map(str::to_string));

        match filename {
            Some(Some(filename)) => return Ok((field, filename)),
            Some(None) => {
                return Err(AppError::BadRequest(format!(
                    "Field '{}' must be a file upload",
                    FILE_FIELD
                )))
            }
            None => {
                // Not ours: drain it so the next part can be read.
                while let Some(chunk) = field.next().await {
                    chunk.map_err(|e| AppError::BadRequest(format!("Invalid multipart form: {}", e)))?;
                }
            }
        }
    }

    Err(AppError::BadRequest(format!(
        "No file part named '{}' in request",
        FILE_FIELD
    )))
}
