//! Stem separation endpoint
//!
//! POST /separate with multipart/form-data field `audio`. Responds with a ZIP
//! of the four stems in MP3 and WAV. The session's output directory is kept
//! alive by the response body and removed once the archive has been streamed
//! (or the client goes away).

use axum::{
    body::{Body, Bytes},
    extract::{
        multipart::{Field, MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use futures::{Stream, StreamExt};
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{error, info};

use crate::error::{ApiError, ApiResult};
use crate::services::stem_archiver::bytes_to_mb;
use crate::services::upload_validator::{validate_upload_name, UploadNameError, ValidatedUpload};
use crate::services::{SeparationOutcome, Session};
use crate::{AppState, UploadLimit};

/// Multipart field carrying the audio file
pub const AUDIO_FIELD: &str = "audio";

/// Upload written to a fresh session
struct SavedUpload {
    session: Session,
    input_path: PathBuf,
    upload: ValidatedUpload,
    bytes: u64,
}

/// POST /separate
pub async fn separate_audio(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Response> {
    let mut multipart = multipart.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let mut saved = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, state.upload_limit))?
    {
        if field.name() != Some(AUDIO_FIELD) {
            continue;
        }
        saved = Some(save_upload(&state, field).await?);
        break;
    }
    let SavedUpload {
        session,
        input_path,
        upload,
        bytes,
    } = saved.ok_or(ApiError::NoAudioFile)?;

    info!(
        session_id = %session.id(),
        filename = %upload.filename,
        size_mb = %format!("{:.1}", bytes_to_mb(bytes)),
        "Processing file"
    );

    match state.workflow.run(&session, &input_path, &upload.track).await {
        Ok(outcome) => archive_response(session, outcome).await,
        Err(e) => {
            error!(session_id = %session.id(), error = %e, "Separation failed");
            state.record_error(e.to_string()).await;
            session.cleanup().await;
            Err(e.into())
        }
    }
}

/// Validate the filename, create a session, and stream the field to disk
///
/// Any failure drops the session, which removes its directories.
async fn save_upload(state: &AppState, mut field: Field<'_>) -> ApiResult<SavedUpload> {
    let upload = validate_upload_name(field.file_name()).map_err(|e| match e {
        UploadNameError::Missing => ApiError::NoFileSelected,
        UploadNameError::UnsupportedFormat(ext) => ApiError::InvalidFormat(ext),
    })?;

    let session = state.sessions.create_session().await?;
    let input_path = session.upload_dir().join(&upload.filename);

    let mut file = File::create(&input_path).await?;
    let mut bytes: u64 = 0;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| multipart_error(e, state.upload_limit))?
    {
        bytes += chunk.len() as u64;
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    drop(file);

    if bytes == 0 {
        return Err(ApiError::EmptyFile);
    }

    Ok(SavedUpload {
        session,
        input_path,
        upload,
        bytes,
    })
}

fn multipart_error(err: MultipartError, limit: UploadLimit) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge {
            limit_mb: limit.max_mb,
        }
    } else {
        ApiError::BadRequest(err.body_text())
    }
}

/// Stream the archive back; the body owns the session from here on
async fn archive_response(session: Session, outcome: SeparationOutcome) -> ApiResult<Response> {
    let file = File::open(&outcome.archive_path).await?;
    let disposition = format!("attachment; filename=\"{}\"", outcome.archive_name);

    let body = Body::from_stream(archive_stream(file, session));
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CONTENT_LENGTH, outcome.archive_bytes.to_string()),
        ],
        body,
    )
        .into_response())
}

fn archive_stream(
    file: File,
    session: Session,
) -> impl Stream<Item = std::io::Result<Bytes>> + Send + 'static {
    async_stream::stream! {
        let mut chunks = ReaderStream::new(file);
        while let Some(chunk) = chunks.next().await {
            yield chunk;
        }
        drop(chunks);
        session.cleanup().await;
    }
}

/// Build separation routes
pub fn separate_routes() -> Router<AppState> {
    Router::new().route("/separate", post(separate_audio))
}
