//! Error types for stemsplit-api
//!
//! Every error renders as a JSON object with `error` (short title) and
//! `message` (detail), plus variant-specific fields flattened in.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::models::ALLOWED_EXTENSIONS;
use crate::services::SeparationError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Multipart body had no `audio` field (400)
    #[error("No audio file provided")]
    NoAudioFile,

    /// `audio` field without a filename (400)
    #[error("No file selected")]
    NoFileSelected,

    /// Extension not accepted (400); carries the uploaded extension
    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    /// Upload contained no bytes (400)
    #[error("Empty file")]
    EmptyFile,

    /// Body over the configured limit (413)
    #[error("File too large (limit {limit_mb}MB)")]
    PayloadTooLarge { limit_mb: u64 },

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Separation pipeline failure (500)
    #[error(transparent)]
    Separation(#[from] SeparationError),

    /// `/cleanup` failed (500)
    #[error("Cleanup failed: {0}")]
    Cleanup(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    /// Status code, title, message, and extra fields for the response body
    fn parts(&self) -> (StatusCode, &'static str, String, Map<String, Value>) {
        let mut extra = Map::new();
        let (status, title, message) = match self {
            ApiError::NoAudioFile => (
                StatusCode::BAD_REQUEST,
                "No audio file provided",
                "Please upload an audio file with key 'audio'".to_string(),
            ),
            ApiError::NoFileSelected => (
                StatusCode::BAD_REQUEST,
                "No file selected",
                "Please select an audio file to upload".to_string(),
            ),
            ApiError::InvalidFormat(ext) => {
                extra.insert("uploaded_format".to_string(), json!(ext));
                (
                    StatusCode::BAD_REQUEST,
                    "Invalid file format",
                    format!("Supported formats: {}", ALLOWED_EXTENSIONS.join(", ")),
                )
            }
            ApiError::EmptyFile => (
                StatusCode::BAD_REQUEST,
                "Empty file",
                "The uploaded audio file contains no data".to_string(),
            ),
            ApiError::PayloadTooLarge { limit_mb } => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "File too large",
                format!("Maximum file size is {}MB", limit_mb),
            ),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "Invalid request", msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "Not found", msg.clone()),
            ApiError::Separation(err) => match err {
                SeparationError::Separator { .. } => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Stem separation failed",
                    err.to_string(),
                ),
                SeparationError::OutputNotFound { .. } => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Separation output not found",
                    "The stem separation process completed but output files were not found"
                        .to_string(),
                ),
                SeparationError::Incomplete {
                    mp3_found,
                    wav_found,
                } => {
                    extra.insert("found_mp3_files".to_string(), json!(mp3_found));
                    extra.insert("found_wav_files".to_string(), json!(wav_found));
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Incomplete separation",
                        err.to_string(),
                    )
                }
                SeparationError::Archive(_)
                | SeparationError::Io(_)
                | SeparationError::Task(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error",
                    err.to_string(),
                ),
            },
            ApiError::Cleanup(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Cleanup failed",
                msg.clone(),
            ),
            ApiError::Io(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                err.to_string(),
            ),
        };
        (status, title, message, extra)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, title, message, extra) = self.parts();

        let mut body = Map::new();
        body.insert("error".to_string(), json!(title));
        body.insert("message".to_string(), json!(message));
        body.extend(extra);

        (status, Json(Value::Object(body))).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OutputFormat;
    use crate::services::SeparatorError;

    async fn body_json(err: ApiError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_invalid_format_lists_supported_formats() {
        let (status, body) = body_json(ApiError::InvalidFormat("txt".to_string())).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid file format");
        assert_eq!(body["message"], "Supported formats: mp3, wav, flac, m4a, ogg");
        assert_eq!(body["uploaded_format"], "txt");
    }

    #[tokio::test]
    async fn test_incomplete_includes_found_files() {
        let err = ApiError::from(SeparationError::Incomplete {
            mp3_found: vec!["bass.mp3".to_string()],
            wav_found: vec![],
        });
        let (status, body) = body_json(err).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Incomplete separation");
        assert_eq!(
            body["message"],
            "Expected 4 MP3 and 4 WAV stems, found 1 MP3 and 0 WAV"
        );
        assert_eq!(body["found_mp3_files"], json!(["bass.mp3"]));
        assert_eq!(body["found_wav_files"], json!([]));
    }

    #[tokio::test]
    async fn test_separator_failure_names_format() {
        let err = ApiError::from(SeparationError::Separator {
            format: OutputFormat::Wav,
            source: SeparatorError::Timeout(30),
        });
        let (status, body) = body_json(err).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Stem separation failed");
        assert_eq!(
            body["message"],
            "WAV separation failed: separator timed out after 30 seconds"
        );
    }

    #[tokio::test]
    async fn test_payload_too_large() {
        let (status, body) = body_json(ApiError::PayloadTooLarge { limit_mb: 100 }).await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["error"], "File too large");
        assert_eq!(body["message"], "Maximum file size is 100MB");
    }
}
