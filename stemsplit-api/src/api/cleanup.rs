//! Admin cleanup endpoint

use axum::{extract::State, routing::post, Json, Router};
use serde::Serialize;
use tracing::{error, warn};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// POST /cleanup response
#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub message: String,
    pub removed_sessions: usize,
}

/// POST /cleanup
///
/// Deletes every session directory and recreates the empty roots.
pub async fn cleanup_all(State(state): State<AppState>) -> ApiResult<Json<CleanupResponse>> {
    let active = state.workflow.active_jobs();
    if active > 0 {
        warn!(active_jobs = active, "Cleanup requested while jobs are running");
    }

    match state.sessions.purge_all().await {
        Ok(removed_sessions) => Ok(Json(CleanupResponse {
            message: "Cleanup completed successfully".to_string(),
            removed_sessions,
        })),
        Err(e) => {
            error!(error = %e, "Cleanup failed");
            state.record_error(format!("Cleanup failed: {}", e)).await;
            Err(ApiError::Cleanup(e.to_string()))
        }
    }
}

/// Build cleanup routes
pub fn cleanup_routes() -> Router<AppState> {
    Router::new().route("/cleanup", post(cleanup_all))
}
