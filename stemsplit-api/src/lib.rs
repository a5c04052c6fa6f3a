//! stemsplit-api library interface
//!
//! Exposes the router and services for the binary and for integration testing.

pub mod api;
pub mod error;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::services::{SeparationWorkflow, SessionManager, StemSeparator};

/// Upload size limit, kept in both units for enforcement and messages
#[derive(Debug, Clone, Copy)]
pub struct UploadLimit {
    pub max_bytes: usize,
    pub max_mb: u64,
}

impl UploadLimit {
    pub fn from_mb(max_mb: u64) -> Self {
        Self {
            max_bytes: (max_mb as usize).saturating_mul(1024 * 1024),
            max_mb,
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Session directory roots
    pub sessions: Arc<SessionManager>,
    /// Separation pipeline and job gate
    pub workflow: Arc<SeparationWorkflow>,
    pub upload_limit: UploadLimit,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        sessions: SessionManager,
        separator: Arc<dyn StemSeparator>,
        max_concurrent_jobs: usize,
        upload_limit: UploadLimit,
    ) -> Self {
        Self {
            sessions: Arc::new(sessions),
            workflow: Arc::new(SeparationWorkflow::new(separator, max_concurrent_jobs)),
            upload_limit,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Remember a failure for `/health`
    pub async fn record_error(&self, message: impl Into<String>) {
        *self.last_error.write().await = Some(message.into());
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.upload_limit.max_bytes;

    Router::new()
        .merge(api::info_routes())
        .merge(api::health_routes())
        .merge(api::separate_routes())
        .merge(api::cleanup_routes())
        .fallback(api::not_found)
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
