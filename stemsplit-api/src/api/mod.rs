//! HTTP API handlers for stemsplit-api
//!
//! - `GET /` API information
//! - `GET /health` health check
//! - `POST /separate` upload and separate
//! - `POST /cleanup` purge all session directories

pub mod cleanup;
pub mod health;
pub mod info;
pub mod separate;

pub use cleanup::cleanup_routes;
pub use health::health_routes;
pub use info::info_routes;
pub use separate::separate_routes;

use axum::http::Uri;

use crate::error::ApiError;

/// Fallback for unknown routes
pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(format!("No route for {}", uri.path()))
}
