//! API information endpoint

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::{OutputFormat, Stem, ALLOWED_EXTENSIONS};
use crate::AppState;

/// GET / response
#[derive(Debug, Serialize)]
pub struct ApiInfo {
    pub message: String,
    pub version: String,
    pub endpoints: BTreeMap<&'static str, &'static str>,
    pub supported_formats: Vec<&'static str>,
    pub max_file_size: String,
    pub output_formats: Vec<OutputFormat>,
    pub stems: Vec<Stem>,
    pub separator: String,
    pub build: BuildInfo,
}

/// Build identification captured by build.rs
#[derive(Debug, Serialize)]
pub struct BuildInfo {
    pub git_hash: &'static str,
    pub timestamp: &'static str,
    pub profile: &'static str,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            git_hash: env!("GIT_HASH"),
            timestamp: env!("BUILD_TIMESTAMP"),
            profile: env!("BUILD_PROFILE"),
        }
    }
}

/// GET /
pub async fn api_info(State(state): State<AppState>) -> Json<ApiInfo> {
    let endpoints = BTreeMap::from([
        ("/separate", "POST - Upload audio file for stem separation"),
        ("/health", "GET - Health check"),
        ("/cleanup", "POST - Remove all temporary session files"),
    ]);

    Json(ApiInfo {
        message: "Audio Stem Separation API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        endpoints,
        supported_formats: ALLOWED_EXTENSIONS.to_vec(),
        max_file_size: format!("{}MB", state.upload_limit.max_mb),
        output_formats: OutputFormat::ALL.to_vec(),
        stems: Stem::ALL.to_vec(),
        separator: format!(
            "{} ({})",
            state.workflow.separator().name(),
            state.workflow.separator().model_name()
        ),
        build: BuildInfo::current(),
    })
}

/// Build API information routes
pub fn info_routes() -> Router<AppState> {
    Router::new().route("/", get(api_info))
}
