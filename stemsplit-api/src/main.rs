//! stemsplit-api - Audio stem separation service
//!
//! Accepts an uploaded audio file, runs the external Demucs separator once
//! for MP3 and once for WAV output, and returns a ZIP with the bass, drums,
//! vocals and other stems in both formats.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use stemsplit_api::services::{DemucsSeparator, SessionManager};
use stemsplit_api::{build_router, AppState, UploadLimit};
use stemsplit_common::config::{load_config, resolve_work_dir, LoggingConfig};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Command-line arguments for stemsplit-api
#[derive(Parser, Debug)]
#[command(name = "stemsplit-api")]
#[command(about = "HTTP service that splits audio into bass, drums, vocals and other stems")]
#[command(version)]
struct Args {
    /// Interface to listen on (overrides config)
    #[arg(long, env = "STEMSPLIT_HOST")]
    host: Option<String>,

    /// Port to listen on (overrides config)
    #[arg(short, long, env = "STEMSPLIT_PORT")]
    port: Option<u16>,

    /// Path to TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Root for per-request session directories
    #[arg(short, long)]
    work_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config comes first so its logging section can shape the subscriber
    let (mut config, config_source) =
        load_config(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    init_tracing(&config.logging)?;

    // Build identification immediately after tracing init
    info!(
        "Starting stemsplit-api v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    match &config_source {
        Some(path) => info!("Configuration: {}", path.display()),
        None => warn!("No config file found, using compiled defaults"),
    }

    let work_dir = resolve_work_dir(args.work_dir.as_deref(), &config);
    let sessions = SessionManager::new(&work_dir);
    sessions
        .init()
        .await
        .with_context(|| format!("Failed to create work directory {}", work_dir.display()))?;
    info!("Work directory: {}", work_dir.display());

    let separator = DemucsSeparator::from_config(&config.separator);
    if separator.check_available().await {
        info!(
            "Separator ready: {} {} (model {})",
            config.separator.program,
            config.separator.args.join(" "),
            config.separator.model
        );
    } else {
        warn!(
            "Separator '{} {}' did not respond; /separate requests will fail until it is installed",
            config.separator.program,
            config.separator.args.join(" ")
        );
    }

    let upload_limit = UploadLimit::from_mb(config.max_upload_mb);
    let state = AppState::new(
        sessions,
        Arc::new(separator),
        config.max_concurrent_jobs,
        upload_limit,
    );
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("Failed to bind to {}:{}", config.host, config.port))?;
    let addr = listener.local_addr().context("Failed to read bound address")?;

    info!("Listening on http://{}", addr);
    info!("Upload endpoint: POST /separate (max {}MB)", upload_limit.max_mb);
    info!("Concurrent jobs: {}", config.max_concurrent_jobs);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize the tracing subscriber
///
/// RUST_LOG takes precedence over the configured level.
fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&logging.level)
            .with_context(|| format!("Invalid log level '{}'", logging.level))?,
    };

    match &logging.file {
        Some(path) => {
            let file = open_log_file(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
    Ok(())
}

fn open_log_file(path: &Path) -> Result<std::fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
