//! Business logic services for stemsplit-api
//!
//! - `session_manager`: per-request upload/output directories
//! - `upload_validator`: filename checks and sanitization
//! - `separator`: external separation engine invocation
//! - `stem_merger`: reconciliation of the two separator runs
//! - `stem_archiver`: ZIP packaging
//! - `separation_workflow`: orchestration of one request

pub mod separation_workflow;
pub mod separator;
pub mod session_manager;
pub mod stem_archiver;
pub mod stem_merger;
pub mod upload_validator;

pub use separation_workflow::{SeparationOutcome, SeparationWorkflow};
pub use separator::{DemucsSeparator, SeparatorError, StemSeparator};
pub use session_manager::{Session, SessionManager};

use std::path::PathBuf;
use thiserror::Error;

use crate::models::OutputFormat;

/// Failure of a separation request after the upload was accepted
#[derive(Debug, Error)]
pub enum SeparationError {
    /// The external separator failed for one output format
    #[error("{} separation failed: {source}", .format.label())]
    Separator {
        format: OutputFormat,
        #[source]
        source: SeparatorError,
    },

    /// A run completed but its track directory is missing
    #[error("{} output directory not found (expected {})", .format.label(), .expected.display())]
    OutputNotFound {
        format: OutputFormat,
        expected: PathBuf,
    },

    /// Not all four stems were produced for both formats
    #[error(
        "Expected 4 MP3 and 4 WAV stems, found {} MP3 and {} WAV",
        .mp3_found.len(),
        .wav_found.len()
    )]
    Incomplete {
        mp3_found: Vec<String>,
        wav_found: Vec<String>,
    },

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Blocking task panicked or was cancelled
    #[error("Task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for SeparationError {
    fn from(err: tokio::task::JoinError) -> Self {
        SeparationError::Task(err.to_string())
    }
}
