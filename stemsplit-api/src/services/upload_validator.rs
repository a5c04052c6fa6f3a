//! Upload filename validation and sanitization
//!
//! Client-supplied filenames are never used as-is: the separator derives its
//! output directory from the input file name, so the name must be safe on
//! disk and predictable.

use crate::models::ALLOWED_EXTENSIONS;

/// Why an upload name was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadNameError {
    /// Field had no filename or an empty one
    Missing,
    /// Extension not in [`ALLOWED_EXTENSIONS`]; carries the lowercased extension or "unknown"
    UnsupportedFormat(String),
}

/// A filename that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedUpload {
    /// Sanitized filename written to the session upload directory
    pub filename: String,
    /// Sanitized filename without extension; the separator's track directory
    pub track: String,
    /// Lowercased extension
    pub extension: String,
}

/// Lowercased text after the last `.`, if any
pub fn file_extension(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
}

pub fn is_allowed_extension(ext: &str) -> bool {
    ALLOWED_EXTENSIONS.contains(&ext)
}

/// Reduce a filename to `[A-Za-z0-9_.-]`
///
/// Non-ASCII characters are dropped, path separators and whitespace become
/// `_`, and leading/trailing `.` and `_` are stripped. May return an empty
/// string.
pub fn sanitize_filename(name: &str) -> String {
    let ascii: String = name
        .chars()
        .filter(|c| c.is_ascii())
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");

    joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect::<String>()
        .trim_matches(|c| c == '.' || c == '_')
        .to_string()
}

/// Validate a client filename and derive the on-disk name and track name
pub fn validate_upload_name(raw: Option<&str>) -> Result<ValidatedUpload, UploadNameError> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty()).ok_or(UploadNameError::Missing)?;

    let extension = match file_extension(raw) {
        Some(ext) if is_allowed_extension(&ext) => ext,
        Some(ext) if !ext.is_empty() => return Err(UploadNameError::UnsupportedFormat(ext)),
        _ => return Err(UploadNameError::UnsupportedFormat("unknown".to_string())),
    };

    let raw_stem = raw.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(raw);
    let mut track = sanitize_filename(raw_stem);
    if track.is_empty() {
        track = "upload".to_string();
    }

    Ok(ValidatedUpload {
        filename: format!("{}.{}", track, extension),
        track,
        extension,
    })
}
