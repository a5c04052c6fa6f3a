//! ZIP packaging of a merged stem set

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::Path;
use tracing::info;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::SeparationError;
use crate::models::StemSet;

/// Download name for a track's archive
pub fn archive_name(track: &str) -> String {
    format!("{}_stems.zip", track)
}

/// Write every stem into a Deflate-compressed archive with flat entry names
///
/// Returns the archive size in bytes.
pub fn write_archive(stems: &StemSet, zip_path: &Path) -> Result<u64, SeparationError> {
    let file = File::create(zip_path)?;
    let mut writer = ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(true);

    for stem_file in &stems.files {
        writer.start_file(stem_file.archive_name(), options)?;
        let mut source = File::open(&stem_file.path)?;
        io::copy(&mut source, &mut writer)?;
    }

    let mut inner = writer.finish()?;
    io::Write::flush(&mut inner)?;
    drop(inner);

    let size = std::fs::metadata(zip_path)?.len();
    info!(
        track = %stems.track,
        entries = stems.files.len(),
        size_mb = %format!("{:.1}", bytes_to_mb(size)),
        "Archive written"
    );
    Ok(size)
}

pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}
