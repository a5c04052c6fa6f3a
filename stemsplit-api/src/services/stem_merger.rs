//! Separator output reconciliation
//!
//! The MP3 and WAV runs each write their own tree:
//!
//! ```text
//! <output>/mp3/<model>/<track>/{bass,drums,vocals,other}.mp3
//! <output>/wav/<model>/<track>/{bass,drums,vocals,other}.wav
//! ```
//!
//! This module finds each run's track directory, checks that all four stems
//! are present in both formats, and moves them into one canonical directory
//! `<output>/stems/<track>/`. Everything here is blocking filesystem work and
//! runs on the blocking pool.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use super::SeparationError;
use crate::models::{OutputFormat, Stem, StemFile, StemSet};

/// Name of the canonical directory below the session output dir
pub const CANONICAL_DIR: &str = "stems";

/// Depth limit when the expected track directory is missing
const SEARCH_DEPTH: usize = 3;

/// Files collected from one run's track directory
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub format: OutputFormat,
    pub track_dir: PathBuf,
    /// Recognized stems, in canonical order
    pub stems: Vec<(Stem, PathBuf)>,
    /// Every file with the run's extension, sorted; used for error reports
    pub found: Vec<String>,
}

impl RunOutput {
    pub fn is_complete(&self) -> bool {
        Stem::ALL
            .iter()
            .all(|stem| self.stems.iter().any(|(s, _)| s == stem))
    }
}

/// Directory a run writes into, below the session output dir
pub fn run_root(output_dir: &Path, format: OutputFormat) -> PathBuf {
    output_dir.join(format.extension())
}

/// Find the directory holding one run's stems
///
/// Tries `<run_root>/<model>/<track>` first; otherwise accepts the single
/// directory below `run_root` that contains files of the run's extension.
pub fn locate_track_dir(
    run_root: &Path,
    model: &str,
    track: &str,
    format: OutputFormat,
) -> Result<PathBuf, SeparationError> {
    let expected = run_root.join(model).join(track);
    if expected.is_dir() {
        return Ok(expected);
    }

    let mut candidates: Vec<PathBuf> = WalkDir::new(run_root)
        .min_depth(1)
        .max_depth(SEARCH_DEPTH)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_dir())
        .filter(|entry| dir_has_extension(entry.path(), format))
        .map(|entry| entry.into_path())
        .collect();

    if candidates.len() == 1 {
        let found = candidates.remove(0);
        debug!(
            format = %format,
            expected = %expected.display(),
            found = %found.display(),
            "Track directory found by search"
        );
        return Ok(found);
    }

    Err(SeparationError::OutputNotFound {
        format,
        expected,
    })
}

fn dir_has_extension(dir: &Path, format: OutputFormat) -> bool {
    fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .any(|e| has_extension(&e.path(), format) && e.path().is_file())
        })
        .unwrap_or(false)
}

fn has_extension(path: &Path, format: OutputFormat) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(format.extension()))
        .unwrap_or(false)
}

/// Collect one run's stem files
pub fn collect_run(
    run_root: &Path,
    model: &str,
    track: &str,
    format: OutputFormat,
) -> Result<RunOutput, SeparationError> {
    let track_dir = locate_track_dir(run_root, model, track, format)?;

    let mut found = Vec::new();
    let mut stems = Vec::new();
    for entry in fs::read_dir(&track_dir)? {
        let path = entry?.path();
        if !path.is_file() || !has_extension(&path, format) {
            continue;
        }
        let Some(file_name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        found.push(file_name);

        let file_stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        match Stem::from_file_stem(file_stem) {
            Some(stem) => stems.push((stem, path)),
            None => debug!(format = %format, file = %path.display(), "Ignoring unrecognized stem file"),
        }
    }

    found.sort();
    stems.sort_by_key(|(stem, _)| *stem);

    Ok(RunOutput {
        format,
        track_dir,
        stems,
        found,
    })
}

/// Validate both runs and move their stems into the canonical directory
pub fn merge_runs(
    output_dir: &Path,
    track: &str,
    mp3: RunOutput,
    wav: RunOutput,
) -> Result<StemSet, SeparationError> {
    if !mp3.is_complete() || !wav.is_complete() {
        return Err(SeparationError::Incomplete {
            mp3_found: mp3.found,
            wav_found: wav.found,
        });
    }

    let canonical = output_dir.join(CANONICAL_DIR).join(track);
    fs::create_dir_all(&canonical)?;

    let mut files = Vec::with_capacity(Stem::ALL.len() * OutputFormat::ALL.len());
    for stem in Stem::ALL {
        for run in [&mp3, &wav] {
            let Some((_, source)) = run.stems.iter().find(|(s, _)| *s == stem) else {
                continue;
            };
            let target = canonical.join(format!("{}.{}", stem, run.format.extension()));
            fs::rename(source, &target)?;
            files.push(StemFile {
                stem,
                format: run.format,
                path: target,
            });
        }
    }

    for format in OutputFormat::ALL {
        let root = run_root(output_dir, format);
        if root.exists() {
            fs::remove_dir_all(&root)?;
        }
    }

    info!(
        track = %track,
        dir = %canonical.display(),
        files = files.len(),
        "Merged separator output"
    );

    Ok(StemSet {
        track: track.to_string(),
        dir: canonical,
        files,
    })
}

/// Collect both runs and merge them
pub fn reconcile(output_dir: &Path, model: &str, track: &str) -> Result<StemSet, SeparationError> {
    let mp3 = collect_run(&run_root(output_dir, OutputFormat::Mp3), model, track, OutputFormat::Mp3)?;
    let wav = collect_run(&run_root(output_dir, OutputFormat::Wav), model, track, OutputFormat::Wav)?;
    merge_runs(output_dir, track, mp3, wav)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_run(output_dir: &Path, format: OutputFormat, track: &str, stems: &[&str]) {
        let dir = run_root(output_dir, format).join("htdemucs").join(track);
        fs::create_dir_all(&dir).unwrap();
        for stem in stems {
            fs::write(dir.join(format!("{}.{}", stem, format.extension())), stem.as_bytes()).unwrap();
        }
    }

    const ALL: [&str; 4] = ["bass", "drums", "vocals", "other"];

    #[test]
    fn test_reconcile_merges_into_canonical_layout() {
        let temp = TempDir::new().unwrap();
        write_run(temp.path(), OutputFormat::Mp3, "song", &ALL);
        write_run(temp.path(), OutputFormat::Wav, "song", &ALL);

        let set = reconcile(temp.path(), "htdemucs", "song").unwrap();

        assert_eq!(set.track, "song");
        assert_eq!(set.dir, temp.path().join("stems").join("song"));
        assert_eq!(set.files.len(), 8);
        assert_eq!(set.count(OutputFormat::Mp3), 4);
        assert_eq!(set.count(OutputFormat::Wav), 4);

        let names: Vec<String> = set.files.iter().map(|f| f.archive_name()).collect();
        assert_eq!(
            names,
            vec![
                "bass.mp3", "bass.wav", "drums.mp3", "drums.wav", "vocals.mp3", "vocals.wav",
                "other.mp3", "other.wav"
            ]
        );
        for file in &set.files {
            assert!(file.path.is_file());
            assert!(file.path.starts_with(&set.dir));
        }

        // Per-format run trees are gone
        assert!(!temp.path().join("mp3").exists());
        assert!(!temp.path().join("wav").exists());
    }

    #[test]
    fn test_missing_track_dir_is_output_not_found() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("mp3")).unwrap();
        write_run(temp.path(), OutputFormat::Wav, "song", &ALL);

        let err = reconcile(temp.path(), "htdemucs", "song").unwrap_err();
        match err {
            SeparationError::OutputNotFound { format, .. } => assert_eq!(format, OutputFormat::Mp3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_track_dir_found_under_unexpected_name() {
        let temp = TempDir::new().unwrap();
        write_run(temp.path(), OutputFormat::Mp3, "song_renamed", &ALL);
        write_run(temp.path(), OutputFormat::Wav, "song", &ALL);

        let set = reconcile(temp.path(), "htdemucs", "song").unwrap();
        assert_eq!(set.files.len(), 8);
    }

    #[test]
    fn test_incomplete_reports_found_files() {
        let temp = TempDir::new().unwrap();
        write_run(temp.path(), OutputFormat::Mp3, "song", &ALL);
        write_run(temp.path(), OutputFormat::Wav, "song", &["vocals", "bass"]);

        let err = reconcile(temp.path(), "htdemucs", "song").unwrap_err();
        match err {
            SeparationError::Incomplete { mp3_found, wav_found } => {
                assert_eq!(mp3_found, vec!["bass.mp3", "drums.mp3", "other.mp3", "vocals.mp3"]);
                assert_eq!(wav_found, vec!["bass.wav", "vocals.wav"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        // Nothing moved on failure
        assert!(!temp.path().join(CANONICAL_DIR).exists());
    }

    #[test]
    fn test_unrecognized_files_are_ignored() {
        let temp = TempDir::new().unwrap();
        write_run(temp.path(), OutputFormat::Mp3, "song", &ALL);
        write_run(temp.path(), OutputFormat::Wav, "song", &["bass", "drums", "vocals", "other", "guitar"]);

        let set = reconcile(temp.path(), "htdemucs", "song").unwrap();
        assert_eq!(set.count(OutputFormat::Wav), 4);
        assert!(!set.dir.join("guitar.wav").exists());
    }
}
