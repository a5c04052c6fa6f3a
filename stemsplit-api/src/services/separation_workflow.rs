//! Orchestration of one separation request
//!
//! MP3 run → WAV run → reconcile → release upload → archive. The session is
//! borrowed, never consumed: whoever owns it decides when the directories go
//! away, which keeps cleanup in one place for both success and failure.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::info;

use super::session_manager::Session;
use super::{stem_archiver, stem_merger, SeparationError, StemSeparator};
use crate::models::{OutputFormat, StemSet};

/// Result of a successful separation
#[derive(Debug)]
pub struct SeparationOutcome {
    pub stems: StemSet,
    /// Archive inside the session output directory
    pub archive_path: PathBuf,
    /// Download name (`<track>_stems.zip`)
    pub archive_name: String,
    pub archive_bytes: u64,
    pub elapsed: Duration,
}

/// Runs separation jobs through a bounded gate
pub struct SeparationWorkflow {
    separator: Arc<dyn StemSeparator>,
    job_gate: Semaphore,
    max_jobs: usize,
}

impl SeparationWorkflow {
    pub fn new(separator: Arc<dyn StemSeparator>, max_jobs: usize) -> Self {
        let max_jobs = max_jobs.max(1);
        Self {
            separator,
            job_gate: Semaphore::new(max_jobs),
            max_jobs,
        }
    }

    /// Jobs currently holding a slot
    pub fn active_jobs(&self) -> usize {
        self.max_jobs
            .saturating_sub(self.job_gate.available_permits())
    }

    pub fn max_jobs(&self) -> usize {
        self.max_jobs
    }

    pub fn separator(&self) -> &dyn StemSeparator {
        self.separator.as_ref()
    }

    /// Separate `input` (already inside the session upload dir) and package the result
    pub async fn run(
        &self,
        session: &Session,
        input: &Path,
        track: &str,
    ) -> Result<SeparationOutcome, SeparationError> {
        if self.job_gate.available_permits() == 0 {
            info!(session_id = %session.id(), "Waiting for a free separation slot");
        }
        let _permit = self
            .job_gate
            .acquire()
            .await
            .map_err(|e| SeparationError::Task(e.to_string()))?;

        let started = Instant::now();
        let output_dir = session.output_dir().to_path_buf();

        for format in OutputFormat::ALL {
            let run_root = stem_merger::run_root(&output_dir, format);
            info!(
                session_id = %session.id(),
                separator = self.separator.name(),
                format = %format,
                "Starting separator run"
            );
            self.separator
                .separate(input, &run_root, format)
                .await
                .map_err(|source| SeparationError::Separator { format, source })?;
        }

        let model = self.separator.model_name().to_string();
        let stems = {
            let output_dir = output_dir.clone();
            let track = track.to_string();
            tokio::task::spawn_blocking(move || stem_merger::reconcile(&output_dir, &model, &track))
                .await??
        };

        // Input is no longer needed; the output dir lives until the download finishes
        session.release_upload().await;

        let archive_name = stem_archiver::archive_name(track);
        let archive_path = output_dir.join(&archive_name);
        let (stems, archive_bytes) = {
            let archive_path = archive_path.clone();
            tokio::task::spawn_blocking(move || {
                let size = stem_archiver::write_archive(&stems, &archive_path)?;
                Ok::<_, SeparationError>((stems, size))
            })
            .await??
        };

        let elapsed = started.elapsed();
        info!(
            session_id = %session.id(),
            track = %track,
            mp3 = stems.count(OutputFormat::Mp3),
            wav = stems.count(OutputFormat::Wav),
            size_mb = %format!("{:.1}", stem_archiver::bytes_to_mb(archive_bytes)),
            elapsed_secs = %format!("{:.1}", elapsed.as_secs_f64()),
            "Separation complete"
        );

        Ok(SeparationOutcome {
            stems,
            archive_path,
            archive_name,
            archive_bytes,
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{SeparatorError, SessionManager};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Writes the requested stems in the Demucs layout
    struct ScriptedSeparator {
        stems: Vec<&'static str>,
        fail_on: Option<OutputFormat>,
        calls: AtomicUsize,
    }

    impl ScriptedSeparator {
        fn complete() -> Self {
            Self {
                stems: vec!["bass", "drums", "vocals", "other"],
                fail_on: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl StemSeparator for ScriptedSeparator {
        async fn separate(
            &self,
            input: &Path,
            output_dir: &Path,
            format: OutputFormat,
        ) -> Result<(), SeparatorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on == Some(format) {
                return Err(SeparatorError::Failed {
                    status: "exit status: 1".to_string(),
                    stderr: "model exploded".to_string(),
                });
            }
            let track = input.file_stem().unwrap().to_string_lossy().into_owned();
            let dir = output_dir.join("htdemucs").join(track);
            std::fs::create_dir_all(&dir)?;
            for stem in &self.stems {
                std::fs::write(dir.join(format!("{}.{}", stem, format.extension())), b"pcm")?;
            }
            Ok(())
        }

        fn model_name(&self) -> &str {
            "htdemucs"
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    async fn session_with_input(temp: &TempDir) -> (Session, PathBuf) {
        let manager = SessionManager::new(temp.path());
        manager.init().await.unwrap();
        let session = manager.create_session().await.unwrap();
        let input = session.upload_dir().join("song.mp3");
        std::fs::write(&input, b"ID3").unwrap();
        (session, input)
    }

    #[tokio::test]
    async fn test_run_produces_archive_and_releases_upload() {
        let temp = TempDir::new().unwrap();
        let (session, input) = session_with_input(&temp).await;
        let separator = Arc::new(ScriptedSeparator::complete());
        let workflow = SeparationWorkflow::new(separator.clone(), 1);

        let outcome = workflow.run(&session, &input, "song").await.unwrap();

        assert_eq!(separator.calls.load(Ordering::SeqCst), 2);
        assert_eq!(outcome.archive_name, "song_stems.zip");
        assert!(outcome.archive_path.is_file());
        assert!(outcome.archive_path.starts_with(session.output_dir()));
        assert_eq!(outcome.stems.files.len(), 8);
        assert!(!session.upload_dir().exists());
        assert_eq!(workflow.active_jobs(), 0);
    }

    #[tokio::test]
    async fn test_failed_mp3_run_skips_wav_run() {
        let temp = TempDir::new().unwrap();
        let (session, input) = session_with_input(&temp).await;
        let separator = Arc::new(ScriptedSeparator {
            fail_on: Some(OutputFormat::Mp3),
            ..ScriptedSeparator::complete()
        });
        let workflow = SeparationWorkflow::new(separator.clone(), 1);

        let err = workflow.run(&session, &input, "song").await.unwrap_err();

        assert!(matches!(
            err,
            SeparationError::Separator { format: OutputFormat::Mp3, .. }
        ));
        assert_eq!(separator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_incomplete_output_is_reported() {
        let temp = TempDir::new().unwrap();
        let (session, input) = session_with_input(&temp).await;
        let separator = Arc::new(ScriptedSeparator {
            stems: vec!["vocals", "other"],
            ..ScriptedSeparator::complete()
        });
        let workflow = SeparationWorkflow::new(separator, 1);

        let err = workflow.run(&session, &input, "song").await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "Expected 4 MP3 and 4 WAV stems, found 2 MP3 and 2 WAV"
        );
    }

    #[test]
    fn test_zero_jobs_is_clamped() {
        let workflow = SeparationWorkflow::new(Arc::new(ScriptedSeparator::complete()), 0);
        assert_eq!(workflow.max_jobs(), 1);
    }
}
