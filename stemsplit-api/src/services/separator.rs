//! External stem separation engine
//!
//! The separation model is a black box reached through [`StemSeparator`].
//! [`DemucsSeparator`] runs the Demucs command line once per output format;
//! tests substitute their own implementation.

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use stemsplit_common::config::SeparatorConfig;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::models::OutputFormat;

/// Lines of stderr kept when a run fails
const STDERR_TAIL_LINES: usize = 20;

/// Upper bound on the stderr tail carried in the error
const STDERR_TAIL_BYTES: usize = 4096;

/// Separation backend
#[async_trait]
pub trait StemSeparator: Send + Sync {
    /// Separate `input` into stems encoded as `format`, writing below `output_dir`
    ///
    /// Output lands at `<output_dir>/<model_name>/<track>/<stem>.<ext>` where
    /// `track` is the input file name without its extension.
    async fn separate(
        &self,
        input: &Path,
        output_dir: &Path,
        format: OutputFormat,
    ) -> Result<(), SeparatorError>;

    /// Model name; the first directory level of the output layout
    fn model_name(&self) -> &str;

    /// Backend name (for logging)
    fn name(&self) -> &'static str;
}

/// A single separator run failed
#[derive(Debug, Error)]
pub enum SeparatorError {
    #[error("input file not found: {0}")]
    InputMissing(PathBuf),

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("separator exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("separator timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Runs the Demucs command line
#[derive(Debug, Clone)]
pub struct DemucsSeparator {
    program: String,
    base_args: Vec<String>,
    model: String,
    device: String,
    mp3_bitrate: u32,
    timeout: Duration,
    extra_args: Vec<String>,
}

impl DemucsSeparator {
    pub fn from_config(config: &SeparatorConfig) -> Self {
        Self {
            program: config.program.clone(),
            base_args: config.args.clone(),
            model: config.model.clone(),
            device: config.device.clone(),
            mp3_bitrate: config.mp3_bitrate,
            timeout: Duration::from_secs(config.timeout_secs),
            extra_args: config.extra_args.clone(),
        }
    }

    /// Full argument list for one run (program excluded)
    pub fn build_args(&self, input: &Path, output_dir: &Path, format: OutputFormat) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.base_args.iter().map(OsString::from).collect();

        args.push("-n".into());
        args.push(self.model.clone().into());
        args.push("-o".into());
        args.push(output_dir.as_os_str().to_owned());

        if format == OutputFormat::Mp3 {
            args.push("--mp3".into());
            args.push("--mp3-bitrate".into());
            args.push(self.mp3_bitrate.to_string().into());
        }

        // "auto": the engine picks CUDA when available
        if !self.device.eq_ignore_ascii_case("auto") && !self.device.trim().is_empty() {
            args.push("-d".into());
            args.push(self.device.clone().into());
        }

        args.extend(self.extra_args.iter().map(OsString::from));
        args.push(input.as_os_str().to_owned());
        args
    }

    /// Probe whether the engine can be launched at all
    pub async fn check_available(&self) -> bool {
        let mut command = Command::new(&self.program);
        command
            .args(&self.base_args)
            .arg("--help")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        match tokio::time::timeout(Duration::from_secs(60), command.status()).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(e)) => {
                debug!(program = %self.program, error = %e, "Separator probe failed to start");
                false
            }
            Err(_) => {
                debug!(program = %self.program, "Separator probe timed out");
                false
            }
        }
    }
}

#[async_trait]
impl StemSeparator for DemucsSeparator {
    async fn separate(
        &self,
        input: &Path,
        output_dir: &Path,
        format: OutputFormat,
    ) -> Result<(), SeparatorError> {
        if !input.exists() {
            return Err(SeparatorError::InputMissing(input.to_path_buf()));
        }
        tokio::fs::create_dir_all(output_dir).await?;

        let args = self.build_args(input, output_dir, format);
        info!(
            program = %self.program,
            model = %self.model,
            format = %format,
            input = %input.display(),
            "Running separator"
        );
        debug!(?args, "Separator arguments");

        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|source| SeparatorError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        // Dropping the wait future on timeout kills the child (kill_on_drop)
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(format = %format, timeout_secs = self.timeout.as_secs(), "Separator timed out");
                return Err(SeparatorError::Timeout(self.timeout.as_secs()));
            }
        };

        if !output.status.success() {
            let stderr = stderr_tail(&output.stderr, STDERR_TAIL_LINES);
            warn!(format = %format, status = %output.status, "Separator exited with failure");
            return Err(SeparatorError::Failed {
                status: output.status.to_string(),
                stderr,
            });
        }

        info!(format = %format, "Separator run complete");
        Ok(())
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn name(&self) -> &'static str {
        "demucs"
    }
}

/// Last `max_lines` non-empty lines of process output, at most `STDERR_TAIL_BYTES`
///
/// Progress bars redraw with `\r`, so carriage returns also end a line.
fn stderr_tail(stderr: &[u8], max_lines: usize) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text
        .split(|c: char| c == '\n' || c == '\r')
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .collect();
    let start = lines.len().saturating_sub(max_lines);
    let tail = lines[start..].join("\n");

    if tail.len() <= STDERR_TAIL_BYTES {
        return tail;
    }
    let mut cut = tail.len() - STDERR_TAIL_BYTES;
    while !tail.is_char_boundary(cut) {
        cut += 1;
    }
    tail[cut..].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separator(device: &str) -> DemucsSeparator {
        DemucsSeparator::from_config(&SeparatorConfig {
            device: device.to_string(),
            ..SeparatorConfig::default()
        })
    }

    fn as_strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_mp3_args_include_bitrate() {
        let args = as_strings(separator("auto").build_args(
            Path::new("/in/song.mp3"),
            Path::new("/out/mp3"),
            OutputFormat::Mp3,
        ));

        assert_eq!(
            args,
            vec![
                "-m", "demucs", "-n", "htdemucs", "-o", "/out/mp3", "--mp3", "--mp3-bitrate", "320",
                "/in/song.mp3"
            ]
        );
    }

    #[test]
    fn test_wav_args_have_no_format_flag() {
        let args = as_strings(separator("cuda").build_args(
            Path::new("/in/song.mp3"),
            Path::new("/out/wav"),
            OutputFormat::Wav,
        ));

        assert!(!args.contains(&"--mp3".to_string()));
        assert_eq!(&args[args.len() - 3..], ["-d", "cuda", "/in/song.mp3"]);
    }

    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        let stderr = b"one\n\ntwo\nthree\nfour\n";
        assert_eq!(stderr_tail(stderr, 2), "three\nfour");
        assert_eq!(stderr_tail(b"", 5), "");
    }

    #[test]
    fn test_stderr_tail_splits_progress_redraws() {
        let stderr = b"  0%|    | 0/10\r 50%|##  | 5/10\r100%|####| 10/10\nRuntimeError: bad input\n";
        assert_eq!(stderr_tail(stderr, 2), "100%|####| 10/10\nRuntimeError: bad input");
    }

    #[test]
    fn test_stderr_tail_is_bounded() {
        let long_line = "x".repeat(STDERR_TAIL_BYTES * 3);
        let tail = stderr_tail(long_line.as_bytes(), STDERR_TAIL_LINES);
        assert_eq!(tail.len(), STDERR_TAIL_BYTES);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_child() {
        let temp = tempfile::TempDir::new().unwrap();
        let input = temp.path().join("song.wav");
        std::fs::write(&input, b"RIFF").unwrap();
        let marker = temp.path().join("finished");

        let separator = DemucsSeparator::from_config(&SeparatorConfig {
            program: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                format!("sleep 3; touch '{}'", marker.display()),
                "sh".to_string(),
            ],
            timeout_secs: 1,
            ..SeparatorConfig::default()
        });

        let started = std::time::Instant::now();
        let err = separator
            .separate(&input, &temp.path().join("out"), OutputFormat::Wav)
            .await
            .unwrap_err();

        assert!(matches!(err, SeparatorError::Timeout(1)));
        assert!(started.elapsed() < Duration::from_secs(3));

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!marker.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_failure() {
        let temp = tempfile::TempDir::new().unwrap();
        let input = temp.path().join("song.wav");
        std::fs::write(&input, b"RIFF").unwrap();

        let separator = DemucsSeparator::from_config(&SeparatorConfig {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "echo boom >&2; exit 3".to_string(), "sh".to_string()],
            ..SeparatorConfig::default()
        });

        let err = separator
            .separate(&input, &temp.path().join("out"), OutputFormat::Wav)
            .await
            .unwrap_err();

        match err {
            SeparatorError::Failed { stderr, .. } => assert_eq!(stderr, "boom"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let temp = tempfile::TempDir::new().unwrap();
        let input = temp.path().join("song.wav");
        std::fs::write(&input, b"RIFF").unwrap();

        let separator = DemucsSeparator::from_config(&SeparatorConfig {
            program: "stemsplit-no-such-program".to_string(),
            ..SeparatorConfig::default()
        });

        let err = separator
            .separate(&input, &temp.path().join("out"), OutputFormat::Mp3)
            .await
            .unwrap_err();
        assert!(matches!(err, SeparatorError::Spawn { .. }));
        assert!(!separator.check_available().await);
    }

    #[tokio::test]
    async fn test_missing_input_is_rejected() {
        let temp = tempfile::TempDir::new().unwrap();
        let err = separator("auto")
            .separate(&temp.path().join("nope.mp3"), temp.path(), OutputFormat::Mp3)
            .await
            .unwrap_err();
        assert!(matches!(err, SeparatorError::InputMissing(_)));
    }
}
