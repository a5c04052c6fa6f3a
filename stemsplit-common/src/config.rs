//! Bootstrap configuration and work directory resolution
//!
//! Configuration is a single optional TOML file. Every field has a built-in
//! default, so a missing file is not an error: the service starts with the
//! compiled defaults and logs a warning.
//!
//! # Config file priority
//!
//! 1. Command-line argument (`--config`)
//! 2. Environment variable (`STEMSPLIT_CONFIG`)
//! 3. `~/.config/stemsplit/config.toml`
//! 4. `/etc/stemsplit/config.toml` (Linux only)
//!
//! # Work directory priority
//!
//! 1. Command-line argument (`--work-dir`)
//! 2. Environment variable (`STEMSPLIT_WORK_DIR`)
//! 3. TOML `work_dir`
//! 4. OS-dependent compiled default

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "STEMSPLIT_CONFIG";

/// Environment variable naming the work directory
pub const WORK_DIR_ENV_VAR: &str = "STEMSPLIT_WORK_DIR";

/// Bootstrap configuration loaded from TOML file
///
/// Read once at startup. The service must restart to pick up changes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Interface to bind the HTTP server to
    pub host: String,

    /// HTTP server port
    pub port: u16,

    /// Root for per-request session directories (optional)
    pub work_dir: Option<PathBuf>,

    /// Maximum accepted upload size in megabytes
    pub max_upload_mb: u64,

    /// Number of separation jobs allowed to run at once
    pub max_concurrent_jobs: usize,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// External separator invocation
    pub separator: SeparatorConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            work_dir: None,
            max_upload_mb: 100,
            max_concurrent_jobs: 1,
            logging: LoggingConfig::default(),
            separator: SeparatorConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// How the external separation engine is launched
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SeparatorConfig {
    /// Executable to run
    pub program: String,

    /// Arguments placed before the separation arguments
    pub args: Vec<String>,

    /// Pretrained model name; also the first directory level of the output
    pub model: String,

    /// Compute device: "auto" lets the engine choose, anything else is passed through
    pub device: String,

    /// MP3 encoder bitrate in kbps
    pub mp3_bitrate: u32,

    /// Hard limit for a single run
    pub timeout_secs: u64,

    /// Additional arguments appended to every run
    pub extra_args: Vec<String>,
}

impl Default for SeparatorConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: vec!["-m".to_string(), "demucs".to_string()],
            model: "htdemucs".to_string(),
            device: "auto".to_string(),
            mp3_bitrate: 320,
            timeout_secs: 1800,
            extra_args: Vec::new(),
        }
    }
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Reject values the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_upload_mb == 0 {
            return Err(Error::Config("max_upload_mb must be greater than 0".to_string()));
        }
        if self.max_concurrent_jobs == 0 {
            return Err(Error::Config(
                "max_concurrent_jobs must be at least 1".to_string(),
            ));
        }
        if self.separator.program.trim().is_empty() {
            return Err(Error::Config("separator.program must not be empty".to_string()));
        }
        if self.separator.model.trim().is_empty() {
            return Err(Error::Config("separator.model must not be empty".to_string()));
        }
        if self.separator.timeout_secs == 0 {
            return Err(Error::Config(
                "separator.timeout_secs must be greater than 0".to_string(),
            ));
        }
        if !(8..=320).contains(&self.separator.mp3_bitrate) {
            return Err(Error::Config(format!(
                "separator.mp3_bitrate must be between 8 and 320, got {}",
                self.separator.mp3_bitrate
            )));
        }
        Ok(())
    }
}

/// Find the config file to load, if any
///
/// Explicit locations (CLI, environment) are returned even when missing so the
/// caller can report them; default locations are only returned when present.
pub fn locate_config_file(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3/4: Platform default locations
    default_config_candidates()
        .into_iter()
        .find(|candidate| candidate.exists())
}

fn default_config_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join("stemsplit").join("config.toml"));
    }
    if cfg!(target_os = "linux") {
        candidates.push(PathBuf::from("/etc/stemsplit/config.toml"));
    }
    candidates
}

/// Load the bootstrap configuration
///
/// Returns the configuration and the file it came from (None = compiled defaults).
/// Runs before the tracing subscriber exists, so reporting the source is left
/// to the caller.
pub fn load_config(cli_arg: Option<&Path>) -> Result<(TomlConfig, Option<PathBuf>)> {
    match locate_config_file(cli_arg) {
        Some(path) => {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            let config = TomlConfig::from_file(&path)?;
            Ok((config, Some(path)))
        }
        None => Ok((TomlConfig::default(), None)),
    }
}

/// Resolve the work directory following the documented priority order
pub fn resolve_work_dir(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(WORK_DIR_ENV_VAR) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(path) = &config.work_dir {
        return path.clone();
    }

    // Priority 4: OS-dependent compiled default
    default_work_dir()
}

/// OS-dependent default work directory
pub fn default_work_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|d| d.join("stemsplit"))
        .unwrap_or_else(|| std::env::temp_dir().join("stemsplit"))
}
