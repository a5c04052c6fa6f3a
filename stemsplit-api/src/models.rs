//! Domain types shared by the services and API layers

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Upload extensions accepted by `/separate`
pub const ALLOWED_EXTENSIONS: [&str; 5] = ["mp3", "wav", "flac", "m4a", "ogg"];

/// One separated instrument track
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stem {
    Bass,
    Drums,
    Vocals,
    Other,
}

impl Stem {
    /// Canonical archive order
    pub const ALL: [Stem; 4] = [Stem::Bass, Stem::Drums, Stem::Vocals, Stem::Other];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stem::Bass => "bass",
            Stem::Drums => "drums",
            Stem::Vocals => "vocals",
            Stem::Other => "other",
        }
    }

    /// Match a separator output file stem (`vocals` in `vocals.mp3`)
    pub fn from_file_stem(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|stem| stem.as_str() == name)
    }
}

impl fmt::Display for Stem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encoded format of a separator run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Mp3,
    Wav,
}

impl OutputFormat {
    /// Run order; MP3 first
    pub const ALL: [OutputFormat; 2] = [OutputFormat::Mp3, OutputFormat::Wav];

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Mp3 => "mp3",
            OutputFormat::Wav => "wav",
        }
    }

    /// Upper-case label used in user-facing messages
    pub fn label(&self) -> &'static str {
        match self {
            OutputFormat::Mp3 => "MP3",
            OutputFormat::Wav => "WAV",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// A single stem file in the canonical output directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StemFile {
    pub stem: Stem,
    pub format: OutputFormat,
    pub path: PathBuf,
}

impl StemFile {
    /// Entry name inside the archive (`bass.mp3`)
    pub fn archive_name(&self) -> String {
        format!("{}.{}", self.stem, self.format.extension())
    }
}

/// Complete, merged separation result for one track
#[derive(Debug, Clone)]
pub struct StemSet {
    /// Track name the separator used as its directory name
    pub track: String,
    /// Canonical directory holding every stem file
    pub dir: PathBuf,
    /// Ordered by stem, MP3 before WAV
    pub files: Vec<StemFile>,
}

impl StemSet {
    pub fn count(&self, format: OutputFormat) -> usize {
        self.files.iter().filter(|f| f.format == format).count()
    }
}
