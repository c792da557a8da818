use std::fmt;
use std::path::Path;
use std::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Upload extensions accepted by the converter
pub const SUPPORTED_INPUT_FORMATS: &[&str] = &[".mp4", ".avi", ".mov", ".mkv", ".wmv", ".flv"];

/// Target container of a conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Mp4,
    Avi,
    Mov,
    Webm,
    Mkv,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 5] = [
        OutputFormat::Mp4,
        OutputFormat::Avi,
        OutputFormat::Mov,
        OutputFormat::Webm,
        OutputFormat::Mkv,
    ];

    /// File extension (without the dot)
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "mp4",
            OutputFormat::Avi => "avi",
            OutputFormat::Mov => "mov",
            OutputFormat::Webm => "webm",
            OutputFormat::Mkv => "mkv",
        }
    }

    /// Muxer name passed to ffmpeg `-f`
    pub fn muxer(&self) -> &'static str {
        match self {
            OutputFormat::Mkv => "matroska",
            other => other.extension(),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().trim_start_matches('.').to_lowercase();
        OutputFormat::ALL
            .into_iter()
            .find(|f| f.extension() == wanted)
            .ok_or_else(|| ValidationError::UnsupportedOutputFormat(s.to_string()))
    }
}

/// Lower-cased extension of a file name including the leading dot
pub fn dotted_extension(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|s| s.to_str())
        .map(|ext| format!(".{}", ext.to_lowercase()))
}

/// Check a file name against the input allowlist
pub fn allowed_file(file_name: &str) -> bool {
    dotted_extension(file_name)
        .map(|ext| SUPPORTED_INPUT_FORMATS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Name of the converted artifact: `{stem}_converted.{ext}`
pub fn output_file_name(input_file_name: &str, format: OutputFormat) -> String {
    let stem = Path::new(input_file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    format!("{}_converted.{}", stem, format.extension())
}
