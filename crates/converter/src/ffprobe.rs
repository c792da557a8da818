use std::path::Path;
use log::debug;
use serde::Deserialize;
use tokio::process::Command;

use crate::engine::MediaInfo;
use crate::error::EngineError;

/// Complete ffprobe output structure
#[derive(Debug, Clone, Deserialize)]
pub struct FFProbeData {
    #[serde(default)]
    pub streams: Vec<FFProbeStream>,
    pub format: Option<FFProbeFormat>,
}

/// Format-level metadata from ffprobe
#[derive(Debug, Clone, Deserialize)]
pub struct FFProbeFormat {
    pub duration: Option<String>,
}

/// Stream-level metadata from ffprobe
#[derive(Debug, Clone, Deserialize)]
pub struct FFProbeStream {
    pub codec_type: Option<String>,
    pub codec_name: Option<String>,
    pub duration: Option<String>,
}

impl FFProbeData {
    /// Parse the JSON printed by `ffprobe -print_format json`
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        serde_json::from_str(json).map_err(|e| EngineError::Probe(e.to_string()))
    }

    pub fn video_stream(&self) -> Option<&FFProbeStream> {
        self.streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("video"))
    }

    /// Container duration, falling back to the video stream's own duration
    pub fn duration_secs(&self) -> Option<f64> {
        let from_format = self
            .format
            .as_ref()
            .and_then(|f| f.duration.as_deref())
            .and_then(parse_duration);
        from_format.or_else(|| {
            self.video_stream()
                .and_then(|s| s.duration.as_deref())
                .and_then(parse_duration)
        })
    }

    pub fn media_info(&self) -> MediaInfo {
        MediaInfo {
            has_video: self.video_stream().is_some(),
            duration_secs: self.duration_secs(),
        }
    }
}

fn parse_duration(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|d| d.is_finite() && *d > 0.0)
}

/// Run ffprobe on a file and parse the JSON output
pub async fn probe_file(ffprobe_bin: &Path, file_path: &Path) -> Result<FFProbeData, EngineError> {
    let program = ffprobe_bin.display().to_string();

    // Verify file exists before trying to probe
    if !file_path.exists() {
        return Err(EngineError::Probe(format!(
            "file does not exist: {}",
            file_path.display()
        )));
    }

    debug!("Executing FFprobe for: {}", file_path.display());

    let output = Command::new(ffprobe_bin)
        .arg("-v")
        .arg("error")
        .arg("-print_format")
        .arg("json")
        .arg("-show_streams")
        .arg("-show_format")
        .arg(file_path)
        .output()
        .await
        .map_err(|source| EngineError::Spawn {
            program: program.clone(),
            source,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!("ffprobe stderr for {}: {}", file_path.display(), stderr);
        return Err(EngineError::Exit {
            program,
            code: output.status.code().unwrap_or(-1),
            stderr_tail: last_line(&stderr),
        });
    }

    let json_str = String::from_utf8(output.stdout)
        .map_err(|_| EngineError::Probe("ffprobe output is not valid UTF-8".to_string()))?;

    FFProbeData::from_json(&json_str)
}

/// Last non-empty line of a diagnostic stream
pub(crate) fn last_line(text: &str) -> String {
    text.lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("no diagnostic output")
        .to_string()
}
