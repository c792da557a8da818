use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::progress::SyntheticProgress;

/// Configuration for the conversion engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    /// Directory where validated uploads are stored
    pub upload_dir: PathBuf,
    /// Directory where converted outputs are written
    pub converted_dir: PathBuf,
    /// Path to ffmpeg binary
    pub ffmpeg_bin: PathBuf,
    /// Path to ffprobe binary
    pub ffprobe_bin: PathBuf,
    /// Maximum number of jobs running at the same time
    pub worker_pool_size: usize,
    /// Capacity of the dispatch queue (submissions wait when it is full)
    pub queue_capacity: usize,
    /// Maximum accepted upload size in bytes
    pub max_file_size: u64,
    /// Files and jobs older than this are removed by the retention sweep
    pub retention_max_age_secs: u64,
    /// Optional deadline for a single engine invocation
    pub engine_timeout_secs: Option<u64>,
    /// Number of synthetic progress updates when the engine reports none
    pub synthetic_progress_ticks: u32,
    /// Pause between synthetic progress updates, in milliseconds
    pub synthetic_progress_interval_ms: u64,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

impl ConverterConfig {
    /// Create a default configuration with sensible values
    pub fn default_config() -> Self {
        Self {
            upload_dir: PathBuf::from("static/uploads"),
            converted_dir: PathBuf::from("static/converted"),
            ffmpeg_bin: PathBuf::from("ffmpeg"),
            ffprobe_bin: PathBuf::from("ffprobe"),
            worker_pool_size: 2,
            queue_capacity: 256,
            max_file_size: 100 * 1024 * 1024, // 100 MiB
            retention_max_age_secs: 24 * 60 * 60,
            engine_timeout_secs: None,
            synthetic_progress_ticks: 100,
            synthetic_progress_interval_ms: 100,
        }
    }

    /// Load configuration from a file, or return defaults if path is None or file doesn't exist
    pub fn load_config(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default_config();

        if let Some(config_path) = path {
            if config_path.exists() {
                let content = std::fs::read_to_string(config_path)
                    .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

                // TOML by extension, JSON otherwise
                if config_path.extension().and_then(|s| s.to_str()) == Some("toml") {
                    config = toml::from_str(&content)
                        .with_context(|| format!("Failed to parse TOML config: {}", config_path.display()))?;
                } else {
                    config = serde_json::from_str(&content)
                        .with_context(|| format!("Failed to parse JSON config: {}", config_path.display()))?;
                }
            }
        }

        Ok(config)
    }

    /// Create the upload and output directories if they are missing
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.upload_dir, &self.converted_dir] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }
        Ok(())
    }

    pub fn pool_size(&self) -> usize {
        self.worker_pool_size.max(1)
    }

    pub fn retention_max_age(&self) -> Duration {
        Duration::from_secs(self.retention_max_age_secs)
    }

    pub fn engine_timeout(&self) -> Option<Duration> {
        self.engine_timeout_secs.map(Duration::from_secs)
    }

    /// Synthetic progress schedule, or None when disabled (zero ticks)
    pub fn synthetic_progress(&self) -> Option<SyntheticProgress> {
        if self.synthetic_progress_ticks == 0 {
            return None;
        }
        Some(SyntheticProgress::new(
            self.synthetic_progress_ticks,
            Duration::from_millis(self.synthetic_progress_interval_ms),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let cfg = ConverterConfig::load_config(Some(Path::new("/nonexistent/vconv.toml"))).unwrap();
        assert_eq!(cfg.worker_pool_size, 2);
        assert_eq!(cfg.max_file_size, 100 * 1024 * 1024);
        assert_eq!(cfg.retention_max_age(), Duration::from_secs(86_400));
        assert!(cfg.engine_timeout().is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vconv.toml");
        std::fs::write(&path, "worker_pool_size = 4\nengine_timeout_secs = 30\n").unwrap();

        let cfg = ConverterConfig::load_config(Some(&path)).unwrap();
        assert_eq!(cfg.worker_pool_size, 4);
        assert_eq!(cfg.engine_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(cfg.ffmpeg_bin, PathBuf::from("ffmpeg"));
    }

    #[test]
    fn test_json_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vconv.json");
        std::fs::write(&path, r#"{"converted_dir": "/srv/out", "synthetic_progress_ticks": 0}"#).unwrap();

        let cfg = ConverterConfig::load_config(Some(&path)).unwrap();
        assert_eq!(cfg.converted_dir, PathBuf::from("/srv/out"));
        assert!(cfg.synthetic_progress().is_none());
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vconv.toml");
        std::fs::write(&path, "worker_pool_size = \"many\"").unwrap();
        assert!(ConverterConfig::load_config(Some(&path)).is_err());
    }

    #[test]
    fn test_zero_pool_size_is_clamped() {
        let cfg = ConverterConfig { worker_pool_size: 0, ..Default::default() };
        assert_eq!(cfg.pool_size(), 1);
    }
}
