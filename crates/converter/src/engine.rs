use std::path::{Path, PathBuf};
use async_trait::async_trait;

use crate::error::EngineError;
use crate::format::OutputFormat;
use crate::preset::QualityPreset;
use crate::progress::ProgressReporter;

/// What the worker needs to know about a source before converting it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaInfo {
    pub has_video: bool,
    pub duration_secs: Option<f64>,
}

/// Parameters of one engine invocation
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub format: OutputFormat,
    pub preset: QualityPreset,
    pub overwrite: bool,
}

/// External media engine performing the actual codec work
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Inspect the source's streams
    async fn probe(&self, input: &Path) -> Result<MediaInfo, EngineError>;

    /// Whether `transcode` will report its own progress for this source.
    /// When false the worker runs a synthetic schedule alongside it.
    fn reports_progress(&self, info: &MediaInfo) -> bool;

    /// Run the conversion to completion, reporting progress as it goes
    async fn transcode(
        &self,
        request: &TranscodeRequest,
        info: &MediaInfo,
        progress: ProgressReporter,
    ) -> Result<(), EngineError>;
}
