use std::path::PathBuf;
use humansize::{format_size, BINARY};
use thiserror::Error;

use crate::job::{JobId, JobState};

/// Longest diagnostic stored on a failed job
pub const MAX_ERROR_DETAIL_CHARS: usize = 300;

/// Rejected at the boundary, before any job exists
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("unsupported input format {extension:?}, supported: {supported}")]
    UnsupportedInputFormat { extension: String, supported: String },

    #[error("unsupported output format: {0}")]
    UnsupportedOutputFormat(String),

    #[error("file is {} which exceeds the {} limit", human_size(.size), human_size(.max))]
    FileTooLarge { size: u64, max: u64 },

    #[error("upload not found: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("failed to store upload {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("job {id}: cannot apply {update} while {from}")]
    InvalidTransition {
        id: JobId,
        from: JobState,
        update: &'static str,
    },
}

/// Failure of the external media engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with code {code}: {stderr_tail}")]
    Exit {
        program: String,
        code: i32,
        stderr_tail: String,
    },

    #[error("{program} timed out after {secs} seconds")]
    Timeout { program: String, secs: u64 },

    #[error("could not read probe output: {0}")]
    Probe(String),

    #[error("engine i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a job ended in `Failed`
#[derive(Debug, Error)]
pub enum JobFailure {
    #[error("no video stream found in source")]
    NoMediaStream,

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("engine reported success but produced no output at {}", .0.display())]
    MissingOutput(PathBuf),

    #[error("internal worker error")]
    WorkerPanicked,
}

impl JobFailure {
    /// Short diagnostic suitable for external callers
    pub fn detail(&self) -> String {
        bounded_detail(&self.to_string())
    }
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("dispatcher is shut down")]
    QueueClosed,
}

fn human_size(bytes: &u64) -> String {
    format_size(*bytes, BINARY)
}

/// Truncate a diagnostic to `MAX_ERROR_DETAIL_CHARS`, keeping char boundaries
pub fn bounded_detail(message: &str) -> String {
    let message = message.trim();
    if message.chars().count() <= MAX_ERROR_DETAIL_CHARS {
        return message.to_string();
    }
    let mut out: String = message.chars().take(MAX_ERROR_DETAIL_CHARS - 1).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_detail_keeps_short_messages() {
        assert_eq!(bounded_detail("  boom \n"), "boom");
    }

    #[test]
    fn test_bounded_detail_truncates_on_char_boundary() {
        let long = "é".repeat(MAX_ERROR_DETAIL_CHARS * 2);
        let out = bounded_detail(&long);
        assert_eq!(out.chars().count(), MAX_ERROR_DETAIL_CHARS);
        assert!(out.ends_with('…'));
    }

    #[test]
    fn test_file_too_large_message_is_human_readable() {
        let err = ValidationError::FileTooLarge { size: 150 * 1024 * 1024, max: 100 * 1024 * 1024 };
        let msg = err.to_string();
        assert!(msg.contains("MiB"), "{}", msg);
    }

    #[test]
    fn test_engine_failure_detail() {
        let failure = JobFailure::from(EngineError::Exit {
            program: "ffmpeg".to_string(),
            code: 1,
            stderr_tail: "Invalid data found when processing input".to_string(),
        });
        assert_eq!(
            failure.detail(),
            "ffmpeg exited with code 1: Invalid data found when processing input"
        );
    }
}
