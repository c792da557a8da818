pub mod config;
pub mod error;
pub mod format;
pub mod preset;
pub mod job;
pub mod store;
pub mod progress;
pub mod engine;
pub mod ffprobe;
pub mod ffmpeg;
pub mod worker;
pub mod dispatcher;
pub mod status;
pub mod upload;
pub mod retention;

#[cfg(test)]
mod testing;

pub use config::ConverterConfig;
pub use dispatcher::Dispatcher;
pub use engine::{MediaEngine, MediaInfo, TranscodeRequest};
pub use error::{EngineError, JobFailure, StoreError, SubmitError, ValidationError};
pub use ffmpeg::FfmpegEngine;
pub use format::OutputFormat;
pub use job::{Job, JobId, JobState};
pub use status::{JobStatusView, StatusQuery};
pub use store::JobStore;
