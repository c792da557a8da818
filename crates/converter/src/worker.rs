use std::path::PathBuf;
use std::sync::Arc;
use log::{debug, error, info, warn};

use crate::engine::{MediaEngine, MediaInfo, TranscodeRequest};
use crate::error::JobFailure;
use crate::format::{output_file_name, OutputFormat};
use crate::job::{JobId, JobUpdate};
use crate::preset;
use crate::progress::{ProgressReporter, SyntheticProgress};
use crate::store::JobStore;

/// Buffer between an engine run and the store writer
const PROGRESS_BUFFER: usize = 32;

/// Descriptor handed from the dispatcher to a worker
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedJob {
    pub id: JobId,
    pub input: PathBuf,
    pub output_format: OutputFormat,
    pub quality: String,
}

/// Executes single jobs against the media engine.
///
/// A worker is the only writer of the jobs it runs.
#[derive(Clone)]
pub struct Worker {
    store: Arc<JobStore>,
    engine: Arc<dyn MediaEngine>,
    converted_dir: PathBuf,
    synthetic: Option<SyntheticProgress>,
}

impl Worker {
    pub fn new(
        store: Arc<JobStore>,
        engine: Arc<dyn MediaEngine>,
        converted_dir: PathBuf,
        synthetic: Option<SyntheticProgress>,
    ) -> Self {
        Self {
            store,
            engine,
            converted_dir,
            synthetic,
        }
    }

    /// Run one job to a terminal state. Never returns an error: every
    /// failure ends up on the job itself.
    pub async fn execute(&self, job: QueuedJob) {
        let id = job.id;

        // Pre-flight: the engine is never invoked for sources without video
        let info = match self.preflight(&job).await {
            Ok(info) => info,
            Err(failure) => return self.finish(id, Err(failure)).await,
        };

        if let Err(e) = self.store.transition(id, JobUpdate::Start).await {
            // Only the owner of a queued job may start it
            warn!("Job {}: not started: {}", id, e);
            return;
        }
        info!("Job {}: running {} -> {}", id, job.input.display(), job.output_format);

        let result = self.convert(&job, &info).await;
        self.finish(id, result).await;
    }

    /// Mark a job failed after its execution task panicked
    pub async fn record_panic(&self, id: JobId) {
        self.finish(id, Err(JobFailure::WorkerPanicked)).await;
    }

    async fn preflight(&self, job: &QueuedJob) -> Result<MediaInfo, JobFailure> {
        let info = self.engine.probe(&job.input).await?;
        if !info.has_video {
            return Err(JobFailure::NoMediaStream);
        }
        Ok(info)
    }

    async fn convert(&self, job: &QueuedJob, info: &MediaInfo) -> Result<PathBuf, JobFailure> {
        let input_name = job
            .input
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("output");
        let output = self
            .converted_dir
            .join(output_file_name(input_name, job.output_format));

        let request = TranscodeRequest {
            input: job.input.clone(),
            output: output.clone(),
            format: job.output_format,
            preset: preset::resolve(&job.quality),
            overwrite: true,
        };

        self.drive_engine(job.id, &request, info).await?;

        if !output.is_file() {
            return Err(JobFailure::MissingOutput(output));
        }
        Ok(output)
    }

    async fn finish(&self, id: JobId, result: Result<PathBuf, JobFailure>) {
        let update = match result {
            Ok(output) => {
                info!("✅ Job {} completed: {}", id, output.display());
                JobUpdate::Succeed { output }
            }
            Err(failure) => {
                warn!("❌ Job {} failed: {}", id, failure);
                JobUpdate::Fail {
                    detail: failure.detail(),
                }
            }
        };

        if let Err(e) = self.store.transition(id, update).await {
            error!("Job {}: could not record terminal state: {}", id, e);
        }
    }

    /// Run the engine while forwarding its progress into the store
    async fn drive_engine(
        &self,
        id: JobId,
        request: &TranscodeRequest,
        info: &MediaInfo,
    ) -> Result<(), JobFailure> {
        let (reporter, mut ticks) = ProgressReporter::channel(PROGRESS_BUFFER);
        let synthetic = if self.engine.reports_progress(info) {
            None
        } else {
            self.synthetic
        };
        let engine = self.engine.as_ref();

        let drive = async move {
            let engine_fut = engine.transcode(request, info, reporter.clone());
            tokio::pin!(engine_fut);
            match synthetic {
                Some(schedule) => {
                    debug!("Job {}: engine has no progress signal, using synthetic schedule", id);
                    let finished = tokio::select! {
                        result = &mut engine_fut => Some(result),
                        () = schedule.drive(reporter) => None,
                    };
                    match finished {
                        Some(result) => result,
                        None => engine_fut.await,
                    }
                }
                None => {
                    drop(reporter);
                    engine_fut.await
                }
            }
        };

        let forward = async {
            while let Some(percent) = ticks.recv().await {
                if let Err(e) = self.store.transition(id, JobUpdate::Progress(percent)).await {
                    warn!("Job {}: dropping progress update: {}", id, e);
                }
            }
        };

        let (result, ()) = tokio::join!(drive, forward);
        result.map_err(JobFailure::from)
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("converted_dir", &self.converted_dir)
            .field("synthetic", &self.synthetic)
            .finish()
    }
}
