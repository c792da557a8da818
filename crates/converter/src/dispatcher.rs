use std::path::PathBuf;
use std::sync::Arc;
use log::{debug, error, info};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::config::ConverterConfig;
use crate::engine::MediaEngine;
use crate::error::{SubmitError, ValidationError};
use crate::format::{allowed_file, dotted_extension, OutputFormat, SUPPORTED_INPUT_FORMATS};
use crate::job::{JobId, JobUpdate};
use crate::store::JobStore;
use crate::worker::{QueuedJob, Worker};

/// Accepts conversion requests and feeds them to a fixed pool of workers.
///
/// Jobs are queued in arrival order on a bounded channel. Each worker loop
/// takes one job at a time, so at most `pool_size` jobs are running and
/// every job id is delivered to exactly one worker.
pub struct Dispatcher {
    store: Arc<JobStore>,
    queue: mpsc::Sender<QueuedJob>,
    workers: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    /// Spawn the worker pool. Must be called inside a tokio runtime.
    pub fn start(store: Arc<JobStore>, engine: Arc<dyn MediaEngine>, config: &ConverterConfig) -> Self {
        let pool_size = config.pool_size();
        let (queue, rx) = mpsc::channel(config.queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));

        let worker = Worker::new(
            store.clone(),
            engine,
            config.converted_dir.clone(),
            config.synthetic_progress(),
        );

        let workers = (0..pool_size)
            .map(|slot| tokio::spawn(worker_loop(slot, worker.clone(), rx.clone())))
            .collect();

        info!("Dispatcher started with {} worker(s)", pool_size);
        Self { store, queue, workers }
    }

    /// Create a queued job and hand it to the pool.
    ///
    /// Returns as soon as the job is queued; waits only while the queue is full.
    pub async fn submit(
        &self,
        input: PathBuf,
        output_format: OutputFormat,
        quality: &str,
    ) -> Result<JobId, SubmitError> {
        let name = input
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        if !allowed_file(name) {
            return Err(ValidationError::UnsupportedInputFormat {
                extension: dotted_extension(name).unwrap_or_default(),
                supported: SUPPORTED_INPUT_FORMATS.join(", "),
            }
            .into());
        }
        if self.queue.is_closed() {
            return Err(SubmitError::QueueClosed);
        }

        let id = self.store.create(input.clone(), output_format, quality).await;
        let job = QueuedJob {
            id,
            input,
            output_format,
            quality: quality.to_string(),
        };

        if self.queue.send(job).await.is_err() {
            let detail = SubmitError::QueueClosed.to_string();
            if let Err(e) = self.store.transition(id, JobUpdate::Fail { detail }).await {
                error!("Job {}: could not record rejection: {}", id, e);
            }
            return Err(SubmitError::QueueClosed);
        }

        info!("Job {} queued: {}", id, output_format);
        Ok(id)
    }

    /// Stop accepting jobs and wait for queued and running ones to finish
    pub async fn shutdown(self) {
        let Dispatcher { queue, workers, .. } = self;
        drop(queue);
        for handle in workers {
            if let Err(e) = handle.await {
                error!("Worker loop ended abnormally: {}", e);
            }
        }
        info!("Dispatcher stopped");
    }
}

async fn worker_loop(slot: usize, worker: Worker, rx: Arc<Mutex<mpsc::Receiver<QueuedJob>>>) {
    loop {
        // Hold the receiver lock only while waiting for the next job
        let next = rx.lock().await.recv().await;
        let Some(job) = next else {
            debug!("Worker {} exiting: queue closed", slot);
            return;
        };

        let id = job.id;
        debug!("Worker {} picked job {}", slot, id);

        // Isolate each job in its own task so a panic only fails that job
        let runner = worker.clone();
        let handle = tokio::spawn(async move { runner.execute(job).await });
        if let Err(e) = handle.await {
            error!("Worker {}: job {} aborted: {}", slot, id, e);
            worker.record_panic(id).await;
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("workers", &self.workers.len())
            .field("closed", &self.queue.is_closed())
            .finish()
    }
}
