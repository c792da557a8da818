use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use chrono::Utc;
use log::debug;
use tokio::sync::{Mutex, RwLock};

use crate::error::StoreError;
use crate::format::OutputFormat;
use crate::job::{Job, JobId, JobUpdate};

/// In-memory job store.
///
/// The map lock is held only to look up or insert an entry; every job has
/// its own mutex, so transitions on one job serialize without blocking
/// readers or writers of other jobs.
#[derive(Debug, Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<JobId, Arc<Mutex<Job>>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new queued job and return its identifier
    pub async fn create(&self, input: PathBuf, output_format: OutputFormat, quality: &str) -> JobId {
        let mut jobs = self.jobs.write().await;
        let mut id = JobId::new();
        while jobs.contains_key(&id) {
            id = JobId::new();
        }
        let job = Job::new(id, input, output_format, quality);
        jobs.insert(id, Arc::new(Mutex::new(job)));
        debug!("Job {}: created", id);
        id
    }

    async fn entry(&self, id: JobId) -> Result<Arc<Mutex<Job>>, StoreError> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    /// Snapshot of a job
    pub async fn get(&self, id: JobId) -> Result<Job, StoreError> {
        let entry = self.entry(id).await?;
        let job = entry.lock().await;
        Ok(job.clone())
    }

    /// Atomically apply an update and return the resulting snapshot
    pub async fn transition(&self, id: JobId, update: JobUpdate) -> Result<Job, StoreError> {
        let entry = self.entry(id).await?;
        let mut job = entry.lock().await;
        job.apply(update)?;
        Ok(job.clone())
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Forget jobs created more than `max_age` ago, whatever their state.
    /// Returns the number of jobs removed.
    pub async fn purge_older_than(&self, max_age: Duration) -> usize {
        let cutoff = match chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
        {
            Some(cutoff) => cutoff,
            None => return 0,
        };

        let mut jobs = self.jobs.write().await;
        let mut expired = Vec::new();
        for (id, entry) in jobs.iter() {
            if entry.lock().await.created_at < cutoff {
                expired.push(*id);
            }
        }
        for id in &expired {
            jobs.remove(id);
        }
        expired.len()
    }
}
