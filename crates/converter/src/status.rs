use std::path::PathBuf;
use std::sync::Arc;
use serde::Serialize;

use crate::error::StoreError;
use crate::job::{Job, JobId, JobState};
use crate::store::JobStore;

/// What a polling client sees of a job.
///
/// Succeeded and failed jobs share this shape and differ only in which of
/// `output_reference` / `error_detail` is populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobStatusView {
    pub id: JobId,
    pub state: JobState,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_reference: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl From<&Job> for JobStatusView {
    fn from(job: &Job) -> Self {
        let download_name = job
            .output
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned());
        Self {
            id: job.id,
            state: job.state,
            progress: job.progress,
            output_reference: job.output.clone(),
            download_name,
            error_detail: job.error.clone(),
        }
    }
}

/// Read-only view over the job store
#[derive(Debug, Clone)]
pub struct StatusQuery {
    store: Arc<JobStore>,
}

impl StatusQuery {
    pub fn new(store: Arc<JobStore>) -> Self {
        Self { store }
    }

    pub async fn status(&self, id: JobId) -> Result<JobStatusView, StoreError> {
        let job = self.store.get(id).await?;
        Ok(JobStatusView::from(&job))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::OutputFormat;
    use crate::job::JobUpdate;

    async fn query_with_job() -> (StatusQuery, Arc<JobStore>, JobId) {
        let store = Arc::new(JobStore::new());
        let id = store
            .create(PathBuf::from("/uploads/x.mp4"), OutputFormat::Webm, "low")
            .await;
        (StatusQuery::new(store.clone()), store, id)
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let (query, _store, _id) = query_with_job().await;
        let missing = JobId::new();
        assert_eq!(query.status(missing).await, Err(StoreError::NotFound(missing)));
    }

    #[tokio::test]
    async fn test_status_is_idempotent() {
        let (query, store, id) = query_with_job().await;
        store.transition(id, JobUpdate::Start).await.unwrap();
        store.transition(id, JobUpdate::Progress(42)).await.unwrap();

        let first = query.status(id).await.unwrap();
        let second = query.status(id).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.state, JobState::Running);
        assert_eq!(first.progress, 42);
        assert_eq!(store.get(id).await.unwrap().progress, 42);
    }

    #[tokio::test]
    async fn test_succeeded_projection() {
        let (query, store, id) = query_with_job().await;
        store.transition(id, JobUpdate::Start).await.unwrap();
        store
            .transition(id, JobUpdate::Succeed { output: PathBuf::from("/converted/x_converted.webm") })
            .await
            .unwrap();

        let view = query.status(id).await.unwrap();
        assert_eq!(view.progress, 100);
        assert_eq!(view.download_name.as_deref(), Some("x_converted.webm"));
        assert!(view.error_detail.is_none());

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["state"], "succeeded");
        assert!(json.get("error_detail").is_none());
    }

    #[tokio::test]
    async fn test_failed_projection() {
        let (query, store, id) = query_with_job().await;
        store
            .transition(id, JobUpdate::Fail { detail: "no video stream found in source".into() })
            .await
            .unwrap();

        let view = query.status(id).await.unwrap();
        assert_eq!(view.state, JobState::Failed);
        assert!(view.output_reference.is_none());
        assert!(view.download_name.is_none());
        assert_eq!(view.error_detail.as_deref(), Some("no video stream found in source"));
    }
}
