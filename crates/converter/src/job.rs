use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;
use crate::format::OutputFormat;

/// Opaque job identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        JobId(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(JobId)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A state transition or field update applied through the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobUpdate {
    /// Queued -> Running
    Start,
    /// Running -> Running with a new progress percentage
    Progress(u8),
    /// Running -> Succeeded
    Succeed { output: PathBuf },
    /// Queued | Running -> Failed
    Fail { detail: String },
}

impl JobUpdate {
    pub fn name(&self) -> &'static str {
        match self {
            JobUpdate::Start => "start",
            JobUpdate::Progress(_) => "progress",
            JobUpdate::Succeed { .. } => "succeed",
            JobUpdate::Fail { .. } => "fail",
        }
    }
}

/// One accepted conversion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub state: JobState,
    pub progress: u8,
    pub input: PathBuf,
    pub output_format: OutputFormat,
    pub quality: String,
    pub output: Option<PathBuf>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new queued job
    pub fn new(id: JobId, input: PathBuf, output_format: OutputFormat, quality: impl Into<String>) -> Self {
        Self {
            id,
            state: JobState::Queued,
            progress: 0,
            input,
            output_format,
            quality: quality.into(),
            output: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Apply an update, enforcing the state machine.
    ///
    /// Progress is clamped below 100 and never moves backwards; a lower
    /// value than the current one is accepted and ignored.
    pub fn apply(&mut self, update: JobUpdate) -> Result<(), StoreError> {
        match (self.state, update) {
            (JobState::Queued, JobUpdate::Start) => {
                self.state = JobState::Running;
                self.started_at = Some(Utc::now());
            }
            (JobState::Running, JobUpdate::Progress(pct)) => {
                self.progress = self.progress.max(pct.min(99));
            }
            (JobState::Running, JobUpdate::Succeed { output }) => {
                self.state = JobState::Succeeded;
                self.progress = 100;
                self.output = Some(output);
                self.finished_at = Some(Utc::now());
            }
            (JobState::Queued | JobState::Running, JobUpdate::Fail { detail }) => {
                self.state = JobState::Failed;
                self.error = Some(detail);
                self.finished_at = Some(Utc::now());
            }
            (from, update) => {
                return Err(StoreError::InvalidTransition {
                    id: self.id,
                    from,
                    update: update.name(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn queued_job() -> Job {
        Job::new(JobId::new(), PathBuf::from("/uploads/a.mp4"), OutputFormat::Webm, "low")
    }

    #[test]
    fn test_happy_path() {
        let mut job = queued_job();
        assert_eq!(job.state, JobState::Queued);
        assert_eq!(job.progress, 0);

        job.apply(JobUpdate::Start).unwrap();
        assert_eq!(job.state, JobState::Running);
        assert!(job.started_at.is_some());

        job.apply(JobUpdate::Progress(40)).unwrap();
        assert_eq!(job.progress, 40);

        job.apply(JobUpdate::Succeed { output: PathBuf::from("/out/a_converted.webm") }).unwrap();
        assert_eq!(job.state, JobState::Succeeded);
        assert_eq!(job.progress, 100);
        assert!(job.output.is_some());
        assert!(job.error.is_none());
    }

    #[test]
    fn test_fail_from_queued_and_running() {
        let mut job = queued_job();
        job.apply(JobUpdate::Fail { detail: "no video".into() }).unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.error.as_deref(), Some("no video"));
        assert!(job.output.is_none());

        let mut job = queued_job();
        job.apply(JobUpdate::Start).unwrap();
        job.apply(JobUpdate::Progress(10)).unwrap();
        job.apply(JobUpdate::Fail { detail: "exit 1".into() }).unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.progress, 10);
    }

    #[test]
    fn test_progress_never_reaches_100_while_running() {
        let mut job = queued_job();
        job.apply(JobUpdate::Start).unwrap();
        job.apply(JobUpdate::Progress(100)).unwrap();
        assert_eq!(job.progress, 99);
        assert_eq!(job.state, JobState::Running);
    }

    #[test]
    fn test_progress_regression_is_ignored() {
        let mut job = queued_job();
        job.apply(JobUpdate::Start).unwrap();
        job.apply(JobUpdate::Progress(50)).unwrap();
        job.apply(JobUpdate::Progress(20)).unwrap();
        assert_eq!(job.progress, 50);
    }

    #[test]
    fn test_invalid_transitions() {
        let mut job = queued_job();
        assert!(matches!(
            job.apply(JobUpdate::Progress(5)),
            Err(StoreError::InvalidTransition { from: JobState::Queued, update: "progress", .. })
        ));
        assert!(job.apply(JobUpdate::Succeed { output: PathBuf::from("x") }).is_err());

        job.apply(JobUpdate::Start).unwrap();
        assert!(job.apply(JobUpdate::Start).is_err());
    }

    #[test]
    fn test_job_id_round_trips_through_display() {
        let id = JobId::new();
        assert_eq!(id.to_string().parse::<JobId>().unwrap(), id);
        assert!("not-a-job".parse::<JobId>().is_err());
    }

    fn any_update() -> impl Strategy<Value = JobUpdate> {
        prop_oneof![
            Just(JobUpdate::Start),
            (0u8..=120).prop_map(JobUpdate::Progress),
            Just(JobUpdate::Succeed { output: PathBuf::from("/out/x_converted.mp4") }),
            Just(JobUpdate::Fail { detail: "boom".to_string() }),
        ]
    }

    proptest! {
        /// Whatever sequence of updates is attempted, progress never decreases,
        /// terminal states absorb, and exactly one of output/error is set once terminal.
        #[test]
        fn test_state_machine_invariants(updates in prop::collection::vec(any_update(), 0..40)) {
            let mut job = queued_job();
            let mut last_progress = job.progress;
            let mut terminal_snapshot: Option<Job> = None;

            for update in updates {
                let result = job.apply(update);

                if let Some(ref snapshot) = terminal_snapshot {
                    prop_assert!(result.is_err());
                    prop_assert_eq!(&job, snapshot);
                }

                prop_assert!(job.progress >= last_progress);
                last_progress = job.progress;

                prop_assert_eq!(job.progress == 100, job.state == JobState::Succeeded);

                if job.state.is_terminal() {
                    prop_assert!(job.output.is_some() != job.error.is_some());
                    prop_assert_eq!(job.output.is_some(), job.state == JobState::Succeeded);
                    terminal_snapshot.get_or_insert_with(|| job.clone());
                } else {
                    prop_assert!(job.output.is_none() && job.error.is_none());
                }
            }
        }
    }
}
