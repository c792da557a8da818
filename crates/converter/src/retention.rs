use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use log::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::store::JobStore;

/// Outcome of one retention sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub files_checked: usize,
    pub files_removed: usize,
    pub bytes_removed: u64,
    pub jobs_removed: usize,
}

/// Sweep artifact directories on a blocking thread, then forget expired jobs
pub async fn run_retention(dirs: Vec<PathBuf>, store: &JobStore, max_age: Duration) -> SweepReport {
    let mut report = match tokio::task::spawn_blocking(move || sweep_directories(&dirs, max_age)).await {
        Ok(report) => report,
        Err(e) => {
            error!("Retention sweep aborted: {}", e);
            SweepReport::default()
        }
    };

    report.jobs_removed = store.purge_older_than(max_age).await;
    if report.jobs_removed > 0 {
        info!("Retention forgot {} expired job(s)", report.jobs_removed);
    }
    report
}

/// Delete regular files directly inside `dirs` whose mtime is older than `max_age`.
///
/// Runs regardless of job state, so a finished job's artifact may disappear
/// while the job is still queryable.
pub fn sweep_directories(dirs: &[PathBuf], max_age: Duration) -> SweepReport {
    let mut report = SweepReport::default();
    let now = SystemTime::now();

    for dir in dirs {
        if !dir.exists() {
            debug!("Retention: directory does not exist: {}", dir.display());
            continue;
        }

        let walker = WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(false);
        for entry in walker.into_iter() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("Error reading directory entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }
            report.files_checked += 1;

            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    warn!("Failed to stat {}: {}", entry.path().display(), e);
                    continue;
                }
            };
            let age = metadata
                .modified()
                .ok()
                .and_then(|mtime| now.duration_since(mtime).ok())
                .unwrap_or_default();
            if age <= max_age {
                continue;
            }

            match std::fs::remove_file(entry.path()) {
                Ok(()) => {
                    debug!("Retention: removed {}", entry.path().display());
                    report.files_removed += 1;
                    report.bytes_removed += metadata.len();
                }
                Err(e) => warn!("Failed to remove {}: {}", entry.path().display(), e),
            }
        }
    }

    if report.files_removed > 0 {
        info!(
            "🗑️  Retention sweep removed {} of {} file(s)",
            report.files_removed, report.files_checked
        );
    }
    report
}
