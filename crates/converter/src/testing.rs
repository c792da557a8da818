//! Scriptable `MediaEngine` for exercising workers and the dispatcher.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use async_trait::async_trait;

use crate::engine::{MediaEngine, MediaInfo, TranscodeRequest};
use crate::error::EngineError;
use crate::progress::ProgressReporter;

#[derive(Debug)]
pub(crate) struct FakeEngine {
    pub has_video: bool,
    pub reports_progress: bool,
    /// Progress values reported, spread evenly over `delay`
    pub progress_ticks: Vec<u8>,
    pub delay: Duration,
    /// Non-zero exit code to fail with
    pub exit_code: Option<i32>,
    pub write_output: bool,
    /// Inputs whose file name contains this marker make `transcode` panic
    pub panic_marker: Option<&'static str>,
    pub probe_calls: AtomicUsize,
    pub transcode_calls: AtomicUsize,
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub requests: Mutex<Vec<TranscodeRequest>>,
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self {
            has_video: true,
            reports_progress: true,
            progress_ticks: vec![25, 50, 75],
            delay: Duration::ZERO,
            exit_code: None,
            write_output: true,
            panic_marker: None,
            probe_calls: AtomicUsize::new(0),
            transcode_calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl FakeEngine {
    pub fn requests(&self) -> Vec<TranscodeRequest> {
        self.requests.lock().unwrap().clone()
    }
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl MediaEngine for FakeEngine {
    async fn probe(&self, _input: &Path) -> Result<MediaInfo, EngineError> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        Ok(MediaInfo {
            has_video: self.has_video,
            duration_secs: Some(10.0),
        })
    }

    fn reports_progress(&self, _info: &MediaInfo) -> bool {
        self.reports_progress
    }

    async fn transcode(
        &self,
        request: &TranscodeRequest,
        _info: &MediaInfo,
        progress: ProgressReporter,
    ) -> Result<(), EngineError> {
        self.transcode_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        let _guard = ActiveGuard(&self.active);

        let step = self.delay / (self.progress_ticks.len() as u32 + 1);
        for pct in &self.progress_ticks {
            tokio::time::sleep(step).await;
            progress.report(*pct).await;
        }
        tokio::time::sleep(step).await;

        let name = request.input.to_string_lossy();
        if let Some(marker) = self.panic_marker {
            if name.contains(marker) {
                panic!("fake engine panicked on {}", name);
            }
        }

        if let Some(code) = self.exit_code {
            return Err(EngineError::Exit {
                program: "fake-ffmpeg".to_string(),
                code,
                stderr_tail: "conversion failed".to_string(),
            });
        }

        if self.write_output {
            if let Some(parent) = request.output.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&request.output, b"converted").await?;
        }
        Ok(())
    }
}
