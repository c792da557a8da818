//! Progress ticks flowing from an engine run to the job store.
//!
//! Two sources exist: the engine's own progress stream (authoritative when
//! available) and a synthetic, time-sliced schedule used when the engine
//! gives no signal. The synthetic schedule is an approximation only; it
//! says nothing about how far the engine actually got.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Highest percentage reported while a job is still running
pub const MAX_RUNNING_PROGRESS: u8 = 99;

/// Cloneable progress sink handed to an engine run.
///
/// Values are clamped to `MAX_RUNNING_PROGRESS` and only strictly
/// increasing values are forwarded, across all clones.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    tx: mpsc::Sender<u8>,
    last: Arc<AtomicU8>,
}

impl ProgressReporter {
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<u8>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (
            Self {
                tx,
                last: Arc::new(AtomicU8::new(0)),
            },
            rx,
        )
    }

    /// Report a percentage; returns false once the receiving side is gone
    pub async fn report(&self, percent: u8) -> bool {
        let percent = percent.min(MAX_RUNNING_PROGRESS);
        let previous = self.last.fetch_max(percent, Ordering::AcqRel);
        if percent <= previous {
            return !self.tx.is_closed();
        }
        self.tx.send(percent).await.is_ok()
    }
}

/// Finite, evenly spaced progress schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyntheticProgress {
    pub ticks: u32,
    pub interval: Duration,
}

impl SyntheticProgress {
    pub fn new(ticks: u32, interval: Duration) -> Self {
        Self { ticks: ticks.max(1), interval }
    }

    /// Percentages emitted by the schedule, in order
    pub fn values(&self) -> impl Iterator<Item = u8> {
        let ticks = self.ticks.max(1);
        (1..=ticks).map(move |i| (u64::from(i) * u64::from(MAX_RUNNING_PROGRESS) / u64::from(ticks)) as u8)
    }

    /// Emit every tick, pausing `interval` before each one.
    /// Returns early if the reporter's receiver is dropped.
    pub async fn drive(self, reporter: ProgressReporter) {
        for percent in self.values() {
            tokio::time::sleep(self.interval).await;
            if !reporter.report(percent).await {
                return;
            }
        }
    }
}

/// Line of ffmpeg's `-progress` key=value stream that we care about
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressLine {
    /// Output timestamp reached, in seconds
    OutTime(f64),
    /// `progress=end`
    End,
}

/// Parse one line of `-progress pipe:1` output
pub fn parse_progress_line(line: &str) -> Option<ProgressLine> {
    let (key, value) = line.trim().split_once('=')?;
    let value = value.trim();
    match key.trim() {
        // out_time_ms is microseconds despite the name
        "out_time_us" | "out_time_ms" => value
            .parse::<i64>()
            .ok()
            .filter(|us| *us >= 0)
            .map(|us| ProgressLine::OutTime(us as f64 / 1_000_000.0)),
        "out_time" => parse_timestamp(value).map(ProgressLine::OutTime),
        "progress" if value == "end" => Some(ProgressLine::End),
        _ => None,
    }
}

/// Parse `HH:MM:SS.micro` into seconds
fn parse_timestamp(value: &str) -> Option<f64> {
    let mut parts = value.split(':');
    let hours = parts.next()?.parse::<f64>().ok()?;
    let minutes = parts.next()?.parse::<f64>().ok()?;
    let seconds = parts.next()?.parse::<f64>().ok()?;
    if parts.next().is_some() || hours < 0.0 || minutes < 0.0 || seconds < 0.0 {
        return None;
    }
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Map elapsed output time onto a running percentage
pub fn percent_of(elapsed_secs: f64, duration_secs: f64) -> u8 {
    if duration_secs.is_nan() || duration_secs <= 0.0 || !elapsed_secs.is_finite() {
        return 0;
    }
    let pct = (elapsed_secs / duration_secs * 100.0).floor();
    pct.clamp(0.0, f64::from(MAX_RUNNING_PROGRESS)) as u8
}
