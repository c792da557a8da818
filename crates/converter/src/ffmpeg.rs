use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::timeout;

use crate::config::ConverterConfig;
use crate::engine::{MediaEngine, MediaInfo, TranscodeRequest};
use crate::error::EngineError;
use crate::ffprobe::{self, last_line};
use crate::progress::{parse_progress_line, percent_of, ProgressLine, ProgressReporter};

/// Number of stderr lines kept for diagnostics
const STDERR_TAIL_LINES: usize = 20;

/// Media engine backed by local ffmpeg/ffprobe binaries
#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    pub ffmpeg_bin: PathBuf,
    pub ffprobe_bin: PathBuf,
    pub timeout: Option<Duration>,
}

impl FfmpegEngine {
    pub fn new(config: &ConverterConfig) -> Self {
        Self {
            ffmpeg_bin: config.ffmpeg_bin.clone(),
            ffprobe_bin: config.ffprobe_bin.clone(),
            timeout: config.engine_timeout(),
        }
    }

    fn program(&self) -> String {
        self.ffmpeg_bin.display().to_string()
    }
}

/// Build the ffmpeg argument list for a conversion
///
/// Generates FFmpeg command with:
/// - Machine-readable progress on stdout
/// - Overwrite flag when requested
/// - Target muxer and optional bitrate caps from the preset
pub fn build_transcode_args(request: &TranscodeRequest) -> Vec<String> {
    let mut args = vec![
        "-hide_banner".to_string(),
        "-nostats".to_string(),
        "-progress".to_string(),
        "pipe:1".to_string(),
    ];

    args.push(if request.overwrite { "-y" } else { "-n" }.to_string());

    args.push("-i".to_string());
    args.push(request.input.to_string_lossy().to_string());

    args.push("-f".to_string());
    args.push(request.format.muxer().to_string());

    if let Some(video) = request.preset.video_bitrate {
        args.push("-b:v".to_string());
        args.push(video.to_ffmpeg_arg());
    }
    if let Some(audio) = request.preset.audio_bitrate {
        args.push("-b:a".to_string());
        args.push(audio.to_ffmpeg_arg());
    }

    args.push(request.output.to_string_lossy().to_string());
    args
}

/// Read one line, replacing invalid UTF-8; `None` at EOF or on a read error
async fn next_lossy_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> Option<String>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    match reader.read_until(b'\n', buf).await {
        Ok(0) => None,
        Ok(_) => {
            let line = String::from_utf8_lossy(buf);
            Some(line.trim_end_matches(['\r', '\n']).to_string())
        }
        Err(e) => {
            debug!("FFmpeg pipe read failed: {}", e);
            None
        }
    }
}

#[async_trait]
impl MediaEngine for FfmpegEngine {
    async fn probe(&self, input: &Path) -> Result<MediaInfo, EngineError> {
        let data = ffprobe::probe_file(&self.ffprobe_bin, input).await?;
        Ok(data.media_info())
    }

    /// Progress can only be derived from `out_time` when the total duration is known
    fn reports_progress(&self, info: &MediaInfo) -> bool {
        info.duration_secs.is_some()
    }

    async fn transcode(
        &self,
        request: &TranscodeRequest,
        info: &MediaInfo,
        progress: ProgressReporter,
    ) -> Result<(), EngineError> {
        let program = self.program();
        let args = build_transcode_args(request);
        debug!("Executing FFmpeg: {} {}", program, args.join(" "));

        let mut child = Command::new(&self.ffmpeg_bin)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EngineError::Spawn {
                program: program.clone(),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Probe("failed to capture ffmpeg stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::Probe("failed to capture ffmpeg stderr".to_string()))?;

        // Translate the -progress stream into percentages
        let duration = info.duration_secs;
        let stdout_handle = tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            let mut buf = Vec::new();
            // Drain to EOF; a closed pipe would kill ffmpeg on its next write
            while let Some(line) = next_lossy_line(&mut reader, &mut buf).await {
                if let (Some(ProgressLine::OutTime(secs)), Some(total)) = (parse_progress_line(&line), duration) {
                    progress.report(percent_of(secs, total)).await;
                }
            }
        });

        // Keep only the tail of stderr; it is diagnostic text, not parsed
        let stderr_handle = tokio::spawn(async move {
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
            let mut reader = BufReader::new(stderr);
            let mut buf = Vec::new();
            while let Some(line) = next_lossy_line(&mut reader, &mut buf).await {
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Vec::from(tail).join("\n")
        });

        // Wait for process with optional timeout
        let status = match self.timeout {
            Some(limit) => match timeout(limit, child.wait()).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!("FFmpeg exceeded {}s for {}, killing it", limit.as_secs(), request.input.display());
                    child.kill().await?;
                    stdout_handle.abort();
                    stderr_handle.abort();
                    return Err(EngineError::Timeout {
                        program,
                        secs: limit.as_secs(),
                    });
                }
            },
            None => child.wait().await?,
        };

        // A reader that panicked only loses diagnostics
        let _ = stdout_handle.await;
        let stderr = stderr_handle.await.unwrap_or_default();

        if !status.success() {
            debug!("FFmpeg stderr for {}:\n{}", request.input.display(), stderr);
            return Err(EngineError::Exit {
                program,
                code: status.code().unwrap_or(-1),
                stderr_tail: last_line(&stderr),
            });
        }

        info!("FFmpeg finished: {}", request.output.display());
        Ok(())
    }
}
