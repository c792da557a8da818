use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use converter::{
    format::SUPPORTED_INPUT_FORMATS,
    preset::QUALITY_LABELS,
    retention, upload,
    ConverterConfig, Dispatcher, FfmpegEngine, JobId, JobState, JobStatusView, JobStore,
    MediaEngine, OutputFormat, StatusQuery,
};
use log::{debug, error, info};
use serde::Serialize;

/// Video conversion job runner
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (JSON or TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert one or more files and wait for the results
    Convert {
        /// Source video files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Target container: mp4, avi, mov, webm or mkv
        #[arg(short, long)]
        format: OutputFormat,

        /// Quality preset: low, medium, high or original
        #[arg(short, long, default_value = "medium")]
        quality: String,

        /// Status polling interval in milliseconds
        #[arg(long, default_value_t = 500)]
        poll_ms: u64,

        /// Print the final summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// List supported formats and quality labels
    Formats,
    /// Delete uploads and outputs older than the retention age
    Cleanup,
}

#[derive(Debug, Serialize)]
struct JobSummary {
    source: PathBuf,
    #[serde(flatten)]
    status: JobStatusView,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logger - use RUST_LOG env var or default to info level
    let mut logger = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if args.verbose {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.format_timestamp_secs().init();

    let cfg = ConverterConfig::load_config(args.config.as_deref())
        .context("Failed to load configuration")?;

    match args.command {
        Command::Convert {
            files,
            format,
            quality,
            poll_ms,
            json,
        } => convert(&cfg, files, format, &quality, Duration::from_millis(poll_ms), json).await,
        Command::Formats => {
            print_formats();
            Ok(())
        }
        Command::Cleanup => {
            let dirs = vec![cfg.upload_dir.clone(), cfg.converted_dir.clone()];
            let report = retention::sweep_directories(&dirs, cfg.retention_max_age());
            println!(
                "checked {} file(s), removed {} ({} bytes)",
                report.files_checked, report.files_removed, report.bytes_removed
            );
            Ok(())
        }
    }
}

fn print_formats() {
    let outputs: Vec<String> = OutputFormat::ALL.iter().map(|f| f.to_string()).collect();
    println!("input formats:  {}", SUPPORTED_INPUT_FORMATS.join(" "));
    println!("output formats: {}", outputs.join(" "));
    println!("quality labels: {}", QUALITY_LABELS.join(" "));
}

async fn convert(
    cfg: &ConverterConfig,
    files: Vec<PathBuf>,
    format: OutputFormat,
    quality: &str,
    poll: Duration,
    json: bool,
) -> Result<()> {
    cfg.ensure_dirs()?;

    info!("Configuration loaded:");
    info!("  Upload dir: {}", cfg.upload_dir.display());
    info!("  Converted dir: {}", cfg.converted_dir.display());
    info!("  Worker pool size: {}", cfg.pool_size());

    let store = Arc::new(JobStore::new());

    // Retention runs alongside the conversions, independent of job state
    let sweep = tokio::spawn({
        let dirs = vec![cfg.upload_dir.clone(), cfg.converted_dir.clone()];
        let max_age = cfg.retention_max_age();
        let store = store.clone();
        async move { retention::run_retention(dirs, &store, max_age).await }
    });

    let engine: Arc<dyn MediaEngine> = Arc::new(FfmpegEngine::new(cfg));
    let dispatcher = Dispatcher::start(store.clone(), engine, cfg);
    let status = StatusQuery::new(store);

    let mut rejected = 0usize;
    let mut submitted: Vec<(PathBuf, JobId)> = Vec::new();
    for file in files {
        let stored = match upload::ingest_upload(cfg, &file).await {
            Ok(stored) => stored,
            Err(e) => {
                error!("Rejected {}: {}", file.display(), e);
                rejected += 1;
                continue;
            }
        };
        match dispatcher.submit(stored, format, quality).await {
            Ok(id) => {
                info!("Submitted {} as job {}", file.display(), id);
                submitted.push((file, id));
            }
            Err(e) => {
                error!("Could not submit {}: {}", file.display(), e);
                rejected += 1;
            }
        }
    }

    let mut last_seen: HashMap<JobId, (JobState, u8)> = HashMap::new();
    let summaries = loop {
        let mut views = Vec::with_capacity(submitted.len());
        for (source, id) in &submitted {
            let view = status.status(*id).await?;
            let key = (view.state, view.progress);
            if last_seen.insert(*id, key) != Some(key) && !json {
                println!("{} {:>3}% {:<9} {}", id, view.progress, view.state, source.display());
            }
            views.push(JobSummary {
                source: source.clone(),
                status: view,
            });
        }
        if views.iter().all(|s| s.status.state.is_terminal()) {
            break views;
        }
        tokio::time::sleep(poll).await;
    };

    dispatcher.shutdown().await;
    match sweep.await {
        Ok(report) => debug!("Retention sweep: {:?}", report),
        Err(e) => error!("Retention sweep failed: {}", e),
    }

    let failed = summaries
        .iter()
        .filter(|s| s.status.state == JobState::Failed)
        .count();

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else {
        for summary in &summaries {
            match (&summary.status.output_reference, &summary.status.error_detail) {
                (Some(output), _) => println!("✅ {} -> {}", summary.source.display(), output.display()),
                (None, Some(detail)) => println!("❌ {}: {}", summary.source.display(), detail),
                (None, None) => {}
            }
        }
    }

    if failed > 0 || rejected > 0 {
        anyhow::bail!("{} job(s) failed, {} file(s) rejected", failed, rejected);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_args() {
        let args = Args::try_parse_from([
            "vconv", "convert", "a.mp4", "b.mov", "--format", "webm", "--quality", "low",
        ])
        .unwrap();
        match args.command {
            Command::Convert { files, format, quality, poll_ms, json } => {
                assert_eq!(files.len(), 2);
                assert_eq!(format, OutputFormat::Webm);
                assert_eq!(quality, "low");
                assert_eq!(poll_ms, 500);
                assert!(!json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_output_format_is_rejected() {
        let result = Args::try_parse_from(["vconv", "convert", "a.mp4", "--format", "gif"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_convert_requires_files() {
        assert!(Args::try_parse_from(["vconv", "convert", "--format", "mp4"]).is_err());
    }
}
