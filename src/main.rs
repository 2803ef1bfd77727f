//! CLI entry point for the stream downloader.

use std::io::{self, IsTerminal, Read};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use stream_downloader::download::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use stream_downloader::download::header_map_from_lines;
use stream_downloader::{
    DEFAULT_CONCURRENCY, DownloadEngine, DownloadQueue, EngineOptions, HttpClient, TaskOutcome,
};
use tracing::{debug, error, info, warn};

mod app_config;
mod cli;
mod progress;

use app_config::{FileConfig, load_config};
use cli::{Args, DownloadPair, parse_input_lines};
use progress::ProgressUi;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();
    let file_config = load_config(args.config.as_deref())?;

    // Priority: RUST_LOG env var > quiet/verbose flags > config verbosity > info
    let default_level = default_log_level(&args, &file_config);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, ?file_config, "CLI arguments parsed");

    let pairs = read_pairs(&args)?;
    if pairs.is_empty() {
        info!("No input provided. Pass URL=DEST pairs or pipe `URL DEST` lines via stdin.");
        info!("Example: stream-downloader 'https://cdn.example/ep1/index.m3u8=ep1.ts'");
        return Ok(ExitCode::SUCCESS);
    }

    let mut queue = DownloadQueue::new();
    for pair in &pairs {
        queue.enqueue(&pair.url, &pair.destination);
    }
    if queue.is_empty() {
        warn!("No supported URLs in input (expected .m3u8 or .mp4)");
        return Ok(ExitCode::FAILURE);
    }
    info!(
        queued = queue.len(),
        dropped = pairs.len() - queue.len(),
        "Parsed input"
    );

    // Config headers first, CLI headers appended after them
    let header_lines = file_config.headers.iter().chain(args.headers.iter());
    let headers = header_map_from_lines(header_lines).context("Invalid request header")?;
    let client = HttpClient::with_headers_and_timeouts(
        headers,
        file_config
            .connect_timeout_secs
            .unwrap_or(CONNECT_TIMEOUT_SECS),
        file_config.read_timeout_secs.unwrap_or(READ_TIMEOUT_SECS),
    );

    let options = EngineOptions {
        concurrency: args
            .concurrency
            .or(file_config.concurrency)
            .map_or(DEFAULT_CONCURRENCY, usize::from),
        task_timeout: args
            .task_timeout
            .or(file_config.task_timeout_secs)
            .map(Duration::from_secs),
        segment_window: file_config.segment_window,
    };
    let engine = DownloadEngine::new(options)?;

    let cancel = engine.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling downloads");
            cancel.cancel();
        }
    });

    let use_spinner = !args.quiet && !args.json && io::stderr().is_terminal();
    let progress = ProgressUi::start(use_spinner, engine.limiter().clone(), queue.len());

    let report = engine.process_all(&mut queue, &client).await;
    progress.finish().await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let mut entries: Vec<_> = report.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        for (destination, outcome) in entries {
            match outcome {
                TaskOutcome::Completed { bytes } => {
                    info!(path = %destination.display(), bytes, "Saved");
                }
                TaskOutcome::Failed { kind, reason } => {
                    error!(path = %destination.display(), kind = %kind, reason = %reason, "Failed");
                }
            }
        }
    }

    info!(
        completed = report.completed(),
        failed = report.failed(),
        total = report.total(),
        "Download complete"
    );

    Ok(if report.all_completed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn default_log_level(args: &Args, file_config: &FileConfig) -> &'static str {
    if args.quiet {
        return "error";
    }
    match args.verbose {
        0 => file_config
            .verbosity
            .map_or("info", app_config::VerbositySetting::filter_directive),
        1 => "debug",
        _ => "trace",
    }
}

/// Collects download requests from positional args or stdin.
fn read_pairs(args: &Args) -> Result<Vec<DownloadPair>> {
    if !args.pairs.is_empty() {
        return Ok(args.pairs.clone());
    }
    if io::stdin().is_terminal() {
        return Ok(Vec::new());
    }
    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer)?;
    parse_input_lines(&buffer)
}
