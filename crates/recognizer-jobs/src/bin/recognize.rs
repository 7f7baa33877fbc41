//! Recognize PDF metadata from the command line.
//!
//! Usage:
//!   recognize [--json] <file.pdf>...
//!   recognize --full-text [--pages 0,1,2] <file.pdf>...
//!
//! Environment:
//!   LOG_FORMAT  - "text" (default) or "json"
//!   LOG_FILE    - path to log file (optional, enables daily-rolling file logging)
//!   RUST_LOG    - standard env filter (default: "recognizer=info")
//!   plus the pool, pipeline, engine and remote service variables.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use recognizer_jobs::{
    PipelineConfig, PoolConfig, PopplerConfig, PopplerProvider, Priority, RecognitionPipeline,
    Task, TaskUpdate, TaskUpdateKind, Work, WorkUpdateKind, Worker, WorkerPool,
};
use recognizer_remote::{RecognizerClient, TranslationServerClient};

#[derive(Debug, Default)]
struct Args {
    json: bool,
    full_text: bool,
    pages: Option<Vec<u32>>,
    files: Vec<PathBuf>,
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  recognize [--json] <file.pdf>...");
    eprintln!("  recognize --full-text [--pages 0,1,2] <file.pdf>...");
}

fn parse_pages(value: &str) -> anyhow::Result<Vec<u32>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| {
            p.parse::<u32>()
                .with_context(|| format!("Invalid page index: {}", p))
        })
        .collect()
}

fn parse_args() -> anyhow::Result<Args> {
    let args: Vec<String> = std::env::args().collect();
    let mut result = Args::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--json" | "-j" => result.json = true,
            "--full-text" | "-f" => result.full_text = true,
            "--pages" | "-p" => {
                i += 1;
                let Some(value) = args.get(i) else {
                    bail!("--pages requires a comma-separated list of page indices");
                };
                result.pages = Some(parse_pages(value)?);
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            flag if flag.starts_with('-') => {
                print_usage();
                bail!("Unknown option: {}", flag);
            }
            file => result.files.push(PathBuf::from(file)),
        }
        i += 1;
    }

    if result.files.is_empty() {
        print_usage();
        bail!("No input files given");
    }
    if result.pages.is_some() && !result.full_text {
        bail!("--pages only applies to --full-text");
    }
    Ok(result)
}

fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "recognizer=info".into());
    let registry = tracing_subscriber::registry().with(env_filter);

    if let Some(ref path) = log_file {
        let path = Path::new(path);
        let file_dir = path.parent().unwrap_or(Path::new("."));
        let file_name = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("recognize.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false),
                )
                .init();
        }
        Some(guard)
    } else {
        // Stdout carries results; logs go to stderr.
        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        } else {
            registry
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
        None
    }
}

fn print_update(update: &TaskUpdate, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(update)?);
        return Ok(());
    }

    let file = update.task.file.display();
    match &update.kind {
        TaskUpdateKind::Translated(item) | TaskUpdateKind::CreatedParent(item) => {
            println!("{}: {} [{}]", file, item.title, item.item_type);
            for creator in &item.creators {
                println!(
                    "    {}: {}, {}",
                    creator.creator_type, creator.last_name, creator.first_name
                );
            }
            for (field, value) in &item.fields {
                println!("    {}: {}", field, value);
            }
        }
        TaskUpdateKind::Failed(reason) => println!("{}: failed: {}", file, reason),
        other => println!("{}: {}", file, other.event_type()),
    }
    Ok(())
}

async fn run_recognition(pool: WorkerPool, args: &Args) -> anyhow::Result<()> {
    let classifier = RecognizerClient::from_env().context("Failed to create recognizer client")?;
    let lookup =
        TranslationServerClient::from_env().context("Failed to create translation client")?;
    let pipeline = RecognitionPipeline::builder(pool, Arc::new(classifier), Arc::new(lookup))
        .with_config(PipelineConfig::from_env())
        .build();

    let mut events = pipeline.events();
    let mut remaining: HashSet<Task> = HashSet::new();
    for file in &args.files {
        let task = Task::simple(file.clone());
        pipeline.queue(task.clone());
        remaining.insert(task);
    }

    let mut failed = 0usize;
    while !remaining.is_empty() {
        let update = match events.recv().await {
            Ok(update) => update,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Dropped pipeline updates");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        print_update(&update, args.json)?;
        if update.kind.is_terminal() && remaining.remove(&update.task) {
            if !matches!(update.kind, TaskUpdateKind::Translated(_)) {
                failed += 1;
            }
        }
    }

    info!(files = args.files.len(), failed, "Recognition finished");
    if failed > 0 {
        bail!("{} of {} files could not be recognized", failed, args.files.len());
    }
    Ok(())
}

async fn run_full_text(pool: WorkerPool, args: &Args) -> anyhow::Result<()> {
    let work = Work::FullText {
        pages: args.pages.clone(),
    };
    let jobs: Vec<_> = args
        .files
        .iter()
        .map(|file| {
            let worker = Worker::new(file.clone(), Priority::High);
            let rx = pool.queue(work.clone(), &worker);
            (worker, rx)
        })
        .collect();

    let mut failed = 0usize;
    for (worker, mut rx) in jobs {
        let kind = loop {
            match rx.recv().await {
                Ok(update) if update.kind.is_terminal() => break update.kind,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break WorkUpdateKind::Cancelled,
            }
        };
        pool.cleanup_worker(&worker);

        let file = worker.file.display();
        match kind {
            WorkUpdateKind::ExtractedData(data) if args.json => {
                println!("{}", serde_json::json!({ "file": file.to_string(), "data": data }));
            }
            WorkUpdateKind::ExtractedData(data) => {
                println!("==> {} <==", file);
                println!("{}", data["text"].as_str().unwrap_or_default());
            }
            WorkUpdateKind::Failed(reason) => {
                failed += 1;
                eprintln!("{}: failed: {}", file, reason);
            }
            WorkUpdateKind::Cancelled | WorkUpdateKind::InProgress => {
                failed += 1;
                eprintln!("{}: cancelled", file);
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} files could not be extracted", failed, args.files.len());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let _log_guard = init_logging();
    let args = parse_args()?;

    let pool = WorkerPool::new(
        Arc::new(PopplerProvider::new(PopplerConfig::from_env())),
        PoolConfig::from_env(),
    );

    if args.full_text {
        run_full_text(pool, &args).await
    } else {
        run_recognition(pool, &args).await
    }
}
