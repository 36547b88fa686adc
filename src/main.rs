//! Anisub - chunked, parallel video-to-translated-subtitle pipeline
//!
//! Entry point for the command line tool: task-based processing of whole
//! videos plus the individual split, transcribe and translate stages.

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{Level, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use anisub::cli::{Args, Commands};
use anisub::config::Config;
use anisub::error::AnisubError;
use anisub::media::MediaProcessorFactory;
use anisub::pipeline::{Pipeline, ProcessingMode};
use anisub::progress::ProgressSink;
use anisub::subtitle::{read_srt, write_srt};
use anisub::task::{ProgressTracker, TaskStore};
use anisub::transcribe::{ParallelTranscriber, TranscriberFactory};
use anisub::translate::{ParallelTranslator, TranslatorFactory};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _guard = setup_logging(args.verbose, &log_dir(&std::env::current_dir()?))?;
    let config = Config::load(args.config.as_deref())?;
    info!("Starting Anisub with {:?} translation", config.translator);

    match args.command {
        Commands::Analyze { input } => {
            config.ensure_directories()?;
            let store = Arc::new(TaskStore::open(&config.storage.tasks_file).await);
            let pipeline = Pipeline::new(config, Arc::clone(&store), store.clone())?;
            let task_id = register(&store, &input).await?;
            analyze(&pipeline, &task_id, &input).await?;
        }
        Commands::Process { task, mode, stream } => {
            let mode: ProcessingMode = mode.parse()?;
            config.ensure_directories()?;
            let store = Arc::new(TaskStore::open(&config.storage.tasks_file).await);
            process(config, store, &task, mode, stream).await?;
        }
        Commands::Run { input, mode, stream } => {
            let mode: ProcessingMode = mode.parse()?;
            config.ensure_directories()?;
            let store = Arc::new(TaskStore::open(&config.storage.tasks_file).await);
            let pipeline = Pipeline::new(config.clone(), Arc::clone(&store), store.clone())?;
            pipeline.check_credentials(mode)?;
            let task_id = register(&store, &input).await?;
            analyze(&pipeline, &task_id, &input).await?;
            process(config, store, &task_id, mode, stream).await?;
        }
        Commands::Status { task } => {
            let store = TaskStore::open(&config.storage.tasks_file).await;
            let record = store.get_task_status(&task).await;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Commands::Split { input, output_dir, segment_seconds } => {
            let segment_seconds = segment_seconds.unwrap_or(config.pipeline.segment_seconds);
            info!("Splitting {} into {}s chunks", input.display(), segment_seconds);

            let media = MediaProcessorFactory::create_processor(config.media.clone());
            media.check_availability().await?;
            info!("Using {}", media.get_version_info().await?);
            let chunks = media.split_audio(&input, segment_seconds, &output_dir).await?;

            for chunk in &chunks {
                println!("{:>5}  {:>8.1}s  {}", chunk.index, chunk.offset_seconds(), chunk.path.display());
            }
            println!("{} chunks written to {}", chunks.len(), output_dir.display());
        }
        Commands::Transcribe { input, output } => {
            let transcriber = TranscriberFactory::create_default(&config)?;
            let media = MediaProcessorFactory::create_processor(config.media.clone());
            media.check_availability().await?;
            info!("Using {}", media.get_version_info().await?);

            let chunk_dir = tempfile::tempdir()?;
            let segment_seconds = config.pipeline.segment_seconds;
            let chunks = media.split_audio(&input, segment_seconds, chunk_dir.path()).await?;

            let coordinator = ParallelTranscriber::new(
                transcriber,
                config.pipeline.transcribe_concurrency,
                config.pipeline.request_timeout(),
            );
            let bar = BarProgress::new("Transcribing");
            let srt = coordinator
                .transcribe_required(&chunks, f64::from(segment_seconds), &bar)
                .await?;
            bar.finish();

            write_srt(&srt, &output).await?;
            println!("Transcription written to {}", output.display());
        }
        Commands::Translate { input, output, target_lang } => {
            let provider = TranslatorFactory::create_provider(&config)?;
            let target_language = target_lang.unwrap_or_else(|| config.pipeline.target_language.clone());

            let source = read_srt(&input).await?;
            if source.trim().is_empty() {
                return Err(AnisubError::Pipeline("No subtitle content to translate".to_string()).into());
            }

            let translator = ParallelTranslator::new(
                provider,
                config.pipeline.group_size,
                config.pipeline.request_timeout(),
            );
            let bar = BarProgress::new("Translating");
            let translated = translator.translate_all(&source, &target_language, &bar).await;
            bar.finish();

            write_srt(&translated, &output).await?;
            println!("Translation written to {}", output.display());
        }
    }

    Ok(())
}

async fn register(store: &TaskStore, input: &Path) -> Result<String> {
    if !input.exists() {
        return Err(AnisubError::FileNotFound(input.display().to_string()).into());
    }
    let filename = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(store.create_task(&filename, input).await)
}

async fn analyze(pipeline: &Pipeline, task_id: &str, input: &Path) -> Result<()> {
    let streams = pipeline.analyze_file(task_id, input).await?;

    println!("Task: {}", task_id);
    println!("{:<6} {:<10} {:<12} {:<8} {}", "Index", "Type", "Codec", "Lang", "Title");
    println!("{}", "-".repeat(60));
    for stream in &streams {
        println!(
            "{:<6} {:<10} {:<12} {:<8} {}",
            stream.index,
            stream.codec_type,
            stream.codec_name.as_deref().unwrap_or("-"),
            stream.language().unwrap_or("-"),
            stream.title().unwrap_or("")
        );
    }
    Ok(())
}

async fn process(
    config: Config,
    store: Arc<TaskStore>,
    task_id: &str,
    mode: ProcessingMode,
    stream: Option<usize>,
) -> Result<()> {
    if store.get_task(task_id).await.is_none() {
        return Err(AnisubError::TaskNotFound(task_id.to_string()).into());
    }

    let tracker = Arc::new(ConsoleTracker::new(Arc::clone(&store)));
    let pipeline = Pipeline::new(config, Arc::clone(&store), tracker.clone())?;
    pipeline.check_credentials(mode)?;
    let output = pipeline.run_processing_task(task_id, mode, stream).await;
    tracker.bar.finish();

    match output {
        Some(path) => {
            println!("Subtitles written to {}", path.display());
            Ok(())
        }
        None => {
            let record = store.get_task_status(task_id).await;
            anyhow::bail!("Task {} stopped at {}%: {}", task_id, record.progress, record.status)
        }
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

/// Mirrors task updates onto a console bar, persisting through the store
struct ConsoleTracker {
    store: Arc<TaskStore>,
    bar: ProgressBar,
}

impl ConsoleTracker {
    fn new(store: Arc<TaskStore>) -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(bar_style());
        Self { store, bar }
    }
}

#[async_trait]
impl ProgressTracker for ConsoleTracker {
    async fn report_status(&self, task_id: &str, status: &str, progress: u8) {
        self.bar.set_position(u64::from(progress.min(100)));
        self.bar.set_message(status.to_string());
        self.store.report_status(task_id, status, progress).await;
    }

    async fn report_metadata(&self, task_id: &str, fields: Map<String, Value>) {
        self.store.report_metadata(task_id, fields).await;
    }
}

/// Progress bar for the single-stage commands
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new(label: &str) -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(bar_style());
        bar.set_message(label.to_string());
        Self { bar }
    }

    fn finish(&self) {
        self.bar.finish();
    }
}

#[async_trait]
impl ProgressSink for BarProgress {
    async fn advance(&self, completed: usize, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(completed as u64);
    }
}

fn log_dir(work_dir: &Path) -> PathBuf {
    work_dir.join(".anisub").join("log")
}

/// Setup logging to both console and a daily rolling file
fn setup_logging(verbose: bool, log_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;

    let file_appender = rolling::daily(log_dir, "anisub.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_target(false)
        .with_file(verbose)
        .with_line_number(verbose);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Logging initialized - console: {}, file: {}",
        log_level,
        log_dir.join("anisub.log").display()
    );

    Ok(guard)
}
