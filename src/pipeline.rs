use async_trait::async_trait;
use serde_json::{Map, json};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{AnisubError, Result};
use crate::media::segment::remove_chunks;
use crate::media::{MediaProcessorFactory, MediaProcessorTrait, StreamInfo};
use crate::progress::{ProgressSink, scale_progress};
use crate::subtitle::{read_srt, write_srt};
use crate::task::{ProgressTracker, TaskRecord, TaskStore};
use crate::transcribe::{ParallelTranscriber, Transcriber, TranscriberFactory};
use crate::translate::{ParallelTranslator, TranslationProvider, TranslatorFactory};

/// Where the source subtitles come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingMode {
    /// Use a subtitle stream already embedded in the container
    Extract,
    /// Extract the audio and transcribe it in parallel chunks
    Transcribe,
}

impl FromStr for ProcessingMode {
    type Err = AnisubError;

    fn from_str(mode: &str) -> Result<Self> {
        match mode.to_lowercase().as_str() {
            "extract" => Ok(ProcessingMode::Extract),
            "transcribe" => Ok(ProcessingMode::Transcribe),
            _ => Err(AnisubError::Config(format!(
                "Invalid processing mode '{}'. Valid modes: extract, transcribe",
                mode
            ))),
        }
    }
}

/// End-to-end run: source subtitles, parallel translation, output file.
/// Every phase is reported to the tracker.
pub struct Pipeline {
    config: Config,
    media: Box<dyn MediaProcessorTrait>,
    transcriber: Option<ParallelTranscriber>,
    translator: Option<ParallelTranslator>,
    store: Arc<TaskStore>,
    tracker: Arc<dyn ProgressTracker>,
}

impl Pipeline {
    /// Build the providers whose credentials are configured. Which ones a run
    /// needs depends on its mode, see `check_credentials`.
    pub fn new(config: Config, store: Arc<TaskStore>, tracker: Arc<dyn ProgressTracker>) -> Result<Self> {
        let transcriber = match config.require_openai_key() {
            Ok(_) => Some(TranscriberFactory::create_default(&config)?),
            Err(e) => {
                debug!("Transcription unavailable: {}", e);
                None
            }
        };
        let provider = match config.require_translator_key() {
            Ok(_) => Some(TranslatorFactory::create_provider(&config)?),
            Err(e) => {
                debug!("Translation unavailable: {}", e);
                None
            }
        };
        let media = MediaProcessorFactory::create_processor(config.media.clone());
        Ok(Self::with_components(config, media, transcriber, provider, store, tracker))
    }

    pub fn with_components(
        config: Config,
        media: Box<dyn MediaProcessorTrait>,
        transcriber: Option<Arc<dyn Transcriber>>,
        provider: Option<Arc<dyn TranslationProvider>>,
        store: Arc<TaskStore>,
        tracker: Arc<dyn ProgressTracker>,
    ) -> Self {
        let timeout = config.pipeline.request_timeout();
        Self {
            transcriber: transcriber
                .map(|t| ParallelTranscriber::new(t, config.pipeline.transcribe_concurrency, timeout)),
            translator: provider.map(|p| ParallelTranslator::new(p, config.pipeline.group_size, timeout)),
            config,
            media,
            store,
            tracker,
        }
    }

    /// Fail with a configuration error when a provider `mode` needs is missing.
    /// Extract runs need the translator; transcribe runs also need OpenAI.
    pub fn check_credentials(&self, mode: ProcessingMode) -> Result<()> {
        self.translator()?;
        if mode == ProcessingMode::Transcribe {
            self.transcriber()?;
        }
        Ok(())
    }

    fn transcriber(&self) -> Result<&ParallelTranscriber> {
        self.transcriber
            .as_ref()
            .ok_or_else(|| AnisubError::Config("OpenAI API Key is missing.".to_string()))
    }

    fn translator(&self) -> Result<&ParallelTranslator> {
        self.translator
            .as_ref()
            .ok_or_else(|| AnisubError::Config(format!("{:?} API Key is missing.", self.config.translator)))
    }

    /// Probe the uploaded file and park the task until a stream is selected
    pub async fn analyze_file(&self, task_id: &str, file_path: &Path) -> Result<Vec<StreamInfo>> {
        self.tracker.report_status(task_id, "Analyzing...", 0).await;

        let streams = match self.media.analyze(file_path).await {
            Ok(streams) => streams,
            Err(e) => {
                error!("Analysis failed for task {}: {}", task_id, e);
                self.tracker.report_status(task_id, &format!("Error: {}", e), 0).await;
                return Err(e);
            }
        };
        info!("Found {} streams in {}", streams.len(), file_path.display());

        let mut fields = Map::new();
        fields.insert("streams".to_string(), serde_json::to_value(&streams)?);
        fields.insert("file_path".to_string(), json!(file_path.to_string_lossy()));
        fields.insert("needs_selection".to_string(), json!(true));
        self.tracker.report_metadata(task_id, fields).await;
        self.tracker.report_status(task_id, "Waiting for Selection", 0).await;

        Ok(streams)
    }

    /// Run the pipeline for an analyzed task. Failures end up in the task
    /// status; the output path is returned on success.
    pub async fn run_processing_task(
        &self,
        task_id: &str,
        mode: ProcessingMode,
        stream_index: Option<usize>,
    ) -> Option<PathBuf> {
        let Some(task) = self.store.get_task(task_id).await else {
            error!("Task {} not found", task_id);
            return None;
        };

        let reporter = RunReporter::new(self.tracker.as_ref(), task_id, task.progress);
        match self.process(task_id, &task, mode, stream_index, &reporter).await {
            Ok(output_path) => {
                info!("Task {} completed: {}", task_id, output_path.display());
                Some(output_path)
            }
            Err(e) => {
                error!("Error processing task {}: {}", task_id, e);
                reporter.fail(&e).await;
                None
            }
        }
    }

    async fn process(
        &self,
        task_id: &str,
        task: &TaskRecord,
        mode: ProcessingMode,
        stream_index: Option<usize>,
        reporter: &RunReporter<'_>,
    ) -> Result<PathBuf> {
        self.check_credentials(mode)?;

        let file_path = task
            .get_str("file_path")
            .map(PathBuf::from)
            .ok_or_else(|| AnisubError::Pipeline(format!("Task {} has no file_path", task_id)))?;
        let output_path = self.output_path_for(task, &file_path);

        let source = match mode {
            ProcessingMode::Extract => self.extract_source(task_id, &file_path, stream_index, reporter).await?,
            ProcessingMode::Transcribe => self.transcribe_source(task_id, &file_path, reporter).await?,
        };

        if source.trim().is_empty() {
            return Err(AnisubError::Pipeline("No subtitle content to translate".to_string()));
        }

        let target_language = &self.config.pipeline.target_language;
        reporter.status("Translating...", 80).await;
        let band = reporter.band("Translating...", 80, 95);
        let translated = self.translator()?.translate_all(&source, target_language, &band).await;

        write_srt(&translated, &output_path).await?;

        let mut fields = Map::new();
        fields.insert("result".to_string(), json!(output_path.to_string_lossy()));
        fields.insert("needs_selection".to_string(), json!(false));
        self.tracker.report_metadata(task_id, fields).await;
        reporter.status("Completed", 100).await;

        Ok(output_path)
    }

    async fn extract_source(
        &self,
        task_id: &str,
        file_path: &Path,
        stream_index: Option<usize>,
        reporter: &RunReporter<'_>,
    ) -> Result<String> {
        reporter.status("Extracting Subtitles...", 10).await;

        let extracted = self.config.storage.upload_dir.join(format!("{}_extracted.srt", task_id));
        let path = self.media.extract_subtitles(file_path, &extracted, stream_index).await?;
        let content = read_srt(&path).await;

        if let Err(e) = tokio::fs::remove_file(&path).await {
            warn!("Failed to remove {}: {}", path.display(), e);
        }
        content
    }

    async fn transcribe_source(&self, task_id: &str, file_path: &Path, reporter: &RunReporter<'_>) -> Result<String> {
        let upload_dir = &self.config.storage.upload_dir;
        let audio_path = upload_dir.join(format!("{}.{}", task_id, self.config.media.chunk_extension));
        let chunk_dir = upload_dir.join(format!("{}_chunks", task_id));

        reporter.status("Extracting Audio...", 10).await;
        self.media.extract_audio(file_path, &audio_path).await?;

        reporter.status("Splitting Audio...", 20).await;
        let segment_seconds = self.config.pipeline.segment_seconds;
        let chunks = match self.media.split_audio(&audio_path, segment_seconds, &chunk_dir).await {
            Ok(chunks) => chunks,
            Err(e) => {
                remove_file_quietly(&audio_path).await;
                return Err(e);
            }
        };

        let label = format!("Transcribing {} chunks...", chunks.len());
        reporter.status(&label, 30).await;
        let band = reporter.band(&label, 30, 80);
        let srt = self
            .transcriber()?
            .transcribe_all(&chunks, f64::from(segment_seconds), &band)
            .await;

        remove_chunks(&chunks, &chunk_dir).await;
        remove_file_quietly(&audio_path).await;

        Ok(srt)
    }

    /// `<output_dir>/<original stem>.<target>.srt`
    fn output_path_for(&self, task: &TaskRecord, file_path: &Path) -> PathBuf {
        let original_name = task
            .get_str("filename")
            .map(PathBuf::from)
            .unwrap_or_else(|| file_path.to_path_buf());
        let stem = original_name
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());

        self.config
            .storage
            .output_dir
            .join(format!("{}.{}.srt", stem, self.config.pipeline.target_language))
    }
}

async fn remove_file_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!("Failed to remove {}: {}", path.display(), e);
    }
}

/// Reports phases of one run and remembers the last progress value, so a
/// failure can be reported without moving the bar.
struct RunReporter<'a> {
    tracker: &'a dyn ProgressTracker,
    task_id: &'a str,
    last: AtomicU8,
}

impl<'a> RunReporter<'a> {
    fn new(tracker: &'a dyn ProgressTracker, task_id: &'a str, initial: u8) -> Self {
        Self {
            tracker,
            task_id,
            last: AtomicU8::new(initial),
        }
    }

    async fn status(&self, status: &str, progress: u8) {
        self.last.store(progress, Ordering::SeqCst);
        self.tracker.report_status(self.task_id, status, progress).await;
    }

    fn band<'r>(&'r self, status: &str, low: u8, high: u8) -> BandProgress<'r, 'a> {
        BandProgress {
            reporter: self,
            status: status.to_string(),
            low,
            high,
        }
    }

    async fn fail(&self, e: &AnisubError) {
        let progress = self.last.load(Ordering::SeqCst);
        self.tracker
            .report_status(self.task_id, &format!("Error: {}", e), progress)
            .await;
    }
}

/// Maps coordinator `(completed, total)` onto one progress band
struct BandProgress<'r, 'a> {
    reporter: &'r RunReporter<'a>,
    status: String,
    low: u8,
    high: u8,
}

#[async_trait]
impl ProgressSink for BandProgress<'_, '_> {
    async fn advance(&self, completed: usize, total: usize) {
        let progress = scale_progress(completed, total, self.low, self.high);
        self.reporter.status(&self.status, progress).await;
    }
}
