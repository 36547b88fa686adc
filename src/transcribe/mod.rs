// Transcription providers and the parallel chunk coordinator
//
// - OpenAI: hosted Whisper returning SRT directly
// - Parallel: bounded fan-out over audio chunks, merged into one timeline
//
// To add a provider, implement `Transcriber` and extend
// `TranscriberImplementation` and the factory.

pub mod openai;
pub mod parallel;

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

pub use parallel::ParallelTranscriber;

use crate::config::Config;
use crate::error::Result;

/// Main trait for transcription operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe one audio file to SRT text with timestamps local to the file
    async fn transcribe(&self, audio_path: &Path) -> Result<String>;

    /// Provider name for logs
    fn name(&self) -> &'static str;
}

/// Transcriber implementation type
#[derive(Debug, Clone, Copy)]
pub enum TranscriberImplementation {
    OpenAI,
}

/// Factory for creating transcriber instances
pub struct TranscriberFactory;

impl TranscriberFactory {
    /// Create a transcriber; fails when the provider's credential is missing
    pub fn create_transcriber(
        implementation: TranscriberImplementation,
        config: &Config,
    ) -> Result<Arc<dyn Transcriber>> {
        match implementation {
            TranscriberImplementation::OpenAI => Ok(Arc::new(openai::OpenAITranscriber::new(
                &config.openai,
                config.pipeline.request_timeout(),
            )?)),
        }
    }

    pub fn create_default(config: &Config) -> Result<Arc<dyn Transcriber>> {
        Self::create_transcriber(TranscriberImplementation::OpenAI, config)
    }
}
