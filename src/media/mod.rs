// Media processing over ffmpeg/ffprobe
//
// - Commands: command builders and execution
// - Processor: probe, audio/subtitle extraction, fixed-length split
// - Segment: chunk naming, ordering and cleanup

pub mod commands;
pub mod processor;
pub mod segment;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub use commands::*;
pub use processor::*;
pub use segment::AudioChunk;

use crate::config::MediaConfig;
use crate::error::Result;

/// One entry of the container's stream listing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub index: usize,
    #[serde(default)]
    pub codec_type: String,
    #[serde(default)]
    pub codec_name: Option<String>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl StreamInfo {
    pub fn is_subtitle(&self) -> bool {
        self.codec_type == "subtitle"
    }

    pub fn language(&self) -> Option<&str> {
        self.tags.get("language").map(String::as_str)
    }

    pub fn title(&self) -> Option<&str> {
        self.tags.get("title").map(String::as_str)
    }
}

/// Main trait for media processing operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaProcessorTrait: Send + Sync {
    /// List the container's streams; probe failures yield an empty list
    async fn analyze(&self, video_path: &Path) -> Result<Vec<StreamInfo>>;

    /// Extract the audio track
    async fn extract_audio(&self, video_path: &Path, audio_path: &Path) -> Result<()>;

    /// Extract one subtitle stream, converted by the output extension
    async fn extract_subtitles(
        &self,
        video_path: &Path,
        output_path: &Path,
        stream_index: Option<usize>,
    ) -> Result<PathBuf>;

    /// Split audio into consecutive `segment_seconds` chunks without re-encoding
    async fn split_audio(
        &self,
        audio_path: &Path,
        segment_seconds: u32,
        output_dir: &Path,
    ) -> Result<Vec<AudioChunk>>;

    /// Check if media processor is available
    async fn check_availability(&self) -> Result<()>;

    /// Get media processor version information
    async fn get_version_info(&self) -> Result<String>;
}

/// Factory for creating media processor instances
pub struct MediaProcessorFactory;

impl MediaProcessorFactory {
    /// Create the default media processor implementation (FFmpeg-based)
    pub fn create_processor(config: MediaConfig) -> Box<dyn MediaProcessorTrait> {
        Box::new(processor::MediaProcessorImpl::new(config))
    }
}
