use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{AudioChunk, MediaCommandBuilder, MediaProcessorTrait, StreamInfo, segment};
use crate::config::MediaConfig;
use crate::error::{AnisubError, Result};

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<StreamInfo>,
}

/// Concrete implementation of media processor (FFmpeg-based)
pub struct MediaProcessorImpl {
    config: MediaConfig,
    command_builder: MediaCommandBuilder,
}

impl MediaProcessorImpl {
    /// Create a new media processor implementation
    pub fn new(config: MediaConfig) -> Self {
        let command_builder = MediaCommandBuilder::new(&config.ffmpeg_path, &config.ffprobe_path);

        Self {
            config,
            command_builder,
        }
    }

    async fn probe(&self, video_path: &Path) -> Result<Vec<StreamInfo>> {
        let stdout = self
            .command_builder
            .probe_streams(video_path)
            .execute_with_output()
            .await?;
        let probe: ProbeOutput = serde_json::from_str(&stdout)
            .map_err(|e| AnisubError::Media(format!("Failed to parse probe output: {}", e)))?;
        Ok(probe.streams)
    }
}

/// Pick the `-map` specifier for subtitle extraction. An explicit stream must be a
/// subtitle stream; otherwise the first subtitle stream is used.
pub fn subtitle_stream_specifier(streams: &[StreamInfo], stream_index: Option<usize>) -> Result<String> {
    let subtitles: Vec<&StreamInfo> = streams.iter().filter(|s| s.is_subtitle()).collect();
    if subtitles.is_empty() {
        return Err(AnisubError::Media("Failed to extract subtitles: no subtitle streams found".to_string()));
    }

    match stream_index {
        Some(index) => {
            if subtitles.iter().any(|s| s.index == index) {
                Ok(format!("0:{}", index))
            } else {
                Err(AnisubError::Media(format!(
                    "Failed to extract subtitles: stream {} is not a subtitle stream",
                    index
                )))
            }
        }
        None => Ok("0:s:0".to_string()),
    }
}

#[async_trait]
impl MediaProcessorTrait for MediaProcessorImpl {
    async fn analyze(&self, video_path: &Path) -> Result<Vec<StreamInfo>> {
        info!("Analyzing media streams of {}", video_path.display());
        match self.probe(video_path).await {
            Ok(streams) => {
                debug!("Found {} streams", streams.len());
                Ok(streams)
            }
            Err(e) => {
                warn!("Stream probe failed: {}", e);
                Ok(Vec::new())
            }
        }
    }

    async fn extract_audio(&self, video_path: &Path, audio_path: &Path) -> Result<()> {
        info!("Extracting audio from {} to {}", video_path.display(), audio_path.display());

        let command = self.command_builder.extract_audio(
            video_path,
            audio_path,
            &self.config.audio_codec,
            &self.config.audio_bitrate,
        );
        command.execute().await?;

        info!("Audio extraction completed");
        Ok(())
    }

    async fn extract_subtitles(
        &self,
        video_path: &Path,
        output_path: &Path,
        stream_index: Option<usize>,
    ) -> Result<PathBuf> {
        let streams = self.probe(video_path).await?;
        let specifier = subtitle_stream_specifier(&streams, stream_index)?;

        info!(
            "Extracting subtitles ({}) from {} to {}",
            specifier,
            video_path.display(),
            output_path.display()
        );
        self.command_builder
            .extract_subtitles(video_path, output_path, &specifier)
            .execute()
            .await?;

        if !output_path.exists() {
            return Err(AnisubError::Media("Failed to extract subtitles".to_string()));
        }
        Ok(output_path.to_path_buf())
    }

    async fn split_audio(
        &self,
        audio_path: &Path,
        segment_seconds: u32,
        output_dir: &Path,
    ) -> Result<Vec<AudioChunk>> {
        info!("Splitting audio {} into {}s chunks...", audio_path.display(), segment_seconds);

        tokio::fs::create_dir_all(output_dir).await?;
        let pattern = segment::chunk_pattern(audio_path, output_dir, &self.config.chunk_extension)?;
        self.command_builder
            .split_audio(audio_path, pattern.as_path(), segment_seconds)
            .execute()
            .await?;

        let chunks = segment::collect_chunks(
            audio_path,
            output_dir,
            &self.config.chunk_extension,
            segment_seconds as f64,
        )?;
        info!("Audio split into {} chunks", chunks.len());
        Ok(chunks)
    }

    async fn check_availability(&self) -> Result<()> {
        self.command_builder
            .version_check()
            .execute()
            .await
            .map_err(|e| AnisubError::Media(format!("Media processor not found: {}", e)))?;
        info!("Media processor is available");
        Ok(())
    }

    async fn get_version_info(&self) -> Result<String> {
        let stdout = self.command_builder.version_check().execute_with_output().await?;
        Ok(stdout.lines().next().unwrap_or("Unknown version").to_string())
    }
}
