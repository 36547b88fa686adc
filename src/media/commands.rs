use std::path::Path;
use tokio::process::Command;
use tracing::debug;

use crate::error::{AnisubError, Result};

/// Abstract media processing command representation
#[derive(Debug, Clone)]
pub struct MediaCommand {
    pub binary_path: String,
    pub args: Vec<String>,
    pub description: String,
}

impl MediaCommand {
    /// Create a new media processing command
    pub fn new<S1: Into<String>, S2: Into<String>>(binary_path: S1, description: S2) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            description: description.into(),
        }
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Add input file
    pub fn input<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg("-i").arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Add output file
    pub fn output<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Force overwrite output
    pub fn overwrite(self) -> Self {
        self.arg("-y")
    }

    /// Set audio codec
    pub fn audio_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:a").arg(codec)
    }

    /// Set audio bitrate
    pub fn audio_bitrate<S: Into<String>>(self, bitrate: S) -> Self {
        self.arg("-b:a").arg(bitrate)
    }

    /// Copy every selected stream without re-encoding
    pub fn copy_streams(self) -> Self {
        self.arg("-c").arg("copy")
    }

    /// Select an input stream
    pub fn map<S: Into<String>>(self, specifier: S) -> Self {
        self.arg("-map").arg(specifier)
    }

    /// Disable video
    pub fn no_video(self) -> Self {
        self.arg("-vn")
    }

    /// Execute the command, discarding stdout
    pub async fn execute(&self) -> Result<()> {
        self.execute_with_output().await.map(|_| ())
    }

    /// Execute the command and return its stdout
    pub async fn execute_with_output(&self) -> Result<String> {
        debug!("Executing media processing command: {} {:?}", self.binary_path, self.args);
        debug!("Description: {}", self.description);

        let output = Command::new(&self.binary_path)
            .args(&self.args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| AnisubError::Media(format!("Failed to execute media processor: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AnisubError::Media(format!(
                "{} failed: {}",
                self.description,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Builder for the ffmpeg/ffprobe invocations the pipeline needs
pub struct MediaCommandBuilder {
    ffmpeg_path: String,
    ffprobe_path: String,
}

impl MediaCommandBuilder {
    pub fn new<S1: Into<String>, S2: Into<String>>(ffmpeg_path: S1, ffprobe_path: S2) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
        }
    }

    /// List every stream as JSON
    pub fn probe_streams<P: AsRef<Path>>(&self, video_path: P) -> MediaCommand {
        MediaCommand::new(&self.ffprobe_path, "Stream probe")
            .args(["-v", "error", "-print_format", "json", "-show_streams"])
            .output(video_path)
    }

    /// Build audio extraction command
    pub fn extract_audio<P: AsRef<Path>>(
        &self,
        video_path: P,
        audio_path: P,
        codec: &str,
        bitrate: &str,
    ) -> MediaCommand {
        MediaCommand::new(&self.ffmpeg_path, "Audio extraction")
            .input(video_path)
            .no_video()
            .audio_codec(codec)
            .audio_bitrate(bitrate)
            .overwrite()
            .output(audio_path)
    }

    /// Build subtitle extraction command; the output extension decides the format
    pub fn extract_subtitles<P: AsRef<Path>>(
        &self,
        video_path: P,
        output_path: P,
        stream_specifier: &str,
    ) -> MediaCommand {
        MediaCommand::new(&self.ffmpeg_path, "Subtitle extraction")
            .input(video_path)
            .map(stream_specifier)
            .overwrite()
            .output(output_path)
    }

    /// Build the fixed-length split using the segment muxer and stream copy
    pub fn split_audio<P: AsRef<Path>>(
        &self,
        audio_path: P,
        output_pattern: P,
        segment_seconds: u32,
    ) -> MediaCommand {
        MediaCommand::new(&self.ffmpeg_path, "Audio split")
            .input(audio_path)
            .arg("-f")
            .arg("segment")
            .arg("-segment_time")
            .arg(segment_seconds.to_string())
            .copy_streams()
            .overwrite()
            .output(output_pattern)
    }

    /// Build version check command
    pub fn version_check(&self) -> MediaCommand {
        MediaCommand::new(&self.ffmpeg_path, "Version check").arg("-version")
    }
}
