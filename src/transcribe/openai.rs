// OpenAI hosted Whisper: multipart upload, SRT response

use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use super::Transcriber;
use crate::config::OpenAIConfig;
use crate::error::{AnisubError, Result};
use crate::http::{build_client, check_status, endpoint};

pub struct OpenAITranscriber {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAITranscriber {
    pub fn new(config: &OpenAIConfig, timeout: Duration) -> Result<Self> {
        let api_key = config.require_api_key()?.to_string();

        Ok(Self {
            client: build_client(timeout)?,
            api_key,
            base_url: config.base_url.clone(),
            model: config.transcribe_model.clone(),
        })
    }
}

fn audio_mime(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()).as_deref() {
        Some("wav") => "audio/wav",
        Some("m4a") => "audio/mp4",
        Some("ogg") => "audio/ogg",
        Some("flac") => "audio/flac",
        Some("webm") => "audio/webm",
        _ => "audio/mpeg",
    }
}

#[async_trait]
impl Transcriber for OpenAITranscriber {
    async fn transcribe(&self, audio_path: &Path) -> Result<String> {
        debug!("Uploading {} for transcription", audio_path.display());

        let bytes = tokio::fs::read(audio_path).await?;
        let file_name = audio_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.mp3".to_string());

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(audio_mime(audio_path))
            .map_err(|e| AnisubError::Provider(format!("Invalid audio part: {}", e)))?;
        let form = Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("response_format", "srt");

        let response = self
            .client
            .post(endpoint(&self.base_url, "audio/transcriptions"))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AnisubError::Provider(format!("HTTP request failed: {}", e)))?;

        let srt = check_status(response, "OpenAI")
            .await?
            .text()
            .await
            .map_err(|e| AnisubError::Provider(format!("Failed to read transcription: {}", e)))?;

        info!("Transcribed {} ({} bytes of SRT)", audio_path.display(), srt.len());
        Ok(srt)
    }

    fn name(&self) -> &'static str {
        "OpenAI Whisper"
    }
}
