use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::{AnisubError, Result};

pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which provider translates the merged document
    pub translator: TranslatorKind,
    pub storage: StorageConfig,
    pub media: MediaConfig,
    pub pipeline: PipelineConfig,
    pub openai: OpenAIConfig,
    pub gemini: GeminiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Scratch space for uploaded media, extracted audio and chunk directories
    pub upload_dir: PathBuf,
    /// Where finished subtitle files are written
    pub output_dir: PathBuf,
    /// JSON file backing the task store
    pub tasks_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Path to ffmpeg binary
    pub ffmpeg_path: String,
    /// Path to ffprobe binary
    pub ffprobe_path: String,
    /// Codec used when extracting the audio track
    pub audio_codec: String,
    /// Bitrate used when extracting the audio track
    pub audio_bitrate: String,
    /// Extension of the extracted audio and of every chunk
    pub chunk_extension: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Length of each audio chunk, also the timestamp offset step
    pub segment_seconds: u32,
    /// Number of subtitle blocks per translation request
    pub group_size: usize,
    /// Target language code (used in prompts and the output file name)
    pub target_language: String,
    /// Maximum in-flight transcription requests
    pub transcribe_concurrency: usize,
    /// Upper bound for a single provider call
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TranslatorKind {
    #[default]
    Gemini,
    OpenAI,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAIConfig {
    /// API key; `OPENAI_API_KEY` takes precedence
    pub api_key: Option<String>,
    pub base_url: String,
    pub transcribe_model: String,
    pub translate_model: String,
    pub temperature: f32,
    /// Parallel translation requests
    pub concurrency: usize,
    /// Pause after each translation request before its slot is released
    pub cooldown_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    /// API key; `GEMINI_API_KEY` takes precedence
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub concurrency: usize,
    pub cooldown_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            output_dir: PathBuf::from("outputs"),
            tasks_file: PathBuf::from("tasks.json"),
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            audio_codec: "mp3".to_string(),
            audio_bitrate: "64k".to_string(),
            chunk_extension: "mp3".to_string(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            segment_seconds: 60,
            group_size: 50,
            target_language: "ko".to_string(),
            transcribe_concurrency: 8,
            request_timeout_secs: 180,
        }
    }
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            transcribe_model: "whisper-1".to_string(),
            translate_model: "gpt-4.1-nano".to_string(),
            temperature: 0.3,
            concurrency: 5,
            cooldown_ms: 0,
        }
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-2.0-flash-lite".to_string(),
            concurrency: 3,
            cooldown_ms: 2000,
        }
    }
}

impl OpenAIConfig {
    pub fn require_api_key(&self) -> Result<&str> {
        non_empty_key(self.api_key.as_deref())
            .ok_or_else(|| AnisubError::Config("OpenAI API Key is missing.".to_string()))
    }
}

impl GeminiConfig {
    pub fn require_api_key(&self) -> Result<&str> {
        non_empty_key(self.api_key.as_deref())
            .ok_or_else(|| AnisubError::Config("Gemini API Key is missing.".to_string()))
    }
}

impl PipelineConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AnisubError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| AnisubError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| AnisubError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| AnisubError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Load from an explicit path, else `./config.toml` when present, else defaults.
    /// Credentials from the environment (and `.env`) override the file.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if dotenvy::dotenv().is_ok() {
            info!("Loaded environment from .env");
        }

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new("config.toml").exists() => {
                info!("Found config.toml in current directory, loading...");
                Self::from_file("config.toml")?
            }
            None => Self::default(),
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(key) = non_empty_env(OPENAI_API_KEY_ENV) {
            self.openai.api_key = Some(key);
        }
        if let Some(key) = non_empty_env(GEMINI_API_KEY_ENV) {
            self.gemini.api_key = Some(key);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.pipeline.segment_seconds == 0 {
            return Err(AnisubError::Config("segment_seconds must be greater than 0".to_string()));
        }
        if self.pipeline.group_size == 0 {
            return Err(AnisubError::Config("group_size must be greater than 0".to_string()));
        }
        if self.pipeline.transcribe_concurrency == 0
            || self.openai.concurrency == 0
            || self.gemini.concurrency == 0
        {
            return Err(AnisubError::Config("concurrency limits must be greater than 0".to_string()));
        }
        Ok(())
    }

    pub fn require_openai_key(&self) -> Result<&str> {
        self.openai.require_api_key()
    }

    /// Key of the provider selected in `translator`
    pub fn require_translator_key(&self) -> Result<&str> {
        match self.translator {
            TranslatorKind::Gemini => self.gemini.require_api_key(),
            TranslatorKind::OpenAI => self.openai.require_api_key(),
        }
    }

    /// Create the upload and output directories
    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.storage.upload_dir)?;
        std::fs::create_dir_all(&self.storage.output_dir)?;
        Ok(())
    }
}

fn non_empty_key(key: Option<&str>) -> Option<&str> {
    key.filter(|k| !k.trim().is_empty())
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
