use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnisubError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Extraction, probing or splitting failed. Fatal for the run.
    #[error("Media processing error: {0}")]
    Media(String),

    /// A single chunk or group request failed. Recovered by the coordinators.
    #[error("Provider request error: {0}")]
    Provider(String),

    /// Missing credential or invalid setting. Raised before any work starts.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Run-level failure, reported verbatim in the task status
    #[error("{0}")]
    Pipeline(String),

    #[error("Subtitle format error: {0}")]
    Subtitle(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),
}

pub type Result<T> = std::result::Result<T, AnisubError>;
