use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{DispatchPolicy, TranslationProvider, strip_code_fences};
use crate::config::GeminiConfig;
use crate::error::{AnisubError, Result};
use crate::http::{build_client, check_status, endpoint};

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

pub struct GeminiTranslator {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    policy: DispatchPolicy,
}

impl GeminiTranslator {
    pub fn new(config: &GeminiConfig, timeout: Duration) -> Result<Self> {
        let api_key = config.require_api_key()?.to_string();

        Ok(Self {
            client: build_client(timeout)?,
            api_key,
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            policy: DispatchPolicy::new(config.concurrency, config.cooldown_ms),
        })
    }
}

#[async_trait]
impl TranslationProvider for GeminiTranslator {
    async fn translate(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
        };

        let url = endpoint(&self.base_url, &format!("models/{}:generateContent", self.model));
        debug!("Gemini request to {} ({} prompt chars)", url, prompt.len());

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AnisubError::Provider(format!("HTTP request failed: {}", e)))?;

        let body: GenerateResponse = check_status(response, "Gemini")
            .await?
            .json()
            .await
            .map_err(|e| AnisubError::Provider(format!("Failed to parse Gemini response: {}", e)))?;

        let text: String = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        let cleaned = strip_code_fences(&text);
        if cleaned.is_empty() {
            return Err(AnisubError::Provider("Gemini returned an empty response".to_string()));
        }
        Ok(cleaned)
    }

    fn name(&self) -> &'static str {
        "Gemini"
    }

    fn dispatch_policy(&self) -> DispatchPolicy {
        self.policy
    }
}
