use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{DispatchPolicy, TranslationProvider, strip_code_fences};
use crate::config::OpenAIConfig;
use crate::error::{AnisubError, Result};
use crate::http::{build_client, check_status, endpoint};

const SYSTEM_PROMPT: &str = "You are a helpful assistant.";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

pub struct OpenAITranslator {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    policy: DispatchPolicy,
}

impl OpenAITranslator {
    pub fn new(config: &OpenAIConfig, timeout: Duration) -> Result<Self> {
        let api_key = config.require_api_key()?.to_string();

        Ok(Self {
            client: build_client(timeout)?,
            api_key,
            base_url: config.base_url.clone(),
            model: config.translate_model.clone(),
            temperature: config.temperature,
            policy: DispatchPolicy::new(config.concurrency, config.cooldown_ms),
        })
    }
}

#[async_trait]
impl TranslationProvider for OpenAITranslator {
    async fn translate(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage { role: "system", content: SYSTEM_PROMPT },
                ChatMessage { role: "user", content: prompt },
            ],
            temperature: self.temperature,
        };
        debug!("OpenAI chat request with model {}", self.model);

        let response = self
            .client
            .post(endpoint(&self.base_url, "chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AnisubError::Provider(format!("HTTP request failed: {}", e)))?;

        let body: ChatResponse = check_status(response, "OpenAI")
            .await?
            .json()
            .await
            .map_err(|e| AnisubError::Provider(format!("Failed to parse OpenAI response: {}", e)))?;

        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        let cleaned = strip_code_fences(&text);
        if cleaned.is_empty() {
            return Err(AnisubError::Provider("OpenAI returned an empty response".to_string()));
        }
        Ok(cleaned)
    }

    fn name(&self) -> &'static str {
        "OpenAI"
    }

    fn dispatch_policy(&self) -> DispatchPolicy {
        self.policy
    }
}
