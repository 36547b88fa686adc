// Translation providers and the grouped parallel coordinator
//
// - Gemini: generateContent with a small concurrency and a per-request cooldown
// - OpenAI: chat completions with wider concurrency
//
// Each provider states its own dispatch policy so the coordinator never
// branches on which provider it drives.

pub mod common;
pub mod gemini;
pub mod openai;
pub mod parallel;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub use common::*;
pub use parallel::ParallelTranslator;

use crate::config::{Config, TranslatorKind};
use crate::error::Result;

/// How many requests may be in flight and how long each slot rests afterwards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchPolicy {
    pub concurrency: usize,
    pub cooldown: Duration,
}

impl DispatchPolicy {
    pub fn new(concurrency: usize, cooldown_ms: u64) -> Self {
        Self {
            concurrency: concurrency.max(1),
            cooldown: Duration::from_millis(cooldown_ms),
        }
    }
}

/// Main trait for translation operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranslationProvider: Send + Sync {
    /// Send one instruction prompt, return the cleaned response text
    async fn translate(&self, prompt: &str) -> Result<String>;

    /// Provider name for logs
    fn name(&self) -> &'static str;

    fn dispatch_policy(&self) -> DispatchPolicy;
}

/// Factory for creating translation providers
pub struct TranslatorFactory;

impl TranslatorFactory {
    /// Create the provider selected in the config; fails when its key is missing
    pub fn create_provider(config: &Config) -> Result<Arc<dyn TranslationProvider>> {
        let timeout = config.pipeline.request_timeout();
        match config.translator {
            TranslatorKind::Gemini => Ok(Arc::new(gemini::GeminiTranslator::new(&config.gemini, timeout)?)),
            TranslatorKind::OpenAI => Ok(Arc::new(openai::OpenAITranslator::new(&config.openai, timeout)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnisubError;

    #[test]
    fn test_factory_follows_selected_provider() {
        let mut config = Config::default();
        config.gemini.api_key = Some("g-key".to_string());

        let provider = TranslatorFactory::create_provider(&config).unwrap();
        assert_eq!(provider.name(), "Gemini");
        assert_eq!(provider.dispatch_policy(), DispatchPolicy::new(3, 2000));

        config.translator = TranslatorKind::OpenAI;
        assert!(matches!(
            TranslatorFactory::create_provider(&config),
            Err(AnisubError::Config(_))
        ));

        config.openai.api_key = Some("o-key".to_string());
        let provider = TranslatorFactory::create_provider(&config).unwrap();
        assert_eq!(provider.name(), "OpenAI");
        assert_eq!(provider.dispatch_policy().concurrency, 5);
        assert!(provider.dispatch_policy().cooldown.is_zero());
    }

    #[test]
    fn test_policy_never_zero_slots() {
        assert_eq!(DispatchPolicy::new(0, 0).concurrency, 1);
    }
}
