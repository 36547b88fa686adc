use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::{TranslationProvider, build_translation_prompt, group_blocks};
use crate::error::AnisubError;
use crate::progress::ProgressSink;

/// Translates an SRT document in groups of blocks, in parallel, under the
/// provider's dispatch policy. A group whose request fails keeps its original
/// text so the output never loses lines.
pub struct ParallelTranslator {
    provider: Arc<dyn TranslationProvider>,
    group_size: usize,
    request_timeout: Duration,
}

impl ParallelTranslator {
    pub fn new(provider: Arc<dyn TranslationProvider>, group_size: usize, request_timeout: Duration) -> Self {
        Self {
            provider,
            group_size: group_size.max(1),
            request_timeout,
        }
    }

    pub async fn translate_all(&self, content: &str, target_language: &str, progress: &dyn ProgressSink) -> String {
        let groups = group_blocks(content, self.group_size);
        let total = groups.len();
        if total == 0 {
            return String::new();
        }

        let policy = self.provider.dispatch_policy();
        info!(
            "Translating {} groups to {} with {} (concurrency {}, cooldown {}ms)",
            total,
            target_language,
            self.provider.name(),
            policy.concurrency,
            policy.cooldown.as_millis()
        );

        let semaphore = Arc::new(Semaphore::new(policy.concurrency));
        let mut tasks = JoinSet::new();

        for (position, group) in groups.iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let provider = Arc::clone(&self.provider);
            let prompt = build_translation_prompt(group, target_language);
            let timeout = self.request_timeout;
            let cooldown = policy.cooldown;

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (position, Err(AnisubError::Provider("Semaphore closed".to_string())));
                };
                let result = match tokio::time::timeout(timeout, provider.translate(&prompt)).await {
                    Ok(result) => result,
                    Err(_) => Err(AnisubError::Provider(format!(
                        "Translation timed out after {}s",
                        timeout.as_secs()
                    ))),
                };
                // The slot stays taken through the cooldown
                if !cooldown.is_zero() {
                    tokio::time::sleep(cooldown).await;
                }
                (position, result)
            });
        }

        let mut translated = groups.clone();
        let mut completed = 0;
        let mut failed = 0;

        while let Some(joined) = tasks.join_next().await {
            completed += 1;
            match joined {
                Ok((position, Ok(text))) => translated[position] = text,
                Ok((position, Err(e))) => {
                    failed += 1;
                    error!("Translation failed for group {}: {}", position + 1, e);
                }
                Err(e) => {
                    failed += 1;
                    error!("Translation task aborted: {}", e);
                }
            }
            progress.advance(completed, total).await;
        }

        if failed > 0 {
            warn!("{} of {} groups kept their original text", failed, total);
        }

        translated.join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::progress::NoProgress;
    use crate::subtitle::{SubtitleDocument, split_blocks};
    use crate::translate::{DispatchPolicy, MockTranslationProvider};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    fn document(blocks: usize) -> String {
        (1..=blocks)
            .map(|i| {
                format!(
                    "{}\n00:{:02}:{:02},000 --> 00:{:02}:{:02},500\nline {}\n",
                    i,
                    i / 60,
                    i % 60,
                    i / 60,
                    i % 60,
                    i
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn input_of(prompt: &str) -> &str {
        prompt.split_once("Input:\n").map(|(_, input)| input.trim_end()).unwrap_or("")
    }

    /// Echoes the group with dialogue upper-cased; the first group is slowest
    struct SlowFirst {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TranslationProvider for SlowFirst {
        async fn translate(&self, prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let input = input_of(prompt);
            let delay = if input.starts_with("1\n") { 300 } else { 10 };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(input.replace("line", "LINE"))
        }

        fn name(&self) -> &'static str {
            "slow-first"
        }

        fn dispatch_policy(&self) -> DispatchPolicy {
            DispatchPolicy::new(3, 0)
        }
    }

    struct RecordingProgress(Mutex<Vec<(usize, usize)>>);

    #[async_trait]
    impl ProgressSink for RecordingProgress {
        async fn advance(&self, completed: usize, total: usize) {
            self.0.lock().unwrap().push((completed, total));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_groups_reassemble_in_order() {
        let provider = Arc::new(SlowFirst { calls: AtomicUsize::new(0) });
        let translator = ParallelTranslator::new(provider.clone(), 50, Duration::from_secs(60));
        let progress = RecordingProgress(Mutex::new(Vec::new()));

        let output = translator.translate_all(&document(120), "ko", &progress).await;

        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        let doc = SubtitleDocument::parse(&output);
        assert_eq!(doc.len(), 120);
        for (i, block) in doc.blocks.iter().enumerate() {
            assert_eq!(block.index, i + 1);
            assert_eq!(block.text, format!("LINE {}", i + 1));
        }
        assert_eq!(split_blocks(&output).len(), 120);

        let calls = progress.0.lock().unwrap().clone();
        assert_eq!(calls, vec![(1, 3), (2, 3), (3, 3)]);
    }

    #[tokio::test]
    async fn test_failed_group_keeps_original_text() {
        let mut mock = MockTranslationProvider::new();
        mock.expect_name().return_const("mock");
        mock.expect_dispatch_policy().return_const(DispatchPolicy::new(2, 0));
        mock.expect_translate().times(3).returning(|prompt| {
            let input = input_of(prompt);
            if input.starts_with("51\n") {
                Err(AnisubError::Provider("quota exceeded".to_string()))
            } else {
                Ok(input.replace("line", "translated"))
            }
        });

        let translator = ParallelTranslator::new(Arc::new(mock), 50, Duration::from_secs(5));
        let doc = SubtitleDocument::parse(&translator.translate_all(&document(120), "ko", &NoProgress).await);

        assert_eq!(doc.len(), 120);
        assert_eq!(doc.blocks[49].text, "translated 50");
        assert_eq!(doc.blocks[50].text, "line 51");
        assert_eq!(doc.blocks[99].text, "line 100");
        assert_eq!(doc.blocks[100].text, "translated 101");
    }

    #[tokio::test]
    async fn test_empty_document_makes_no_requests() {
        let mut mock = MockTranslationProvider::new();
        mock.expect_translate().never();
        mock.expect_dispatch_policy().never();

        let translator = ParallelTranslator::new(Arc::new(mock), 50, Duration::from_secs(5));
        assert_eq!(translator.translate_all("  \n\n ", "ko", &NoProgress).await, "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_holds_the_slot() {
        let mut mock = MockTranslationProvider::new();
        mock.expect_name().return_const("mock");
        mock.expect_dispatch_policy().return_const(DispatchPolicy::new(1, 2000));
        mock.expect_translate()
            .times(3)
            .returning(|prompt| Ok(input_of(prompt).to_string()));

        let translator = ParallelTranslator::new(Arc::new(mock), 50, Duration::from_secs(5));
        let started = Instant::now();
        let output = translator.translate_all(&document(120), "ja", &NoProgress).await;

        assert!(started.elapsed() >= Duration::from_secs(6));
        assert_eq!(SubtitleDocument::parse(&output).len(), 120);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_group_falls_back() {
        struct Hangs;

        #[async_trait]
        impl TranslationProvider for Hangs {
            async fn translate(&self, _prompt: &str) -> Result<String> {
                std::future::pending::<()>().await;
                Ok(String::new())
            }

            fn name(&self) -> &'static str {
                "hangs"
            }

            fn dispatch_policy(&self) -> DispatchPolicy {
                DispatchPolicy::new(1, 0)
            }
        }

        let source = document(3);
        let translator = ParallelTranslator::new(Arc::new(Hangs), 50, Duration::from_secs(10));
        let output = translator.translate_all(&source, "ko", &NoProgress).await;
        assert_eq!(split_blocks(&output), split_blocks(&source));
    }
}
