use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::Transcriber;
use crate::error::{AnisubError, Result};
use crate::media::AudioChunk;
use crate::merge::TimelineMerger;
use crate::progress::ProgressSink;

/// Transcribes every chunk concurrently and merges the results in chunk order.
///
/// A failed or timed-out chunk contributes nothing; the rest of the timeline is
/// still merged with contiguous sequence numbers.
pub struct ParallelTranscriber {
    transcriber: Arc<dyn Transcriber>,
    concurrency: usize,
    request_timeout: Duration,
}

impl ParallelTranscriber {
    pub fn new(transcriber: Arc<dyn Transcriber>, concurrency: usize, request_timeout: Duration) -> Self {
        Self {
            transcriber,
            concurrency: concurrency.max(1),
            request_timeout,
        }
    }

    /// Transcribe `chunks` (in chronological order) and return the merged SRT.
    /// An empty string means no chunk produced subtitles.
    pub async fn transcribe_all(
        &self,
        chunks: &[AudioChunk],
        segment_seconds: f64,
        progress: &dyn ProgressSink,
    ) -> String {
        let total = chunks.len();
        info!(
            "Starting parallel transcription for {} chunks with {} ({} at a time)...",
            total,
            self.transcriber.name(),
            self.concurrency
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for (position, chunk) in chunks.iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let transcriber = Arc::clone(&self.transcriber);
            let path = chunk.path.clone();
            let timeout = self.request_timeout;

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (position, Err(AnisubError::Provider("Semaphore closed".to_string())));
                };
                let result = match tokio::time::timeout(timeout, transcriber.transcribe(&path)).await {
                    Ok(result) => result,
                    Err(_) => Err(AnisubError::Provider(format!(
                        "Transcription timed out after {}s",
                        timeout.as_secs()
                    ))),
                };
                (position, result)
            });
        }

        let mut partials: Vec<String> = vec![String::new(); total];
        let mut completed = 0;
        let mut failed = 0;

        while let Some(joined) = tasks.join_next().await {
            completed += 1;
            match joined {
                Ok((position, Ok(srt))) => partials[position] = srt,
                Ok((position, Err(e))) => {
                    failed += 1;
                    error!("Chunk transcription failed for {}: {}", chunks[position].path.display(), e);
                }
                Err(e) => {
                    failed += 1;
                    error!("Chunk transcription task aborted: {}", e);
                }
            }
            progress.advance(completed, total).await;
        }

        if failed > 0 {
            warn!("{} of {} chunks failed and were left out", failed, total);
        }

        let mut merger = TimelineMerger::new(segment_seconds);
        for (position, partial) in partials.iter().enumerate() {
            merger.push(position, partial);
        }
        info!(
            "Merged {} chunks ({} without subtitles)",
            merger.chunks_merged(),
            merger.chunks_skipped()
        );
        let document = merger.finish();
        info!("Merged transcription has {} subtitle blocks", document.len());

        document.to_srt()
    }

    /// Transcribe and fail when nothing came back
    pub async fn transcribe_required(
        &self,
        chunks: &[AudioChunk],
        segment_seconds: f64,
        progress: &dyn ProgressSink,
    ) -> Result<String> {
        let srt = self.transcribe_all(chunks, segment_seconds, progress).await;
        if srt.trim().is_empty() {
            return Err(AnisubError::Pipeline("Transcription produced no subtitles".to_string()));
        }
        Ok(srt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use crate::subtitle::SubtitleDocument;
    use crate::transcribe::MockTranscriber;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn chunks(n: usize) -> Vec<AudioChunk> {
        (0..n)
            .map(|index| AudioChunk {
                index,
                path: PathBuf::from(format!("/chunks/a_{:03}.mp3", index)),
                segment_seconds: 60.0,
            })
            .collect()
    }

    fn local_srt(label: &str) -> String {
        format!(
            "1\n00:00:01,000 --> 00:00:05,000\n{label} one\n\n2\n00:00:10,000 --> 00:00:12,500\n{label} two\n"
        )
    }

    fn chunk_number(path: &Path) -> usize {
        let stem = path.file_stem().unwrap().to_string_lossy();
        stem.rsplit('_').next().unwrap().parse().unwrap()
    }

    /// Later chunks finish first; tracks peak concurrency
    struct ReverseLatency {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Transcriber for ReverseLatency {
        async fn transcribe(&self, audio_path: &Path) -> Result<String> {
            let n = chunk_number(audio_path);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(((6 - n) * 10) as u64)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(local_srt(&format!("chunk{}", n)))
        }

        fn name(&self) -> &'static str {
            "reverse"
        }
    }

    struct RecordingProgress(Mutex<Vec<(usize, usize)>>);

    #[async_trait]
    impl ProgressSink for RecordingProgress {
        async fn advance(&self, completed: usize, total: usize) {
            self.0.lock().unwrap().push((completed, total));
        }
    }

    #[tokio::test]
    async fn test_merge_ignores_completion_order() {
        let provider = Arc::new(ReverseLatency {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let coordinator = ParallelTranscriber::new(provider.clone(), 2, Duration::from_secs(5));
        let progress = RecordingProgress(Mutex::new(Vec::new()));

        let srt = coordinator.transcribe_all(&chunks(6), 60.0, &progress).await;
        let doc = SubtitleDocument::parse(&srt);

        assert_eq!(doc.len(), 12);
        for (i, block) in doc.blocks.iter().enumerate() {
            assert_eq!(block.index, i + 1);
        }
        for pair in doc.blocks.windows(2) {
            assert!(pair[0].start_ms <= pair[1].start_ms);
        }
        assert_eq!(doc.blocks[0].text, "chunk0 one");
        assert_eq!(doc.blocks[10].text, "chunk5 one");
        assert_eq!(doc.blocks[10].start_ms, 301_000);

        assert!(provider.peak.load(Ordering::SeqCst) <= 2);
        let calls = progress.0.lock().unwrap().clone();
        assert_eq!(calls.len(), 6);
        assert_eq!(calls.last(), Some(&(6, 6)));
    }

    #[tokio::test]
    async fn test_failed_chunk_keeps_numbering_contiguous() {
        let mut mock = MockTranscriber::new();
        mock.expect_name().return_const("mock");
        mock.expect_transcribe().times(3).returning(|path| {
            match chunk_number(path) {
                1 => Err(AnisubError::Provider("rate limited".to_string())),
                n => Ok(local_srt(&format!("chunk{}", n))),
            }
        });

        let coordinator = ParallelTranscriber::new(Arc::new(mock), 4, Duration::from_secs(5));
        let doc = SubtitleDocument::parse(&coordinator.transcribe_all(&chunks(3), 60.0, &NoProgress).await);

        assert_eq!(doc.len(), 4);
        assert_eq!(
            doc.blocks.iter().map(|b| b.index).collect::<Vec<_>>(),
            vec![1, 2, 3, 4]
        );
        assert_eq!(doc.blocks[2].text, "chunk2 one");
        assert_eq!(doc.blocks[2].start_ms, 121_000);
        assert_eq!(doc.blocks[3].end_ms, 132_500);
    }

    #[tokio::test]
    async fn test_all_failures_yield_empty_and_required_errors() {
        let mut mock = MockTranscriber::new();
        mock.expect_name().return_const("mock");
        mock.expect_transcribe()
            .returning(|_| Err(AnisubError::Provider("down".to_string())));

        let coordinator = ParallelTranscriber::new(Arc::new(mock), 4, Duration::from_secs(5));
        assert_eq!(coordinator.transcribe_all(&chunks(2), 60.0, &NoProgress).await, "");
        assert!(matches!(
            coordinator.transcribe_required(&chunks(2), 60.0, &NoProgress).await,
            Err(AnisubError::Pipeline(_))
        ));
    }

    struct Stuck;

    #[async_trait]
    impl Transcriber for Stuck {
        async fn transcribe(&self, audio_path: &Path) -> Result<String> {
            if chunk_number(audio_path) == 0 {
                std::future::pending::<()>().await;
            }
            Ok(local_srt("late"))
        }

        fn name(&self) -> &'static str {
            "stuck"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_chunk_times_out() {
        let coordinator = ParallelTranscriber::new(Arc::new(Stuck), 2, Duration::from_secs(30));
        let doc = SubtitleDocument::parse(&coordinator.transcribe_all(&chunks(2), 60.0, &NoProgress).await);

        assert_eq!(doc.len(), 2);
        assert_eq!(doc.blocks[0].index, 1);
        assert_eq!(doc.blocks[0].start_ms, 61_000);
    }
}
