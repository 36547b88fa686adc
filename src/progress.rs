use async_trait::async_trait;

/// Receives `(completed, total)` as fan-out work resolves
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn advance(&self, completed: usize, total: usize);
}

/// Sink that ignores progress
pub struct NoProgress;

#[async_trait]
impl ProgressSink for NoProgress {
    async fn advance(&self, _completed: usize, _total: usize) {}
}

/// Map `completed / total` onto the `[low, high]` percent band
pub fn scale_progress(completed: usize, total: usize, low: u8, high: u8) -> u8 {
    if total == 0 {
        return high;
    }
    let span = high.saturating_sub(low) as usize;
    let done = completed.min(total);
    low + (done * span / total) as u8
}
