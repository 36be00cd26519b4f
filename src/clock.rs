use async_trait::async_trait;
use std::time::Duration;

/// Source of the booth's suspension points (countdown ticks, settle and
/// develop delays). Tests swap in a clock that returns immediately.
#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Wall-clock delays on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
