//! Sleep abstraction used between delivery attempts

use std::time::Duration;

use async_trait::async_trait;

/// Suspends the current task for a duration
///
/// The delivery executor waits through this trait so tests can record the
/// backoff schedule instead of sleeping.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
