//! Time provider abstraction.
//!
//! Registry lock expiry, sender idle tracking and retry delays all read time
//! through [`TimeProvider`] so tests can run on a paused clock.

use std::time::Duration;

use async_trait::async_trait;

/// Provider trait for time operations.
///
/// `now()` is a monotonic duration since the provider was created, not a
/// wall-clock timestamp.
#[async_trait(?Send)]
pub trait TimeProvider: Clone {
    /// Sleep for the specified duration.
    async fn sleep(&self, duration: Duration);

    /// Monotonic time elapsed since provider creation.
    fn now(&self) -> Duration;
}

/// Time provider using Tokio's time facilities.
///
/// Built on `tokio::time::Instant`, so it follows a paused test clock.
#[derive(Debug, Clone)]
pub struct TokioTimeProvider {
    start_time: tokio::time::Instant,
}

impl TokioTimeProvider {
    /// Create a new Tokio time provider.
    pub fn new() -> Self {
        Self {
            start_time: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioTimeProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl TimeProvider for TokioTimeProvider {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn now(&self) -> Duration {
        self.start_time.elapsed()
    }
}
