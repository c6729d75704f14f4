//! Runtime providers.
//!
//! Code in this crate never calls `tokio::time` or `tokio::task` directly;
//! it goes through a [`Providers`] bundle so the same registry and sender
//! logic can run under a real runtime or a controlled one.

mod task;
mod time;

pub use task::{TaskProvider, TokioTaskProvider};
pub use time::{TimeProvider, TokioTimeProvider};

/// Bundle of the provider types a shard needs.
///
/// Keeps `LocationRegistry<P>` and `LocationSender<P, ..>` at a single
/// type parameter instead of one per provider.
pub trait Providers: Clone + 'static {
    /// Time provider type for sleep and time queries.
    type Time: TimeProvider + Clone + 'static;

    /// Task provider type for spawning local tasks.
    type Task: TaskProvider + Clone + 'static;

    /// Get the time provider instance.
    fn time(&self) -> &Self::Time;

    /// Get the task provider instance.
    fn task(&self) -> &Self::Task;
}

/// Production providers using the Tokio runtime.
#[derive(Debug, Clone, Default)]
pub struct TokioProviders {
    time: TokioTimeProvider,
    task: TokioTaskProvider,
}

impl TokioProviders {
    /// Create a new production providers bundle.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Providers for TokioProviders {
    type Time = TokioTimeProvider;
    type Task = TokioTaskProvider;

    fn time(&self) -> &Self::Time {
        &self.time
    }

    fn task(&self) -> &Self::Task {
        &self.task
    }
}
