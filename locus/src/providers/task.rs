//! Task spawning abstraction for single-threaded execution.

use std::future::Future;

/// Provider for spawning local tasks.
///
/// Everything in this crate is `!Send` (`Rc`, `RefCell`), so tasks run on
/// the current thread and must be spawned inside a `tokio::task::LocalSet`.
pub trait TaskProvider: Clone {
    /// Spawn a named task that runs on the current thread.
    fn spawn_task<F>(&self, name: &str, future: F) -> tokio::task::JoinHandle<()>
    where
        F: Future<Output = ()> + 'static;
}

/// Tokio-based task provider using `spawn_local`.
#[derive(Debug, Clone, Default)]
pub struct TokioTaskProvider;

impl TaskProvider for TokioTaskProvider {
    fn spawn_task<F>(&self, name: &str, future: F) -> tokio::task::JoinHandle<()>
    where
        F: Future<Output = ()> + 'static,
    {
        let task_name = name.to_string();
        tokio::task::spawn_local(async move {
            tracing::trace!(task = %task_name, "task started");
            future.await;
            tracing::trace!(task = %task_name, "task finished");
        })
    }
}
