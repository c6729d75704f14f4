//! Periodic eviction of idle sender entries.

use tokio::task::JoinHandle;

use crate::providers::{Providers, TaskProvider, TimeProvider};
use crate::registry::LocationResolver;
use crate::transport::Transport;

use super::location_sender::LocationSender;

/// Handle to a running reaper task.
///
/// The task is aborted when the handle is stopped or dropped.
#[derive(Debug)]
pub struct ReaperHandle {
    task: Option<JoinHandle<()>>,
}

impl ReaperHandle {
    /// Stop the reaper. Idempotent.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Whether the reaper task is still scheduled.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for ReaperHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Start sweeping `sender` every `reap_interval`.
///
/// Must be called inside a `LocalSet`. Each sweep evicts entries idle for
/// longer than `idle_timeout`; calls racing an eviction fail with
/// [`SenderError::Stale`](crate::SenderError::Stale).
pub fn spawn_reaper<P, T, R>(sender: &LocationSender<P, T, R>) -> ReaperHandle
where
    P: Providers,
    T: Transport + 'static,
    R: LocationResolver + 'static,
{
    let sweeper = sender.clone();
    let interval = sender.config().reap_interval();
    let task = sender
        .providers()
        .task()
        .spawn_task("location_reaper", async move {
            tracing::debug!(
                location_type = %sweeper.location_type(),
                interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
                "reaper started"
            );
            loop {
                sweeper.providers().time().sleep(interval).await;
                let evicted = sweeper.reap_idle();
                if evicted > 0 {
                    tracing::debug!(
                        location_type = %sweeper.location_type(),
                        evicted,
                        remaining = sweeper.len(),
                        "reaper sweep"
                    );
                }
            }
        });

    ReaperHandle { task: Some(task) }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::net::{IpAddr, Ipv4Addr};
    use std::rc::Rc;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::error::RegistryError;
    use crate::providers::TokioProviders;
    use crate::sender::SenderConfig;
    use crate::transport::{Request, Response, TransportError};
    use crate::types::{Address, LocationKey, LocationType, NetworkAddress, UID};

    use super::*;

    struct Echo;

    #[async_trait(?Send)]
    impl Transport for Echo {
        fn send(&self, _to: &Address, _request: Request) {}

        async fn call(&self, _to: &Address, request: Request) -> Result<Response, TransportError> {
            Ok(Response::ok(request.rpc_id, request.body))
        }
    }

    struct CountingResolver {
        lookups: Cell<usize>,
    }

    #[async_trait(?Send)]
    impl LocationResolver for CountingResolver {
        async fn resolve(
            &self,
            _location_type: LocationType,
            _key: LocationKey,
        ) -> Result<Option<Address>, RegistryError> {
            self.lookups.set(self.lookups.get() + 1);
            Ok(Some(Address::new(
                NetworkAddress::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 4500),
                UID::new(1, 1),
            )))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_evicts_after_idle_timeout() {
        tokio::task::LocalSet::new()
            .run_until(async {
                let resolver = Rc::new(CountingResolver {
                    lookups: Cell::new(0),
                });
                let sender = LocationSender::new(
                    LocationType(1),
                    TokioProviders::new(),
                    Rc::new(Echo),
                    resolver.clone(),
                    SenderConfig::default(),
                );
                let key = LocationKey::new(42);
                let mut reaper = spawn_reaper(&sender);

                sender
                    .call(key, Request::new(key, Vec::new()))
                    .await
                    .expect("call");
                assert!(sender.contains(key));

                // Sweeps up to t=120s see it idle for at most the timeout.
                tokio::time::sleep(Duration::from_secs(125)).await;
                assert!(sender.contains(key));

                // The t=130s sweep evicts it.
                tokio::time::sleep(Duration::from_secs(10)).await;
                assert!(!sender.contains(key));

                sender
                    .call(key, Request::new(key, Vec::new()))
                    .await
                    .expect("call");
                assert_eq!(resolver.lookups.get(), 2);

                assert!(reaper.is_running());
                reaper.stop();
                assert!(!reaper.is_running());
            })
            .await;
    }
}
