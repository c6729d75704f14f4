//! Client-side address cache for one location type.
//!
//! # Call path
//!
//! ```text
//! call(key, req)
//!   │ entry = get-or-create(key), gen = entry.generation
//!   │ sticky? ──────────────────────────────► failure response, no I/O
//!   ▼
//! ┌─► cached address? ── no ──► lock(key) ─ check gen ─ resolver.resolve ─ check gen ─ cache
//! │   sticky? ──────────────────────────────► failure response
//! │   no address? ── set sticky ────────────► TargetNotFound response
//! │   transport.call ─ check gen ─ touch
//! │   TargetNotFound:
//! │     clear address, failures += 1
//! │     failures == budget? ── set sticky ──► TargetNotFound response
//! └──── sleep(retry_delay) ─ check gen ─ clear address
//! ```
//!
//! Every suspension is followed by a generation check. If the entry was
//! evicted (by the reaper or [`LocationSender::remove`]) while the call was
//! suspended, the call fails with [`SenderError::Stale`] and touches nothing.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::SenderError;
use crate::providers::{Providers, TaskProvider, TimeProvider};
use crate::registry::LocationResolver;
use crate::sync::KeyedMutex;
use crate::transport::{CorrelationIds, ErrorCode, Request, Response, Transport, TransportError};
use crate::types::{Address, LocationKey, LocationType, RpcId};

use super::config::SenderConfig;
use super::entry::{SenderEntry, SenderEntrySnapshot};

/// Address cache and delivery front-end for one location type.
///
/// Cheap to clone; clones share the cache.
pub struct LocationSender<P: Providers, T: Transport, R: LocationResolver> {
    inner: Rc<SenderInner<P, T, R>>,
}

struct SenderInner<P: Providers, T: Transport, R: LocationResolver> {
    location_type: LocationType,
    providers: P,
    transport: Rc<T>,
    resolver: Rc<R>,
    config: SenderConfig,
    entries: RefCell<HashMap<LocationKey, Rc<SenderEntry>>>,
    locks: KeyedMutex<LocationKey>,
    next_generation: Cell<u64>,
    rpc_ids: CorrelationIds,
}

impl<P: Providers, T: Transport, R: LocationResolver> Clone for LocationSender<P, T, R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P: Providers, T: Transport, R: LocationResolver> std::fmt::Debug for LocationSender<P, T, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationSender")
            .field("location_type", &self.inner.location_type)
            .field("entries", &self.inner.entries.borrow().len())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl<P, T, R> LocationSender<P, T, R>
where
    P: Providers,
    T: Transport + 'static,
    R: LocationResolver + 'static,
{
    /// Create a sender for `location_type`.
    pub fn new(
        location_type: LocationType,
        providers: P,
        transport: Rc<T>,
        resolver: Rc<R>,
        config: SenderConfig,
    ) -> Self {
        Self {
            inner: Rc::new(SenderInner {
                location_type,
                providers,
                transport,
                resolver,
                config,
                entries: RefCell::new(HashMap::new()),
                locks: KeyedMutex::new(),
                next_generation: Cell::new(1),
                rpc_ids: CorrelationIds::new(),
            }),
        }
    }

    /// Location type served by this sender.
    pub fn location_type(&self) -> LocationType {
        self.inner.location_type
    }

    /// Configuration in use.
    pub fn config(&self) -> &SenderConfig {
        &self.inner.config
    }

    pub(crate) fn providers(&self) -> &P {
        &self.inner.providers
    }

    /// Deliver `request` to whoever currently serves `key` and wait for the
    /// response.
    ///
    /// A target that stays unreachable for the whole retry budget is not an
    /// error: the `TargetNotFound` response is returned and remembered, and
    /// later calls for `key` get it back immediately until the entry is
    /// evicted.
    ///
    /// # Errors
    ///
    /// - [`SenderError::Stale`] if the key's entry was evicted while the call
    ///   was suspended.
    /// - [`SenderError::Timeout`] / [`SenderError::Protocol`] from the
    ///   response code, or a mismatched correlation id.
    /// - [`SenderError::Transport`] if delivery itself failed.
    /// - [`SenderError::Resolve`] if the resolver failed.
    pub async fn call(&self, key: LocationKey, mut request: Request) -> Result<Response, SenderError> {
        let entry = self.get_or_create(key);
        let generation = entry.generation();
        let rpc_id = self.inner.rpc_ids.next_id();
        request.rpc_id = rpc_id;
        request.key = key;

        if let Some(code) = entry.sticky_error() {
            return Ok(self.sticky_response(key, rpc_id, code));
        }

        let budget = self.inner.config.retry_budget();
        let mut failures = 0u32;
        loop {
            let address = match entry.address() {
                Some(address) => Some(address),
                None => self.resolve(&entry, key, generation).await?,
            };

            if let Some(code) = entry.sticky_error() {
                return Ok(self.sticky_response(key, rpc_id, code));
            }

            let Some(address) = address else {
                // After a TargetNotFound, unresolved means the key is locked
                // for migration or not yet re-registered: a failed attempt.
                if failures > 0 {
                    failures += 1;
                    if failures < budget {
                        tracing::debug!(
                            location_type = %self.inner.location_type,
                            key = %key,
                            attempt = failures,
                            "key unresolved, retrying"
                        );
                        self.wait_retry(key, generation).await?;
                        continue;
                    }
                }

                entry.set_sticky_error(ErrorCode::TargetNotFound);
                tracing::warn!(
                    location_type = %self.inner.location_type,
                    key = %key,
                    attempts = failures,
                    "no address registered, marking target not found"
                );
                return Ok(Response::failure(
                    rpc_id,
                    ErrorCode::TargetNotFound,
                    format!("no address for key {}", key),
                ));
            };

            let result = self.inner.transport.call(&address, request.clone()).await;
            self.ensure_current(key, generation)?;
            entry.touch(self.inner.providers.time().now());

            let response = match result {
                Ok(response) => response,
                Err(TransportError::Timeout) => return Err(SenderError::Timeout { key }),
                Err(e) => return Err(SenderError::Transport(e)),
            };

            if response.rpc_id != rpc_id {
                return Err(SenderError::Protocol {
                    key,
                    reason: format!("expected {}, got {}", rpc_id, response.rpc_id),
                });
            }

            let code = response.error;
            match code {
                ErrorCode::TargetNotFound => {
                    entry.clear_address();
                    failures += 1;
                    if failures >= budget {
                        entry.set_sticky_error(ErrorCode::TargetNotFound);
                        tracing::warn!(
                            location_type = %self.inner.location_type,
                            key = %key,
                            attempts = failures,
                            "retry budget exhausted"
                        );
                        return Ok(response);
                    }

                    tracing::debug!(
                        location_type = %self.inner.location_type,
                        key = %key,
                        address = %address,
                        attempt = failures,
                        "target not found, retrying"
                    );
                    self.wait_retry(key, generation).await?;
                    entry.clear_address();
                }
                ErrorCode::Timeout => return Err(SenderError::Timeout { key }),
                ErrorCode::Protocol => {
                    return Err(SenderError::Protocol {
                        key,
                        reason: response
                            .message
                            .unwrap_or_else(|| "remote protocol error".to_string()),
                    })
                }
                _ => return Ok(response),
            }
        }
    }

    /// Deliver `request` to whoever currently serves `key`, without waiting
    /// for a reply.
    ///
    /// With a cached route the request goes out immediately. Otherwise a
    /// local task resolves the key first. Failures are logged and dropped.
    pub fn send(&self, key: LocationKey, mut request: Request) {
        let entry = self.get_or_create(key);
        request.rpc_id = self.inner.rpc_ids.next_id();
        request.key = key;

        if let Some(code) = entry.sticky_error() {
            tracing::debug!(
                location_type = %self.inner.location_type,
                key = %key,
                code = %code,
                "send dropped: sticky error"
            );
            return;
        }

        if let Some(address) = entry.address() {
            self.inner.transport.send(&address, request);
            entry.touch(self.inner.providers.time().now());
            return;
        }

        let sender = self.clone();
        self.inner
            .providers
            .task()
            .spawn_task("location_send", async move {
                if let Err(e) = sender.send_resolved(&entry, key, request).await {
                    tracing::warn!(
                        location_type = %sender.inner.location_type,
                        key = %key,
                        error = %e,
                        "send failed"
                    );
                }
            });
    }

    /// Evict the entry for `key`.
    ///
    /// In-flight calls for the key fail with [`SenderError::Stale`] when they
    /// next resume. Returns whether an entry existed.
    pub fn remove(&self, key: LocationKey) -> bool {
        let removed = self.inner.entries.borrow_mut().remove(&key).is_some();
        if removed {
            tracing::debug!(
                location_type = %self.inner.location_type,
                key = %key,
                "sender entry removed"
            );
        }
        removed
    }

    /// Evict every entry idle for longer than the configured idle timeout.
    ///
    /// Returns the number of evicted entries.
    pub fn reap_idle(&self) -> usize {
        let now = self.inner.providers.time().now();
        let idle_timeout = self.inner.config.idle_timeout();

        let mut entries = self.inner.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|key, entry| {
            let keep = now.saturating_sub(entry.last_activity()) <= idle_timeout;
            if !keep {
                tracing::debug!(
                    location_type = %self.inner.location_type,
                    key = %key,
                    generation = entry.generation(),
                    "evicting idle sender entry"
                );
            }
            keep
        });
        before - entries.len()
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.inner.entries.borrow().len()
    }

    /// Whether no entry is cached.
    pub fn is_empty(&self) -> bool {
        self.inner.entries.borrow().is_empty()
    }

    /// Whether `key` has an entry.
    pub fn contains(&self, key: LocationKey) -> bool {
        self.inner.entries.borrow().contains_key(&key)
    }

    /// Copy of the entry for `key`.
    pub fn entry_snapshot(&self, key: LocationKey) -> Option<SenderEntrySnapshot> {
        self.inner.entries.borrow().get(&key).map(|e| e.snapshot())
    }

    fn get_or_create(&self, key: LocationKey) -> Rc<SenderEntry> {
        let mut entries = self.inner.entries.borrow_mut();
        entries
            .entry(key)
            .or_insert_with(|| {
                let generation = self.inner.next_generation.get();
                self.inner.next_generation.set(generation + 1);
                tracing::trace!(
                    location_type = %self.inner.location_type,
                    key = %key,
                    generation,
                    "sender entry created"
                );
                Rc::new(SenderEntry::new(
                    generation,
                    self.inner.providers.time().now(),
                ))
            })
            .clone()
    }

    fn ensure_current(&self, key: LocationKey, generation: u64) -> Result<(), SenderError> {
        let current = self
            .inner
            .entries
            .borrow()
            .get(&key)
            .map(|entry| entry.generation());
        if current == Some(generation) {
            Ok(())
        } else {
            tracing::debug!(
                location_type = %self.inner.location_type,
                key = %key,
                generation,
                current = ?current,
                "sender entry went stale"
            );
            Err(SenderError::Stale { key })
        }
    }

    async fn wait_retry(&self, key: LocationKey, generation: u64) -> Result<(), SenderError> {
        self.inner
            .providers
            .time()
            .sleep(self.inner.config.retry_delay())
            .await;
        self.ensure_current(key, generation)
    }

    /// Resolve `key` under its mutex.
    ///
    /// A caller queued behind another resolution picks up the address (or
    /// sticky error) it left instead of querying again.
    async fn resolve(
        &self,
        entry: &SenderEntry,
        key: LocationKey,
        generation: u64,
    ) -> Result<Option<Address>, SenderError> {
        let _guard = self.inner.locks.lock(key).await;
        self.ensure_current(key, generation)?;

        if let Some(address) = entry.address() {
            return Ok(Some(address));
        }
        if entry.sticky_error().is_some() {
            return Ok(None);
        }

        let resolved = self
            .inner
            .resolver
            .resolve(self.inner.location_type, key)
            .await?;
        self.ensure_current(key, generation)?;

        tracing::debug!(
            location_type = %self.inner.location_type,
            key = %key,
            address = ?resolved,
            "resolved location"
        );
        entry.set_address(resolved.clone());
        Ok(resolved)
    }

    async fn send_resolved(
        &self,
        entry: &SenderEntry,
        key: LocationKey,
        request: Request,
    ) -> Result<(), SenderError> {
        let generation = entry.generation();
        let resolved = self.resolve(entry, key, generation).await?;

        if entry.sticky_error().is_some() {
            return Ok(());
        }
        match resolved {
            Some(address) => {
                self.inner.transport.send(&address, request);
                entry.touch(self.inner.providers.time().now());
            }
            None => {
                entry.set_sticky_error(ErrorCode::TargetNotFound);
                tracing::warn!(
                    location_type = %self.inner.location_type,
                    key = %key,
                    "send dropped: no address registered"
                );
            }
        }
        Ok(())
    }

    fn sticky_response(&self, key: LocationKey, rpc_id: RpcId, code: ErrorCode) -> Response {
        tracing::debug!(
            location_type = %self.inner.location_type,
            key = %key,
            code = %code,
            "short-circuit on sticky error"
        );
        Response::failure(rpc_id, code, format!("key {} previously failed: {}", key, code))
    }
}
