//! Authoritative key → address registry with migration locks.
//!
//! Every operation takes the key's mutex first, so all operations on one
//! key are totally ordered in arrival order while different keys proceed
//! independently.
//!
//! # Migration protocol
//!
//! ```text
//! owner A                      registry                     owner B
//!   │ lock(k, A, ttl) ───────────►│ Locked(A, now+ttl)
//!   │                             │   get(k) → None
//!   │ ── transfer entity ─────────┼──────────────────────────►│
//!   │ unlock(k, A, Some(B)) ─────►│ Unlocked(B)
//!   │                             │   get(k) → B
//!   │                             │
//!   │        (ttl elapses)        │ auto unlock(k, A, Some(A)) → NotLocked, ignored
//! ```
//!
//! The auto-unlock is never cancelled. It is made harmless by the holder
//! check in [`LocationRegistry::unlock`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use crate::error::RegistryError;
use crate::providers::{Providers, TaskProvider, TimeProvider};
use crate::sync::KeyedMutex;
use crate::types::{Address, LocationKey, LocationType};

use super::entry::{LockRecord, RegistryEntry, UnlockOutcome};

/// Registry for one location type.
///
/// Cheap to clone; clones share state.
pub struct LocationRegistry<P: Providers> {
    inner: Rc<RegistryInner<P>>,
}

struct RegistryInner<P: Providers> {
    location_type: LocationType,
    providers: P,
    entries: RefCell<HashMap<LocationKey, RegistryEntry>>,
    locks: KeyedMutex<LocationKey>,
}

impl<P: Providers> Clone for LocationRegistry<P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P: Providers> std::fmt::Debug for LocationRegistry<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationRegistry")
            .field("location_type", &self.inner.location_type)
            .field("entries", &self.inner.entries.borrow().len())
            .finish()
    }
}

impl<P: Providers> LocationRegistry<P> {
    /// Create an empty registry for `location_type`.
    pub fn new(location_type: LocationType, providers: P) -> Self {
        Self {
            inner: Rc::new(RegistryInner {
                location_type,
                providers,
                entries: RefCell::new(HashMap::new()),
                locks: KeyedMutex::new(),
            }),
        }
    }

    /// Location type served by this registry.
    pub fn location_type(&self) -> LocationType {
        self.inner.location_type
    }

    /// Register `address` as the current location of `key`.
    ///
    /// Idempotent; overwrites whatever state the key was in.
    pub async fn add(&self, key: LocationKey, address: Address) {
        let _guard = self.inner.locks.lock(key).await;
        tracing::debug!(
            location_type = %self.inner.location_type,
            key = %key,
            address = %address,
            "location added"
        );
        self.inner
            .entries
            .borrow_mut()
            .insert(key, RegistryEntry::Unlocked(Some(address)));
    }

    /// Forget `key`. Subsequent lookups report unresolved.
    pub async fn remove(&self, key: LocationKey) {
        let _guard = self.inner.locks.lock(key).await;
        let removed = self.inner.entries.borrow_mut().remove(&key);
        tracing::debug!(
            location_type = %self.inner.location_type,
            key = %key,
            existed = removed.is_some(),
            "location removed"
        );
    }

    /// Current address of `key`.
    ///
    /// `None` when the key is unknown, has no address, or is locked.
    pub async fn get(&self, key: LocationKey) -> Option<Address> {
        let _guard = self.inner.locks.lock(key).await;
        self.inner
            .entries
            .borrow()
            .get(&key)
            .and_then(|entry| entry.resolved().cloned())
    }

    /// Lock `key` for migration on behalf of `holder`.
    ///
    /// Hides the key's address until [`unlock`](Self::unlock) is called or
    /// `ttl` elapses, whichever comes first. On expiry the key unlocks to
    /// `holder`.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::InvalidKey`] for the zero key.
    /// - [`RegistryError::AlreadyLocked`] if another lock is active.
    pub async fn lock(
        &self,
        key: LocationKey,
        holder: Address,
        ttl: Duration,
    ) -> Result<(), RegistryError> {
        if !key.is_valid() {
            tracing::error!(
                location_type = %self.inner.location_type,
                holder = %holder,
                "lock requested for invalid key"
            );
            return Err(RegistryError::InvalidKey { key });
        }

        {
            let _guard = self.inner.locks.lock(key).await;
            let mut entries = self.inner.entries.borrow_mut();

            if let Some(RegistryEntry::Locked(record)) = entries.get(&key) {
                return Err(RegistryError::AlreadyLocked {
                    key,
                    holder: record.holder.clone(),
                });
            }

            let expires_at = self.inner.providers.time().now().saturating_add(ttl);
            entries.insert(
                key,
                RegistryEntry::Locked(LockRecord {
                    holder: holder.clone(),
                    expires_at,
                }),
            );
            tracing::debug!(
                location_type = %self.inner.location_type,
                key = %key,
                holder = %holder,
                ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX),
                "location locked"
            );
        }

        self.schedule_auto_unlock(key, holder, ttl);
        Ok(())
    }

    /// Release the migration lock on `key` and install `new_address`.
    ///
    /// Only applies when `key` is locked by `expected_holder`. Any other
    /// state is logged and left untouched.
    pub async fn unlock(
        &self,
        key: LocationKey,
        expected_holder: Address,
        new_address: Option<Address>,
    ) -> UnlockOutcome {
        let _guard = self.inner.locks.lock(key).await;
        let mut entries = self.inner.entries.borrow_mut();

        let outcome = match entries.get(&key) {
            Some(RegistryEntry::Locked(record)) if record.holder == expected_holder => {
                tracing::debug!(
                    location_type = %self.inner.location_type,
                    key = %key,
                    holder = %expected_holder,
                    "location unlocked"
                );
                UnlockOutcome::Released
            }
            Some(RegistryEntry::Locked(record)) => {
                tracing::warn!(
                    location_type = %self.inner.location_type,
                    key = %key,
                    expected = %expected_holder,
                    actual = %record.holder,
                    "unlock ignored: holder mismatch"
                );
                UnlockOutcome::HolderMismatch
            }
            _ => {
                tracing::debug!(
                    location_type = %self.inner.location_type,
                    key = %key,
                    holder = %expected_holder,
                    "unlock ignored: key not locked"
                );
                UnlockOutcome::NotLocked
            }
        };

        if outcome == UnlockOutcome::Released {
            entries.insert(key, RegistryEntry::Unlocked(new_address));
        }
        outcome
    }

    /// Snapshot of the entry for `key`, read without taking the key mutex.
    pub fn entry(&self, key: LocationKey) -> Option<RegistryEntry> {
        self.inner.entries.borrow().get(&key).cloned()
    }

    /// Number of keys known to the registry.
    pub fn len(&self) -> usize {
        self.inner.entries.borrow().len()
    }

    /// Whether the registry knows no keys.
    pub fn is_empty(&self) -> bool {
        self.inner.entries.borrow().is_empty()
    }

    fn schedule_auto_unlock(&self, key: LocationKey, holder: Address, ttl: Duration) {
        let registry = self.clone();
        self.inner
            .providers
            .task()
            .spawn_task("location_auto_unlock", async move {
                registry.inner.providers.time().sleep(ttl).await;
                let outcome = registry.unlock(key, holder.clone(), Some(holder)).await;
                tracing::debug!(
                    location_type = %registry.inner.location_type,
                    key = %key,
                    outcome = ?outcome,
                    "auto unlock fired"
                );
            });
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use crate::providers::TokioProviders;
    use crate::types::{NetworkAddress, UID};

    use super::*;

    const PLAYERS: LocationType = LocationType(1);

    fn address(port: u16) -> Address {
        Address::new(
            NetworkAddress::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port),
            UID::new(port as u64, 1),
        )
    }

    fn registry() -> LocationRegistry<TokioProviders> {
        LocationRegistry::new(PLAYERS, TokioProviders::new())
    }

    async fn run_local<F: std::future::Future<Output = ()>>(f: F) {
        tokio::task::LocalSet::new().run_until(f).await;
    }

    #[tokio::test]
    async fn test_add_get_remove() {
        let registry = registry();
        let key = LocationKey::new(42);

        assert_eq!(registry.get(key).await, None);

        registry.add(key, address(4500)).await;
        assert_eq!(registry.get(key).await, Some(address(4500)));

        // Re-adding overwrites
        registry.add(key, address(4501)).await;
        assert_eq!(registry.get(key).await, Some(address(4501)));
        assert_eq!(registry.len(), 1);

        registry.remove(key).await;
        assert_eq!(registry.get(key).await, None);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_lock_invalid_key_fails() {
        let registry = registry();
        let result = registry
            .lock(LocationKey::new(0), address(4500), Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(RegistryError::InvalidKey { .. })));
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_hides_address() {
        run_local(async {
            let registry = registry();
            let key = LocationKey::new(42);
            registry.add(key, address(4500)).await;

            registry
                .lock(key, address(4500), Duration::from_secs(10))
                .await
                .expect("lock");

            assert_eq!(registry.get(key).await, None);
            let record = registry
                .entry(key)
                .and_then(|e| e.lock_record().cloned())
                .expect("locked");
            assert_eq!(record.holder, address(4500));
            assert_eq!(record.expires_at, Duration::from_secs(10));
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_with_unbounded_ttl_saturates() {
        run_local(async {
            let registry = registry();
            let key = LocationKey::new(42);
            tokio::time::sleep(Duration::from_secs(1)).await;

            registry
                .lock(key, address(4500), Duration::MAX)
                .await
                .expect("lock");

            let record = registry
                .entry(key)
                .and_then(|e| e.lock_record().cloned())
                .expect("locked");
            assert_eq!(record.expires_at, Duration::MAX);
            assert_eq!(registry.get(key).await, None);
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_lock_rejected() {
        run_local(async {
            let registry = registry();
            let key = LocationKey::new(7);
            registry
                .lock(key, address(4500), Duration::from_secs(10))
                .await
                .expect("first lock");

            let second = registry
                .lock(key, address(4501), Duration::from_secs(10))
                .await;
            match second {
                Err(RegistryError::AlreadyLocked { holder, .. }) => {
                    assert_eq!(holder, address(4500))
                }
                other => panic!("expected AlreadyLocked, got {:?}", other),
            }
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_unlock_with_wrong_holder_is_ignored() {
        run_local(async {
            let registry = registry();
            let key = LocationKey::new(42);
            registry.add(key, address(4500)).await;
            registry
                .lock(key, address(4500), Duration::from_secs(10))
                .await
                .expect("lock");
            let before = registry.entry(key);

            let outcome = registry
                .unlock(key, address(4999), Some(address(4600)))
                .await;

            assert_eq!(outcome, UnlockOutcome::HolderMismatch);
            assert_eq!(registry.entry(key), before);
            assert_eq!(registry.get(key).await, None);
        })
        .await;
    }

    #[tokio::test]
    async fn test_unlock_not_locked_is_ignored() {
        let registry = registry();
        let key = LocationKey::new(5);
        registry.add(key, address(4500)).await;

        let outcome = registry.unlock(key, address(4500), None).await;
        assert_eq!(outcome, UnlockOutcome::NotLocked);
        assert_eq!(registry.get(key).await, Some(address(4500)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_unlock_after_ttl() {
        run_local(async {
            let registry = registry();
            let key = LocationKey::new(42);
            let ttl = Duration::from_millis(1000);

            registry.lock(key, address(4501), ttl).await.expect("lock");

            tokio::time::sleep(Duration::from_millis(999)).await;
            assert_eq!(registry.get(key).await, None);

            tokio::time::sleep(Duration::from_millis(2)).await;
            assert_eq!(registry.get(key).await, Some(address(4501)));
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_unlock_makes_auto_unlock_noop() {
        run_local(async {
            let registry = registry();
            let key = LocationKey::new(42);

            registry
                .lock(key, address(4500), Duration::from_secs(1))
                .await
                .expect("lock");
            let outcome = registry
                .unlock(key, address(4500), Some(address(4600)))
                .await;
            assert_eq!(outcome, UnlockOutcome::Released);

            // A fresh migration by someone else is in progress when the
            // first lock's timer fires.
            registry
                .lock(key, address(4600), Duration::from_secs(10))
                .await
                .expect("second lock");

            tokio::time::sleep(Duration::from_secs(2)).await;

            let record = registry
                .entry(key)
                .and_then(|e| e.lock_record().cloned())
                .expect("still locked by second holder");
            assert_eq!(record.holder, address(4600));
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_operations_apply_in_arrival_order() {
        run_local(async {
            let registry = registry();
            let key = LocationKey::new(42);
            let observed = Rc::new(RefCell::new(Vec::new()));

            let mut handles = Vec::new();
            {
                let r = registry.clone();
                handles.push(tokio::task::spawn_local(async move {
                    r.add(key, address(4500)).await;
                }));
            }
            {
                let r = registry.clone();
                handles.push(tokio::task::spawn_local(async move {
                    r.lock(key, address(4500), Duration::from_secs(30))
                        .await
                        .expect("lock");
                }));
            }
            {
                let r = registry.clone();
                let observed = observed.clone();
                handles.push(tokio::task::spawn_local(async move {
                    observed.borrow_mut().push(r.get(key).await);
                }));
            }
            {
                let r = registry.clone();
                handles.push(tokio::task::spawn_local(async move {
                    r.unlock(key, address(4500), Some(address(4700))).await;
                }));
            }
            {
                let r = registry.clone();
                let observed = observed.clone();
                handles.push(tokio::task::spawn_local(async move {
                    observed.borrow_mut().push(r.get(key).await);
                }));
            }
            for handle in handles {
                handle.await.expect("task");
            }

            assert_eq!(*observed.borrow(), vec![None, Some(address(4700))]);
            assert_eq!(
                registry.entry(key),
                Some(RegistryEntry::Unlocked(Some(address(4700))))
            );
        })
        .await;
    }
}
