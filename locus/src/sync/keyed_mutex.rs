//! Per-key async mutex.
//!
//! Serializes every operation that touches the same key while leaving
//! unrelated keys fully concurrent. Each key gets its own FIFO
//! `tokio::sync::Mutex`, so waiters on one key acquire it in arrival order.
//!
//! Slots are created on first use and dropped as soon as no task holds or
//! waits for the key, so the map only ever contains contended keys.
//!
//! ```text
//! lock(42) ──► slots[42] = { mutex, users: 1 } ──► guard
//! lock(42) ──► slots[42] = { mutex, users: 2 } ──► waits (FIFO)
//! drop(guard) ─► users: 1, second waiter wakes
//! drop(guard) ─► users: 0, slot removed
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

struct Slot {
    mutex: Arc<Mutex<()>>,
    /// Holders plus waiters.
    users: usize,
}

/// Async mutual exclusion scoped to one key.
pub struct KeyedMutex<K> {
    slots: RefCell<HashMap<K, Slot>>,
}

impl<K: Eq + Hash + Clone> KeyedMutex<K> {
    /// Create an empty keyed mutex.
    pub fn new() -> Self {
        Self {
            slots: RefCell::new(HashMap::new()),
        }
    }

    /// Acquire the mutex for `key`, waiting behind earlier callers.
    ///
    /// Dropping the returned future before it resolves releases the
    /// waiter's reservation without acquiring the lock.
    pub async fn lock(&self, key: K) -> KeyedGuard<'_, K> {
        let ticket = self.enter(key);
        let guard = ticket.mutex.clone().lock_owned().await;
        KeyedGuard {
            _guard: guard,
            _ticket: ticket,
        }
    }

    /// Number of keys currently held or awaited.
    pub fn active_keys(&self) -> usize {
        self.slots.borrow().len()
    }

    /// Number of tasks holding or waiting for `key`.
    pub fn users(&self, key: &K) -> usize {
        self.slots.borrow().get(key).map_or(0, |slot| slot.users)
    }

    fn enter(&self, key: K) -> Ticket<'_, K> {
        let mut slots = self.slots.borrow_mut();
        let slot = slots.entry(key.clone()).or_insert_with(|| Slot {
            mutex: Arc::new(Mutex::new(())),
            users: 0,
        });
        slot.users += 1;
        let mutex = slot.mutex.clone();
        drop(slots);

        Ticket {
            owner: self,
            key,
            mutex,
        }
    }

    fn leave(&self, key: &K) {
        let mut slots = self.slots.borrow_mut();
        if let Some(slot) = slots.get_mut(key) {
            slot.users = slot.users.saturating_sub(1);
            if slot.users == 0 {
                slots.remove(key);
            }
        }
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedMutex<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> std::fmt::Debug for KeyedMutex<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedMutex")
            .field("active_keys", &self.slots.borrow().len())
            .finish()
    }
}

/// Reservation on a key slot; released on drop whether or not the lock
/// was ever acquired.
struct Ticket<'a, K: Eq + Hash + Clone> {
    owner: &'a KeyedMutex<K>,
    key: K,
    mutex: Arc<Mutex<()>>,
}

impl<K: Eq + Hash + Clone> Drop for Ticket<'_, K> {
    fn drop(&mut self) {
        self.owner.leave(&self.key);
    }
}

/// Guard for a held key. The key is released when the guard is dropped.
pub struct KeyedGuard<'a, K: Eq + Hash + Clone> {
    // Field order matters: unlock before giving the slot back.
    _guard: OwnedMutexGuard<()>,
    _ticket: Ticket<'a, K>,
}
