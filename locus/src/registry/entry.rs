//! Registry entry state machine.
//!
//! ```text
//! Absent ──add──► Unlocked(addr) ──lock──► Locked(holder, expiry)
//!                      ▲                          │
//!                      └──── unlock(holder) ──────┘
//! ```
//!
//! `Locked` is the only transient state. It hides the previous address so
//! nobody is routed to the process the entity is leaving.

use std::time::Duration;

use crate::types::Address;

/// Migration lock held on a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRecord {
    /// Who holds the lock (normally the entity's current owner).
    pub holder: Address,
    /// Provider time at which the auto-unlock fires.
    pub expires_at: Duration,
}

/// State of one key in the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEntry {
    /// Resolvable. `None` means the key is known but has no address.
    Unlocked(Option<Address>),
    /// Under migration; lookups report unresolved.
    Locked(LockRecord),
}

impl RegistryEntry {
    /// Address a lookup should report for this entry.
    pub fn resolved(&self) -> Option<&Address> {
        match self {
            RegistryEntry::Unlocked(address) => address.as_ref(),
            RegistryEntry::Locked(_) => None,
        }
    }

    /// The lock record, if the entry is locked.
    pub fn lock_record(&self) -> Option<&LockRecord> {
        match self {
            RegistryEntry::Locked(record) => Some(record),
            RegistryEntry::Unlocked(_) => None,
        }
    }
}

/// What an unlock request did.
///
/// None of these is an error: a mismatched holder is the expected outcome
/// of a stale auto-unlock racing an explicit one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockOutcome {
    /// The lock was released and the new address installed.
    Released,
    /// The key is locked by someone else; nothing changed.
    HolderMismatch,
    /// The key is not locked; nothing changed.
    NotLocked,
}
