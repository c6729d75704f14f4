//! Per-key sender bookkeeping.

use std::cell::{Cell, RefCell};
use std::time::Duration;

use crate::transport::ErrorCode;
use crate::types::Address;

/// Cached route for one key.
///
/// The generation never changes for the lifetime of an entry. Evicting the
/// key and creating a new entry is what "bumps" it.
#[derive(Debug)]
pub(crate) struct SenderEntry {
    generation: u64,
    address: RefCell<Option<Address>>,
    last_activity: Cell<Duration>,
    sticky_error: Cell<Option<ErrorCode>>,
}

impl SenderEntry {
    pub(crate) fn new(generation: u64, now: Duration) -> Self {
        Self {
            generation,
            address: RefCell::new(None),
            last_activity: Cell::new(now),
            sticky_error: Cell::new(None),
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn address(&self) -> Option<Address> {
        self.address.borrow().clone()
    }

    pub(crate) fn set_address(&self, address: Option<Address>) {
        *self.address.borrow_mut() = address;
    }

    pub(crate) fn clear_address(&self) {
        self.set_address(None);
    }

    pub(crate) fn last_activity(&self) -> Duration {
        self.last_activity.get()
    }

    pub(crate) fn touch(&self, now: Duration) {
        self.last_activity.set(now);
    }

    pub(crate) fn sticky_error(&self) -> Option<ErrorCode> {
        self.sticky_error.get()
    }

    pub(crate) fn set_sticky_error(&self, code: ErrorCode) {
        self.sticky_error.set(Some(code));
    }

    pub(crate) fn snapshot(&self) -> SenderEntrySnapshot {
        SenderEntrySnapshot {
            address: self.address(),
            generation: self.generation,
            last_activity: self.last_activity(),
            sticky_error: self.sticky_error(),
        }
    }
}

/// Point-in-time copy of a sender entry, for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderEntrySnapshot {
    /// Cached address, `None` while unresolved.
    pub address: Option<Address>,
    /// Generation of the entry.
    pub generation: u64,
    /// Provider time of the last completed delivery (or creation).
    pub last_activity: Duration,
    /// Terminal failure short-circuiting further calls.
    pub sticky_error: Option<ErrorCode>,
}
