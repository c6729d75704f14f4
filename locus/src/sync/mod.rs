//! Synchronization primitives.

mod keyed_mutex;

pub use keyed_mutex::{KeyedGuard, KeyedMutex};
