//! Correlation id allocation.

use std::cell::Cell;

use crate::types::RpcId;

/// Allocates request correlation ids.
///
/// Ids start at 1 and wrap around, skipping 0 so that a zeroed response
/// can never match a live request.
#[derive(Debug)]
pub struct CorrelationIds {
    next: Cell<u32>,
}

impl CorrelationIds {
    /// Create an allocator starting at 1.
    pub fn new() -> Self {
        Self { next: Cell::new(1) }
    }

    /// Allocate the next id.
    pub fn next_id(&self) -> RpcId {
        let id = self.next.get();
        let following = id.wrapping_add(1);
        self.next.set(if following == 0 { 1 } else { following });
        RpcId(id)
    }
}

impl Default for CorrelationIds {
    fn default() -> Self {
        Self::new()
    }
}
