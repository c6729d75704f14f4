//! Client-side routing: cache resolved addresses, retry moved targets,
//! evict idle routes.
//!
//! - [`LocationSender`]: address cache and delivery for one location type
//! - [`LocationSenders`]: one sender per location type
//! - [`spawn_reaper`]: periodic idle eviction
//! - [`SenderConfig`]: retry budget, retry delay, reap interval, idle timeout

mod config;
mod container;
mod entry;
mod location_sender;
mod reaper;

pub use config::{
    SenderConfig, SenderConfigBuilder, DEFAULT_IDLE_TIMEOUT, DEFAULT_REAP_INTERVAL,
    DEFAULT_RETRY_BUDGET, DEFAULT_RETRY_DELAY,
};
pub use container::LocationSenders;
pub use entry::SenderEntrySnapshot;
pub use location_sender::LocationSender;
pub use reaper::{spawn_reaper, ReaperHandle};
