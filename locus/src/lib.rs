//! # Locus
//!
//! Location routing for migrating entities.
//!
//! An entity (player, room, session) is owned by one process at a time and
//! may move. Callers address it by [`LocationKey`] and let `locus` find it:
//! the registry knows where every key lives, the sender caches that answer
//! and retries when the entity has moved.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────── caller process ────────────────┐
//! │  LocationSenders ── one per LocationType ──┐   │
//! │  LocationSender                            │   │
//! │  • cached address + generation per key     │   │
//! │  • retry on TargetNotFound, sticky failure │   │
//! │  • reaper evicts idle keys                 │   │
//! │        │ resolve                 │ call    │   │
//! │  RegistryClient (LocationResolver)  Transport  │
//! └────────┼─────────────────────────────┼─────────┘
//!          ▼                             ▼
//! ┌──── registry process ────┐   ┌── owning process ──┐
//! │  RegistryService         │   │  entity handlers   │
//! │  LocationRegistries      │   └────────────────────┘
//! │  LocationRegistry        │
//! │  • key → address         │
//! │  • migration lock + ttl  │
//! └──────────────────────────┘
//! ```
//!
//! Everything is single-threaded: state lives behind `Rc`/`RefCell`, traits
//! are `#[async_trait(?Send)]`, and background work (auto-unlock, reaper,
//! fire-and-forget sends) is spawned with `spawn_local`. Run inside a
//! `tokio::task::LocalSet`.
//!
//! ## Modules
//!
//! - [`registry`] - Authoritative registry, its service and client
//! - [`sender`] - Address cache, retries and the reaper
//! - [`transport`] - Transport contract, error codes, correlation ids
//! - [`providers`] - Time and task providers
//! - [`sync`] - Per-key async mutex

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

pub mod codec;
pub mod error;
pub mod providers;
pub mod registry;
pub mod sender;
pub mod sync;
pub mod transport;
pub mod types;

pub use codec::{CodecError, JsonCodec, MessageCodec};
pub use error::{ConfigError, RegistryError, SenderError};
pub use providers::{
    Providers, TaskProvider, TimeProvider, TokioProviders, TokioTaskProvider, TokioTimeProvider,
};
pub use registry::{
    LocationRegistries, LocationRegistry, LocationResolver, LockRecord, RegistryClient,
    RegistryEntry, RegistryRequest, RegistryResponse, RegistryService, UnlockOutcome,
};
pub use sender::{
    spawn_reaper, LocationSender, LocationSenders, ReaperHandle, SenderConfig,
    SenderConfigBuilder, SenderEntrySnapshot,
};
pub use sync::{KeyedGuard, KeyedMutex};
pub use transport::{CorrelationIds, ErrorCode, Request, Response, Transport, TransportError};
pub use types::{
    Address, LocationKey, LocationType, NetworkAddress, NetworkAddressParseError, RpcId, UID,
};
