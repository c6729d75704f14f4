//! Location registry: the authoritative key → address map.
//!
//! - [`LocationRegistry`]: one key space, with the migration lock
//! - [`LocationRegistries`]: one registry per location type
//! - [`RegistryService`]: serves registry requests arriving over a transport
//! - [`RegistryClient`]: remote proxy, and the usual [`LocationResolver`]

mod client;
mod entry;
mod location_registry;
mod service;

pub use client::{LocationResolver, RegistryClient};
pub use entry::{LockRecord, RegistryEntry, UnlockOutcome};
pub use location_registry::LocationRegistry;
pub use service::{LocationRegistries, RegistryRequest, RegistryResponse, RegistryService};
