//! Request/response glue exposing registry operations to remote callers.
//!
//! The registry process owns one [`LocationRegistries`] container and wraps
//! it in a [`RegistryService`]. Whatever transport delivers requests to the
//! registry process hands each [`Request`] to [`RegistryService::handle`],
//! which decodes a [`RegistryRequest`], dispatches it to the registry for
//! the request's location type, and encodes the [`RegistryResponse`].
//!
//! The set of operations is closed: adding one means adding a variant and
//! a match arm in [`RegistryService::dispatch`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::codec::{JsonCodec, MessageCodec};
use crate::error::RegistryError;
use crate::providers::Providers;
use crate::transport::{ErrorCode, Request, Response};
use crate::types::{Address, LocationKey, LocationType};

use super::location_registry::LocationRegistry;

/// Operations a remote caller can ask of the registry process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryRequest {
    /// Register `address` for `key`.
    Add {
        /// Target key space.
        location_type: LocationType,
        /// Key to register.
        key: LocationKey,
        /// Where the key is served.
        address: Address,
    },
    /// Look up the address of `key`.
    Get {
        /// Target key space.
        location_type: LocationType,
        /// Key to look up.
        key: LocationKey,
    },
    /// Start a migration of `key`.
    Lock {
        /// Target key space.
        location_type: LocationType,
        /// Key to lock.
        key: LocationKey,
        /// Lock holder, also the address restored on expiry.
        holder: Address,
        /// Lock lifetime in milliseconds.
        ttl_ms: u64,
    },
    /// Finish a migration of `key`.
    Unlock {
        /// Target key space.
        location_type: LocationType,
        /// Key to unlock.
        key: LocationKey,
        /// Holder the caller believes owns the lock.
        old_holder: Address,
        /// Address to install once unlocked.
        new_address: Option<Address>,
    },
    /// Forget `key`.
    Remove {
        /// Target key space.
        location_type: LocationType,
        /// Key to forget.
        key: LocationKey,
    },
}

impl RegistryRequest {
    /// Location type the request targets.
    pub fn location_type(&self) -> LocationType {
        match self {
            RegistryRequest::Add { location_type, .. }
            | RegistryRequest::Get { location_type, .. }
            | RegistryRequest::Lock { location_type, .. }
            | RegistryRequest::Unlock { location_type, .. }
            | RegistryRequest::Remove { location_type, .. } => *location_type,
        }
    }

    /// Key the request targets.
    pub fn key(&self) -> LocationKey {
        match self {
            RegistryRequest::Add { key, .. }
            | RegistryRequest::Get { key, .. }
            | RegistryRequest::Lock { key, .. }
            | RegistryRequest::Unlock { key, .. }
            | RegistryRequest::Remove { key, .. } => *key,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            RegistryRequest::Add { .. } => "add",
            RegistryRequest::Get { .. } => "get",
            RegistryRequest::Lock { .. } => "lock",
            RegistryRequest::Unlock { .. } => "unlock",
            RegistryRequest::Remove { .. } => "remove",
        }
    }
}

/// Reply to a [`RegistryRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryResponse {
    /// The operation was applied.
    Ack,
    /// Result of a `Get`. `None` when unknown or locked.
    Address {
        /// Resolved address.
        address: Option<Address>,
    },
}

/// One [`LocationRegistry`] per location type.
///
/// Registries are created on first use. The container is owned by the
/// registry process and shared by reference; there is no global instance.
pub struct LocationRegistries<P: Providers> {
    providers: P,
    registries: RefCell<HashMap<LocationType, LocationRegistry<P>>>,
}

impl<P: Providers> LocationRegistries<P> {
    /// Create an empty container.
    pub fn new(providers: P) -> Self {
        Self {
            providers,
            registries: RefCell::new(HashMap::new()),
        }
    }

    /// Registry for `location_type`, created if missing.
    pub fn registry(&self, location_type: LocationType) -> LocationRegistry<P> {
        self.registries
            .borrow_mut()
            .entry(location_type)
            .or_insert_with(|| {
                tracing::debug!(location_type = %location_type, "creating location registry");
                LocationRegistry::new(location_type, self.providers.clone())
            })
            .clone()
    }

    /// Registry for `location_type`, if it was ever used.
    pub fn existing(&self, location_type: LocationType) -> Option<LocationRegistry<P>> {
        self.registries.borrow().get(&location_type).cloned()
    }

    /// Location types with a registry.
    pub fn location_types(&self) -> Vec<LocationType> {
        self.registries.borrow().keys().copied().collect()
    }
}

impl<P: Providers> std::fmt::Debug for LocationRegistries<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationRegistries")
            .field("location_types", &self.registries.borrow().len())
            .finish()
    }
}

/// Serves [`RegistryRequest`]s against a [`LocationRegistries`] container.
pub struct RegistryService<P: Providers, C: MessageCodec = JsonCodec> {
    registries: Rc<LocationRegistries<P>>,
    codec: C,
}

impl<P: Providers> RegistryService<P, JsonCodec> {
    /// Create a service speaking JSON.
    pub fn new(registries: Rc<LocationRegistries<P>>) -> Self {
        Self::with_codec(registries, JsonCodec)
    }
}

impl<P: Providers, C: MessageCodec> RegistryService<P, C> {
    /// Create a service with a custom codec.
    pub fn with_codec(registries: Rc<LocationRegistries<P>>, codec: C) -> Self {
        Self { registries, codec }
    }

    /// The container this service serves.
    pub fn registries(&self) -> &Rc<LocationRegistries<P>> {
        &self.registries
    }

    /// Apply a decoded request.
    ///
    /// # Errors
    ///
    /// Propagates [`RegistryError::InvalidKey`] and
    /// [`RegistryError::AlreadyLocked`] from `Lock`.
    pub async fn dispatch(
        &self,
        request: RegistryRequest,
    ) -> Result<RegistryResponse, RegistryError> {
        let registry = self.registries.registry(request.location_type());
        match request {
            RegistryRequest::Add { key, address, .. } => {
                registry.add(key, address).await;
                Ok(RegistryResponse::Ack)
            }
            RegistryRequest::Get { key, .. } => Ok(RegistryResponse::Address {
                address: registry.get(key).await,
            }),
            RegistryRequest::Lock {
                key,
                holder,
                ttl_ms,
                ..
            } => {
                registry
                    .lock(key, holder, Duration::from_millis(ttl_ms))
                    .await?;
                Ok(RegistryResponse::Ack)
            }
            RegistryRequest::Unlock {
                key,
                old_holder,
                new_address,
                ..
            } => {
                registry.unlock(key, old_holder, new_address).await;
                Ok(RegistryResponse::Ack)
            }
            RegistryRequest::Remove { key, .. } => {
                registry.remove(key).await;
                Ok(RegistryResponse::Ack)
            }
        }
    }

    /// Decode, dispatch and encode one transport-level request.
    ///
    /// Never fails: errors become failure responses carrying the request's
    /// correlation id.
    pub async fn handle(&self, request: Request) -> Response {
        let rpc_id = request.rpc_id;

        let decoded: RegistryRequest = match self.codec.decode(&request.body) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::warn!(rpc_id = %rpc_id, error = %e, "malformed registry request");
                return Response::failure(rpc_id, ErrorCode::Protocol, e.to_string());
            }
        };

        let name = decoded.name();
        let location_type = decoded.location_type();
        let key = decoded.key();
        tracing::debug!(
            rpc_id = %rpc_id,
            location_type = %location_type,
            key = %key,
            op = name,
            "registry request"
        );

        match self.dispatch(decoded).await {
            Ok(reply) => match self.codec.encode(&reply) {
                Ok(body) => Response::ok(rpc_id, body),
                Err(e) => Response::failure(rpc_id, ErrorCode::Protocol, e.to_string()),
            },
            Err(e) => {
                tracing::debug!(
                    rpc_id = %rpc_id,
                    location_type = %location_type,
                    key = %key,
                    op = name,
                    error = %e,
                    "registry request failed"
                );
                Response::failure(rpc_id, e.code(), e.to_string())
            }
        }
    }
}
