//! Caller-side access to the registry.
//!
//! [`LocationResolver`] is the seam the sender resolves keys through. The
//! usual implementation is [`RegistryClient`], which forwards each lookup
//! to the registry process over the [`Transport`]. A co-located
//! [`LocationRegistry`] or [`LocationRegistries`] container can be used
//! directly instead.

use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;

use crate::codec::{JsonCodec, MessageCodec};
use crate::error::RegistryError;
use crate::providers::Providers;
use crate::transport::{CorrelationIds, ErrorCode, Request, Transport};
use crate::types::{Address, LocationKey, LocationType};

use super::location_registry::LocationRegistry;
use super::service::{LocationRegistries, RegistryRequest, RegistryResponse};

/// Resolves a key to its current address.
#[async_trait(?Send)]
pub trait LocationResolver {
    /// Current address of `key` in `location_type`.
    ///
    /// `Ok(None)` means the registry has no usable address (unknown key or
    /// migration in progress).
    async fn resolve(
        &self,
        location_type: LocationType,
        key: LocationKey,
    ) -> Result<Option<Address>, RegistryError>;
}

#[async_trait(?Send)]
impl<R: LocationResolver + ?Sized> LocationResolver for Rc<R> {
    async fn resolve(
        &self,
        location_type: LocationType,
        key: LocationKey,
    ) -> Result<Option<Address>, RegistryError> {
        (**self).resolve(location_type, key).await
    }
}

/// A single registry answers for its own location type only.
#[async_trait(?Send)]
impl<P: Providers> LocationResolver for LocationRegistry<P> {
    async fn resolve(
        &self,
        location_type: LocationType,
        key: LocationKey,
    ) -> Result<Option<Address>, RegistryError> {
        if location_type != self.location_type() {
            return Ok(None);
        }
        Ok(self.get(key).await)
    }
}

#[async_trait(?Send)]
impl<P: Providers> LocationResolver for LocationRegistries<P> {
    async fn resolve(
        &self,
        location_type: LocationType,
        key: LocationKey,
    ) -> Result<Option<Address>, RegistryError> {
        match self.existing(location_type) {
            Some(registry) => Ok(registry.get(key).await),
            None => Ok(None),
        }
    }
}

/// Proxy for a remote registry process.
pub struct RegistryClient<T: Transport, C: MessageCodec = JsonCodec> {
    transport: Rc<T>,
    registry: Address,
    codec: C,
    rpc_ids: CorrelationIds,
}

impl<T: Transport> RegistryClient<T, JsonCodec> {
    /// Create a client for the registry served at `registry`.
    pub fn new(transport: Rc<T>, registry: Address) -> Self {
        Self::with_codec(transport, registry, JsonCodec)
    }
}

impl<T: Transport, C: MessageCodec> RegistryClient<T, C> {
    /// Create a client with a custom codec.
    pub fn with_codec(transport: Rc<T>, registry: Address, codec: C) -> Self {
        Self {
            transport,
            registry,
            codec,
            rpc_ids: CorrelationIds::new(),
        }
    }

    /// Address of the registry process.
    pub fn registry_address(&self) -> &Address {
        &self.registry
    }

    /// Register `address` for `key`.
    pub async fn add(
        &self,
        location_type: LocationType,
        key: LocationKey,
        address: Address,
    ) -> Result<(), RegistryError> {
        self.expect_ack(RegistryRequest::Add {
            location_type,
            key,
            address,
        })
        .await
    }

    /// Forget `key`.
    pub async fn remove(
        &self,
        location_type: LocationType,
        key: LocationKey,
    ) -> Result<(), RegistryError> {
        self.expect_ack(RegistryRequest::Remove { location_type, key })
            .await
    }

    /// Look up `key`.
    pub async fn get(
        &self,
        location_type: LocationType,
        key: LocationKey,
    ) -> Result<Option<Address>, RegistryError> {
        match self
            .request(RegistryRequest::Get { location_type, key })
            .await?
        {
            RegistryResponse::Address { address } => Ok(address),
            other => Err(unexpected(location_type, &other)),
        }
    }

    /// Lock `key` for migration.
    ///
    /// # Errors
    ///
    /// A rejected lock comes back as [`RegistryError::Remote`] with
    /// [`ErrorCode::Rejected`].
    pub async fn lock(
        &self,
        location_type: LocationType,
        key: LocationKey,
        holder: Address,
        ttl: Duration,
    ) -> Result<(), RegistryError> {
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        self.expect_ack(RegistryRequest::Lock {
            location_type,
            key,
            holder,
            ttl_ms,
        })
        .await
    }

    /// Finish a migration of `key`.
    pub async fn unlock(
        &self,
        location_type: LocationType,
        key: LocationKey,
        old_holder: Address,
        new_address: Option<Address>,
    ) -> Result<(), RegistryError> {
        self.expect_ack(RegistryRequest::Unlock {
            location_type,
            key,
            old_holder,
            new_address,
        })
        .await
    }

    async fn expect_ack(&self, request: RegistryRequest) -> Result<(), RegistryError> {
        let location_type = request.location_type();
        match self.request(request).await? {
            RegistryResponse::Ack => Ok(()),
            other => Err(unexpected(location_type, &other)),
        }
    }

    async fn request(&self, request: RegistryRequest) -> Result<RegistryResponse, RegistryError> {
        let location_type = request.location_type();
        let mut wire = Request::new(request.key(), self.codec.encode(&request)?);
        let rpc_id = self.rpc_ids.next_id();
        wire.rpc_id = rpc_id;

        let response = self.transport.call(&self.registry, wire).await?;

        if response.rpc_id != rpc_id {
            return Err(RegistryError::Remote {
                location_type,
                code: ErrorCode::Protocol,
                message: format!("expected {}, got {}", rpc_id, response.rpc_id),
            });
        }
        if !response.is_success() {
            return Err(RegistryError::Remote {
                location_type,
                code: response.error,
                message: response.message.unwrap_or_default(),
            });
        }

        Ok(self.codec.decode(&response.body)?)
    }
}

#[async_trait(?Send)]
impl<T: Transport, C: MessageCodec> LocationResolver for RegistryClient<T, C> {
    async fn resolve(
        &self,
        location_type: LocationType,
        key: LocationKey,
    ) -> Result<Option<Address>, RegistryError> {
        self.get(location_type, key).await
    }
}

fn unexpected(location_type: LocationType, response: &RegistryResponse) -> RegistryError {
    RegistryError::Remote {
        location_type,
        code: ErrorCode::Protocol,
        message: format!("unexpected registry response: {:?}", response),
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::net::{IpAddr, Ipv4Addr};

    use crate::providers::TokioProviders;
    use crate::registry::RegistryService;
    use crate::transport::{Response, TransportError};
    use crate::types::{NetworkAddress, RpcId, UID};

    use super::*;

    const PLAYERS: LocationType = LocationType(1);

    fn address(port: u16) -> Address {
        Address::new(
            NetworkAddress::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port),
            UID::new(port as u64, 1),
        )
    }

    /// Delivers every call straight into an in-process service.
    struct ServiceTransport {
        service: RegistryService<TokioProviders>,
        calls: Cell<usize>,
    }

    #[async_trait(?Send)]
    impl Transport for ServiceTransport {
        fn send(&self, _to: &Address, _request: Request) {}

        async fn call(&self, _to: &Address, request: Request) -> Result<Response, TransportError> {
            self.calls.set(self.calls.get() + 1);
            Ok(self.service.handle(request).await)
        }
    }

    /// Replies with whatever was queued, regardless of the request.
    struct CannedTransport {
        replies: RefCell<Vec<Response>>,
    }

    #[async_trait(?Send)]
    impl Transport for CannedTransport {
        fn send(&self, _to: &Address, _request: Request) {}

        async fn call(&self, _to: &Address, _request: Request) -> Result<Response, TransportError> {
            self.replies
                .borrow_mut()
                .pop()
                .ok_or(TransportError::ConnectionFailed)
        }
    }

    fn loopback() -> (Rc<ServiceTransport>, RegistryClient<ServiceTransport>) {
        let transport = Rc::new(ServiceTransport {
            service: RegistryService::new(Rc::new(LocationRegistries::new(TokioProviders::new()))),
            calls: Cell::new(0),
        });
        let client = RegistryClient::new(transport.clone(), address(1000));
        (transport, client)
    }

    #[tokio::test]
    async fn test_client_add_get_remove() {
        let (transport, client) = loopback();
        let key = LocationKey::new(42);

        client.add(PLAYERS, key, address(4500)).await.expect("add");
        assert_eq!(
            client.get(PLAYERS, key).await.expect("get"),
            Some(address(4500))
        );
        assert_eq!(
            client.resolve(PLAYERS, key).await.expect("resolve"),
            Some(address(4500))
        );

        client.remove(PLAYERS, key).await.expect("remove");
        assert_eq!(client.get(PLAYERS, key).await.expect("get"), None);
        assert_eq!(transport.calls.get(), 5);
    }

    #[tokio::test]
    async fn test_client_rejected_lock_is_remote_error() {
        let (_transport, client) = loopback();
        let err = client
            .lock(
                PLAYERS,
                LocationKey::new(0),
                address(4500),
                Duration::from_secs(1),
            )
            .await
            .expect_err("zero key");
        match err {
            RegistryError::Remote { code, .. } => assert_eq!(code, ErrorCode::Rejected),
            other => panic!("expected Remote, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_client_rpc_id_mismatch_is_protocol_error() {
        let transport = Rc::new(CannedTransport {
            replies: RefCell::new(vec![Response::ok(RpcId(77), b"\"Ack\"".to_vec())]),
        });
        let client = RegistryClient::new(transport, address(1000));

        let err = client
            .remove(PLAYERS, LocationKey::new(1))
            .await
            .expect_err("mismatch");
        assert_eq!(err.code(), ErrorCode::Protocol);
    }

    #[tokio::test]
    async fn test_client_transport_failure_propagates() {
        let transport = Rc::new(CannedTransport {
            replies: RefCell::new(Vec::new()),
        });
        let client = RegistryClient::new(transport, address(1000));

        let err = client
            .get(PLAYERS, LocationKey::new(1))
            .await
            .expect_err("no reply");
        assert!(matches!(
            err,
            RegistryError::Transport(TransportError::ConnectionFailed)
        ));
    }

    #[tokio::test]
    async fn test_container_resolver_unknown_type_is_unresolved() {
        let registries = LocationRegistries::new(TokioProviders::new());
        registries
            .registry(PLAYERS)
            .add(LocationKey::new(1), address(4500))
            .await;

        assert_eq!(
            registries
                .resolve(PLAYERS, LocationKey::new(1))
                .await
                .expect("resolve"),
            Some(address(4500))
        );
        assert_eq!(
            registries
                .resolve(LocationType(9), LocationKey::new(1))
                .await
                .expect("resolve"),
            None
        );
    }
}
