//! Shared fixtures: an in-process loopback transport that serves the
//! registry and a set of entity processes.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use std::rc::Rc;

use async_trait::async_trait;
use locus::{
    Address, ErrorCode, LocationRegistries, LocationSender, LocationType, NetworkAddress,
    RegistryClient, RegistryService, Request, Response, SenderConfig, TokioProviders, Transport,
    TransportError, UID,
};

pub const PLAYERS: LocationType = LocationType(1);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn address(port: u16) -> Address {
    Address::new(
        NetworkAddress::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port),
        UID::new(port as u64, 1),
    )
}

pub fn registry_address() -> Address {
    address(1000)
}

/// Routes calls to the registry service or to hosted entity addresses.
///
/// Entity addresses echo the request body while hosted and answer
/// `TargetNotFound` otherwise.
pub struct LoopbackTransport {
    registry: Address,
    service: RegistryService<TokioProviders>,
    hosted: RefCell<HashSet<Address>>,
    registry_calls: Cell<usize>,
    entity_calls: RefCell<Vec<Address>>,
    sends: RefCell<Vec<Address>>,
}

impl LoopbackTransport {
    pub fn new(registries: Rc<LocationRegistries<TokioProviders>>) -> Rc<Self> {
        Rc::new(Self {
            registry: registry_address(),
            service: RegistryService::new(registries),
            hosted: RefCell::new(HashSet::new()),
            registry_calls: Cell::new(0),
            entity_calls: RefCell::new(Vec::new()),
            sends: RefCell::new(Vec::new()),
        })
    }

    pub fn host(&self, address: Address) {
        self.hosted.borrow_mut().insert(address);
    }

    pub fn unhost(&self, address: &Address) {
        self.hosted.borrow_mut().remove(address);
    }

    /// Registry round trips so far.
    pub fn registry_calls(&self) -> usize {
        self.registry_calls.get()
    }

    /// Entity calls so far.
    pub fn entity_calls(&self) -> usize {
        self.entity_calls.borrow().len()
    }

    /// Addresses of entity calls, in order.
    pub fn entity_targets(&self) -> Vec<Address> {
        self.entity_calls.borrow().clone()
    }

    /// Total transport calls so far.
    pub fn total_calls(&self) -> usize {
        self.registry_calls() + self.entity_calls()
    }

    pub fn sends(&self) -> Vec<Address> {
        self.sends.borrow().clone()
    }
}

#[async_trait(?Send)]
impl Transport for LoopbackTransport {
    fn send(&self, to: &Address, _request: Request) {
        self.sends.borrow_mut().push(to.clone());
    }

    async fn call(&self, to: &Address, request: Request) -> Result<Response, TransportError> {
        if *to == self.registry {
            self.registry_calls.set(self.registry_calls.get() + 1);
            return Ok(self.service.handle(request).await);
        }

        self.entity_calls.borrow_mut().push(to.clone());
        if self.hosted.borrow().contains(to) {
            Ok(Response::ok(request.rpc_id, request.body))
        } else {
            Ok(Response::failure(
                request.rpc_id,
                ErrorCode::TargetNotFound,
                format!("{} does not host key {}", to, request.key),
            ))
        }
    }
}

pub type Client = RegistryClient<LoopbackTransport>;
pub type Sender = LocationSender<TokioProviders, LoopbackTransport, Client>;

/// Registry process, loopback transport, registry client and a sender for
/// [`PLAYERS`] wired together.
pub struct Cluster {
    pub registries: Rc<LocationRegistries<TokioProviders>>,
    pub transport: Rc<LoopbackTransport>,
    pub client: Rc<Client>,
    pub sender: Sender,
}

impl Cluster {
    pub fn new(config: SenderConfig) -> Self {
        let registries = Rc::new(LocationRegistries::new(TokioProviders::new()));
        let transport = LoopbackTransport::new(registries.clone());
        let client = Rc::new(RegistryClient::new(transport.clone(), registry_address()));
        let sender = LocationSender::new(
            PLAYERS,
            TokioProviders::new(),
            transport.clone(),
            client.clone(),
            config,
        );
        Self {
            registries,
            transport,
            client,
            sender,
        }
    }
}
