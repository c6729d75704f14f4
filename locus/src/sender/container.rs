//! One sender per location type.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::SenderError;
use crate::providers::Providers;
use crate::registry::LocationResolver;
use crate::transport::{Request, Response, Transport};
use crate::types::{LocationKey, LocationType};

use super::config::SenderConfig;
use super::location_sender::LocationSender;
use super::reaper::{spawn_reaper, ReaperHandle};

/// Lazily created [`LocationSender`]s sharing one transport, resolver and
/// configuration.
///
/// Owned by the process and passed by reference; there is no global
/// instance.
pub struct LocationSenders<P: Providers, T: Transport, R: LocationResolver> {
    providers: P,
    transport: Rc<T>,
    resolver: Rc<R>,
    config: SenderConfig,
    senders: RefCell<HashMap<LocationType, LocationSender<P, T, R>>>,
    reapers: RefCell<HashMap<LocationType, ReaperHandle>>,
    reaping: Cell<bool>,
}

impl<P, T, R> LocationSenders<P, T, R>
where
    P: Providers,
    T: Transport + 'static,
    R: LocationResolver + 'static,
{
    /// Create an empty container.
    pub fn new(providers: P, transport: Rc<T>, resolver: Rc<R>, config: SenderConfig) -> Self {
        Self {
            providers,
            transport,
            resolver,
            config,
            senders: RefCell::new(HashMap::new()),
            reapers: RefCell::new(HashMap::new()),
            reaping: Cell::new(false),
        }
    }

    /// Sender for `location_type`, created if missing.
    ///
    /// Once [`spawn_reapers`](Self::spawn_reapers) was called, new senders
    /// get a reaper too.
    pub fn get(&self, location_type: LocationType) -> LocationSender<P, T, R> {
        if let Some(sender) = self.senders.borrow().get(&location_type) {
            return sender.clone();
        }

        tracing::debug!(location_type = %location_type, "creating location sender");
        let sender = LocationSender::new(
            location_type,
            self.providers.clone(),
            self.transport.clone(),
            self.resolver.clone(),
            self.config.clone(),
        );
        self.senders
            .borrow_mut()
            .insert(location_type, sender.clone());
        if self.reaping.get() {
            self.reapers
                .borrow_mut()
                .insert(location_type, spawn_reaper(&sender));
        }
        sender
    }

    /// [`LocationSender::call`] on the sender for `location_type`.
    pub async fn call(
        &self,
        location_type: LocationType,
        key: LocationKey,
        request: Request,
    ) -> Result<Response, SenderError> {
        self.get(location_type).call(key, request).await
    }

    /// [`LocationSender::send`] on the sender for `location_type`.
    pub fn send(&self, location_type: LocationType, key: LocationKey, request: Request) {
        self.get(location_type).send(key, request);
    }

    /// [`LocationSender::remove`] on the sender for `location_type`.
    ///
    /// Does not create a sender.
    pub fn remove(&self, location_type: LocationType, key: LocationKey) -> bool {
        self.senders
            .borrow()
            .get(&location_type)
            .is_some_and(|sender| sender.remove(key))
    }

    /// Start a reaper for every sender, present and future.
    ///
    /// Must be called inside a `LocalSet`.
    pub fn spawn_reapers(&self) {
        if self.reaping.replace(true) {
            return;
        }
        let senders = self.senders.borrow();
        let mut reapers = self.reapers.borrow_mut();
        for (location_type, sender) in senders.iter() {
            reapers.insert(*location_type, spawn_reaper(sender));
        }
    }

    /// Stop every reaper.
    pub fn stop_reapers(&self) {
        self.reaping.set(false);
        self.reapers.borrow_mut().clear();
    }

    /// Location types with a sender.
    pub fn location_types(&self) -> Vec<LocationType> {
        self.senders.borrow().keys().copied().collect()
    }
}
