//! Synchronous, typed in-process event bus.
//!
//! Listeners subscribe to a concrete event type and are called on the publishing thread, in
//! subscription order. The bus is a regular component - other components get it injected and
//! subscribe in their factories, while the [Application](crate::application::Application)
//! publishes lifecycle events.

use fxhash::FxHashMap;
use itertools::Itertools;
use parking_lot::RwLock;
use rootwire_di::component_key::ComponentKey;
use rootwire_di::instance_provider::ErrorPtr;
use std::any::{type_name, Any, TypeId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Published after the container is ready, before running runners.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ApplicationStarted;

/// Published after runners finish, before the container shuts down.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ApplicationStopping;

/// Published after a component binding got replaced at runtime.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ComponentReloaded {
    pub key: ComponentKey,
    /// Keys whose cached instances were discarded, starting with the reloaded one.
    pub invalidated: Vec<ComponentKey>,
}

/// Handle identifying a subscription.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct SubscriptionId(u64);

/// Some listeners failed to handle a published event. All listeners are called regardless.
#[derive(Error, Clone, Debug)]
#[error("{} listener(s) failed to handle {event_type}: {}", .errors.len(), .errors.iter().join("; "))]
pub struct PublishError {
    pub event_type: &'static str,
    pub errors: Vec<ErrorPtr>,
}

type Listener = Arc<dyn Fn(&(dyn Any + Send + Sync)) -> Result<(), ErrorPtr> + Send + Sync>;

#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<FxHashMap<TypeId, Vec<(SubscriptionId, Listener)>>>,
    last_subscription_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Default::default()
    }

    /// Subscribes to events of type `E`.
    pub fn subscribe<E, F>(&self, listener: F) -> SubscriptionId
    where
        E: Send + Sync + 'static,
        F: Fn(&E) -> Result<(), ErrorPtr> + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.last_subscription_id.fetch_add(1, Ordering::Relaxed));
        let listener: Listener = Arc::new(move |event: &(dyn Any + Send + Sync)| {
            match event.downcast_ref::<E>() {
                Some(event) => listener(event),
                None => Ok(()),
            }
        });

        debug!(event_type = type_name::<E>(), "Adding event listener.");

        self.listeners
            .write()
            .entry(TypeId::of::<E>())
            .or_default()
            .push((id, listener));

        id
    }

    /// Removes given subscription. Returns if it was present.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        listeners.values_mut().any(|listeners| {
            let count = listeners.len();
            listeners.retain(|(listener_id, _)| *listener_id != id);
            count != listeners.len()
        })
    }

    /// Calls all listeners of `E`. Listeners can subscribe or publish from within the call.
    pub fn publish<E: Send + Sync + 'static>(&self, event: &E) -> Result<(), PublishError> {
        let listeners = self
            .listeners
            .read()
            .get(&TypeId::of::<E>())
            .map(|listeners| {
                listeners
                    .iter()
                    .map(|(_, listener)| listener.clone())
                    .collect_vec()
            })
            .unwrap_or_default();

        let event_type = type_name::<E>();
        debug!(event_type, listeners = listeners.len(), "Publishing event.");

        let errors = listeners
            .iter()
            .filter_map(|listener| listener(event as &(dyn Any + Send + Sync)).err())
            .inspect(|error| warn!(event_type, %error, "Event listener failed."))
            .collect_vec();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(PublishError { event_type, errors })
        }
    }

    pub fn listener_count<E: 'static>(&self) -> usize {
        self.listeners
            .read()
            .get(&TypeId::of::<E>())
            .map(|listeners| listeners.len())
            .unwrap_or_default()
    }
}
