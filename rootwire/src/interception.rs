//! Decoration of component instances after they leave the container.
//!
//! Interceptors wrap an instance of a given key in another instance of the same type, e.g. a
//! `Arc<dyn Repository>` in a timing or caching proxy. Chains are applied in registration order, so
//! the last registered interceptor is the outermost one. The container itself never sees the
//! decorated instances - cached singletons stay undecorated and interception happens on each
//! [InterceptorRegistry::get] call.

use fxhash::FxHashMap;
use parking_lot::RwLock;
use rootwire_di::component_key::ComponentKey;
use rootwire_di::container::Container;
use rootwire_di::error::ResolutionError;
use rootwire_di::instance_provider::{downcast_instance, ComponentInstancePtr};
use std::any::{type_name, Any};
use std::sync::Arc;
use tracing::{debug, warn};

type Interceptor<T> =
    Arc<dyn Fn(ComponentInstancePtr<T>) -> ComponentInstancePtr<T> + Send + Sync>;

type ErasedInterceptor = Arc<dyn Any + Send + Sync>;

/// Per-key chains of interceptors.
#[derive(Default)]
pub struct InterceptorRegistry {
    chains: RwLock<FxHashMap<ComponentKey, Vec<ErasedInterceptor>>>,
}

impl InterceptorRegistry {
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds an interceptor for instances of `T` registered under given key.
    pub fn add<T, F>(&self, key: ComponentKey, interceptor: F)
    where
        T: Send + Sync + 'static,
        F: Fn(ComponentInstancePtr<T>) -> ComponentInstancePtr<T> + Send + Sync + 'static,
    {
        debug!(%key, "Adding interceptor.");

        let interceptor: Interceptor<T> = Arc::new(interceptor);
        self.chains
            .write()
            .entry(key)
            .or_default()
            .push(Arc::new(interceptor) as ErasedInterceptor);
    }

    /// Removes all interceptors of given key.
    pub fn clear(&self, key: &ComponentKey) -> bool {
        self.chains.write().remove(key).is_some()
    }

    pub fn interceptor_count(&self, key: &ComponentKey) -> usize {
        self.chains
            .read()
            .get(key)
            .map(|chain| chain.len())
            .unwrap_or_default()
    }

    /// Applies the chain of given key to an instance. Interceptors registered for another type
    /// than `T` are skipped.
    pub fn apply<T: Send + Sync + 'static>(
        &self,
        key: &ComponentKey,
        instance: ComponentInstancePtr<T>,
    ) -> ComponentInstancePtr<T> {
        // the chain is cloned so interceptors can use the registry themselves
        let chain = self.chains.read().get(key).cloned().unwrap_or_default();

        chain.iter().fold(instance, |instance, interceptor| {
            match interceptor.downcast_ref::<Interceptor<T>>() {
                Some(interceptor) => interceptor(instance),
                None => {
                    warn!(
                        %key,
                        requested_type = type_name::<T>(),
                        "Skipping interceptor of incompatible type."
                    );
                    instance
                }
            }
        })
    }

    /// Gets an instance from given container and applies the chain of its key.
    pub fn get<T: Send + Sync + 'static>(
        &self,
        container: &Container,
        key: &ComponentKey,
    ) -> Result<ComponentInstancePtr<T>, ResolutionError> {
        container
            .get(key)
            .and_then(|instance| downcast_instance(key, instance))
            .map(|instance| self.apply(key, instance))
    }
}
