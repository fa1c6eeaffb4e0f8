//! Core functionality for creating component instances - the [Container].
//!
//! A container combines a [BindingRegistry] with an [InstanceCache]. Requesting a key looks up its
//! binding, resolves declared dependencies depth-first and invokes the factory. Singletons are
//! created at most once, even when many threads request them at the same time, and are disposed
//! in reverse creation order on [Container::shutdown].
//!
//! ```
//! use rootwire_di::component_key::ComponentKey;
//! use rootwire_di::component_registry::Binding;
//! use rootwire_di::container::Container;
//!
//! struct Logger;
//!
//! struct Service {
//!     logger: std::sync::Arc<Logger>,
//! }
//!
//! let container = Container::builder()
//!     .register(ComponentKey::of::<Logger>(), Binding::singleton(|_| Ok(Logger)))
//!     .register(
//!         ComponentKey::of::<Service>(),
//!         Binding::singleton(|dependencies| {
//!             Ok(Service {
//!                 logger: dependencies.get::<Logger>()?,
//!             })
//!         })
//!         .depends_on_type::<Logger>(),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let service = container.get_typed::<Service>().unwrap();
//! assert!(std::sync::Arc::ptr_eq(
//!     &service.logger,
//!     &container.get_typed::<Logger>().unwrap()
//! ));
//! ```

use crate::component_key::ComponentKey;
use crate::component_registry::conditional::{
    BindingCondition, BindingRegistryFacade, ConditionMetadata, ContextFactory,
    SimpleContextFactory,
};
use crate::component_registry::{
    Binding, BindingRegistry, BindingRegistryPtr, ConcurrentBindingRegistry,
};
use crate::error::{
    DisposalError, RegistrationError, ResolutionError, ShutdownError, ValidationError,
};
use crate::graph::DependencyGraph;
use crate::instance_cache::{InstanceCache, RecordInfo};
use crate::instance_provider::{
    ComponentInstanceAnyPtr, ComponentInstanceProvider, ComponentInstancePtr, ErrorPtr,
    TypedComponentInstanceProvider,
};
use crate::resolver::{ResolutionStack, Resolver};
use crate::scope::Scope;
use itertools::Itertools;
use std::any::TypeId;
use std::cmp::Reverse;
use tracing::{debug, warn};

pub type ContextFactoryPtr = Box<dyn ContextFactory + Send + Sync>;

/// Runtime settings of a [Container].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ContainerConfig {
    /// Allow re-registering an already registered key. The last registration wins.
    pub allow_binding_overriding: bool,
    /// Maximum length of a dependency chain within a single request.
    pub max_resolution_depth: usize,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            allow_binding_overriding: true,
            max_resolution_depth: 256,
        }
    }
}

struct ConditionalBinding {
    key: ComponentKey,
    binding: Binding,
    condition: BindingCondition,
    priority: i8,
}

/// Builder for [Container] with sensible defaults, for easy construction.
pub struct ContainerBuilder {
    config: ContainerConfig,
    registry: Option<BindingRegistryPtr>,
    context_factory: ContextFactoryPtr,
    bindings: Vec<(ComponentKey, Binding)>,
    conditional_bindings: Vec<ConditionalBinding>,
}

impl Default for ContainerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerBuilder {
    /// Creates a new builder with a default configuration.
    pub fn new() -> Self {
        Self {
            config: Default::default(),
            registry: None,
            context_factory: Box::<SimpleContextFactory>::default(),
            bindings: vec![],
            conditional_bindings: vec![],
        }
    }

    /// Sets new [ContainerConfig].
    pub fn with_config(mut self, config: ContainerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_allow_binding_overriding(mut self, allow_binding_overriding: bool) -> Self {
        self.config.allow_binding_overriding = allow_binding_overriding;
        self
    }

    pub fn with_max_resolution_depth(mut self, max_resolution_depth: usize) -> Self {
        self.config.max_resolution_depth = max_resolution_depth;
        self
    }

    /// Sets a custom [BindingRegistry]. Handling of duplicate registrations is then up to the
    /// registry, regardless of [ContainerConfig::allow_binding_overriding].
    pub fn with_registry(mut self, registry: BindingRegistryPtr) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Sets new [ContextFactory] for conditional registration.
    pub fn with_context_factory(mut self, context_factory: ContextFactoryPtr) -> Self {
        self.context_factory = context_factory;
        self
    }

    /// Adds a binding registered unconditionally.
    pub fn register(mut self, key: ComponentKey, binding: Binding) -> Self {
        self.bindings.push((key, binding));
        self
    }

    /// Adds a binding registered only if `condition` passes. Conditions are evaluated after all
    /// unconditional bindings are registered, higher `priority` first.
    pub fn register_conditional(
        mut self,
        key: ComponentKey,
        binding: Binding,
        condition: BindingCondition,
        priority: i8,
    ) -> Self {
        self.conditional_bindings.push(ConditionalBinding {
            key,
            binding,
            condition,
            priority,
        });
        self
    }

    /// Builds resulting [Container].
    pub fn build(self) -> Result<Container, RegistrationError> {
        let registry = self.registry.unwrap_or_else(|| {
            Box::new(ConcurrentBindingRegistry::new(
                self.config.allow_binding_overriding,
            ))
        });

        for (key, binding) in self.bindings {
            registry.register(key, binding)?;
        }

        let conditional_bindings = self
            .conditional_bindings
            .into_iter()
            .sorted_by_key(|binding| Reverse(binding.priority));

        for ConditionalBinding {
            key,
            binding,
            condition,
            ..
        } in conditional_bindings
        {
            let facade = RegistryFacade(registry.as_ref());
            let context = self.context_factory.create_context(&facade);
            let metadata = ConditionMetadata {
                key: &key,
                binding: &binding,
            };

            if condition(context.as_ref(), metadata) {
                registry.register(key, binding)?;
            } else {
                debug!(%key, "Skipping conditional binding.");
            }
        }

        Ok(Container::from_parts(registry, self.config))
    }
}

struct RegistryFacade<'a>(&'a (dyn BindingRegistry + Send + Sync));

impl BindingRegistryFacade for RegistryFacade<'_> {
    fn is_registered(&self, key: &ComponentKey) -> bool {
        self.0.is_registered(key)
    }

    fn is_type_registered(&self, type_id: TypeId) -> bool {
        !self.0.keys_by_type(type_id).is_empty()
    }
}

/// Thread-safe dependency injection container. Can be shared between threads behind an
/// [Arc](std::sync::Arc); all operations take `&self`.
pub struct Container {
    registry: BindingRegistryPtr,
    cache: InstanceCache,
    config: ContainerConfig,
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl Container {
    /// Creates an empty container with default configuration.
    pub fn new() -> Self {
        let config = ContainerConfig::default();
        Self::from_parts(
            Box::new(ConcurrentBindingRegistry::new(
                config.allow_binding_overriding,
            )),
            config,
        )
    }

    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::new()
    }

    fn from_parts(registry: BindingRegistryPtr, config: ContainerConfig) -> Self {
        Self {
            registry,
            cache: Default::default(),
            config,
        }
    }

    #[inline]
    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    /// Registers a binding for given key, replacing the previous one if overriding is allowed.
    /// The cached instance of a replaced binding is discarded without disposal.
    pub fn register(&self, key: ComponentKey, binding: Binding) -> Result<(), RegistrationError> {
        let previous = self.registry.register(key.clone(), binding)?;
        if previous.is_some() {
            self.cache.invalidate(&key);
        }

        Ok(())
    }

    /// Removes the binding for given key, along with its cached instance. Returns if a binding
    /// was present.
    pub fn unregister(&self, key: &ComponentKey) -> bool {
        let removed = self.registry.unregister(key).is_some();
        self.cache.invalidate(key);
        removed
    }

    #[inline]
    pub fn is_registered(&self, key: &ComponentKey) -> bool {
        self.registry.is_registered(key)
    }

    /// Returns all registered keys of given type, in registration order.
    #[inline]
    pub fn keys_of_type(&self, type_id: TypeId) -> Vec<ComponentKey> {
        self.registry.keys_by_type(type_id)
    }

    /// Returns an instance for given key, creating it and its dependencies if needed.
    pub fn get(&self, key: &ComponentKey) -> Result<ComponentInstanceAnyPtr, ResolutionError> {
        Resolver::new(
            self.registry.as_ref(),
            &self.cache,
            self.config.max_resolution_depth,
        )
        .resolve(key, &mut ResolutionStack::new())
    }

    /// Returns the instance for the unqualified key of `T`.
    #[inline]
    pub fn get_typed<T: Send + Sync + 'static>(
        &self,
    ) -> Result<ComponentInstancePtr<T>, ResolutionError> {
        self.instance_typed()
    }

    /// Returns the instance of `T` qualified with given name.
    #[inline]
    pub fn get_named_typed<T: Send + Sync + 'static>(
        &self,
        name: &str,
    ) -> Result<ComponentInstancePtr<T>, ResolutionError> {
        self.named_instance_typed(name)
    }

    /// Returns the instance for the unqualified key of `T`, or `None` if it's not registered.
    #[inline]
    pub fn get_option_typed<T: Send + Sync + 'static>(
        &self,
    ) -> Result<Option<ComponentInstancePtr<T>>, ResolutionError> {
        self.instance_option()
    }

    /// Returns instances of all keys of type `T`, regardless of qualifiers.
    #[inline]
    pub fn get_all_typed<T: Send + Sync + 'static>(
        &self,
    ) -> Result<Vec<ComponentInstancePtr<T>>, ResolutionError> {
        self.instances_typed()
    }

    /// Discards the cached instance for given key, so the next request creates a new one. The
    /// discarded instance is not disposed. Returns if an instance record was present.
    pub fn invalidate(&self, key: &ComponentKey) -> bool {
        self.cache.invalidate(key)
    }

    /// Discards the cached instance for given key and all singletons which transitively depend on
    /// it. Returns the affected keys, starting with the given one.
    pub fn invalidate_cascading(&self, key: &ComponentKey) -> Vec<ComponentKey> {
        let graph = DependencyGraph::from_bindings(self.registry.all_bindings());

        let mut affected = vec![key.clone()];
        affected.extend(graph.dependents_of(key));

        for key in &affected {
            self.cache.invalidate(key);
        }

        debug!(%key, count = affected.len(), "Invalidated dependent instances.");
        affected
    }

    /// Discards all cached instances without disposing them.
    pub fn reset(&self) {
        self.cache.invalidate_all();
    }

    /// Checks all registered bindings for missing dependencies and cycles without creating any
    /// instances.
    pub fn validate(&self) -> Result<(), ValidationError> {
        DependencyGraph::from_bindings(self.registry.all_bindings()).validate()
    }

    /// Returns the order in which instances would be created for given key.
    pub fn resolution_order(
        &self,
        key: &ComponentKey,
    ) -> Result<Vec<ComponentKey>, ResolutionError> {
        DependencyGraph::from_bindings(self.registry.all_bindings()).resolution_order(key)
    }

    /// Creates instances of all singleton bindings, in registration order.
    pub fn instantiate_singletons(&self) -> Result<(), ResolutionError> {
        let keys = self
            .registry
            .all_bindings()
            .into_iter()
            .filter(|(_, binding)| binding.scope() == Scope::Singleton && !binding.is_alias())
            .sorted_by_key(|(_, binding)| binding.revision())
            .map(|(key, _)| key)
            .collect_vec();

        debug!(count = keys.len(), "Instantiating singletons.");

        keys.iter().try_for_each(|key| self.get(key).map(|_| ()))
    }

    /// Debug information about the singleton record of given key, if one exists.
    #[inline]
    pub fn record_info(&self, key: &ComponentKey) -> Option<RecordInfo> {
        self.cache.record_info(key)
    }

    /// Disposes all created singletons in reverse creation order and removes all bindings.
    /// Disposal errors don't stop the shutdown - they are collected and returned together.
    pub fn shutdown(&self) -> Result<(), ShutdownError> {
        let records = self.cache.invalidate_all();
        debug!(count = records.len(), "Shutting down container.");

        let errors = records
            .iter()
            .rev()
            .filter_map(|record| {
                let disposer = record.binding().disposer()?;
                let instance = record.instance()?;

                disposer(instance).err().map(|error| {
                    warn!(key = %record.key(), %error, "Error disposing component.");
                    DisposalError {
                        key: record.key().clone(),
                        source: ErrorPtr::from(error),
                    }
                })
            })
            .collect_vec();

        self.registry.clear();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ShutdownError { errors })
        }
    }
}

impl ComponentInstanceProvider for Container {
    #[inline]
    fn instance(&self, key: &ComponentKey) -> Result<ComponentInstanceAnyPtr, ResolutionError> {
        self.get(key)
    }

    fn instances(
        &self,
        type_id: TypeId,
    ) -> Result<Vec<(ComponentKey, ComponentInstanceAnyPtr)>, ResolutionError> {
        self.registry
            .keys_by_type(type_id)
            .into_iter()
            .map(|key| self.get(&key).map(|instance| (key, instance)))
            .collect()
    }
}
