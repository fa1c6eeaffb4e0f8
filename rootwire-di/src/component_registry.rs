//! Functionality related to registering [Binding]s - recipes describing how to create instances
//! for a given [ComponentKey]. A [Container](crate::container::Container) creates instances based
//! on those bindings.
//!
//! A binding is one of:
//!
//! * a factory - a function receiving [ResolvedDependencies] for the keys it declared,
//! * a pre-built instance,
//! * an alias - a reference to another key.
//!
//! ```
//! use rootwire_di::component_key::ComponentKey;
//! use rootwire_di::component_registry::Binding;
//!
//! struct Logger;
//!
//! struct Service {
//!     logger: std::sync::Arc<Logger>,
//! }
//!
//! let logger = Binding::singleton(|_| Ok(Logger));
//! let service = Binding::singleton(|dependencies| {
//!     Ok(Service {
//!         logger: dependencies.get::<Logger>()?,
//!     })
//! })
//! .depends_on(ComponentKey::of::<Logger>());
//! ```

pub mod conditional;

use crate::component_key::ComponentKey;
use crate::component_registry::registry::BindingMap;
use crate::error::RegistrationError;
use crate::instance_provider::{BoxError, ComponentInstanceAnyPtr, ComponentInstancePtr};
use crate::resolver::ResolvedDependencies;
use crate::scope::Scope;
use derivative::Derivative;
#[cfg(test)]
use mockall::automock;
use parking_lot::RwLock;
use std::any::{type_name, TypeId};
use std::slice;
use std::sync::Arc;
use tracing::debug;

/// Type-erased constructor of a factory binding.
pub type ConstructorFn = Arc<
    dyn Fn(&ResolvedDependencies) -> Result<ComponentInstanceAnyPtr, BoxError> + Send + Sync,
>;

/// Type-erased disposer invoked for resolved singletons on container shutdown.
pub type DisposerFn = Arc<dyn Fn(&ComponentInstanceAnyPtr) -> Result<(), BoxError> + Send + Sync>;

pub type BindingPtr = Arc<Binding>;

pub type BindingRegistryPtr = Box<dyn BindingRegistry + Send + Sync>;

/// The way a [Binding] produces instances.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub enum BindingKind {
    Factory {
        /// Keys resolved before calling the constructor, in declaration order.
        dependencies: Vec<ComponentKey>,
        #[derivative(Debug = "ignore")]
        constructor: ConstructorFn,
    },
    Instance(#[derivative(Debug = "ignore")] ComponentInstanceAnyPtr),
    Alias(ComponentKey),
}

/// Declared recipe for producing an instance for a given key.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct Binding {
    kind: BindingKind,
    scope: Scope,
    #[derivative(Debug = "ignore")]
    disposer: Option<DisposerFn>,
    // assigned by the registry; orders registrations of the same key
    pub(crate) revision: u64,
}

impl Binding {
    fn new(kind: BindingKind, scope: Scope) -> Self {
        Self {
            kind,
            scope,
            disposer: None,
            revision: 0,
        }
    }

    /// Creates a factory binding producing `T` in given scope.
    pub fn factory<T, F>(scope: Scope, constructor: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&ResolvedDependencies) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        Self::new(
            BindingKind::Factory {
                dependencies: vec![],
                constructor: Arc::new(move |dependencies: &ResolvedDependencies| {
                    constructor(dependencies)
                        .map(|instance| {
                            ComponentInstancePtr::new(instance) as ComponentInstanceAnyPtr
                        })
                }),
            },
            scope,
        )
    }

    /// Creates a [Scope::Singleton] factory binding.
    #[inline]
    pub fn singleton<T, F>(constructor: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&ResolvedDependencies) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        Self::factory(Scope::Singleton, constructor)
    }

    /// Creates a [Scope::Transient] factory binding.
    #[inline]
    pub fn transient<T, F>(constructor: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&ResolvedDependencies) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        Self::factory(Scope::Transient, constructor)
    }

    /// Creates a binding for an already constructed instance.
    #[inline]
    pub fn instance<T: Send + Sync + 'static>(instance: T) -> Self {
        Self::shared(ComponentInstancePtr::new(instance))
    }

    /// Creates a binding for an already constructed instance, which can be shared with code
    /// outside the container.
    pub fn shared<T: Send + Sync + 'static>(instance: ComponentInstancePtr<T>) -> Self {
        Self::new(
            BindingKind::Instance(instance as ComponentInstanceAnyPtr),
            Scope::Singleton,
        )
    }

    /// Creates an alias resolving to `target`. Aliases delegate caching to the target binding.
    pub fn alias(target: ComponentKey) -> Self {
        Self::new(BindingKind::Alias(target), Scope::Transient)
    }

    /// Declares a dependency, which will be resolved before calling the factory. Has no effect
    /// for non-factory bindings.
    pub fn depends_on(mut self, key: ComponentKey) -> Self {
        match &mut self.kind {
            BindingKind::Factory { dependencies, .. } => dependencies.push(key),
            _ => debug!(dependency = %key, "Ignoring dependency of a non-factory binding."),
        }
        self
    }

    /// Declares a dependency on the unqualified key of `T`.
    #[inline]
    pub fn depends_on_type<T: ?Sized + 'static>(self) -> Self {
        self.depends_on(ComponentKey::of::<T>())
    }

    /// Sets a disposer called with the instance when the container shuts down. Only resolved
    /// singletons are disposed.
    pub fn with_disposer<T, F>(mut self, disposer: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&T) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.disposer = Some(Arc::new(move |instance: &ComponentInstanceAnyPtr| {
            match instance.downcast_ref::<T>() {
                Some(instance) => disposer(instance),
                None => Err(format!("Cannot dispose instance as {}", type_name::<T>()).into()),
            }
        }));
        self
    }

    #[inline]
    pub fn kind(&self) -> &BindingKind {
        &self.kind
    }

    #[inline]
    pub fn scope(&self) -> Scope {
        self.scope
    }

    #[inline]
    pub fn disposer(&self) -> Option<&DisposerFn> {
        self.disposer.as_ref()
    }

    /// Registration revision - later registrations have higher revisions. Zero for bindings
    /// which haven't been registered yet.
    #[inline]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Keys this binding needs in order to produce an instance.
    pub fn dependencies(&self) -> &[ComponentKey] {
        match &self.kind {
            BindingKind::Factory { dependencies, .. } => dependencies,
            BindingKind::Instance(_) => &[],
            BindingKind::Alias(target) => slice::from_ref(target),
        }
    }

    #[inline]
    pub fn is_alias(&self) -> bool {
        matches!(self.kind, BindingKind::Alias(_))
    }
}

/// A durable mapping from [ComponentKey] to [Binding]. Implementations must be safe for concurrent
/// registration and lookup, with readers never observing a partially written binding.
#[cfg_attr(test, automock)]
pub trait BindingRegistry {
    /// Inserts or overwrites the binding for given key, returning the previous one. Handling of
    /// overwrites is registry-dependent.
    fn register(
        &self,
        key: ComponentKey,
        binding: Binding,
    ) -> Result<Option<BindingPtr>, RegistrationError>;

    /// Returns the binding registered for given key.
    fn lookup(&self, key: &ComponentKey) -> Option<BindingPtr>;

    /// Removes the binding for given key, returning it if present.
    fn unregister(&self, key: &ComponentKey) -> Option<BindingPtr>;

    /// Returns all keys registered for given type, in registration order.
    fn keys_by_type(&self, type_id: TypeId) -> Vec<ComponentKey>;

    /// Checks if given key is present in this registry.
    fn is_registered(&self, key: &ComponentKey) -> bool;

    /// Returns a snapshot of all registered bindings.
    fn all_bindings(&self) -> Vec<(ComponentKey, BindingPtr)>;

    /// Removes all bindings.
    fn clear(&self);
}

/// Default [BindingRegistry] guarded by a read-write lock. Lookups only take the shared lock and
/// clone an [Arc], so they never block each other.
#[derive(Debug)]
pub struct ConcurrentBindingRegistry {
    binding_map: RwLock<BindingMap>,
    allow_binding_overriding: bool,
}

impl ConcurrentBindingRegistry {
    pub fn new(allow_binding_overriding: bool) -> Self {
        Self {
            binding_map: Default::default(),
            allow_binding_overriding,
        }
    }
}

impl Default for ConcurrentBindingRegistry {
    fn default() -> Self {
        Self::new(true)
    }
}

impl BindingRegistry for ConcurrentBindingRegistry {
    fn register(
        &self,
        key: ComponentKey,
        binding: Binding,
    ) -> Result<Option<BindingPtr>, RegistrationError> {
        debug!(%key, scope = %binding.scope(), "Registering binding.");
        self.binding_map
            .write()
            .try_register(key, binding, self.allow_binding_overriding)
    }

    #[inline]
    fn lookup(&self, key: &ComponentKey) -> Option<BindingPtr> {
        self.binding_map.read().lookup(key)
    }

    fn unregister(&self, key: &ComponentKey) -> Option<BindingPtr> {
        debug!(%key, "Unregistering binding.");
        self.binding_map.write().unregister(key)
    }

    #[inline]
    fn keys_by_type(&self, type_id: TypeId) -> Vec<ComponentKey> {
        self.binding_map.read().keys_by_type(type_id)
    }

    #[inline]
    fn is_registered(&self, key: &ComponentKey) -> bool {
        self.binding_map.read().is_registered(key)
    }

    #[inline]
    fn all_bindings(&self) -> Vec<(ComponentKey, BindingPtr)> {
        self.binding_map.read().all_bindings()
    }

    fn clear(&self) {
        self.binding_map.write().clear();
    }
}

mod registry {
    use crate::component_key::ComponentKey;
    use crate::component_registry::{Binding, BindingPtr};
    use crate::error::RegistrationError;
    use fxhash::FxHashMap;
    use std::any::TypeId;
    use std::sync::Arc;

    #[derive(Default, Debug)]
    pub(super) struct BindingMap {
        bindings: FxHashMap<ComponentKey, BindingPtr>,
        types: FxHashMap<TypeId, Vec<ComponentKey>>,
        last_revision: u64,
    }

    impl BindingMap {
        pub(super) fn try_register(
            &mut self,
            key: ComponentKey,
            mut binding: Binding,
            allow_binding_overriding: bool,
        ) -> Result<Option<BindingPtr>, RegistrationError> {
            if !allow_binding_overriding && self.bindings.contains_key(&key) {
                return Err(RegistrationError::DuplicateBinding(key.to_string()));
            }

            self.last_revision += 1;
            binding.revision = self.last_revision;

            let previous = self.bindings.insert(key.clone(), Arc::new(binding));
            if previous.is_none() {
                self.types.entry(key.type_id()).or_default().push(key);
            }

            Ok(previous)
        }

        #[inline]
        pub(super) fn lookup(&self, key: &ComponentKey) -> Option<BindingPtr> {
            self.bindings.get(key).cloned()
        }

        pub(super) fn unregister(&mut self, key: &ComponentKey) -> Option<BindingPtr> {
            let removed = self.bindings.remove(key)?;

            if let Some(keys) = self.types.get_mut(&key.type_id()) {
                keys.retain(|registered| registered != key);
                if keys.is_empty() {
                    self.types.remove(&key.type_id());
                }
            }

            Some(removed)
        }

        pub(super) fn keys_by_type(&self, type_id: TypeId) -> Vec<ComponentKey> {
            self.types.get(&type_id).cloned().unwrap_or_default()
        }

        #[inline]
        pub(super) fn is_registered(&self, key: &ComponentKey) -> bool {
            self.bindings.contains_key(key)
        }

        pub(super) fn all_bindings(&self) -> Vec<(ComponentKey, BindingPtr)> {
            self.bindings
                .iter()
                .map(|(key, binding)| (key.clone(), binding.clone()))
                .collect()
        }

        pub(super) fn clear(&mut self) {
            self.bindings.clear();
            self.types.clear();
        }
    }

    #[cfg(test)]
    mod tests {
        use crate::component_key::ComponentKey;
        use crate::component_registry::registry::BindingMap;
        use crate::component_registry::Binding;
        use crate::error::RegistrationError;
        use std::any::TypeId;

        #[test]
        fn should_register_binding() {
            let key = ComponentKey::named::<i8>("name");

            let mut registry = BindingMap::default();
            assert!(registry
                .try_register(key.clone(), Binding::instance(1i8), false)
                .unwrap()
                .is_none());

            assert!(registry.is_registered(&key));
            assert!(registry.lookup(&key).unwrap().revision() > 0);
            assert_eq!(registry.keys_by_type(TypeId::of::<i8>()), vec![key]);
        }

        #[test]
        fn should_not_register_duplicate_key() {
            let key = ComponentKey::of::<i8>();

            let mut registry = BindingMap::default();
            registry
                .try_register(key.clone(), Binding::instance(1i8), false)
                .unwrap();

            assert_eq!(
                registry
                    .try_register(key.clone(), Binding::instance(2i8), false)
                    .unwrap_err(),
                RegistrationError::DuplicateBinding(key.to_string())
            );
        }

        #[test]
        fn should_override_duplicate_key() {
            let key = ComponentKey::of::<i8>();

            let mut registry = BindingMap::default();
            registry
                .try_register(key.clone(), Binding::instance(1i8), true)
                .unwrap();
            let first_revision = registry.lookup(&key).unwrap().revision();

            assert!(registry
                .try_register(key.clone(), Binding::instance(2i8), true)
                .unwrap()
                .is_some());

            assert!(registry.lookup(&key).unwrap().revision() > first_revision);
            assert_eq!(registry.keys_by_type(TypeId::of::<i8>()).len(), 1);
        }

        #[test]
        fn should_unregister_binding() {
            let first = ComponentKey::named::<i8>("first");
            let second = ComponentKey::named::<i8>("second");

            let mut registry = BindingMap::default();
            registry
                .try_register(first.clone(), Binding::instance(1i8), false)
                .unwrap();
            registry
                .try_register(second.clone(), Binding::instance(2i8), false)
                .unwrap();

            assert!(registry.unregister(&first).is_some());
            assert!(registry.unregister(&first).is_none());
            assert!(!registry.is_registered(&first));
            assert_eq!(registry.keys_by_type(TypeId::of::<i8>()), vec![second]);
        }
    }
}
