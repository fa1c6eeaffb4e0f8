//! Depth-first expansion of a requested key into a fully constructed instance.
//!
//! For every key, the resolver pushes it onto a per-request [ResolutionStack], resolves the
//! declared dependencies of its binding (recursively, on the same stack), invokes the factory with
//! the resolved dependencies and pops the key. A key appearing twice on the stack is a cycle and
//! fails immediately. The resulting creation order is the natural DFS post-order of dependency
//! declarations - independent subtrees have no guaranteed relative order.

use crate::component_key::ComponentKey;
use crate::component_registry::{BindingKind, BindingPtr, BindingRegistry};
use crate::error::ResolutionError;
use crate::instance_cache::InstanceCache;
use crate::instance_provider::{
    downcast_instance, BoxError, ComponentInstanceAnyPtr, ComponentInstancePtr, ErrorPtr,
};
use fxhash::FxHashSet;

/// Ordered set of keys currently being built within a single top-level request. Exists only for
/// the duration of that request.
#[derive(Clone, Debug, Default)]
pub struct ResolutionStack {
    keys: Vec<ComponentKey>,
    members: FxHashSet<ComponentKey>,
}

impl ResolutionStack {
    pub fn new() -> Self {
        Default::default()
    }

    /// Pushes given key, failing with [ResolutionError::CircularDependency] if it is already
    /// present. The error path starts and ends with the repeated key.
    pub fn push(&mut self, key: ComponentKey) -> Result<(), ResolutionError> {
        if self.members.contains(&key) {
            let start = self
                .keys
                .iter()
                .position(|present| *present == key)
                .unwrap_or_default();

            let mut path = self.keys[start..].to_vec();
            path.push(key.clone());

            return Err(ResolutionError::CircularDependency {
                key: self.root().cloned().unwrap_or(key),
                path,
            });
        }

        self.members.insert(key.clone());
        self.keys.push(key);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<ComponentKey> {
        let key = self.keys.pop()?;
        self.members.remove(&key);
        Some(key)
    }

    #[inline]
    pub fn contains(&self, key: &ComponentKey) -> bool {
        self.members.contains(key)
    }

    /// The key requested at the top level.
    #[inline]
    pub fn root(&self) -> Option<&ComponentKey> {
        self.keys.first()
    }

    #[inline]
    pub fn keys(&self) -> &[ComponentKey] {
        &self.keys
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.keys.len()
    }
}

/// Dependencies resolved for a factory binding, in declaration order.
#[derive(Clone, Debug)]
pub struct ResolvedDependencies {
    owner: ComponentKey,
    instances: Vec<(ComponentKey, ComponentInstanceAnyPtr)>,
}

impl ResolvedDependencies {
    pub fn new(
        owner: ComponentKey,
        instances: Vec<(ComponentKey, ComponentInstanceAnyPtr)>,
    ) -> Self {
        Self { owner, instances }
    }

    /// Returns the declared unqualified dependency of type `T`.
    #[inline]
    pub fn get<T: Send + Sync + 'static>(
        &self,
    ) -> Result<ComponentInstancePtr<T>, ResolutionError> {
        self.get_by_key(&ComponentKey::of::<T>())
    }

    /// Returns the declared dependency of type `T` qualified with given name.
    #[inline]
    pub fn get_named<T: Send + Sync + 'static>(
        &self,
        name: &str,
    ) -> Result<ComponentInstancePtr<T>, ResolutionError> {
        self.get_by_key(&ComponentKey::named::<T>(name.to_string()))
    }

    /// Returns the declared dependency registered under given key.
    pub fn get_by_key<T: Send + Sync + 'static>(
        &self,
        key: &ComponentKey,
    ) -> Result<ComponentInstancePtr<T>, ResolutionError> {
        self.get_any(key)
            .cloned()
            .ok_or_else(|| ResolutionError::UndeclaredDependency {
                key: self.owner.clone(),
                dependency: key.clone(),
            })
            .and_then(|instance| downcast_instance(key, instance))
    }

    /// Returns the type-erased instance of given dependency, if declared.
    pub fn get_any(&self, key: &ComponentKey) -> Option<&ComponentInstanceAnyPtr> {
        self.instances
            .iter()
            .find(|(declared, _)| declared == key)
            .map(|(_, instance)| instance)
    }

    /// Key of the component being constructed.
    #[inline]
    pub fn owner(&self) -> &ComponentKey {
        &self.owner
    }

    pub fn iter(&self) -> impl Iterator<Item = &(ComponentKey, ComponentInstanceAnyPtr)> {
        self.instances.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

pub(crate) struct Resolver<'a> {
    registry: &'a dyn BindingRegistry,
    cache: &'a InstanceCache,
    max_depth: usize,
}

impl<'a> Resolver<'a> {
    pub(crate) fn new(
        registry: &'a dyn BindingRegistry,
        cache: &'a InstanceCache,
        max_depth: usize,
    ) -> Self {
        Self {
            registry,
            cache,
            max_depth,
        }
    }

    pub(crate) fn resolve(
        &self,
        key: &ComponentKey,
        stack: &mut ResolutionStack,
    ) -> Result<ComponentInstanceAnyPtr, ResolutionError> {
        let binding =
            self.registry
                .lookup(key)
                .ok_or_else(|| ResolutionError::NotRegistered {
                    key: key.clone(),
                    required_by: stack.keys().to_vec(),
                })?;

        if stack.depth() >= self.max_depth {
            return Err(ResolutionError::ResolutionTooDeep {
                key: stack.root().unwrap_or(key).clone(),
                limit: self.max_depth,
            });
        }

        stack.push(key.clone())?;

        let result = match binding.kind() {
            BindingKind::Alias(target) => self.resolve(target, stack),
            _ if binding.scope().is_cached() => {
                self.cache.get_or_create(key, &binding, stack, |stack| {
                    self.construct(key, &binding, stack)
                })
            }
            _ => self.construct(key, &binding, stack),
        };

        stack.pop();
        result
    }

    fn construct(
        &self,
        key: &ComponentKey,
        binding: &BindingPtr,
        stack: &mut ResolutionStack,
    ) -> Result<ComponentInstanceAnyPtr, ResolutionError> {
        match binding.kind() {
            BindingKind::Instance(instance) => Ok(instance.clone()),
            BindingKind::Alias(target) => self.resolve(target, stack),
            BindingKind::Factory {
                dependencies,
                constructor,
            } => {
                let instances = dependencies
                    .iter()
                    .map(|dependency| {
                        self.resolve(dependency, stack)
                            .map(|instance| (dependency.clone(), instance))
                    })
                    .collect::<Result<Vec<_>, _>>()?;

                constructor(&ResolvedDependencies::new(key.clone(), instances))
                    .map_err(|error| instantiation_error(key, stack, error))
            }
        }
    }
}

// factories propagating resolution errors with `?` keep their original meaning
fn instantiation_error(
    key: &ComponentKey,
    stack: &ResolutionStack,
    error: BoxError,
) -> ResolutionError {
    match error.downcast::<ResolutionError>() {
        Ok(error) => *error,
        Err(error) => ResolutionError::Instantiation {
            key: key.clone(),
            path: stack.keys().to_vec(),
            source: ErrorPtr::from(error),
        },
    }
}

#[cfg(test)]
mod tests {
    use crate::component_key::ComponentKey;
    use crate::component_registry::{Binding, BindingPtr, MockBindingRegistry};
    use crate::error::ResolutionError;
    use crate::instance_cache::InstanceCache;
    use crate::instance_provider::{ComponentInstanceAnyPtr, ComponentInstancePtr};
    use crate::resolver::{ResolutionStack, ResolvedDependencies, Resolver};
    use mockall::predicate::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct A;
    struct B;

    #[test]
    fn should_detect_repeated_key() {
        let mut stack = ResolutionStack::new();
        stack.push(ComponentKey::of::<u8>()).unwrap();
        stack.push(ComponentKey::of::<A>()).unwrap();
        stack.push(ComponentKey::of::<B>()).unwrap();

        let ResolutionError::CircularDependency { key, path } =
            stack.push(ComponentKey::of::<A>()).unwrap_err()
        else {
            panic!("expected a cycle");
        };

        assert_eq!(key, ComponentKey::of::<u8>());
        assert_eq!(
            path,
            vec![
                ComponentKey::of::<A>(),
                ComponentKey::of::<B>(),
                ComponentKey::of::<A>()
            ]
        );
        assert_eq!(stack.depth(), 3);
    }

    #[test]
    fn should_pop_keys() {
        let mut stack = ResolutionStack::new();
        stack.push(ComponentKey::of::<A>()).unwrap();

        assert_eq!(stack.pop(), Some(ComponentKey::of::<A>()));
        assert!(!stack.contains(&ComponentKey::of::<A>()));
        assert!(stack.push(ComponentKey::of::<A>()).is_ok());
    }

    #[test]
    fn should_reject_undeclared_dependency() {
        let dependencies = ResolvedDependencies::new(
            ComponentKey::of::<A>(),
            vec![(
                ComponentKey::of::<i8>(),
                ComponentInstancePtr::new(1i8) as ComponentInstanceAnyPtr,
            )],
        );

        assert_eq!(*dependencies.get::<i8>().unwrap(), 1);
        assert!(matches!(
            dependencies.get_named::<i8>("other").unwrap_err(),
            ResolutionError::UndeclaredDependency { .. }
        ));
    }

    fn binding_ptr(mut registry_binding: Binding) -> BindingPtr {
        // revisions are normally assigned by the registry
        registry_binding.revision = 1;
        Arc::new(registry_binding)
    }

    #[test]
    fn should_resolve_declared_dependencies_before_factory() {
        let b_key = ComponentKey::of::<B>();
        let a_key = ComponentKey::of::<A>();

        let mut registry = MockBindingRegistry::new();
        registry
            .expect_lookup()
            .with(eq(a_key.clone()))
            .times(1)
            .return_const(Some(binding_ptr(
                Binding::transient(|dependencies| {
                    dependencies.get::<B>()?;
                    Ok(A)
                })
                .depends_on_type::<B>(),
            )));
        registry
            .expect_lookup()
            .with(eq(b_key))
            .times(1)
            .return_const(Some(binding_ptr(Binding::transient(|_| Ok(B)))));

        let cache = InstanceCache::default();
        let resolver = Resolver::new(&registry, &cache, 16);
        let mut stack = ResolutionStack::new();

        let instance = resolver.resolve(&a_key, &mut stack).unwrap();
        assert!(instance.downcast::<A>().is_ok());
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn should_not_return_missing_binding() {
        let mut registry = MockBindingRegistry::new();
        registry.expect_lookup().return_const(None);

        let cache = InstanceCache::default();
        let resolver = Resolver::new(&registry, &cache, 16);

        assert!(matches!(
            resolver
                .resolve(&ComponentKey::of::<A>(), &mut ResolutionStack::new())
                .unwrap_err(),
            ResolutionError::NotRegistered { .. }
        ));
    }

    #[test]
    fn should_wrap_factory_errors() {
        let mut registry = MockBindingRegistry::new();
        registry
            .expect_lookup()
            .return_const(Some(binding_ptr(Binding::transient::<A, _>(|_| {
                Err("connection refused".into())
            }))));

        let cache = InstanceCache::default();
        let resolver = Resolver::new(&registry, &cache, 16);

        let ResolutionError::Instantiation { key, path, source } = resolver
            .resolve(&ComponentKey::of::<A>(), &mut ResolutionStack::new())
            .unwrap_err()
        else {
            panic!("expected instantiation error");
        };

        assert_eq!(key, ComponentKey::of::<A>());
        assert_eq!(path, vec![ComponentKey::of::<A>()]);
        assert_eq!(source.to_string(), "connection refused");
    }

    #[test]
    fn should_limit_resolution_depth() {
        let mut registry = MockBindingRegistry::new();
        registry.expect_lookup().returning(|key| {
            let next = ComponentKey::named::<A>(format!("{}0", key.qualifier().unwrap_or("")));
            Some(binding_ptr(Binding::transient(|_| Ok(A)).depends_on(next)))
        });

        let cache = InstanceCache::default();
        let resolver = Resolver::new(&registry, &cache, 8);

        assert!(matches!(
            resolver
                .resolve(&ComponentKey::of::<A>(), &mut ResolutionStack::new())
                .unwrap_err(),
            ResolutionError::ResolutionTooDeep { limit: 8, .. }
        ));
    }

    #[test]
    fn should_cache_singletons() {
        let counter = Arc::new(AtomicUsize::new(0));
        let factory_counter = counter.clone();

        let mut registry = MockBindingRegistry::new();
        registry
            .expect_lookup()
            .return_const(Some(binding_ptr(Binding::singleton(move |_| {
                factory_counter.fetch_add(1, Ordering::SeqCst);
                Ok(A)
            }))));

        let cache = InstanceCache::default();
        let resolver = Resolver::new(&registry, &cache, 16);
        let key = ComponentKey::of::<A>();

        let first = resolver.resolve(&key, &mut ResolutionStack::new()).unwrap();
        let second = resolver.resolve(&key, &mut ResolutionStack::new()).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn should_bypass_cache_for_transients() {
        let counter = Arc::new(AtomicUsize::new(0));
        let factory_counter = counter.clone();

        let mut registry = MockBindingRegistry::new();
        registry
            .expect_lookup()
            .return_const(Some(binding_ptr(Binding::transient(move |_| {
                factory_counter.fetch_add(1, Ordering::SeqCst);
                Ok(A)
            }))));

        let cache = InstanceCache::default();
        let resolver = Resolver::new(&registry, &cache, 16);
        let key = ComponentKey::of::<A>();

        let first = resolver.resolve(&key, &mut ResolutionStack::new()).unwrap();
        let second = resolver.resolve(&key, &mut ResolutionStack::new()).unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert!(cache.record_info(&key).is_none());
    }
}
