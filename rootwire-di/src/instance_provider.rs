//! Pointer types for component instances and the minimal contract used by anything which needs
//! to obtain instances from a container.

use crate::component_key::ComponentKey;
use crate::error::ResolutionError;
use std::any::{type_name, Any, TypeId};
use std::error::Error;
use std::sync::Arc;

pub type ComponentInstancePtr<T> = Arc<T>;

pub type ComponentInstanceAnyPtr = ComponentInstancePtr<dyn Any + Send + Sync + 'static>;

/// Shared pointer to a type-erased error, cloneable so multiple waiters can observe the same
/// failure.
pub type ErrorPtr = Arc<dyn Error + Send + Sync>;

/// Error type returned by factories and disposers. Any error can be converted with `?`.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Generic provider for component instances.
pub trait ComponentInstanceProvider {
    /// Returns an instance for given key, creating it along with its dependencies if needed.
    fn instance(&self, key: &ComponentKey) -> Result<ComponentInstanceAnyPtr, ResolutionError>;

    /// Returns instances of all bindings registered for given type, regardless of their
    /// qualifiers.
    fn instances(
        &self,
        type_id: TypeId,
    ) -> Result<Vec<(ComponentKey, ComponentInstanceAnyPtr)>, ResolutionError>;
}

/// Helper trait for [ComponentInstanceProvider] providing strongly-typed access.
pub trait TypedComponentInstanceProvider {
    /// Typesafe version of [ComponentInstanceProvider::instance] for the unqualified key of `T`.
    fn instance_typed<T: Send + Sync + 'static>(
        &self,
    ) -> Result<ComponentInstancePtr<T>, ResolutionError>;

    /// Typesafe version of [ComponentInstanceProvider::instance] for `T` qualified with `name`.
    fn named_instance_typed<T: Send + Sync + 'static>(
        &self,
        name: &str,
    ) -> Result<ComponentInstancePtr<T>, ResolutionError>;

    /// Tries to get an instance like [TypedComponentInstanceProvider::instance_typed] does,
    /// but returns `None` when `T` is not registered. Other errors, including missing
    /// dependencies of `T`, are still returned.
    fn instance_option<T: Send + Sync + 'static>(
        &self,
    ) -> Result<Option<ComponentInstancePtr<T>>, ResolutionError>;

    /// Typesafe version of [ComponentInstanceProvider::instances].
    fn instances_typed<T: Send + Sync + 'static>(
        &self,
    ) -> Result<Vec<ComponentInstancePtr<T>>, ResolutionError>;
}

impl<CIP: ComponentInstanceProvider + ?Sized> TypedComponentInstanceProvider for CIP {
    fn instance_typed<T: Send + Sync + 'static>(
        &self,
    ) -> Result<ComponentInstancePtr<T>, ResolutionError> {
        let key = ComponentKey::of::<T>();
        self.instance(&key)
            .and_then(|instance| downcast_instance(&key, instance))
    }

    fn named_instance_typed<T: Send + Sync + 'static>(
        &self,
        name: &str,
    ) -> Result<ComponentInstancePtr<T>, ResolutionError> {
        let key = ComponentKey::named::<T>(name.to_string());
        self.instance(&key)
            .and_then(|instance| downcast_instance(&key, instance))
    }

    fn instance_option<T: Send + Sync + 'static>(
        &self,
    ) -> Result<Option<ComponentInstancePtr<T>>, ResolutionError> {
        let key = ComponentKey::of::<T>();
        match self.instance(&key) {
            Ok(instance) => downcast_instance(&key, instance).map(Some),
            Err(ResolutionError::NotRegistered {
                key: missing,
                required_by,
            }) if missing == key && required_by.is_empty() => Ok(None),
            Err(error) => Err(error),
        }
    }

    fn instances_typed<T: Send + Sync + 'static>(
        &self,
    ) -> Result<Vec<ComponentInstancePtr<T>>, ResolutionError> {
        self.instances(TypeId::of::<T>()).and_then(|instances| {
            instances
                .into_iter()
                .map(|(key, instance)| downcast_instance(&key, instance))
                .collect()
        })
    }
}

/// Casts a type-erased instance registered under `key` to `T`.
pub fn downcast_instance<T: Send + Sync + 'static>(
    key: &ComponentKey,
    instance: ComponentInstanceAnyPtr,
) -> Result<ComponentInstancePtr<T>, ResolutionError> {
    instance
        .downcast::<T>()
        .map_err(|_| ResolutionError::IncompatibleComponent {
            key: key.clone(),
            requested_type: type_name::<T>(),
        })
}

#[cfg(test)]
mod tests {
    use crate::component_key::ComponentKey;
    use crate::error::ResolutionError;
    use crate::instance_provider::{
        ComponentInstanceAnyPtr, ComponentInstanceProvider, ComponentInstancePtr,
        TypedComponentInstanceProvider,
    };
    use mockall::mock;
    use mockall::predicate::*;
    use std::any::TypeId;

    mock! {
        ComponentInstanceProvider {}

        impl ComponentInstanceProvider for ComponentInstanceProvider {
            fn instance(
                &self,
                key: &ComponentKey,
            ) -> Result<ComponentInstanceAnyPtr, ResolutionError>;

            fn instances(
                &self,
                type_id: TypeId,
            ) -> Result<Vec<(ComponentKey, ComponentInstanceAnyPtr)>, ResolutionError>;
        }
    }

    #[test]
    fn should_cast_typed_instance() {
        let mut provider = MockComponentInstanceProvider::new();
        provider
            .expect_instance()
            .with(eq(ComponentKey::of::<i8>()))
            .times(1)
            .returning(|_| Ok(ComponentInstancePtr::new(5i8) as ComponentInstanceAnyPtr));

        assert_eq!(*provider.instance_typed::<i8>().unwrap(), 5);
    }

    #[test]
    fn should_reject_incompatible_instance() {
        let mut provider = MockComponentInstanceProvider::new();
        provider
            .expect_instance()
            .returning(|_| Ok(ComponentInstancePtr::new(5u8) as ComponentInstanceAnyPtr));

        assert!(matches!(
            provider.instance_typed::<i8>().unwrap_err(),
            ResolutionError::IncompatibleComponent { .. }
        ));
    }

    #[test]
    fn should_return_none_for_missing_optional_instance() {
        let mut provider = MockComponentInstanceProvider::new();
        provider.expect_instance().returning(|key| {
            Err(ResolutionError::NotRegistered {
                key: key.clone(),
                required_by: vec![],
            })
        });

        assert!(provider.instance_option::<i8>().unwrap().is_none());
    }

    #[test]
    fn should_forward_missing_dependency_of_optional_instance() {
        let mut provider = MockComponentInstanceProvider::new();
        provider.expect_instance().returning(|key| {
            Err(ResolutionError::NotRegistered {
                key: ComponentKey::of::<u8>(),
                required_by: vec![key.clone()],
            })
        });

        assert!(provider.instance_option::<i8>().is_err());
    }

    #[test]
    fn should_return_all_typed_instances() {
        let mut provider = MockComponentInstanceProvider::new();
        provider
            .expect_instances()
            .with(eq(TypeId::of::<i8>()))
            .times(1)
            .returning(|_| {
                Ok(vec![
                    (
                        ComponentKey::named::<i8>("a"),
                        ComponentInstancePtr::new(1i8) as ComponentInstanceAnyPtr,
                    ),
                    (
                        ComponentKey::named::<i8>("b"),
                        ComponentInstancePtr::new(2i8) as ComponentInstanceAnyPtr,
                    ),
                ])
            });

        let instances = provider.instances_typed::<i8>().unwrap();
        assert_eq!(instances.len(), 2);
        assert_eq!(*instances[1], 2);
    }
}
