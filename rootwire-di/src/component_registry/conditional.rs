//! Conditional binding registration support.
//!
//! Bindings added with
//! [ContainerBuilder::register_conditional](crate::container::ContainerBuilder::register_conditional)
//! are registered only if their condition passes. Conditions are evaluated after all unconditional
//! bindings are registered, in descending priority order, so a condition can observe bindings
//! registered by higher-priority conditional entries. A common use case is providing default
//! implementations which step aside when the user registers their own.

use crate::component_key::ComponentKey;
use crate::component_registry::Binding;
#[cfg(test)]
use mockall::automock;
use std::any::TypeId;

/// A read-only facade of a [BindingRegistry](super::BindingRegistry) safe to use in registration
/// conditions.
#[cfg_attr(test, automock)]
pub trait BindingRegistryFacade {
    /// Checks if given key is present in the registry.
    fn is_registered(&self, key: &ComponentKey) -> bool;

    /// Checks if any key of given type is present in the registry, regardless of its qualifier.
    fn is_type_registered(&self, type_id: TypeId) -> bool;
}

/// Context information for use by condition implementations.
pub trait Context {
    /// Returns the registry for which the conditional evaluation is taking place.
    fn registry(&self) -> &dyn BindingRegistryFacade;
}

/// Factory for contexts for conditional binding registration.
pub trait ContextFactory {
    /// Creates a new context when starting evaluation.
    fn create_context<'a>(
        &self,
        registry: &'a dyn BindingRegistryFacade,
    ) -> Box<dyn Context + 'a>;
}

/// Metadata for the binding which is currently evaluated for registration.
#[derive(Clone, Debug, Copy)]
pub struct ConditionMetadata<'a> {
    pub key: &'a ComponentKey,
    pub binding: &'a Binding,
}

/// Registration condition which should pass to let given binding be registered.
pub type BindingCondition = fn(context: &dyn Context, metadata: ConditionMetadata) -> bool;

struct SimpleContext<'a> {
    registry: &'a dyn BindingRegistryFacade,
}

impl Context for SimpleContext<'_> {
    fn registry(&self) -> &dyn BindingRegistryFacade {
        self.registry
    }
}

/// Factory producing contexts containing only the necessary data and noting more.
#[derive(Default, Debug, Copy, Clone, Eq, PartialEq)]
pub struct SimpleContextFactory;

impl ContextFactory for SimpleContextFactory {
    fn create_context<'a>(
        &self,
        registry: &'a dyn BindingRegistryFacade,
    ) -> Box<dyn Context + 'a> {
        Box::new(SimpleContext { registry })
    }
}

/// Simple condition returning true if any binding for the given type is already registered.
pub fn registered_component<T: ?Sized + 'static>(
    context: &dyn Context,
    _metadata: ConditionMetadata,
) -> bool {
    context.registry().is_type_registered(TypeId::of::<T>())
}

/// Simple condition returning true if no binding for the given type is registered yet.
pub fn unregistered_component<T: ?Sized + 'static>(
    context: &dyn Context,
    metadata: ConditionMetadata,
) -> bool {
    !registered_component::<T>(context, metadata)
}

/// Returns true if the exact key being registered is not registered yet.
pub fn unregistered_key(context: &dyn Context, metadata: ConditionMetadata) -> bool {
    !context.registry().is_registered(metadata.key)
}
