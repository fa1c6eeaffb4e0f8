//! Identity of injectable components.
//!
//! Every binding is registered under a [ComponentKey], which combines the type the consumer asks
//! for with an optional qualifier. The qualifier makes it possible to register multiple bindings
//! producing the same type, e.g. two differently configured database pools:
//!
//! ```
//! use rootwire_di::component_key::ComponentKey;
//!
//! struct Pool;
//!
//! let primary = ComponentKey::of::<Pool>();
//! let replica = ComponentKey::named::<Pool>("replica");
//!
//! assert_ne!(primary, replica);
//! assert!(replica.is_type::<Pool>());
//! assert_eq!(replica.qualifier(), Some("replica"));
//! ```

use std::any::{type_name, TypeId};
use std::borrow::Cow;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

/// Identity of a requested dependency: declared type and optional qualifier name.
///
/// Equality and hashing only consider the [TypeId] and the qualifier - the stored type name is
/// used for diagnostics only.
#[derive(Clone, Debug)]
pub struct ComponentKey {
    type_id: TypeId,
    type_name: &'static str,
    qualifier: Option<Cow<'static, str>>,
}

impl ComponentKey {
    /// Creates an unqualified key for `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            qualifier: None,
        }
    }

    /// Creates a key for `T` qualified with given name.
    pub fn named<T: ?Sized + 'static>(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            qualifier: Some(name.into()),
            ..Self::of::<T>()
        }
    }

    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    #[inline]
    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }

    /// Checks if this key refers to type `T`, regardless of the qualifier.
    #[inline]
    pub fn is_type<T: ?Sized + 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }
}

impl PartialEq for ComponentKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id && self.qualifier == other.qualifier
    }
}

impl Eq for ComponentKey {}

impl Hash for ComponentKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
        self.qualifier.hash(state);
    }
}

impl Display for ComponentKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.qualifier {
            Some(qualifier) => write!(f, "{}#{}", self.type_name, qualifier),
            None => f.write_str(self.type_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::component_key::ComponentKey;
    use fxhash::FxHashSet;

    struct TestComponent;

    #[test]
    fn should_compare_type_and_qualifier() {
        assert_eq!(
            ComponentKey::of::<TestComponent>(),
            ComponentKey::of::<TestComponent>()
        );
        assert_eq!(
            ComponentKey::named::<TestComponent>("a"),
            ComponentKey::named::<TestComponent>("a".to_string())
        );
        assert_ne!(
            ComponentKey::of::<TestComponent>(),
            ComponentKey::named::<TestComponent>("a")
        );
        assert_ne!(ComponentKey::of::<TestComponent>(), ComponentKey::of::<i8>());
    }

    #[test]
    fn should_hash_consistently_with_equality() {
        let keys: FxHashSet<_> = [
            ComponentKey::of::<TestComponent>(),
            ComponentKey::of::<TestComponent>(),
            ComponentKey::named::<TestComponent>("a"),
        ]
        .into_iter()
        .collect();

        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn should_display_qualifier() {
        let key = ComponentKey::named::<i8>("answer");
        assert_eq!(key.to_string(), "i8#answer");
        assert_eq!(ComponentKey::of::<i8>().to_string(), "i8");
    }
}
