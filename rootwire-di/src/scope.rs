//! Each [Binding](crate::component_registry::Binding) declares a [Scope] - a lifetime policy
//! deciding when an instance should be reused and when a new one should be created.
//!
//! Note: scope resolution happens at component instantiation time, which can lead to unexpected
//! consequences if incompatible scopes are mixed together, e.g. a [singleton](Scope::Singleton)
//! component can depend on a [transient](Scope::Transient) one. In such case when creating the
//! singleton, a new instance of the dependency will be created, since it's transient, but then that
//! single instance will live as long as the singleton lives.

use std::fmt::{Display, Formatter};

/// Lifetime policy of component instances.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum Scope {
    /// One instance for the lifetime of the container, shared between all consumers. Stateless
    /// components are good candidates to be singletons. Construction happens at most once, even
    /// with concurrent first access.
    #[default]
    Singleton,
    /// A new instance on each request. Stateful components usually should be transient.
    Transient,
}

impl Scope {
    #[inline]
    pub fn is_cached(&self) -> bool {
        *self == Scope::Singleton
    }
}

impl Display for Scope {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Singleton => f.write_str("SINGLETON"),
            Scope::Transient => f.write_str("TRANSIENT"),
        }
    }
}
