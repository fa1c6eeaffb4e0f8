//! Thread-safe dependency injection with explicit, statically typed registration.
//!
//! Components are registered in a [Container](container::Container) under a
//! [ComponentKey](component_key::ComponentKey) - a type and an optional qualifier name. Each key has
//! a [Binding](component_registry::Binding) describing how to produce an instance: a factory
//! receiving its declared dependencies, a pre-built instance or an alias to another key. Requesting
//! a key creates the whole dependency graph below it, in dependency order.
//!
//! ### Scopes
//!
//! Bindings are either [singletons](scope::Scope::Singleton), created at most once and shared, or
//! [transient](scope::Scope::Transient), created on every request. Concurrent first requests for a
//! singleton block on a single construction instead of racing. See [instance_cache] for details.
//!
//! ### Cycles
//!
//! Circular dependencies are reported as
//! [CircularDependency](error::ResolutionError::CircularDependency) errors containing the whole
//! cycle path, both within a single request and across threads waiting for each other.
//! [Container::validate](container::Container::validate) checks the whole graph up front, without
//! creating any instances.
//!
//! ### Lifecycle
//!
//! Singletons can declare disposers, called in reverse creation order on
//! [Container::shutdown](container::Container::shutdown). Cached instances can be invalidated,
//! optionally together with everything depending on them, which is the basis of reloading
//! components at runtime.

pub mod component_key;
pub mod component_registry;
pub mod container;
pub mod error;
pub mod graph;
pub mod instance_cache;
pub mod instance_provider;
pub mod resolver;
pub mod scope;
