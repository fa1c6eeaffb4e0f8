use crate::component_key::ComponentKey;
use crate::instance_provider::ErrorPtr;
use itertools::Itertools;
use thiserror::Error;

fn required_by_suffix(required_by: &[ComponentKey]) -> String {
    if required_by.is_empty() {
        String::new()
    } else {
        format!(" (required by: {})", required_by.iter().join(" -> "))
    }
}

/// Errors related to resolving component instances.
#[derive(Error, Clone, Debug)]
pub enum ResolutionError {
    #[error("No binding registered for component '{key}'{}", required_by_suffix(.required_by))]
    NotRegistered {
        key: ComponentKey,
        /// Chain of components which led to requesting the missing one, starting from the
        /// top-level request. Empty if the missing component was requested directly.
        required_by: Vec<ComponentKey>,
    },
    #[error("Circular dependency detected while resolving '{key}': {}", .path.iter().join(" -> "))]
    CircularDependency {
        key: ComponentKey,
        /// Keys forming the cycle, starting and ending with the same key.
        path: Vec<ComponentKey>,
    },
    #[error("Error creating component '{key}' (resolution path: {}): {source}", .path.iter().join(" -> "))]
    Instantiation {
        key: ComponentKey,
        /// Resolution stack at the time of failure, starting from the top-level request.
        path: Vec<ComponentKey>,
        source: ErrorPtr,
    },
    #[error("Component '{key}' cannot be cast to the requested type: {requested_type}")]
    IncompatibleComponent {
        key: ComponentKey,
        requested_type: &'static str,
    },
    #[error("Component '{key}' requested dependency '{dependency}', which it did not declare")]
    UndeclaredDependency {
        key: ComponentKey,
        dependency: ComponentKey,
    },
    #[error("Maximum resolution depth of {limit} exceeded while resolving '{key}'")]
    ResolutionTooDeep { key: ComponentKey, limit: usize },
}

impl ResolutionError {
    /// Returns the key this error refers to.
    pub fn key(&self) -> &ComponentKey {
        match self {
            ResolutionError::NotRegistered { key, .. }
            | ResolutionError::CircularDependency { key, .. }
            | ResolutionError::Instantiation { key, .. }
            | ResolutionError::IncompatibleComponent { key, .. }
            | ResolutionError::UndeclaredDependency { key, .. }
            | ResolutionError::ResolutionTooDeep { key, .. } => key,
        }
    }
}

/// Error related to binding registries.
#[derive(Error, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub enum RegistrationError {
    #[error("Attempted to re-register component '{0}' with binding overriding disabled")]
    DuplicateBinding(String),
}

/// Static validation of the registered dependency graph failed.
#[derive(Error, Clone, Debug)]
#[error("Found {} invalid binding(s): {}", .errors.len(), .errors.iter().join("; "))]
pub struct ValidationError {
    pub errors: Vec<ResolutionError>,
}

/// A disposer of a singleton instance failed during shutdown.
#[derive(Error, Clone, Debug)]
#[error("Error disposing component '{key}': {source}")]
pub struct DisposalError {
    pub key: ComponentKey,
    pub source: ErrorPtr,
}

/// Shutdown finished, but some disposals failed. Failed disposals do not prevent the remaining
/// ones from running.
#[derive(Error, Clone, Debug)]
#[error("{} component(s) failed to dispose: {}", .errors.len(), .errors.iter().join("; "))]
pub struct ShutdownError {
    pub errors: Vec<DisposalError>,
}
