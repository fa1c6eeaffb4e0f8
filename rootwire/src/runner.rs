//! Runners executing actual application logic.

#[cfg(test)]
use mockall::automock;
use rootwire_di::component_key::ComponentKey;
use rootwire_di::component_registry::Binding;
pub use rootwire_di::instance_provider::ErrorPtr;
use std::borrow::Cow;
use std::sync::Arc;

pub type ApplicationRunnerPtr = Arc<dyn ApplicationRunner + Send + Sync>;

/// Runs application logic. Runners are run by the [Application](crate::application::Application)
/// and are discovered as all bindings of [ApplicationRunnerPtr], regardless of their qualifiers.
#[cfg_attr(test, automock)]
pub trait ApplicationRunner {
    /// Runs any application code.
    fn run(&self) -> Result<(), ErrorPtr>;

    /// Returns the priority for this runner. Higher priorities get run first. Default 0.
    fn priority(&self) -> i8 {
        0
    }
}

/// Key for a runner with given name.
#[inline]
pub fn runner_key(name: impl Into<Cow<'static, str>>) -> ComponentKey {
    ComponentKey::named::<ApplicationRunnerPtr>(name)
}

/// Binding for a runner without dependencies.
pub fn runner_binding<R: ApplicationRunner + Send + Sync + 'static>(runner: R) -> Binding {
    Binding::instance(Arc::new(runner) as ApplicationRunnerPtr)
}
