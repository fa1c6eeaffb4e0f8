//! Core application framework functionality.

use crate::config::{register_default_provider, ApplicationConfigProviderPtr};
use crate::event::{ApplicationStarted, ApplicationStopping, EventBus};
use crate::health::{HealthRegistry, HealthReport};
use crate::interception::InterceptorRegistry;
use crate::reload::ReloadCoordinator;
use crate::runner::ApplicationRunnerPtr;
use rootwire_di::component_key::ComponentKey;
use rootwire_di::component_registry::conditional::unregistered_component;
use rootwire_di::component_registry::Binding;
use rootwire_di::container::{Container, ContainerBuilder};
use rootwire_di::error::{RegistrationError, ResolutionError, ShutdownError, ValidationError};
use rootwire_di::instance_provider::ErrorPtr;
use std::cmp::Reverse;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Error, Debug)]
pub enum ApplicationError {
    #[error("Error registering components: {0}")]
    Registration(#[from] RegistrationError),
    #[error("Error retrieving configuration: {0}")]
    Config(ErrorPtr),
    #[error("Invalid component graph: {0}")]
    Validation(#[from] ValidationError),
    #[error("Error retrieving components: {0}")]
    Injection(#[from] ResolutionError),
    #[error("Runner error: {0}")]
    Runner(ErrorPtr),
    #[error("Error shutting down: {0}")]
    Shutdown(#[from] ShutdownError),
}

/// Main entrypoint for the application. Bootstraps the application and runs
/// [ApplicationRunners](crate::runner::ApplicationRunner).
///
/// Besides user components, the container gets default framework components, unless the user
/// registers their own: an [ApplicationConfigProvider](crate::config::ApplicationConfigProvider),
/// an [EventBus], a [HealthRegistry] and an [InterceptorRegistry].
pub struct Application {
    container: Arc<Container>,
}

impl Application {
    /// Builds the container with default framework components.
    pub fn new(builder: ContainerBuilder) -> Result<Self, ApplicationError> {
        let container = register_defaults(builder).build()?;
        Ok(Self::from_container(Arc::new(container)))
    }

    /// Uses an existing container. It needs to contain at least an
    /// [ApplicationConfigProviderPtr], e.g. by building it with [register_defaults].
    pub fn from_container(container: Arc<Container>) -> Self {
        Self { container }
    }

    #[inline]
    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    /// Checks all registered health indicators.
    pub fn health(&self) -> Result<HealthReport, ApplicationError> {
        let registry = self.container.get_typed::<HealthRegistry>()?;
        Ok(registry.check(&self.container))
    }

    /// Creates a [ReloadCoordinator] publishing to the registered [EventBus], if any.
    pub fn reload_coordinator(&self) -> Result<ReloadCoordinator, ApplicationError> {
        let event_bus = self.container.get_option_typed::<EventBus>()?;
        Ok(ReloadCoordinator::new(self.container.clone(), event_bus))
    }

    /// Runs the application: prepares the container, runs all runners in priority order and
    /// shuts the container down. The container is shut down on every exit path, so instances
    /// created before a failure still get disposed. The first error takes precedence over a
    /// shutdown error.
    pub fn run(&self) -> Result<(), ApplicationError> {
        let result = self.start();

        info!("Shutting down application...");
        let shutdown = self.container.shutdown();

        result?;
        shutdown.map_err(|error| error.into())
    }

    fn start(&self) -> Result<(), ApplicationError> {
        let config = self
            .container
            .get_typed::<ApplicationConfigProviderPtr>()?
            .config()
            .map_err(ApplicationError::Config)?;

        if config.install_tracing_logger {
            install_tracing_logger();
        }

        info!("Starting application...");

        if config.validate_on_startup {
            self.container.validate()?;
        }

        if config.eager_singletons {
            self.container.instantiate_singletons()?;
        }

        let event_bus = self.container.get_option_typed::<EventBus>()?;
        publish(&event_bus, &ApplicationStarted);

        let result = self.run_runners();

        publish(&event_bus, &ApplicationStopping);
        result
    }

    fn run_runners(&self) -> Result<(), ApplicationError> {
        info!("Searching for application runners...");

        let mut runners = self.container.get_all_typed::<ApplicationRunnerPtr>()?;
        runners.sort_by_key(|runner| Reverse(runner.priority()));

        info!("Running application runners...");

        for runner in &runners {
            runner.run().map_err(ApplicationError::Runner)?;
        }

        Ok(())
    }
}

/// Adds default framework components to given builder. They are registered conditionally, with
/// the lowest priority, so user components always take precedence.
pub fn register_defaults(builder: ContainerBuilder) -> ContainerBuilder {
    register_default_provider(builder)
        .register_conditional(
            ComponentKey::of::<EventBus>(),
            Binding::singleton(|_| Ok(EventBus::new())),
            unregistered_component::<EventBus>,
            -128,
        )
        .register_conditional(
            ComponentKey::of::<HealthRegistry>(),
            Binding::singleton(|dependencies| {
                let config = dependencies.get::<ApplicationConfigProviderPtr>()?.config()?;
                Ok(HealthRegistry::new(config.health_check_timeout()))
            })
            .depends_on_type::<ApplicationConfigProviderPtr>(),
            unregistered_component::<HealthRegistry>,
            -128,
        )
        .register_conditional(
            ComponentKey::of::<InterceptorRegistry>(),
            Binding::singleton(|_| Ok(InterceptorRegistry::new())),
            unregistered_component::<InterceptorRegistry>,
            -128,
        )
}

fn install_tracing_logger() {
    if tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init()
        .is_err()
    {
        debug!("Global tracing subscriber already installed.");
    }
}

fn publish<E: Send + Sync + 'static>(event_bus: &Option<Arc<EventBus>>, event: &E) {
    if let Some(event_bus) = event_bus {
        // listener failures don't stop the application
        if let Err(error) = event_bus.publish(event) {
            warn!(%error, "Error publishing lifecycle event.");
        }
    }
}
