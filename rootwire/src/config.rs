//! Framework configuration is based on injecting an [ApplicationConfigProvider], which can later
//! be used to retrieve [ApplicationConfig]. [Application](crate::application::Application) uses
//! this config to configure itself, but it can also be injected into any other component.
//!
//! By default, the config is created with opinionated default values, which can then be overwritten
//! by environment variables prefixed with `ROOTWIRE_` or `rootwire.json` file. Registering a custom
//! provider under the unqualified [ApplicationConfigProviderPtr] key replaces the default one.

use config::{Config, ConfigError, Environment, File};
#[cfg(test)]
use mockall::automock;
use rootwire_di::component_key::ComponentKey;
use rootwire_di::component_registry::conditional::unregistered_component;
use rootwire_di::component_registry::Binding;
use rootwire_di::container::ContainerBuilder;
use rootwire_di::instance_provider::ErrorPtr;
use serde::Deserialize;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

const CONFIG_ENV_PREFIX: &str = "ROOTWIRE";

/// Name of the default config file.
pub const CONFIG_FILE: &str = "rootwire.json";

fn convert_error<E: Error + Send + Sync + 'static>(error: E) -> ErrorPtr {
    Arc::new(error) as ErrorPtr
}

/// Framework configuration which can be provided by an [ApplicationConfigProvider].
#[non_exhaustive]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ApplicationConfig {
    /// Should a default tracing logger be installed in the scope of the application.
    pub install_tracing_logger: bool,
    /// Should the dependency graph be validated before running the application.
    pub validate_on_startup: bool,
    /// Should all singletons be created before running the application, instead of on first use.
    pub eager_singletons: bool,
    /// Maximum time a single health indicator can take, in milliseconds.
    pub health_check_timeout_ms: u64,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            install_tracing_logger: true,
            validate_on_startup: true,
            eager_singletons: false,
            health_check_timeout_ms: 5000,
        }
    }
}

impl From<OptionalApplicationConfig> for ApplicationConfig {
    fn from(value: OptionalApplicationConfig) -> Self {
        let default = Self::default();
        Self {
            install_tracing_logger: value
                .install_tracing_logger
                .unwrap_or(default.install_tracing_logger),
            validate_on_startup: value
                .validate_on_startup
                .unwrap_or(default.validate_on_startup),
            eager_singletons: value.eager_singletons.unwrap_or(default.eager_singletons),
            health_check_timeout_ms: value
                .health_check_timeout_ms
                .unwrap_or(default.health_check_timeout_ms),
        }
    }
}

impl ApplicationConfig {
    #[inline]
    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_millis(self.health_check_timeout_ms)
    }

    /// Loads the config from the default file and environment.
    pub fn init_from_environment() -> Result<Self, ConfigError> {
        Self::init_from_sources(CONFIG_FILE, Environment::with_prefix(CONFIG_ENV_PREFIX))
    }

    fn init_from_sources(file: &str, environment: Environment) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(file).required(false))
            .add_source(environment.try_parsing(true))
            .build()
            .and_then(|config| config.try_deserialize::<OptionalApplicationConfig>())
            .map(|config| config.into())
    }
}

/// Provider for [ApplicationConfig]. The instance registered under the unqualified
/// [ApplicationConfigProviderPtr] key will be used to retrieve application configuration.
#[cfg_attr(test, automock)]
pub trait ApplicationConfigProvider {
    fn config(&self) -> Result<ApplicationConfig, ErrorPtr>;
}

pub type ApplicationConfigProviderPtr = Arc<dyn ApplicationConfigProvider + Send + Sync>;

/// Provider loading the config once, from the default sources.
#[derive(Debug)]
pub struct DefaultApplicationConfigProvider {
    // cached init result
    config: Result<ApplicationConfig, ErrorPtr>,
}

impl DefaultApplicationConfigProvider {
    pub fn new() -> Self {
        Self {
            config: ApplicationConfig::init_from_environment().map_err(convert_error),
        }
    }
}

impl Default for DefaultApplicationConfigProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ApplicationConfigProvider for DefaultApplicationConfigProvider {
    fn config(&self) -> Result<ApplicationConfig, ErrorPtr> {
        self.config.clone()
    }
}

/// Provider returning a fixed config, e.g. built in code or in tests.
#[derive(Clone, Debug, Default)]
pub struct StaticApplicationConfigProvider {
    config: ApplicationConfig,
}

impl StaticApplicationConfigProvider {
    pub fn new(config: ApplicationConfig) -> Self {
        Self { config }
    }
}

impl ApplicationConfigProvider for StaticApplicationConfigProvider {
    fn config(&self) -> Result<ApplicationConfig, ErrorPtr> {
        Ok(self.config.clone())
    }
}

/// Registers [DefaultApplicationConfigProvider], unless another provider gets registered.
pub(crate) fn register_default_provider(builder: ContainerBuilder) -> ContainerBuilder {
    builder.register_conditional(
        ComponentKey::of::<ApplicationConfigProviderPtr>(),
        Binding::singleton(|_| {
            Ok(Arc::new(DefaultApplicationConfigProvider::new()) as ApplicationConfigProviderPtr)
        }),
        unregistered_component::<ApplicationConfigProviderPtr>,
        -128,
    )
}

#[derive(Deserialize)]
struct OptionalApplicationConfig {
    install_tracing_logger: Option<bool>,
    validate_on_startup: Option<bool>,
    eager_singletons: Option<bool>,
    health_check_timeout_ms: Option<u64>,
}
