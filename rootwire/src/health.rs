//! Application health checks.
//!
//! Health indicators are regular components registered under qualified [HealthIndicatorPtr] keys -
//! the qualifier becomes the name of the indicator in a [HealthReport]. Each check, including
//! creating the indicator, runs on its own thread and is reported as down if it doesn't finish
//! within the configured timeout. A check
//! which timed out keeps running in the background, since checks cannot be cancelled.

#[cfg(test)]
use mockall::automock;
use rootwire_di::component_key::ComponentKey;
use rootwire_di::container::Container;
use rootwire_di::instance_provider::{downcast_instance, ErrorPtr};
use std::any::TypeId;
use std::borrow::Cow;
use std::fmt::{Display, Formatter};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Checks the health of a single part of the application.
#[cfg_attr(test, automock)]
pub trait HealthIndicator {
    /// Returns an error describing the problem, if unhealthy.
    fn check(&self) -> Result<(), ErrorPtr>;
}

pub type HealthIndicatorPtr = Arc<dyn HealthIndicator + Send + Sync>;

/// Key for a health indicator with given name.
#[inline]
pub fn indicator_key(name: impl Into<Cow<'static, str>>) -> ComponentKey {
    ComponentKey::named::<HealthIndicatorPtr>(name)
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum HealthStatus {
    Up,
    Down(String),
}

impl HealthStatus {
    #[inline]
    pub fn is_up(&self) -> bool {
        *self == HealthStatus::Up
    }
}

impl Display for HealthStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Up => f.write_str("UP"),
            HealthStatus::Down(reason) => write!(f, "DOWN ({reason})"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub duration: Duration,
}

/// Result of checking all registered indicators.
#[derive(Clone, Debug, Default)]
pub struct HealthReport {
    pub components: Vec<ComponentHealth>,
}

impl HealthReport {
    /// True if all indicators are up. A report without indicators is healthy.
    pub fn is_healthy(&self) -> bool {
        self.components
            .iter()
            .all(|component| component.status.is_up())
    }

    pub fn component(&self, name: &str) -> Option<&ComponentHealth> {
        self.components
            .iter()
            .find(|component| component.name == name)
    }
}

/// Runs all [HealthIndicator]s registered in a container.
#[derive(Clone, Debug)]
pub struct HealthRegistry {
    timeout: Duration,
}

impl HealthRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    #[inline]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Checks all indicators registered in given container. Indicators which cannot be created
    /// are reported as down.
    pub fn check(&self, container: &Arc<Container>) -> HealthReport {
        let pending = container
            .keys_of_type(TypeId::of::<HealthIndicatorPtr>())
            .into_iter()
            .map(|key| {
                let name = key.qualifier().unwrap_or_default().to_string();
                let started = Instant::now();
                let receiver = Self::spawn_check(container.clone(), key);

                (name, started, receiver)
            })
            .collect::<Vec<_>>();

        // all checks are already running, so waiting for them one by one bounds the total time
        let components = pending
            .into_iter()
            .map(|(name, started, receiver)| {
                let status = self.wait_for_check(&receiver, started);

                if !status.is_up() {
                    warn!(indicator = %name, %status, "Health check failed.");
                }

                ComponentHealth {
                    name,
                    status,
                    duration: started.elapsed(),
                }
            })
            .collect();

        let report = HealthReport { components };
        debug!(healthy = report.is_healthy(), "Finished health check.");
        report
    }

    fn spawn_check(
        container: Arc<Container>,
        key: ComponentKey,
    ) -> mpsc::Receiver<Result<(), ErrorPtr>> {
        let (sender, receiver) = mpsc::channel();
        thread::spawn(move || {
            let result = container
                .get(&key)
                .and_then(|instance| downcast_instance::<HealthIndicatorPtr>(&key, instance))
                .map_err(|error| Arc::new(error) as ErrorPtr)
                .and_then(|indicator| indicator.check());

            // the receiver is gone if the check timed out
            let _ = sender.send(result);
        });
        receiver
    }

    fn wait_for_check(
        &self,
        receiver: &mpsc::Receiver<Result<(), ErrorPtr>>,
        started: Instant,
    ) -> HealthStatus {
        let remaining = self.timeout.saturating_sub(started.elapsed());
        match receiver.recv_timeout(remaining) {
            Ok(Ok(())) => HealthStatus::Up,
            Ok(Err(error)) => HealthStatus::Down(error.to_string()),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                HealthStatus::Down(format!("timed out after {:?}", self.timeout))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                HealthStatus::Down("check panicked".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::health::{
        indicator_key, HealthIndicatorPtr, HealthRegistry, HealthStatus, MockHealthIndicator,
    };
    use rootwire_di::component_registry::Binding;
    use rootwire_di::container::Container;
    use rootwire_di::instance_provider::ErrorPtr;
    use std::io;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    fn indicator(result: fn() -> Result<(), ErrorPtr>) -> Binding {
        let mut indicator = MockHealthIndicator::new();
        indicator.expect_check().times(1).returning(result);
        Binding::instance(Arc::new(indicator) as HealthIndicatorPtr)
    }

    #[test]
    fn should_report_indicator_statuses() {
        let container = Arc::new(
            Container::builder()
                .register(indicator_key("database"), indicator(|| Ok(())))
                .register(
                    indicator_key("cache"),
                    indicator(|| {
                        Err(Arc::new(io::Error::new(io::ErrorKind::Other, "connection refused"))
                            as ErrorPtr)
                    }),
                )
                .build()
                .unwrap(),
        );

        let report = HealthRegistry::new(Duration::from_secs(5)).check(&container);

        assert!(!report.is_healthy());
        assert_eq!(report.components.len(), 2);
        assert_eq!(report.component("database").unwrap().status, HealthStatus::Up);
        assert_eq!(
            report.component("cache").unwrap().status,
            HealthStatus::Down("connection refused".to_string())
        );
    }

    #[test]
    fn should_time_out_slow_indicator() {
        let container = Arc::new(
            Container::builder()
                .register(
                    indicator_key("slow"),
                    indicator(|| {
                        thread::sleep(Duration::from_millis(500));
                        Ok(())
                    }),
                )
                .build()
                .unwrap(),
        );

        let report = HealthRegistry::new(Duration::from_millis(20)).check(&container);

        assert!(matches!(
            report.component("slow").unwrap().status,
            HealthStatus::Down(_)
        ));
    }

    #[test]
    fn should_time_out_slow_indicator_creation() {
        let container = Arc::new(
            Container::builder()
                .register(
                    indicator_key("slow"),
                    Binding::singleton(|_| {
                        thread::sleep(Duration::from_millis(500));

                        let mut indicator = MockHealthIndicator::new();
                        indicator.expect_check().returning(|| Ok(()));
                        Ok(Arc::new(indicator) as HealthIndicatorPtr)
                    }),
                )
                .build()
                .unwrap(),
        );

        let started = Instant::now();
        let report = HealthRegistry::new(Duration::from_millis(20)).check(&container);

        assert!(started.elapsed() < Duration::from_millis(400));
        assert!(matches!(
            report.component("slow").unwrap().status,
            HealthStatus::Down(_)
        ));
    }

    #[test]
    fn should_report_unresolvable_indicator() {
        let container = Arc::new(
            Container::builder()
                .register(
                    indicator_key("broken"),
                    Binding::singleton::<HealthIndicatorPtr, _>(|_| Err("missing driver".into())),
                )
                .build()
                .unwrap(),
        );

        let report = HealthRegistry::new(Duration::from_secs(1)).check(&container);
        assert!(!report.is_healthy());
    }

    #[test]
    fn should_be_healthy_without_indicators() {
        assert!(HealthRegistry::new(Duration::from_secs(1))
            .check(&Arc::new(Container::new()))
            .is_healthy());
    }
}
