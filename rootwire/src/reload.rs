//! Replacing component bindings at runtime.
//!
//! Reloading registers the new binding, then discards the cached instance of the key together
//! with every singleton depending on it and notifies listeners with [ComponentReloaded]. Instances already
//! handed out keep working with the old implementation; new requests get instances built from the
//! new binding. What triggers a reload, e.g. a file watcher, is up to the application.

use crate::event::{ComponentReloaded, EventBus, PublishError};
use derive_more::Constructor;
use rootwire_di::component_key::ComponentKey;
use rootwire_di::component_registry::Binding;
use rootwire_di::container::Container;
use rootwire_di::error::RegistrationError;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Clone, Error, Debug)]
pub enum ReloadError {
    #[error("Error registering new binding: {0}")]
    Registration(#[from] RegistrationError),
    #[error("Error notifying about reloaded component: {0}")]
    Notification(#[from] PublishError),
}

/// Replaces bindings in a shared container.
#[derive(Constructor)]
pub struct ReloadCoordinator {
    container: Arc<Container>,
    event_bus: Option<Arc<EventBus>>,
}

impl ReloadCoordinator {
    /// Replaces the binding of given key, returning keys of discarded instances. The binding is
    /// registered even if notifying listeners fails.
    pub fn reload(
        &self,
        key: ComponentKey,
        binding: Binding,
    ) -> Result<Vec<ComponentKey>, ReloadError> {
        // Dependents built from the old binding between the two steps get discarded too.
        self.container.register(key.clone(), binding)?;
        let invalidated = self.container.invalidate_cascading(&key);

        info!(%key, invalidated = invalidated.len(), "Reloaded component.");

        if let Some(event_bus) = &self.event_bus {
            event_bus.publish(&ComponentReloaded {
                key,
                invalidated: invalidated.clone(),
            })?;
        }

        Ok(invalidated)
    }
}

#[cfg(test)]
mod tests {
    use crate::event::{ComponentReloaded, EventBus};
    use crate::reload::{ReloadCoordinator, ReloadError};
    use parking_lot::Mutex;
    use rootwire_di::component_key::ComponentKey;
    use rootwire_di::component_registry::Binding;
    use rootwire_di::container::Container;
    use rootwire_di::instance_provider::ErrorPtr;
    use std::io;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    struct Settings(u32);

    struct Client {
        settings: Arc<Settings>,
    }

    fn container() -> Arc<Container> {
        Arc::new(
            Container::builder()
                .register(ComponentKey::of::<Settings>(), Binding::singleton(|_| Ok(Settings(1))))
                .register(
                    ComponentKey::of::<Client>(),
                    Binding::singleton(|dependencies| {
                        Ok(Client {
                            settings: dependencies.get::<Settings>()?,
                        })
                    })
                    .depends_on_type::<Settings>(),
                )
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn should_rebuild_dependents_after_reload() {
        let container = container();
        let event_bus = Arc::new(EventBus::new());
        let events = Arc::new(Mutex::new(vec![]));

        let listener_events = events.clone();
        event_bus.subscribe(move |event: &ComponentReloaded| {
            listener_events.lock().push(event.clone());
            Ok(())
        });

        let old_client = container.get_typed::<Client>().unwrap();
        assert_eq!(old_client.settings.0, 1);

        let coordinator = ReloadCoordinator::new(container.clone(), Some(event_bus));
        let invalidated = coordinator
            .reload(
                ComponentKey::of::<Settings>(),
                Binding::singleton(|_| Ok(Settings(2))),
            )
            .unwrap();

        assert_eq!(
            invalidated,
            vec![ComponentKey::of::<Settings>(), ComponentKey::of::<Client>()]
        );
        assert_eq!(container.get_typed::<Client>().unwrap().settings.0, 2);
        assert_eq!(old_client.settings.0, 1);

        let events = events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].key, ComponentKey::of::<Settings>());
    }

    #[test]
    fn should_not_keep_stale_dependents_under_concurrent_reads() {
        let container = container();
        let coordinator = ReloadCoordinator::new(container.clone(), None);
        let stop = AtomicBool::new(false);

        thread::scope(|scope| {
            scope.spawn(|| {
                while !stop.load(Ordering::SeqCst) {
                    container.get_typed::<Client>().unwrap();
                }
            });

            let observed = (2..50)
                .map(|value| {
                    coordinator
                        .reload(
                            ComponentKey::of::<Settings>(),
                            Binding::singleton(move |_| Ok(Settings(value))),
                        )
                        .unwrap();

                    (value, container.get_typed::<Client>().unwrap().settings.0)
                })
                .collect::<Vec<_>>();

            stop.store(true, Ordering::SeqCst);

            for (expected, actual) in observed {
                assert_eq!(actual, expected);
            }
        });
    }

    #[test]
    fn should_register_despite_failed_notification() {
        let container = container();
        let event_bus = Arc::new(EventBus::new());
        event_bus.subscribe(|_: &ComponentReloaded| {
            Err(Arc::new(io::Error::new(io::ErrorKind::Other, "listener failed")) as ErrorPtr)
        });

        let coordinator = ReloadCoordinator::new(container.clone(), Some(event_bus));
        assert!(matches!(
            coordinator
                .reload(
                    ComponentKey::of::<Settings>(),
                    Binding::singleton(|_| Ok(Settings(3))),
                )
                .unwrap_err(),
            ReloadError::Notification(_)
        ));

        assert_eq!(container.get_typed::<Settings>().unwrap().0, 3);
    }

    #[test]
    fn should_fail_when_overriding_disabled() {
        let container = Arc::new(
            Container::builder()
                .with_allow_binding_overriding(false)
                .register(ComponentKey::of::<Settings>(), Binding::singleton(|_| Ok(Settings(1))))
                .build()
                .unwrap(),
        );

        let coordinator = ReloadCoordinator::new(container, None);
        assert!(matches!(
            coordinator
                .reload(
                    ComponentKey::of::<Settings>(),
                    Binding::singleton(|_| Ok(Settings(2))),
                )
                .unwrap_err(),
            ReloadError::Registration(_)
        ));
    }
}
