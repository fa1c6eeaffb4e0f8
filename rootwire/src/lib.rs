//! Application framework based on [rootwire_di] dependency injection.
//!
//! Traditional applications start in the `main()` function and often explicitly initialize and pass
//! around various domain/application services or other components. With dependency injection in
//! place, all application components can become decoupled and form a dependency graph managed by a
//! DI container. This, in turn, requires an entrypoint for the application which initializes DI and
//! runs the actual business logic of the application. This crate provides such entrypoint in the
//! form of [Application](application::Application), which also configures additional supporting
//! infrastructure, e.g. logging.
//!
//! Other framework components talk to the container only through its public contract:
//!
//! * [health] - health indicators aggregated with a per-indicator timeout,
//! * [event] - a synchronous event bus, also carrying application lifecycle events,
//! * [interception] - decorators applied to instances after they leave the container,
//! * [reload] - replacing bindings at runtime along with their dependents.

pub mod application;
pub mod config;
pub mod event;
pub mod health;
pub mod interception;
pub mod reload;
pub mod runner;
