// note: this example assumes you've analyzed the previous one

use rootwire::application::Application;
use rootwire::config::{
    ApplicationConfig, ApplicationConfigProviderPtr, StaticApplicationConfigProvider,
};
use rootwire::event::{ApplicationStarted, EventBus};
use rootwire::runner::{runner_key, ApplicationRunner, ApplicationRunnerPtr};
use rootwire_di::component_key::ComponentKey;
use rootwire_di::component_registry::Binding;
use rootwire_di::container::Container;
use rootwire_di::instance_provider::ErrorPtr;
use std::sync::Arc;

struct PrintingRunner {
    message: &'static str,
    priority: i8,
}

impl ApplicationRunner for PrintingRunner {
    fn run(&self) -> Result<(), ErrorPtr> {
        println!("{}", self.message);
        Ok(())
    }

    // runners with higher priorities run first
    fn priority(&self) -> i8 {
        self.priority
    }
}

fn printing_runner(message: &'static str, priority: i8) -> Binding {
    Binding::instance(Arc::new(PrintingRunner { message, priority }) as ApplicationRunnerPtr)
}

fn main() {
    // start with a default config and override what's needed; registering a provider replaces
    // the default one, which reads the environment
    let mut config = ApplicationConfig::default();
    config.eager_singletons = true;

    let application = Application::new(
        Container::builder()
            .register(
                ComponentKey::of::<ApplicationConfigProviderPtr>(),
                Binding::instance(
                    Arc::new(StaticApplicationConfigProvider::new(config))
                        as ApplicationConfigProviderPtr,
                ),
            )
            .register(runner_key("second"), printing_runner("Second", 0))
            .register(runner_key("first"), printing_runner("First", 10)),
    )
    .expect("unable to create application");

    application
        .container()
        .get_typed::<EventBus>()
        .expect("missing event bus")
        .subscribe(|_: &ApplicationStarted| {
            println!("Application started");
            Ok(())
        });

    // prints "Application started", "First", "Second"
    application.run().expect("error running application");
}
