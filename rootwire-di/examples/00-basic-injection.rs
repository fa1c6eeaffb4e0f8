use rootwire_di::component_key::ComponentKey;
use rootwire_di::component_registry::Binding;
use rootwire_di::container::Container;
use rootwire_di::instance_provider::ComponentInstancePtr;
use std::sync::Arc;

// injectable abstractions are registered as shared trait objects
trait Greeter: Send + Sync {
    fn greet(&self) -> String;
}

type GreeterPtr = Arc<dyn Greeter>;

struct EnglishGreeter;

impl Greeter for EnglishGreeter {
    fn greet(&self) -> String {
        "Hello world!".to_string()
    }
}

struct GreetingService {
    greeter: ComponentInstancePtr<GreeterPtr>,
}

// note: for the sake of simplicity, errors are unwrapped, rather than gracefully handled
fn main() {
    let container = Container::builder()
        .register(
            ComponentKey::of::<GreeterPtr>(),
            Binding::singleton(|_| Ok(Arc::new(EnglishGreeter) as GreeterPtr)),
        )
        // dependencies need to be declared up front, so they can be resolved before the factory
        // is called
        .register(
            ComponentKey::of::<GreetingService>(),
            Binding::singleton(|dependencies| {
                Ok(GreetingService {
                    greeter: dependencies.get::<GreeterPtr>()?,
                })
            })
            .depends_on_type::<GreeterPtr>(),
        )
        .build()
        .expect("error building container");

    // the whole graph is validated without creating anything
    container.validate().expect("invalid component graph");

    let service = container
        .get_typed::<GreetingService>()
        .expect("error creating service");

    // prints "Hello world!"
    println!("{}", service.greeter.greet());
}
