use rootwire::application::Application;
use rootwire::runner::{runner_binding, runner_key, ApplicationRunner};
use rootwire_di::container::Container;
use rootwire_di::instance_provider::ErrorPtr;

// this is an application runner, which will run when the application starts; the application
// finds all runners registered in the container
struct HelloWorldRunner;

impl ApplicationRunner for HelloWorldRunner {
    fn run(&self) -> Result<(), ErrorPtr> {
        println!("Hello world!");
        Ok(())
    }
}

// note: for the sake of simplicity, errors are unwrapped, rather than gracefully handled
fn main() {
    // create our application along with default framework components
    let application = Application::new(
        Container::builder().register(runner_key("hello"), runner_binding(HelloWorldRunner)),
    )
    .expect("unable to create application");

    // prints "Hello world!"
    application.run().expect("error running application");
}
