// note: this example assumes you've analyzed the previous one

use rootwire_di::component_key::ComponentKey;
use rootwire_di::component_registry::Binding;
use rootwire_di::container::Container;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

struct Connection {
    id: usize,
}

struct Pool;

fn main() {
    let next_id = Arc::new(AtomicUsize::new(0));

    let container = Arc::new(
        Container::builder()
            // singletons are created once and shared, even if many threads ask for them at the
            // same time
            .register(
                ComponentKey::of::<Pool>(),
                Binding::singleton(|_| {
                    println!("Creating pool...");
                    Ok(Pool)
                })
                .with_disposer(|_: &Pool| {
                    println!("Closing pool...");
                    Ok(())
                }),
            )
            // transient components are created on each request
            .register(
                ComponentKey::of::<Connection>(),
                Binding::transient(move |_| {
                    Ok(Connection {
                        id: next_id.fetch_add(1, Ordering::SeqCst),
                    })
                })
                .depends_on_type::<Pool>(),
            )
            .build()
            .expect("error building container"),
    );

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let container = container.clone();
            thread::spawn(move || {
                container
                    .get_typed::<Connection>()
                    .expect("error creating connection")
                    .id
            })
        })
        .collect();

    for handle in handles {
        println!("Got connection {}", handle.join().expect("thread panicked"));
    }

    // disposers run in reverse creation order
    container.shutdown().expect("error shutting down");
}
