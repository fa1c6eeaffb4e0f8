// note: this example assumes you've analyzed the previous ones

use rootwire_di::component_key::ComponentKey;
use rootwire_di::component_registry::conditional::unregistered_component;
use rootwire_di::component_registry::Binding;
use rootwire_di::container::Container;
use std::sync::Arc;

trait Storage: Send + Sync {
    fn name(&self) -> &'static str;
}

type StoragePtr = Arc<dyn Storage>;

struct MemoryStorage;

impl Storage for MemoryStorage {
    fn name(&self) -> &'static str {
        "memory"
    }
}

struct DiskStorage;

impl Storage for DiskStorage {
    fn name(&self) -> &'static str {
        "disk"
    }
}

fn main() {
    let container = Container::builder()
        // a default implementation, which steps aside if any other storage is registered
        .register_conditional(
            ComponentKey::of::<StoragePtr>(),
            Binding::singleton(|_| Ok(Arc::new(MemoryStorage) as StoragePtr)),
            unregistered_component::<StoragePtr>,
            -128,
        )
        // try commenting this registration out
        .register(
            ComponentKey::of::<StoragePtr>(),
            Binding::singleton(|_| Ok(Arc::new(DiskStorage) as StoragePtr)),
        )
        .build()
        .expect("error building container");

    // prints "disk"
    println!(
        "{}",
        container
            .get_typed::<StoragePtr>()
            .expect("error creating storage")
            .name()
    );
}
