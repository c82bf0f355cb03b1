use std::sync::Arc;

use minecraft_provider::{init_logging, resources, serve, MemoryWorld, MinecraftProvider};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let registry = resources::registry();
    tracing::info!(resources = ?registry.type_names(), "Starting minecraft provider");

    let provider = MinecraftProvider::new(registry, Arc::new(MemoryWorld::new()));
    serve(provider).await
}
