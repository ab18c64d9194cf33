#![allow(dead_code)]

pub mod registry;
pub mod storage;

use std::sync::Arc;
use std::time::Duration;

use imagewatch::cache::ResultCache;
use imagewatch::discovery::{DiscoveryInput, Image, Storage};
use imagewatch::finder::Finder;
use imagewatch::registry::{Protocol, RegistryEndpoint};
use imagewatch::resolver::TagResolver;
use imagewatch::version::Classifier;

pub use registry::{InMemoryRegistry, StaticConnector};
pub use storage::InMemoryStorage;

pub const REDIS: &str = "docker.io/library/redis";
pub const CURRENT_DIGEST: &str = "sha256:55f2d1c3e4b5a69701234567";
pub const LATEST_DIGEST: &str = "sha256:e1cd649a0a4d73b589abcdef";

pub fn image(repository: &str, tag: &str, digest: &str) -> Image {
    Image {
        digest: digest.to_string(),
        repository: repository.to_string(),
        source: "cache".to_string(),
        tag: tag.to_string(),
    }
}

pub fn input(name: &str, instance: &str, images: Vec<Image>) -> DiscoveryInput {
    DiscoveryInput {
        instance: instance.to_string(),
        name: name.to_string(),
        images,
    }
}

/// Docker Hub serving redis in a few tag schemes
pub fn redis_registry() -> InMemoryRegistry {
    InMemoryRegistry::new("docker.io")
        .with_image("library/redis", "4.0.14-alpine", CURRENT_DIGEST)
        .with_image("library/redis", "5.0.6-alpine", LATEST_DIGEST)
        .with_image("library/redis", "5.0.6", "sha256:0123456789abcdef")
        .with_image("library/redis", "latest", "sha256:fedcba9876543210")
}

pub fn create_test_resolver(registry: Arc<InMemoryRegistry>) -> TagResolver {
    TagResolver::new(
        Arc::new(Classifier::default()),
        vec![RegistryEndpoint::new("docker.io", Protocol::Https).with_token_auth()],
        Arc::new(StaticConnector::new(registry)),
    )
}

pub fn create_test_finder(
    storage: Arc<dyn Storage>,
    registry: Arc<InMemoryRegistry>,
    ttl: Duration,
) -> Finder {
    Finder::new(
        storage,
        Arc::new(ResultCache::new(ttl)),
        Arc::new(create_test_resolver(registry)),
    )
}
