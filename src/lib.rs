//! Prometheus exporter reporting whether running container images have newer
//! versions in their registries.

pub mod cache;
pub mod config;
pub mod discovery;
pub mod finder;
pub mod logging;
pub mod registry;
pub mod resolver;
pub mod server;
pub mod version;
