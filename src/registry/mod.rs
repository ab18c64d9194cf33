//! Container registry access
//!
//! - [`endpoint`]: configured registries and repository-to-registry matching
//! - [`client`]: `RegistryClient`/`RegistryConnector` traits
//! - [`distribution`]: HTTP implementation of the Docker Registry v2 API

pub mod client;
pub mod distribution;
pub mod endpoint;
pub mod error;

pub use client::{Authenticator, ImageInfo, RegistryClient, RegistryConnector};
pub use distribution::{DistributionClient, DistributionConnector};
pub use endpoint::{AuthMethod, EndpointParseError, Protocol, RegistryEndpoint, select_endpoint};
pub use error::RegistryError;
