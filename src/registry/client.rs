//! Capabilities the resolver needs from a registry

use std::fmt;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

use crate::registry::endpoint::{AuthMethod, RegistryEndpoint};
use crate::registry::error::RegistryError;

/// Canonical metadata of a tagged image in a registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    pub digest: String,
    /// Registry address, e.g. `docker.io`
    pub domain: String,
    /// Repository path within the registry, e.g. `library/redis`
    pub repository: String,
    pub tag: String,
}

/// Credentials applied to registry requests
#[derive(Clone, PartialEq, Eq)]
pub enum Authenticator {
    None,
    Basic { username: String, password: String },
    Token,
}

impl Authenticator {
    /// Build the authenticator an endpoint is configured for.
    ///
    /// Basic auth without stored credentials sends an empty user.
    pub fn for_endpoint(endpoint: &RegistryEndpoint) -> Self {
        match endpoint.auth {
            AuthMethod::None => Authenticator::None,
            AuthMethod::Basic => {
                let (username, password) = endpoint
                    .credentials
                    .as_ref()
                    .map(|c| (c.username.clone(), c.password.clone()))
                    .unwrap_or_default();
                Authenticator::Basic { username, password }
            }
            AuthMethod::Token => Authenticator::Token,
        }
    }
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Authenticator::None => f.write_str("None"),
            Authenticator::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .finish_non_exhaustive(),
            Authenticator::Token => f.write_str("Token"),
        }
    }
}

/// Read access to the repositories of one registry
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait RegistryClient: Send + Sync {
    /// Lists every tag of a repository
    ///
    /// # Arguments
    /// * `repository` - Registry-qualified repository, e.g. `docker.io/library/redis`
    async fn list_tags(&self, repository: &str) -> Result<Vec<String>, RegistryError>;

    /// Fetches the canonical metadata of a tagged image
    async fn image_by_tag(&self, repository: &str, tag: &str)
    -> Result<ImageInfo, RegistryError>;
}

/// Hands out clients scoped to a single endpoint
#[cfg_attr(test, automock)]
pub trait RegistryConnector: Send + Sync {
    fn connect(
        &self,
        endpoint: &RegistryEndpoint,
        authenticator: Authenticator,
    ) -> Arc<dyn RegistryClient>;
}
