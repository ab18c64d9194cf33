//! Determines the best upgrade tag of an image

use std::sync::Arc;

#[cfg(test)]
use mockall::automock;
use thiserror::Error;
use tracing::debug;

use crate::discovery::Image;
use crate::registry::{Authenticator, RegistryConnector, RegistryEndpoint, RegistryError, select_endpoint};
use crate::version::Classifier;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("tag '{tag}' does not follow a supported versioning scheme")]
    TagNotSupported { tag: String },

    #[error("no registry configured for repository '{repository}'")]
    UnknownRegistry { repository: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl ResolveError {
    /// Whether the image should be skipped quietly instead of counted as a failure
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            ResolveError::TagNotSupported { .. } | ResolveError::UnknownRegistry { .. }
        )
    }
}

#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait ImageResolver: Send + Sync {
    /// Returns the newest image whose tag follows the same scheme as `image.tag`
    async fn resolve(&self, image: &Image) -> Result<Image, ResolveError>;
}

/// Resolves images against a fixed set of registry endpoints
pub struct TagResolver {
    classifier: Arc<Classifier>,
    endpoints: Vec<RegistryEndpoint>,
    connector: Arc<dyn RegistryConnector>,
}

impl TagResolver {
    pub fn new(
        classifier: Arc<Classifier>,
        endpoints: Vec<RegistryEndpoint>,
        connector: Arc<dyn RegistryConnector>,
    ) -> Self {
        Self {
            classifier,
            endpoints,
            connector,
        }
    }

    pub fn endpoints(&self) -> &[RegistryEndpoint] {
        &self.endpoints
    }
}

#[async_trait::async_trait]
impl ImageResolver for TagResolver {
    async fn resolve(&self, image: &Image) -> Result<Image, ResolveError> {
        let current = self.classifier.classify(&image.tag);
        if current.is_unknown() {
            return Err(ResolveError::TagNotSupported {
                tag: image.tag.clone(),
            });
        }

        let endpoint = select_endpoint(&self.endpoints, &image.repository).ok_or_else(|| {
            ResolveError::UnknownRegistry {
                repository: image.repository.clone(),
            }
        })?;

        let client = self
            .connector
            .connect(endpoint, Authenticator::for_endpoint(endpoint));
        let tags = client.list_tags(&image.repository).await?;

        let distinction = current.distinction();
        let mut best_token = current;
        let mut best_tag = image.tag.clone();

        for tag in tags {
            let candidate = self.classifier.classify(&tag);
            if candidate.distinction() != distinction {
                continue;
            }

            // The current tag only counts as long as nothing newer was found,
            // so the outcome does not depend on listing order.
            let replaces = match candidate.is_greater_than(&best_token) {
                Ok(greater) => greater || (tag == image.tag && best_tag == image.tag),
                Err(e) => {
                    debug!("Skipping tag {}: {}", tag, e);
                    false
                }
            };

            if replaces {
                best_token = candidate;
                best_tag = tag;
            }
        }

        debug!("Best tag for {} is {}", image, best_tag);
        let info = client.image_by_tag(&image.repository, &best_tag).await?;

        Ok(Image {
            digest: info.digest,
            repository: format!("{}/{}", info.domain, info.repository),
            source: image.source.clone(),
            tag: info.tag,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::client::{MockRegistryClient, MockRegistryConnector};
    use crate::registry::{ImageInfo, Protocol, RegistryClient};
    use mockall::predicate::eq;
    use rstest::rstest;

    const REDIS: &str = "docker.io/library/redis";

    fn redis(tag: &str) -> Image {
        Image {
            digest: "sha256:0000aaaa".to_string(),
            repository: REDIS.to_string(),
            source: "container/redis".to_string(),
            tag: tag.to_string(),
        }
    }

    fn info(tag: &str) -> ImageInfo {
        ImageInfo {
            digest: format!("sha256:digest-of-{}", tag),
            domain: "docker.io".to_string(),
            repository: "library/redis".to_string(),
            tag: tag.to_string(),
        }
    }

    /// Registry client listing `tags` and answering any tag lookup
    fn listing(tags: &[&str]) -> MockRegistryClient {
        let tags: Vec<String> = tags.iter().map(|t| t.to_string()).collect();
        let mut client = MockRegistryClient::new();
        client
            .expect_list_tags()
            .with(eq(REDIS))
            .returning(move |_| Ok(tags.clone()));
        client
            .expect_image_by_tag()
            .returning(|_, tag| Ok(info(tag)));
        client
    }

    fn resolver_with(client: MockRegistryClient) -> TagResolver {
        let client: Arc<dyn RegistryClient> = Arc::new(client);
        let mut connector = MockRegistryConnector::new();
        connector
            .expect_connect()
            .returning(move |_, _| client.clone());

        TagResolver::new(
            Arc::new(Classifier::default()),
            vec![RegistryEndpoint::new("docker.io", Protocol::Https).with_token_auth()],
            Arc::new(connector),
        )
    }

    #[rstest]
    #[case("4.0.14-alpine", &["4.0.14-alpine", "5.0.6-alpine", "5.0.6", "latest"], "5.0.6-alpine")]
    #[case("5.0.6-alpine", &["4.0.14-alpine", "5.0.6-alpine", "5.0.6"], "5.0.6-alpine")]
    #[case("9.0", &["10.0", "9.0", "8.0"], "10.0")]
    #[case("1", &["1", "2", "2-alpine", "1.5"], "2")]
    #[case("stretch-20190812", &["stretch-20190812", "stretch-20191014", "buster-20191201"], "stretch-20191014")]
    #[case("latest", &["latest", "5.0.6", "mainline"], "latest")]
    #[case("4.0.14", &["5.0.6"], "5.0.6")]
    #[case("4.0.14", &[], "4.0.14")]
    #[tokio::test]
    async fn resolve_picks_greatest_tag_of_same_scheme(
        #[case] current: &str,
        #[case] tags: &[&str],
        #[case] expected: &str,
    ) {
        let resolver = resolver_with(listing(tags));

        let resolved = resolver.resolve(&redis(current)).await.unwrap();

        assert_eq!(resolved.tag, expected);
        assert_eq!(resolved.digest, format!("sha256:digest-of-{}", expected));
    }

    #[tokio::test]
    async fn resolve_builds_qualified_repository_and_keeps_source() {
        let resolver = resolver_with(listing(&["4.0.14-alpine", "5.0.6-alpine"]));

        let resolved = resolver.resolve(&redis("4.0.14-alpine")).await.unwrap();

        assert_eq!(
            resolved,
            Image {
                digest: "sha256:digest-of-5.0.6-alpine".to_string(),
                repository: REDIS.to_string(),
                source: "container/redis".to_string(),
                tag: "5.0.6-alpine".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn resolve_is_idempotent_for_unchanged_registry() {
        let resolver = resolver_with(listing(&["4.0.14", "5.0.6", "5.0.5"]));
        let image = redis("4.0.14");

        let first = resolver.resolve(&image).await.unwrap();
        let second = resolver.resolve(&image).await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn resolve_rejects_unknown_tag_without_contacting_registry() {
        let mut connector = MockRegistryConnector::new();
        connector.expect_connect().never();
        let resolver = TagResolver::new(
            Arc::new(Classifier::default()),
            vec![RegistryEndpoint::new("docker.io", Protocol::Https)],
            Arc::new(connector),
        );

        let result = resolver.resolve(&redis("abc123")).await;

        assert!(matches!(result, Err(ResolveError::TagNotSupported { ref tag }) if tag == "abc123"));
        assert!(result.unwrap_err().is_benign());
    }

    #[tokio::test]
    async fn resolve_rejects_repository_without_endpoint() {
        let resolver = resolver_with(MockRegistryClient::new());
        let mut image = redis("5.0.6");
        image.repository = "quay.io/coreos/etcd".to_string();

        let result = resolver.resolve(&image).await;

        assert!(matches!(result, Err(ResolveError::UnknownRegistry { .. })));
        assert!(result.unwrap_err().is_benign());
    }

    #[tokio::test]
    async fn resolve_propagates_registry_failure() {
        let mut client = MockRegistryClient::new();
        client
            .expect_list_tags()
            .returning(|_| Err(RegistryError::Unauthorized("tags".to_string())));
        let resolver = resolver_with(client);

        let result = resolver.resolve(&redis("5.0.6")).await;

        let error = result.unwrap_err();
        assert!(matches!(error, ResolveError::Registry(RegistryError::Unauthorized(_))));
        assert!(!error.is_benign());
    }

    #[tokio::test]
    async fn resolve_propagates_metadata_failure() {
        let mut client = MockRegistryClient::new();
        client
            .expect_list_tags()
            .returning(|_| Ok(vec!["5.0.6".to_string()]));
        client
            .expect_image_by_tag()
            .with(eq(REDIS), eq("5.0.6"))
            .returning(|_, tag| Err(RegistryError::NotFound(tag.to_string())));
        let resolver = resolver_with(client);

        let result = resolver.resolve(&redis("5.0.6")).await;

        assert!(matches!(
            result,
            Err(ResolveError::Registry(RegistryError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn resolve_passes_endpoint_authenticator_to_connector() {
        let client: Arc<dyn RegistryClient> = Arc::new(listing(&["5.0.6"]));
        let mut connector = MockRegistryConnector::new();
        connector
            .expect_connect()
            .withf(|endpoint, auth| {
                endpoint.address == "docker.io"
                    && *auth
                        == Authenticator::Basic {
                            username: "u".to_string(),
                            password: "p".to_string(),
                        }
            })
            .times(1)
            .returning(move |_, _| client.clone());
        let resolver = TagResolver::new(
            Arc::new(Classifier::default()),
            vec![RegistryEndpoint::new("docker.io", Protocol::Https).with_basic_auth("u", "p")],
            Arc::new(connector),
        );

        resolver.resolve(&redis("5.0.6")).await.unwrap();
    }
}
