//! In-memory registry test utilities

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use imagewatch::registry::{
    Authenticator, ImageInfo, RegistryClient, RegistryConnector, RegistryEndpoint, RegistryError,
};

/// Registry serving a fixed set of tagged images
pub struct InMemoryRegistry {
    domain: String,
    /// Tags and digests by repository path, in listing order
    repositories: HashMap<String, Vec<(String, String)>>,
    list_calls: AtomicUsize,
}

impl InMemoryRegistry {
    pub fn new(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            repositories: HashMap::new(),
            list_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_image(mut self, repository: &str, tag: &str, digest: &str) -> Self {
        self.repositories
            .entry(repository.to_string())
            .or_default()
            .push((tag.to_string(), digest.to_string()));
        self
    }

    /// How often tags were listed
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn tags_of<'a>(
        &'a self,
        repository: &'a str,
    ) -> Result<(&'a str, &'a [(String, String)]), RegistryError> {
        let path = repository
            .strip_prefix(&self.domain)
            .map(|rest| rest.trim_start_matches('/'))
            .ok_or_else(|| RegistryError::ForeignRepository {
                repository: repository.to_string(),
                domain: self.domain.clone(),
            })?;
        let tags = self
            .repositories
            .get(path)
            .ok_or_else(|| RegistryError::NotFound(repository.to_string()))?;
        Ok((path, tags.as_slice()))
    }
}

#[async_trait]
impl RegistryClient for InMemoryRegistry {
    async fn list_tags(&self, repository: &str) -> Result<Vec<String>, RegistryError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let (_, tags) = self.tags_of(repository)?;
        Ok(tags.iter().map(|(tag, _)| tag.clone()).collect())
    }

    async fn image_by_tag(
        &self,
        repository: &str,
        tag: &str,
    ) -> Result<ImageInfo, RegistryError> {
        let (path, tags) = self.tags_of(repository)?;
        let (_, digest) = tags
            .iter()
            .find(|(candidate, _)| candidate == tag)
            .ok_or_else(|| RegistryError::NotFound(format!("{}:{}", repository, tag)))?;

        Ok(ImageInfo {
            digest: digest.clone(),
            domain: self.domain.clone(),
            repository: path.to_string(),
            tag: tag.to_string(),
        })
    }
}

/// Connector handing out the same registry for every endpoint
pub struct StaticConnector {
    registry: Arc<InMemoryRegistry>,
}

impl StaticConnector {
    pub fn new(registry: Arc<InMemoryRegistry>) -> Self {
        Self { registry }
    }
}

impl RegistryConnector for StaticConnector {
    fn connect(
        &self,
        _endpoint: &RegistryEndpoint,
        _authenticator: Authenticator,
    ) -> Arc<dyn RegistryClient> {
        self.registry.clone()
    }
}
