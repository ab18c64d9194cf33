//! Pairs every discovered image with the newest image available for it

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tracing::{debug, error, warn};

use crate::cache::ResultStore;
use crate::discovery::{DiscoveryInput, Image, Storage, StorageError};
use crate::resolver::ImageResolver;

#[derive(Debug, Error)]
pub enum FindError {
    #[error("Unable to read discovery inputs: {0}")]
    Storage(#[from] StorageError),
}

/// A discovered image and the newest image of the same tag scheme
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindResult {
    pub current: Image,
    pub latest: Image,
    /// Name of the input that reported the image
    pub input: String,
    /// Instance of the input that reported the image
    pub instance: String,
}

impl FindResult {
    pub fn needs_update(&self) -> bool {
        self.latest.digest != self.current.digest
    }
}

pub struct Finder {
    storage: Arc<dyn Storage>,
    cache: Arc<dyn ResultStore>,
    resolver: Arc<dyn ImageResolver>,
    skipped: AtomicU64,
    errors: AtomicU64,
}

impl Finder {
    pub fn new(
        storage: Arc<dyn Storage>,
        cache: Arc<dyn ResultStore>,
        resolver: Arc<dyn ImageResolver>,
    ) -> Self {
        Self {
            storage,
            cache,
            resolver,
            skipped: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    /// Images skipped because of an unsupported tag or an unknown registry
    pub fn skipped_total(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Images whose resolution failed
    pub fn errors_total(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Produce a result for every valid, resolvable image of every input.
    ///
    /// Only a failure to read the inputs fails the whole pass; problems with
    /// single images are logged and the image is left out.
    pub async fn find(&self) -> Result<Vec<FindResult>, FindError> {
        let inputs = self.storage.read_all().inspect_err(|e| {
            error!("Failed to read discovery inputs: {}", e);
        })?;

        let mut results = Vec::new();
        for input in &inputs {
            for image in &input.images {
                if let Some(result) = self.find_image(input, image).await {
                    results.push(result);
                }
            }
        }

        debug!("Found {} results in {} inputs", results.len(), inputs.len());
        Ok(results)
    }

    async fn find_image(&self, input: &DiscoveryInput, image: &Image) -> Option<FindResult> {
        if let Err(e) = image.validate() {
            warn!("Validation of image from input {} failed: {}", input.name, e);
            return None;
        }

        match self.cache.get(image) {
            Ok(Some(cached)) => {
                debug!("Cache hit for {}", image);
                return Some(FindResult {
                    input: input.name.clone(),
                    instance: input.instance.clone(),
                    ..cached
                });
            }
            Ok(None) => {}
            Err(e) => warn!("Reading cached result of {} failed: {}", image, e),
        }

        debug!("Resolving latest image of {}", image);
        let latest = match self.resolver.resolve(image).await {
            Ok(latest) => latest,
            Err(e) if e.is_benign() => {
                warn!("Skipping {}: {}", image, e);
                self.skipped.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Err(e) => {
                error!("Resolving latest image of {} failed: {}", image, e);
                self.errors.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        let result = FindResult {
            current: image.clone(),
            latest,
            input: input.name.clone(),
            instance: input.instance.clone(),
        };

        if let Err(e) = self.cache.set(image, result.clone()) {
            warn!("Caching result of {} failed: {}", image, e);
        }

        Some(result)
    }
}
