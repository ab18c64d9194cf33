//! In-memory result cache with a fixed time to live

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;

#[cfg(test)]
use mockall::automock;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::discovery::{Image, ValidationError};
use crate::finder::FindResult;

const SHARD_COUNT: usize = 16;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cannot fingerprint image: {0}")]
    InvalidImage(#[from] ValidationError),

    #[error("Cache lock poisoned")]
    LockPoisoned,
}

/// Structural hash of an image, used as cache key.
///
/// Every field is hashed with its name and length so that moving characters
/// between fields changes the fingerprint.
pub fn fingerprint(image: &Image) -> Result<String, CacheError> {
    image.validate()?;

    let mut hasher = Sha256::new();
    for (name, value) in [
        ("digest", &image.digest),
        ("repository", &image.repository),
        ("source", &image.source),
        ("tag", &image.tag),
    ] {
        hasher.update(name.as_bytes());
        hasher.update((value.len() as u64).to_be_bytes());
        hasher.update(value.as_bytes());
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Storage for resolved results, keyed by the current image
#[cfg_attr(test, automock)]
pub trait ResultStore: Send + Sync {
    /// Get the unexpired result for an image
    fn get(&self, image: &Image) -> Result<Option<FindResult>, CacheError>;

    /// Store a result; it stays visible for the configured time to live
    fn set(&self, image: &Image, result: FindResult) -> Result<(), CacheError>;
}

struct Entry {
    result: FindResult,
    expires_at: Instant,
}

type Shard = RwLock<HashMap<String, Entry>>;

/// Sharded TTL map.
///
/// Keys are spread over a fixed number of shards, each behind its own lock.
pub struct ResultCache {
    shards: Vec<Shard>,
    ttl: Duration,
}

impl ResultCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| RwLock::new(HashMap::new())).collect(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn shard(&self, key: &str) -> &Shard {
        let index = key
            .get(..4)
            .and_then(|prefix| usize::from_str_radix(prefix, 16).ok())
            .unwrap_or_default();
        &self.shards[index % self.shards.len()]
    }

    fn read(shard: &Shard) -> Result<RwLockReadGuard<'_, HashMap<String, Entry>>, CacheError> {
        shard.read().map_err(|_| CacheError::LockPoisoned)
    }

    fn write(shard: &Shard) -> Result<RwLockWriteGuard<'_, HashMap<String, Entry>>, CacheError> {
        shard.write().map_err(|_| CacheError::LockPoisoned)
    }

    /// Number of stored entries, expired ones included until removed
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .filter_map(|shard| shard.read().ok())
            .map(|entries| entries.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every expired entry and return how many were removed
    pub fn sweep(&self) -> Result<usize, CacheError> {
        let now = Instant::now();
        let mut removed = 0;
        for shard in &self.shards {
            let mut entries = Self::write(shard)?;
            let before = entries.len();
            entries.retain(|_, entry| entry.expires_at > now);
            removed += before - entries.len();
        }
        Ok(removed)
    }

    /// Sweep expired entries every two TTLs until the cache is dropped
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let cache: Weak<Self> = Arc::downgrade(self);
        let period = self.ttl * 2;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                interval.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                match cache.sweep() {
                    Ok(removed) => debug!("Swept {} expired cache entries", removed),
                    Err(e) => debug!("Cache sweep failed: {}", e),
                }
            }
        })
    }
}

impl ResultStore for ResultCache {
    fn get(&self, image: &Image) -> Result<Option<FindResult>, CacheError> {
        let key = fingerprint(image)?;
        let shard = self.shard(&key);
        let now = Instant::now();

        {
            let entries = Self::read(shard)?;
            match entries.get(&key) {
                None => return Ok(None),
                Some(entry) if entry.expires_at > now => return Ok(Some(entry.result.clone())),
                Some(_) => {}
            }
        }

        let mut entries = Self::write(shard)?;
        // Another writer may have refreshed the entry in between
        if entries.get(&key).is_some_and(|entry| entry.expires_at <= now) {
            entries.remove(&key);
        }
        Ok(entries
            .get(&key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.result.clone()))
    }

    fn set(&self, image: &Image, result: FindResult) -> Result<(), CacheError> {
        let key = fingerprint(image)?;
        let entry = Entry {
            result,
            expires_at: Instant::now() + self.ttl,
        };
        Self::write(self.shard(&key))?.insert(key, entry);
        Ok(())
    }
}
