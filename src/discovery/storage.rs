//! Persistence of discovery inputs
//!
//! Each input lives in its own JSON file, named after the producer and the
//! instance it describes. A producer that reports again overwrites its
//! previous file.

use std::fs;
use std::path::{Path, PathBuf};

#[cfg(test)]
use mockall::automock;
use thiserror::Error;
use tracing::debug;

use crate::discovery::types::DiscoveryInput;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("directory '{0}' does not exist")]
    Missing(PathBuf),

    #[error("'{0}' is not a directory")]
    NotADirectory(PathBuf),

    #[error("'{0}' is outside the discovery directory")]
    OutsideDirectory(PathBuf),

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in '{path}': {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Trait for reading and writing discovery inputs
#[cfg_attr(test, automock)]
pub trait Storage: Send + Sync {
    /// Read every stored input
    fn read_all(&self) -> Result<Vec<DiscoveryInput>, StorageError>;

    /// Store an input, replacing the previous one of the same name and instance
    fn write(&self, input: &DiscoveryInput) -> Result<(), StorageError>;
}

/// Stores inputs as `<name>-<instance>.json` files in a directory
#[derive(Debug, Clone)]
pub struct Directory {
    path: PathBuf,
}

impl Directory {
    /// Open an existing directory
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::Missing(path));
            }
            Err(source) => return Err(StorageError::Io { path, source }),
        };

        if !metadata.is_dir() {
            return Err(StorageError::NotADirectory(path));
        }

        Ok(Self { path })
    }

    /// Open a directory, creating it and its parents first if needed
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        fs::create_dir_all(&path).map_err(|source| StorageError::Io {
            path: path.clone(),
            source,
        })?;
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name an input is stored under
    pub fn file_name(input: &DiscoveryInput) -> String {
        format!(
            "{}-{}.json",
            input.name.to_lowercase(),
            input.instance.to_lowercase()
        )
    }

    fn read_input(path: &Path) -> Result<DiscoveryInput, StorageError> {
        debug!("Reading input from {:?}", path);
        let bytes = fs::read(path).map_err(|source| StorageError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| StorageError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl Storage for Directory {
    fn read_all(&self) -> Result<Vec<DiscoveryInput>, StorageError> {
        let io_err = |source| StorageError::Io {
            path: self.path.clone(),
            source,
        };

        let mut files = Vec::new();
        for entry in fs::read_dir(&self.path).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        files.sort();

        files.iter().map(|path| Self::read_input(path)).collect()
    }

    fn write(&self, input: &DiscoveryInput) -> Result<(), StorageError> {
        let target = self.path.join(Self::file_name(input));
        if target.parent() != Some(self.path.as_path()) {
            return Err(StorageError::OutsideDirectory(target));
        }
        let bytes = serde_json::to_vec(input).map_err(|source| StorageError::Json {
            path: target.clone(),
            source,
        })?;

        // Readers only ever see complete files.
        let staging = self.path.join(format!(".{}.tmp", Self::file_name(input)));
        fs::write(&staging, bytes).map_err(|source| StorageError::Io {
            path: staging.clone(),
            source,
        })?;
        fs::rename(&staging, &target).map_err(|source| StorageError::Io {
            path: target.clone(),
            source,
        })?;

        debug!("Stored input {}/{} at {:?}", input.name, input.instance, target);
        Ok(())
    }
}
