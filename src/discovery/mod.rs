//! Discovery inputs: what producers report and where it is kept
//!
//! - [`types`]: `Image`, `DiscoveryInput` and their validation
//! - [`storage`]: `Storage` trait and the directory-backed implementation

pub mod storage;
pub mod types;

pub use storage::{Directory, Storage, StorageError};
pub use types::{DiscoveryInput, Image, ValidationError, validate_input};
