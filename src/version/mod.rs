//! Version classification for image tags
//!
//! Image tags are informally versioned. This module turns a tag string into
//! a typed token that can be ordered against tokens of the same scheme.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────┐
//! │     tag     │────▶│  Classifier  │────▶│ VersionToken │
//! │  (string)   │     │ (recognizers)│     │  (ordering)  │
//! └─────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! # Modules
//!
//! - [`classifier`]: Ordered recognizer chain with an `Unknown` fallback
//! - [`token`]: Token variants, distinction keys and ordering

pub mod classifier;
pub mod token;

pub use classifier::{Classifier, Recognizer};
pub use token::{CompareError, TokenKind, VersionToken};
