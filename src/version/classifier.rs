//! Tag classification
//!
//! The classifier runs an ordered chain of recognizers over a tag and
//! returns the token of the first one that accepts it. Order matters:
//! `Major` is tried before `MajorMinor`, and `NameDate` before `Static`.
//! Tags no recognizer accepts become [`VersionToken::Unknown`].

use std::collections::HashSet;

use regex::Regex;

use crate::version::token::VersionToken;

/// Tags that track a branch rather than a release
pub const STATIC_TAGS: &[&str] = &["latest", "mainline", "master", "stable"];

/// A single step of the classification chain
pub trait Recognizer: Send + Sync {
    /// Returns a token if the tag follows this recognizer's scheme
    fn recognize(&self, tag: &str) -> Option<VersionToken>;
}

/// Parses a digit-only capture. Overflowing values saturate.
fn parse_number(digits: &str) -> u64 {
    digits.parse().unwrap_or(u64::MAX)
}

/// `^v?(\d+)(-.*)?$`
pub struct MajorRecognizer {
    re: Regex,
}

impl MajorRecognizer {
    pub fn new() -> Self {
        Self {
            re: Regex::new(r"^v?([0-9]+)(-.*)?$").expect("major pattern is valid"),
        }
    }
}

impl Default for MajorRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Recognizer for MajorRecognizer {
    fn recognize(&self, tag: &str) -> Option<VersionToken> {
        let caps = self.re.captures(tag)?;
        Some(VersionToken::Major {
            version: parse_number(&caps[1]),
            build: caps.get(2).map_or("", |m| m.as_str()).to_string(),
            raw: tag.to_string(),
        })
    }
}

/// `^v?(\d+)\.(\d+)(-.*)?$`
pub struct MajorMinorRecognizer {
    re: Regex,
}

impl MajorMinorRecognizer {
    pub fn new() -> Self {
        Self {
            re: Regex::new(r"^v?([0-9]+)\.([0-9]+)(-.*)?$").expect("major.minor pattern is valid"),
        }
    }
}

impl Default for MajorMinorRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Recognizer for MajorMinorRecognizer {
    fn recognize(&self, tag: &str) -> Option<VersionToken> {
        let caps = self.re.captures(tag)?;
        Some(VersionToken::MajorMinor {
            major: parse_number(&caps[1]),
            minor: parse_number(&caps[2]),
            build: caps.get(3).map_or("", |m| m.as_str()).to_string(),
            raw: tag.to_string(),
        })
    }
}

/// `^v?(\d+)\.(\d+)\.(\d+)(-.*)?$`
pub struct MajorMinorPatchRecognizer {
    re: Regex,
}

impl MajorMinorPatchRecognizer {
    pub fn new() -> Self {
        Self {
            re: Regex::new(r"^v?([0-9]+)\.([0-9]+)\.([0-9]+)(-.*)?$")
                .expect("major.minor.patch pattern is valid"),
        }
    }
}

impl Default for MajorMinorPatchRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Recognizer for MajorMinorPatchRecognizer {
    fn recognize(&self, tag: &str) -> Option<VersionToken> {
        let caps = self.re.captures(tag)?;
        Some(VersionToken::MajorMinorPatch {
            major: parse_number(&caps[1]),
            minor: parse_number(&caps[2]),
            patch: parse_number(&caps[3]),
            build: caps.get(4).map_or("", |m| m.as_str()).to_string(),
            raw: tag.to_string(),
        })
    }
}

/// `^(\w*)-(\d{8})$`
pub struct NameDateRecognizer {
    re: Regex,
}

impl NameDateRecognizer {
    pub fn new() -> Self {
        Self {
            re: Regex::new(r"^([0-9A-Za-z_]*)-([0-9]{8})$").expect("name-date pattern is valid"),
        }
    }
}

impl Default for NameDateRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Recognizer for NameDateRecognizer {
    fn recognize(&self, tag: &str) -> Option<VersionToken> {
        let caps = self.re.captures(tag)?;
        // eight ASCII digits always fit
        let date = caps[2].parse().unwrap_or(u32::MAX);
        Some(VersionToken::NameDate {
            name: caps[1].to_string(),
            date,
            raw: tag.to_string(),
        })
    }
}

/// Exact match against [`STATIC_TAGS`]
pub struct StaticRecognizer {
    known: HashSet<&'static str>,
}

impl StaticRecognizer {
    pub fn new() -> Self {
        Self {
            known: STATIC_TAGS.iter().copied().collect(),
        }
    }
}

impl Default for StaticRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Recognizer for StaticRecognizer {
    fn recognize(&self, tag: &str) -> Option<VersionToken> {
        self.known
            .contains(tag)
            .then(|| VersionToken::Static(tag.to_string()))
    }
}

/// Ordered recognizer chain with an `Unknown` fallback
pub struct Classifier {
    recognizers: Vec<Box<dyn Recognizer>>,
}

impl Classifier {
    /// Create a classifier that tries `recognizers` in the given order
    pub fn new(recognizers: Vec<Box<dyn Recognizer>>) -> Self {
        Self { recognizers }
    }

    pub fn classify(&self, tag: &str) -> VersionToken {
        self.recognizers
            .iter()
            .find_map(|r| r.recognize(tag))
            .unwrap_or_else(|| VersionToken::Unknown(tag.to_string()))
    }
}

impl Default for Classifier {
    /// The standard chain: major, major.minor, major.minor.patch, name-date,
    /// static
    fn default() -> Self {
        Self::new(vec![
            Box::new(MajorRecognizer::new()),
            Box::new(MajorMinorRecognizer::new()),
            Box::new(MajorMinorPatchRecognizer::new()),
            Box::new(NameDateRecognizer::new()),
            Box::new(StaticRecognizer::new()),
        ])
    }
}
