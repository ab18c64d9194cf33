//! Typed version tokens extracted from image tags
//!
//! A token only orders against tokens of the same variant. Callers must
//! compare distinction keys first: two `MajorMinorPatch` tokens with
//! different build suffixes (`-alpine` vs `-debian`) are not comparable.

use std::fmt;

use thiserror::Error;

/// Variant of a [`VersionToken`] without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    MajorMinorPatch,
    MajorMinor,
    Major,
    NameDate,
    Static,
    Unknown,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::MajorMinorPatch => "major_minor_patch",
            TokenKind::MajorMinor => "major_minor",
            TokenKind::Major => "major",
            TokenKind::NameDate => "name_date",
            TokenKind::Static => "static",
            TokenKind::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompareError {
    #[error("cannot compare {found} token with {expected} token")]
    WrongVariant {
        expected: &'static str,
        found: &'static str,
    },
}

/// A tag classified into a comparable version scheme
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionToken {
    /// `v1.2.3`, `4.0.14-alpine`
    MajorMinorPatch {
        major: u64,
        minor: u64,
        patch: u64,
        build: String,
        raw: String,
    },
    /// `v1.2`, `3.11-slim`
    MajorMinor {
        major: u64,
        minor: u64,
        build: String,
        raw: String,
    },
    /// `v1`, `18-bullseye`
    Major {
        version: u64,
        build: String,
        raw: String,
    },
    /// `nightly-20230101`
    NameDate { name: String, date: u32, raw: String },
    /// One of the well-known moving tags (`latest`, `stable`, ...)
    Static(String),
    /// Anything no recognizer accepted
    Unknown(String),
}

impl VersionToken {
    pub fn kind(&self) -> TokenKind {
        match self {
            VersionToken::MajorMinorPatch { .. } => TokenKind::MajorMinorPatch,
            VersionToken::MajorMinor { .. } => TokenKind::MajorMinor,
            VersionToken::Major { .. } => TokenKind::Major,
            VersionToken::NameDate { .. } => TokenKind::NameDate,
            VersionToken::Static(_) => TokenKind::Static,
            VersionToken::Unknown(_) => TokenKind::Unknown,
        }
    }

    /// Grouping key under which two tokens may be ordered.
    ///
    /// The key format is stable, e.g. `majorMinorPatch-alpine` or
    /// `nameDate-nightly`.
    pub fn distinction(&self) -> String {
        match self {
            VersionToken::MajorMinorPatch { build, .. } => format!("majorMinorPatch{}", build),
            VersionToken::MajorMinor { build, .. } => format!("majorMinor{}", build),
            VersionToken::Major { build, .. } => format!("major{}", build),
            VersionToken::NameDate { name, .. } => format!("nameDate-{}", name),
            VersionToken::Static(raw) => format!("static-{}", raw),
            VersionToken::Unknown(raw) => format!("unknown-{}", raw),
        }
    }

    /// Returns whether `self` is strictly greater than `other`.
    ///
    /// Fails with [`CompareError::WrongVariant`] when the two tokens belong to
    /// different variants. `Static` and `Unknown` tokens are never greater.
    /// Build suffixes and `NameDate` names are not compared: only order tokens
    /// that share a [`distinction`](Self::distinction).
    pub fn is_greater_than(&self, other: &VersionToken) -> Result<bool, CompareError> {
        match (self, other) {
            (
                VersionToken::MajorMinorPatch {
                    major,
                    minor,
                    patch,
                    ..
                },
                VersionToken::MajorMinorPatch {
                    major: o_major,
                    minor: o_minor,
                    patch: o_patch,
                    ..
                },
            ) => Ok((major, minor, patch) > (o_major, o_minor, o_patch)),
            (
                VersionToken::MajorMinor { major, minor, .. },
                VersionToken::MajorMinor {
                    major: o_major,
                    minor: o_minor,
                    ..
                },
            ) => Ok((major, minor) > (o_major, o_minor)),
            (
                VersionToken::Major { version, .. },
                VersionToken::Major {
                    version: o_version, ..
                },
            ) => Ok(version > o_version),
            (
                VersionToken::NameDate { date, .. },
                VersionToken::NameDate { date: o_date, .. },
            ) => Ok(date > o_date),
            (VersionToken::Static(_), VersionToken::Static(_)) => Ok(false),
            (VersionToken::Unknown(_), VersionToken::Unknown(_)) => Ok(false),
            _ => Err(CompareError::WrongVariant {
                expected: self.kind().as_str(),
                found: other.kind().as_str(),
            }),
        }
    }

    /// Priority score of the variant.
    ///
    /// Not consulted by any comparison yet: precedence between variants
    /// comes from the recognizer order of the classifier.
    pub fn weight(&self) -> u32 {
        match self {
            VersionToken::MajorMinorPatch { .. } => 100,
            VersionToken::MajorMinor { .. } => 90,
            VersionToken::Major { .. } => 80,
            VersionToken::NameDate { .. } => 70,
            VersionToken::Static(_) => 60,
            VersionToken::Unknown(_) => 10,
        }
    }

    /// The tag this token was parsed from
    pub fn as_str(&self) -> &str {
        match self {
            VersionToken::MajorMinorPatch { raw, .. }
            | VersionToken::MajorMinor { raw, .. }
            | VersionToken::Major { raw, .. }
            | VersionToken::NameDate { raw, .. }
            | VersionToken::Static(raw)
            | VersionToken::Unknown(raw) => raw,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, VersionToken::Unknown(_))
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
