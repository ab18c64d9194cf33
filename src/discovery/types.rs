//! Discovery payload types and their validation

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A container image as reported by a discovery producer
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Image {
    /// Content digest, e.g. `sha256:55f2...`
    pub digest: String,
    /// Registry-qualified repository, e.g. `docker.io/library/redis`
    pub repository: String,
    /// Where the producer found the image (a container or pod name)
    pub source: String,
    /// Tag the image was started from, e.g. `4.0.14-alpine`
    pub tag: String,
}

impl Image {
    /// Check that all four fields are set.
    ///
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.validation_errors().into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn validation_errors(&self) -> Vec<ValidationError> {
        [
            ("digest", &self.digest),
            ("repository", &self.repository),
            ("source", &self.source),
            ("tag", &self.tag),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(field, _)| ValidationError::EmptyImageField {
            field,
            image: self.to_string(),
        })
        .collect()
    }
}

impl fmt::Display for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.repository, self.tag, self.digest)
    }
}

/// The set of images one producer found on one instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryInput {
    /// Host or cluster the images run on
    pub instance: String,
    /// Name of the producer, e.g. `docker` or `kubernetes`
    pub name: String,
    pub images: Vec<Image>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Field {field} of Input is empty")]
    EmptyInputField { field: &'static str },

    #[error("Field {field} of Image '{image}' is empty")]
    EmptyImageField { field: &'static str, image: String },

    #[error("Field {field} of Input '{value}' must not contain path separators or start with a dot")]
    UnsafeInputField { field: &'static str, value: String },
}

/// `name` and `instance` become a file name, so they must stay one path component
fn is_safe_component(value: &str) -> bool {
    !value.starts_with('.') && !value.contains(['/', '\\']) && !value.contains("..")
}

/// Collect every validation error of an input, in field order
pub fn validate_input(input: &DiscoveryInput) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    for (field, value) in [("instance", &input.instance), ("name", &input.name)] {
        if value.is_empty() {
            errors.push(ValidationError::EmptyInputField { field });
        } else if !is_safe_component(value) {
            errors.push(ValidationError::UnsafeInputField {
                field,
                value: value.clone(),
            });
        }
    }
    for image in &input.images {
        errors.extend(image.validation_errors());
    }
    errors
}
