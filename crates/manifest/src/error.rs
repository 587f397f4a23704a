//! Error types for the manifest crate

use crate::types::Format;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that make a desired-state document unusable
///
/// Any of these is fatal to a run: nothing is reconciled.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Document could not be read
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File extension maps to no known format
    #[error("unsupported manifest format: {} (expected .yaml, .yml, .toml or .json)", .0.display())]
    UnknownFormat(PathBuf),

    /// Document is not well-formed in its format
    #[error("invalid {format}: {message}")]
    Syntax { format: Format, message: String },

    /// Document has no `resources` list
    #[error("manifest has no `resources` list")]
    MissingResources,

    /// An entry is not a mapping, or a field has the wrong shape
    #[error("resource #{index}: {reason}")]
    InvalidEntry { index: usize, reason: String },

    /// A required field is absent or empty
    #[error("resource #{index}: missing required field `{field}`")]
    MissingField { index: usize, field: &'static str },

    /// Two entries share a logical name
    #[error("duplicate resource name: {0}")]
    DuplicateName(String),

    /// A kind-specific attribute is absent
    #[error("{kind} '{name}': missing required attribute `{attribute}`")]
    MissingAttribute {
        kind: String,
        name: String,
        attribute: &'static str,
    },

    /// A storage bucket name the provider would refuse
    #[error(
        "invalid bucket name '{0}': use 3-63 lowercase letters, digits, '.' or '-', \
         starting and ending with a letter or digit"
    )]
    InvalidBucketName(String),
}

/// Result type for manifest operations
pub type Result<T> = std::result::Result<T, ConfigError>;
