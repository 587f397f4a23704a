//! Error types for reconciliation.
//!
//! Errors are split by blast radius. [`ReconcileError`] aborts a run before
//! any provider call. [`ResourceError`] (an [`UnsupportedKindError`] or a
//! [`ProviderError`]) only fails the resource it belongs to and is
//! aggregated into the run report. [`StateError`] covers the durable
//! state document.

use crate::store::{ObjectVersion, StateLocator};
use crate::types::ResourceKind;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by a provider capability.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider rejected the request
    #[error("provider rejected request: {message}")]
    Api {
        /// Message returned by the provider
        message: String,
    },

    /// The addressed resource does not exist on the provider side
    #[error("resource not found: {provider_id}")]
    NotFound {
        /// Identifier that could not be resolved
        provider_id: String,
    },

    /// A bounded wait for a provider-side transition ran out
    #[error("timed out after {}s waiting for {operation}", .waited.as_secs())]
    Timeout {
        /// What was being waited for
        operation: String,
        /// How long the wait lasted
        waited: Duration,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ProviderError {
    /// Create an API error.
    pub fn api(message: impl Into<String>) -> Self {
        Self::Api {
            message: message.into(),
        }
    }

    /// Whether this error is a bounded-wait timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// A resource kind with no registered provider.
///
/// This is a configuration problem, detected before any provider call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported resource type: {kind}")]
pub struct UnsupportedKindError {
    pub kind: ResourceKind,
}

/// Failure of a single resource within a run.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error(transparent)]
    Unsupported(#[from] UnsupportedKindError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl ResourceError {
    /// Whether the provider was never called.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported(_))
    }
}

/// Errors from an object store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The object changed since the caller read it
    #[error("version conflict (expected {}, found {})", display_version(.expected.as_ref()), display_version(.actual.as_ref()))]
    Conflict {
        expected: Option<ObjectVersion>,
        actual: Option<ObjectVersion>,
    },

    /// Another writer holds the lock for this object
    #[error(
        "object is locked by another writer: {}",
        .path.display()
    )]
    Locked { path: PathBuf },

    /// Bucket or key cannot be mapped onto the backend
    #[error("invalid locator: {0}")]
    InvalidLocator(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

fn display_version(version: Option<&ObjectVersion>) -> String {
    version.map_or_else(|| "<none>".to_string(), ToString::to_string)
}

/// Errors loading or saving the durable state document.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to read state {locator}: {source}")]
    Read {
        locator: StateLocator,
        #[source]
        source: StoreError,
    },

    #[error("failed to parse state {locator}: {source}")]
    Parse {
        locator: StateLocator,
        #[source]
        source: serde_json::Error,
    },

    #[error("state {locator} is inconsistent: {reason}")]
    Invalid { locator: StateLocator, reason: String },

    #[error("failed to serialize state: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("failed to write state {locator}: {source}")]
    Write {
        locator: StateLocator,
        #[source]
        source: StoreError,
    },

    #[error("state {locator} was modified by another run since it was loaded")]
    Conflict { locator: StateLocator },
}

impl StateError {
    /// Whether this error happened while loading.
    pub fn is_load_error(&self) -> bool {
        matches!(
            self,
            Self::Read { .. } | Self::Parse { .. } | Self::Invalid { .. }
        )
    }

    /// Whether this error happened while saving.
    pub fn is_save_error(&self) -> bool {
        !self.is_load_error()
    }

    /// Whether a concurrent writer won the race for the document.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Errors that abort a run before any provider call.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The tracked state could not be trusted
    #[error("refusing to reconcile: {0}")]
    StateLoad(#[source] StateError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_provider_error_subtype() {
        let err = ProviderError::Timeout {
            operation: "instance i-1 to stop".into(),
            waited: Duration::from_secs(120),
        };
        assert!(err.is_timeout());
        assert_eq!(
            err.to_string(),
            "timed out after 120s waiting for instance i-1 to stop"
        );
        assert!(!ProviderError::api("nope").is_timeout());
    }

    #[test]
    fn test_unsupported_distinguishable_from_provider() {
        let err: ResourceError = UnsupportedKindError {
            kind: ResourceKind::Other("gcp_bucket".into()),
        }
        .into();
        assert!(err.is_unsupported());
        assert_eq!(err.to_string(), "unsupported resource type: gcp_bucket");

        let err: ResourceError = ProviderError::api("denied").into();
        assert!(!err.is_unsupported());
    }

    #[test]
    fn test_state_error_classification() {
        let locator = StateLocator::new("bucket", "state.json");
        let err = StateError::Invalid {
            locator: locator.clone(),
            reason: "bad".into(),
        };
        assert!(err.is_load_error());

        let err = StateError::Conflict { locator };
        assert!(err.is_save_error());
        assert!(err.is_conflict());
    }
}
