use crate::instance::InstanceState;
use reconcile::ProviderError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the emulated cloud.
#[derive(Debug, Error)]
pub enum Error {
    /// Name or region cannot be used as a directory name
    #[error("invalid {what}: {value:?}")]
    InvalidName { what: &'static str, value: String },

    /// Bucket already exists in this region
    #[error("bucket already exists: {name} ({region})")]
    BucketExists { name: String, region: String },

    /// Bucket does not exist in this region
    #[error("no such bucket: {name} ({region})")]
    BucketNotFound { name: String, region: String },

    /// Instance does not exist in this region
    #[error("no such instance: {id} ({region})")]
    InstanceNotFound { id: String, region: String },

    /// Instance is in a state that does not allow the action
    #[error("cannot {action} instance {id} while it is {state}")]
    IncorrectState {
        id: String,
        action: &'static str,
        state: InstanceState,
    },

    /// A required launch parameter is missing
    #[error("missing launch parameter: {0}")]
    MissingParameter(&'static str),

    /// Stored record is unreadable
    #[error("corrupt record {}: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if this error means the addressed resource is gone
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::BucketNotFound { .. } | Self::InstanceNotFound { .. }
        )
    }
}

impl From<Error> for ProviderError {
    fn from(err: Error) -> Self {
        match err {
            Error::BucketNotFound { name, .. } => Self::NotFound { provider_id: name },
            Error::InstanceNotFound { id, .. } => Self::NotFound { provider_id: id },
            Error::Io(e) => Self::Io(e),
            other => Self::api(other.to_string()),
        }
    }
}

/// Result type for sandbox operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_mapping() {
        let err: ProviderError = Error::InstanceNotFound {
            id: "i-1".into(),
            region: "us-east-1".into(),
        }
        .into();
        assert!(matches!(err, ProviderError::NotFound { ref provider_id } if provider_id == "i-1"));

        let err: ProviderError = Error::BucketExists {
            name: "logs".into(),
            region: "us-east-1".into(),
        }
        .into();
        assert!(matches!(err, ProviderError::Api { .. }));
        assert!(err.to_string().contains("bucket already exists"));
    }
}
