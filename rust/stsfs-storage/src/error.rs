use stsfs_policy::PolicyError;
use thiserror::Error;

/// Failures of a storage operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The store refused the request for the session's credentials
    #[error("Access denied ({code}): {message}")]
    Denied {
        /// Store error code, e.g. `AccessDenied`
        code: String,
        /// Store error message
        message: String,
    },

    /// No object exists under the key
    #[error("No such key: {key}")]
    NotFound {
        /// The missing key
        key: String,
    },

    /// The store reported any other failure
    #[error("Storage service error {status} ({code}): {message}")]
    Service {
        /// HTTP status
        status: u16,
        /// Store error code
        code: String,
        /// Store error message
        message: String,
    },

    /// The store could not be reached
    #[error("Storage unreachable: {0}")]
    Transport(String),

    /// The arguments supplied for an operation do not fit it
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// The bucket path or object path is unusable
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// The request could not be signed
    #[error("Failed to authorize request: {0}")]
    Authorization(String),
}

impl StorageError {
    /// Whether the store refused the request on authorization grounds.
    pub fn is_denied(&self) -> bool {
        matches!(self, StorageError::Denied { .. })
    }
}

impl From<PolicyError> for StorageError {
    fn from(error: PolicyError) -> Self {
        StorageError::InvalidPath(error.to_string())
    }
}

impl From<reqwest::Error> for StorageError {
    fn from(error: reqwest::Error) -> Self {
        StorageError::Transport(error.to_string())
    }
}
