use stsfs_credentials::AssumeRoleError;
use stsfs_policy::PolicyError;
use stsfs_storage::StorageError;
use thiserror::Error;

/// Failures surfaced by the broker and the proxy.
///
/// Underlying errors are kept intact as the `source`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The configuration, the policy template, or the user id and bucket
    /// path substituted into it cannot produce a usable policy
    #[error("Invalid configuration: {message}")]
    Configuration {
        /// What is wrong
        message: String,
        /// The policy error, when policy building failed
        #[source]
        source: Option<PolicyError>,
    },

    /// The role-assumption service did not issue credentials
    #[error("Failed to assume role: {0}")]
    CredentialAssumption(#[source] AssumeRoleError),

    /// The operation is not one the storage client offers
    #[error("Unsupported operation {operation:?}")]
    UnsupportedOperation {
        /// The requested operation name
        operation: String,
    },

    /// The storage client failed to perform the operation
    #[error("{operation} {context:?} failed: {source}")]
    BackendOperation {
        /// Name of the operation
        operation: String,
        /// Path or prefix the operation targeted
        context: String,
        /// The storage failure
        #[source]
        source: StorageError,
    },
}

impl Error {
    /// A configuration error without an underlying cause.
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
            source: None,
        }
    }

    /// Whether a remote service refused access: the role assumption was
    /// denied, or the store denied the operation.
    pub fn is_access_denied(&self) -> bool {
        match self {
            Error::CredentialAssumption(AssumeRoleError::Denied { .. }) => true,
            Error::BackendOperation { source, .. } => source.is_denied(),
            _ => false,
        }
    }
}

impl From<PolicyError> for Error {
    fn from(error: PolicyError) -> Self {
        Error::Configuration {
            message: error.to_string(),
            source: Some(error),
        }
    }
}
