use async_trait::async_trait;
use stsfs_common::{ConditionalSend, ConditionalSync};
use thiserror::Error;

use crate::{AssumedCredentials, RoleAssumptionRequest};

/// The role-assumption service: exchanges a scoped request for temporary
/// credentials.
///
/// Implementations make exactly one remote attempt per call and report
/// failures without retrying.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait AssumeRole: ConditionalSend + ConditionalSync {
    /// Assume the role described by `request`.
    async fn assume_role(
        &self,
        request: &RoleAssumptionRequest,
    ) -> Result<AssumedCredentials, AssumeRoleError>;
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl<A> AssumeRole for std::sync::Arc<A>
where
    A: AssumeRole + ?Sized,
{
    async fn assume_role(
        &self,
        request: &RoleAssumptionRequest,
    ) -> Result<AssumedCredentials, AssumeRoleError> {
        (**self).assume_role(request).await
    }
}

/// Failures of a role assumption
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssumeRoleError {
    /// The service refused to issue credentials (untrusted caller, bad
    /// signature, missing permission)
    #[error("Role assumption denied ({code}): {message}")]
    Denied {
        /// Service error code, e.g. `AccessDenied`
        code: String,
        /// Service error message
        message: String,
    },

    /// The request was malformed or rejected as invalid
    #[error("Invalid role assumption request: {0}")]
    InvalidRequest(String),

    /// The service could not be reached or failed
    #[error("Role assumption service unavailable: {0}")]
    Transport(String),

    /// The service answered with something that is not a credential set
    #[error("Unreadable role assumption response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for AssumeRoleError {
    fn from(error: reqwest::Error) -> Self {
        AssumeRoleError::Transport(error.to_string())
    }
}
