use thiserror::Error;

/// Errors produced while building a scoped policy
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// The template (or the document it renders to) is not a usable policy
    #[error("Malformed policy template: {0}")]
    Configuration(String),

    /// The user id would not confine the policy to a single prefix
    #[error("User id {user_id:?} cannot scope a policy: {reason}")]
    InvalidUserId {
        /// The rejected user id
        user_id: String,
        /// Why it was rejected
        reason: &'static str,
    },

    /// The bucket path is not a plain bucket name with an optional sub-path
    #[error("Bucket path {bucket_path:?} cannot scope a policy: {reason}")]
    InvalidBucketPath {
        /// The rejected bucket path
        bucket_path: String,
        /// Why it was rejected
        reason: &'static str,
    },
}
