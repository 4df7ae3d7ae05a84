use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifetime requested when none is configured, and the shortest one STS
/// accepts.
pub const DEFAULT_DURATION_SECONDS: u64 = 900;

/// Everything the role-assumption service needs to mint a scoped session.
///
/// Built fresh for every refresh and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleAssumptionRequest {
    /// ARN of the role to assume
    pub role_arn: String,
    /// Session name, the user id
    pub session_name: String,
    /// External id, the user id
    pub external_id: String,
    /// Serialized scoped policy limiting the session
    pub policy: String,
    /// Requested session lifetime
    pub duration_seconds: u64,
}

impl RoleAssumptionRequest {
    /// Request a session for `user_id` limited by the serialized `policy`.
    ///
    /// The user id doubles as session name and external id.
    pub fn new(
        role_arn: impl Into<String>,
        user_id: &str,
        policy: impl Into<String>,
        duration_seconds: u64,
    ) -> Self {
        Self {
            role_arn: role_arn.into(),
            session_name: user_id.to_string(),
            external_id: user_id.to_string(),
            policy: policy.into(),
            duration_seconds,
        }
    }
}

/// Temporary credentials as returned by the role-assumption service.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssumedCredentials {
    /// Temporary access key id
    pub access_key_id: String,
    /// Temporary secret
    pub secret_access_key: String,
    /// Session token that must accompany every request
    pub session_token: String,
    /// Expiry reported by the service
    pub expiration: DateTime<Utc>,
}

impl std::fmt::Debug for AssumedCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssumedCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &"<redacted>")
            .field("expiration", &self.expiration)
            .finish()
    }
}
