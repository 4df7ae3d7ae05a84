use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{AccessKey, AssumedCredentials};

/// The credentials a caller holds between calls.
///
/// Records are returned to the caller, who passes them back on the next
/// call. They are never mutated: a refresh produces a new record.
///
/// `issued_at` is the local time at which the role assumption was
/// requested. Freshness is judged from it alone; `expiration` is what the
/// service reported and is kept for information only. A record without
/// `issued_at` (one imported from another tool, say) is always stale.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRecord {
    /// Temporary access key id
    pub access_key_id: String,
    /// Temporary secret
    pub secret_access_key: String,
    /// Session token
    pub session_token: String,
    /// Expiry reported by the role-assumption service
    pub expiration: DateTime<Utc>,
    /// Region requests are signed for
    pub region: String,
    /// When the role assumption was requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<DateTime<Utc>>,
}

impl CredentialRecord {
    /// Record for `assumed`, requested at `issued_at`.
    pub fn issued(
        assumed: AssumedCredentials,
        region: impl Into<String>,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_key_id: assumed.access_key_id,
            secret_access_key: assumed.secret_access_key,
            session_token: assumed.session_token,
            expiration: assumed.expiration,
            region: region.into(),
            issued_at: Some(issued_at),
        }
    }

    /// Local expiry: `issued_at + duration_seconds`, if the issue time is
    /// known.
    pub fn expires_at(&self, duration_seconds: u64) -> Option<DateTime<Utc>> {
        let duration = Duration::try_seconds(i64::try_from(duration_seconds).ok()?)?;
        self.issued_at?.checked_add_signed(duration)
    }

    /// Key for signing requests made with this record.
    pub fn access_key(&self) -> AccessKey {
        AccessKey::new(&self.access_key_id, &self.secret_access_key)
            .with_session_token(&self.session_token)
    }
}

impl std::fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &"<redacted>")
            .field("expiration", &self.expiration)
            .field("region", &self.region)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}
