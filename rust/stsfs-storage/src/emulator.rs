//! An in-process stand-in for STS and S3.
//!
//! The [`Emulator`] issues sessions like `AssumeRole` does and stores
//! objects like S3 does. Every storage request is authenticated against
//! the issued sessions and authorized by evaluating the session's policy,
//! so a client built from emulator credentials can only touch what the
//! scoped policy grants.
//!
//! ```
//! use stsfs_credentials::{AssumeRole, CredentialRecord, RoleAssumptionRequest};
//! use stsfs_policy::{PolicyTemplate, build_policy};
//! use stsfs_storage::{ClientFactory, StorageClient, emulator::Emulator};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let emulator = Emulator::new("arn:aws:iam::000000000000:role/stsfs").with_bucket("media");
//! let policy = build_policy(&PolicyTemplate::default(), "media", "alice")?;
//! let request = RoleAssumptionRequest::new(
//!     "arn:aws:iam::000000000000:role/stsfs",
//!     "alice",
//!     policy.to_json()?,
//!     900,
//! );
//! let assumed = emulator.assume_role(&request).await?;
//! let credentials = CredentialRecord::issued(assumed, "us-east-1", chrono::Utc::now());
//!
//! let client = emulator.build_client("media", &credentials)?;
//! client.write_file("alice/notes.txt", b"hello".to_vec()).await?;
//! assert!(client.write_file("bob/notes.txt", b"hello".to_vec()).await.is_err());
//! # Ok(())
//! # }
//! ```

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use stsfs_common::{Clock, SystemClock};
use stsfs_credentials::{
    AssumeRole, AssumeRoleError, AssumedCredentials, CredentialRecord, RoleAssumptionRequest,
};
use stsfs_policy::{BucketPath, ScopedPolicy};
use tracing::debug;

use crate::{
    ClientFactory, OperationKind, StorageClient, StorageError, bucket_arn, listing_prefix,
    object_arn, object_key,
};

/// Shortest session STS issues.
pub const MIN_DURATION_SECONDS: u64 = 900;
/// Longest session STS issues.
pub const MAX_DURATION_SECONDS: u64 = 43200;

/// In-memory STS and S3.
///
/// Clones share state.
#[derive(Clone)]
pub struct Emulator {
    trusted_role_arn: String,
    capabilities: BTreeSet<OperationKind>,
    clock: Arc<dyn Clock + Send + Sync>,
    issued: Arc<AtomicUsize>,
    state: Arc<RwLock<State>>,
}

#[derive(Default)]
struct State {
    sessions: HashMap<String, Session>,
    buckets: HashMap<String, BTreeMap<String, Vec<u8>>>,
}

struct Session {
    secret_access_key: String,
    session_token: String,
    policy: ScopedPolicy,
    expiration: DateTime<Utc>,
}

impl Emulator {
    /// An emulator that lets callers assume `trusted_role_arn` and no
    /// other role. It has no buckets.
    pub fn new(trusted_role_arn: impl Into<String>) -> Self {
        Self {
            trusted_role_arn: trusted_role_arn.into(),
            capabilities: OperationKind::ALL.into_iter().collect(),
            clock: Arc::new(SystemClock),
            issued: Arc::new(AtomicUsize::new(0)),
            state: Arc::new(RwLock::new(State::default())),
        }
    }

    /// Add an empty bucket.
    pub fn with_bucket(self, name: &str) -> Self {
        self.state.write().buckets.entry(name.to_string()).or_default();
        self
    }

    /// Let clients perform only operations of the given kinds.
    pub fn with_capabilities(mut self, kinds: impl IntoIterator<Item = OperationKind>) -> Self {
        self.capabilities = kinds.into_iter().collect();
        self
    }

    /// Judge session expiry by `clock`.
    pub fn with_clock(mut self, clock: impl Clock + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// How many sessions have been issued.
    pub fn issued_sessions(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }

    /// Keys stored in `bucket`, bypassing authorization.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let state = self.state.read();
        state
            .buckets
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn validate(&self, request: &RoleAssumptionRequest) -> Result<ScopedPolicy, AssumeRoleError> {
        if request.role_arn != self.trusted_role_arn {
            return Err(AssumeRoleError::Denied {
                code: "AccessDenied".into(),
                message: format!(
                    "not authorized to perform sts:AssumeRole on resource {}",
                    request.role_arn
                ),
            });
        }
        if !(MIN_DURATION_SECONDS..=MAX_DURATION_SECONDS).contains(&request.duration_seconds) {
            return Err(AssumeRoleError::InvalidRequest(format!(
                "ValidationError: DurationSeconds {} is outside {MIN_DURATION_SECONDS}..={MAX_DURATION_SECONDS}",
                request.duration_seconds
            )));
        }
        ScopedPolicy::from_json(&request.policy).map_err(|error| {
            AssumeRoleError::InvalidRequest(format!("MalformedPolicyDocument: {error}"))
        })
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl AssumeRole for Emulator {
    async fn assume_role(
        &self,
        request: &RoleAssumptionRequest,
    ) -> Result<AssumedCredentials, AssumeRoleError> {
        let policy = self.validate(request)?;

        let serial = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let seconds = i64::try_from(request.duration_seconds)
            .map_err(|error| AssumeRoleError::InvalidRequest(error.to_string()))?;
        let credentials = AssumedCredentials {
            access_key_id: format!("ASIAEMULATOR{serial:08}"),
            secret_access_key: format!("emulated-secret-{serial}"),
            session_token: format!("emulated-token-{serial}-{}", request.session_name),
            expiration: self.clock.now() + Duration::seconds(seconds),
        };

        self.state.write().sessions.insert(
            credentials.access_key_id.clone(),
            Session {
                secret_access_key: credentials.secret_access_key.clone(),
                session_token: credentials.session_token.clone(),
                policy,
                expiration: credentials.expiration,
            },
        );
        debug!(session = %request.session_name, serial, "issued emulated session");

        Ok(credentials)
    }
}

impl ClientFactory for Emulator {
    type Client = EmulatorClient;

    fn build_client(
        &self,
        bucket_path: &str,
        credentials: &CredentialRecord,
    ) -> Result<EmulatorClient, StorageError> {
        Ok(EmulatorClient {
            emulator: self.clone(),
            bucket: BucketPath::parse(bucket_path)?,
            access_key_id: credentials.access_key_id.clone(),
            secret_access_key: credentials.secret_access_key.clone(),
            session_token: credentials.session_token.clone(),
        })
    }
}

/// A [`StorageClient`] over the [`Emulator`]'s buckets.
#[derive(Clone)]
pub struct EmulatorClient {
    emulator: Emulator,
    bucket: BucketPath,
    access_key_id: String,
    secret_access_key: String,
    session_token: String,
}

fn denied(code: &str, message: impl Into<String>) -> StorageError {
    StorageError::Denied {
        code: code.to_string(),
        message: message.into(),
    }
}

impl EmulatorClient {
    /// Authenticate the session and evaluate its policy for one request.
    fn authorize(
        &self,
        state: &State,
        action: &str,
        resource: &str,
        context: &[(&str, &str)],
    ) -> Result<(), StorageError> {
        let session = state
            .sessions
            .get(&self.access_key_id)
            .ok_or_else(|| denied("InvalidAccessKeyId", "unknown access key"))?;
        if session.secret_access_key != self.secret_access_key {
            return Err(denied("SignatureDoesNotMatch", "signature does not match"));
        }
        if session.session_token != self.session_token {
            return Err(denied("InvalidToken", "session token does not match"));
        }
        if session.expiration <= self.emulator.clock.now() {
            return Err(denied("ExpiredToken", "the provided token has expired"));
        }
        if !session.policy.allows(action, resource, context) {
            return Err(denied("AccessDenied", "Access Denied"));
        }
        Ok(())
    }

    fn objects<'a>(&self, state: &'a State) -> Result<&'a BTreeMap<String, Vec<u8>>, StorageError> {
        state.buckets.get(self.bucket.bucket()).ok_or_else(|| no_such_bucket(&self.bucket))
    }
}

fn no_such_bucket(bucket: &BucketPath) -> StorageError {
    StorageError::Service {
        status: 404,
        code: "NoSuchBucket".into(),
        message: format!("bucket {} does not exist", bucket.bucket()),
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl StorageClient for EmulatorClient {
    fn supports(&self, kind: OperationKind) -> bool {
        self.emulator.capabilities.contains(&kind)
    }

    async fn write_file(&self, path: &str, content: Vec<u8>) -> Result<String, StorageError> {
        let key = object_key(&self.bucket, path)?;
        let mut state = self.emulator.state.write();
        self.authorize(&state, "s3:PutObject", &object_arn(&self.bucket, &key), &[])?;

        let etag = format!("\"{:x}\"", md5::compute(&content));
        state
            .buckets
            .get_mut(self.bucket.bucket())
            .ok_or_else(|| no_such_bucket(&self.bucket))?
            .insert(key, content);
        Ok(etag)
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let key = object_key(&self.bucket, path)?;
        let state = self.emulator.state.read();
        self.authorize(&state, "s3:GetObject", &object_arn(&self.bucket, &key), &[])?;

        self.objects(&state)?
            .get(&key)
            .cloned()
            .ok_or(StorageError::NotFound { key })
    }

    async fn readdirp(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let prefix = listing_prefix(&self.bucket, prefix);
        let state = self.emulator.state.read();
        self.authorize(
            &state,
            "s3:ListBucket",
            &bucket_arn(&self.bucket),
            &[("s3:prefix", prefix.as_str())],
        )?;

        Ok(self
            .objects(&state)?
            .range(prefix.clone()..)
            .map(|(key, _)| key)
            .take_while(|key| key.starts_with(&prefix))
            .map(|key| key[prefix.len()..].to_string())
            .collect())
    }

    async fn unlink(&self, path: &str) -> Result<(), StorageError> {
        let key = object_key(&self.bucket, path)?;
        let mut state = self.emulator.state.write();
        self.authorize(&state, "s3:DeleteObject", &object_arn(&self.bucket, &key), &[])?;

        state
            .buckets
            .get_mut(self.bucket.bucket())
            .ok_or_else(|| no_such_bucket(&self.bucket))?
            .remove(&key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stsfs_policy::{PolicyTemplate, build_policy};

    const ROLE: &str = "arn:aws:iam::000000000000:role/stsfs";

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn request(user_id: &str) -> RoleAssumptionRequest {
        let policy = build_policy(&PolicyTemplate::default(), "media", user_id).unwrap();
        RoleAssumptionRequest::new(ROLE, user_id, policy.to_json().unwrap(), 900)
    }

    async fn client(emulator: &Emulator, user_id: &str) -> EmulatorClient {
        let assumed = emulator.assume_role(&request(user_id)).await.unwrap();
        let credentials = CredentialRecord::issued(assumed, "us-east-1", Utc::now());
        emulator.build_client("media", &credentials).unwrap()
    }

    #[tokio::test]
    async fn it_issues_distinct_sessions() {
        let emulator = Emulator::new(ROLE).with_bucket("media");
        let first = emulator.assume_role(&request("alice")).await.unwrap();
        let second = emulator.assume_role(&request("alice")).await.unwrap();

        assert_ne!(first.access_key_id, second.access_key_id);
        assert_eq!(emulator.issued_sessions(), 2);
    }

    #[tokio::test]
    async fn it_refuses_untrusted_roles_and_bad_requests() {
        let emulator = Emulator::new(ROLE);

        let mut untrusted = request("alice");
        untrusted.role_arn = "arn:aws:iam::000000000000:role/other".into();
        assert!(matches!(
            emulator.assume_role(&untrusted).await,
            Err(AssumeRoleError::Denied { code, .. }) if code == "AccessDenied"
        ));

        let mut short = request("alice");
        short.duration_seconds = 60;
        assert!(matches!(
            emulator.assume_role(&short).await,
            Err(AssumeRoleError::InvalidRequest(_))
        ));

        let mut malformed = request("alice");
        malformed.policy = "{".into();
        assert!(matches!(
            emulator.assume_role(&malformed).await,
            Err(AssumeRoleError::InvalidRequest(message)) if message.starts_with("MalformedPolicyDocument")
        ));
        assert_eq!(emulator.issued_sessions(), 0);
    }

    #[tokio::test]
    async fn it_enforces_the_session_policy() {
        let emulator = Emulator::new(ROLE).with_bucket("media");
        let alice = client(&emulator, "alice").await;

        let etag = alice
            .write_file("alice/1/message.txt", b"hello".to_vec())
            .await
            .unwrap();
        assert_eq!(etag, format!("\"{:x}\"", md5::compute(b"hello")));
        assert_eq!(emulator.keys("media"), ["alice/1/message.txt"]);
        assert_eq!(alice.read_file("/alice/1/message.txt").await.unwrap(), b"hello");
        assert_eq!(alice.readdirp("alice").await.unwrap(), ["1/message.txt"]);

        for result in [
            alice.write_file("deny_this/a", b"x".to_vec()).await.err(),
            alice.read_file("bob/a").await.err(),
            alice.unlink("bob/a").await.err(),
            alice.readdirp("deny_this/").await.err(),
            alice.readdirp("").await.err(),
        ] {
            assert!(matches!(result, Some(StorageError::Denied { .. })), "{result:?}");
        }

        alice.unlink("alice/1/message.txt").await.unwrap();
        assert!(alice.readdirp("alice/").await.unwrap().is_empty());
        assert!(matches!(
            alice.read_file("alice/1/message.txt").await,
            Err(StorageError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn it_keeps_users_apart() {
        let emulator = Emulator::new(ROLE).with_bucket("media");
        let alice = client(&emulator, "alice").await;
        let bob = client(&emulator, "bob").await;

        alice.write_file("alice/a", b"a".to_vec()).await.unwrap();
        bob.write_file("bob/b", b"b".to_vec()).await.unwrap();

        assert!(bob.read_file("alice/a").await.is_err());
        assert_eq!(bob.readdirp("bob/").await.unwrap(), ["b"]);
        assert_eq!(emulator.keys("media"), ["alice/a", "bob/b"]);
    }

    #[tokio::test]
    async fn it_rejects_unknown_and_expired_sessions() {
        let emulator = Emulator::new(ROLE).with_bucket("media");
        let assumed = emulator.assume_role(&request("alice")).await.unwrap();
        let mut credentials = CredentialRecord::issued(assumed, "us-east-1", Utc::now());

        let later = emulator
            .clone()
            .with_clock(FixedClock(credentials.expiration + Duration::seconds(1)));
        let expired = later.build_client("media", &credentials).unwrap();
        assert!(matches!(
            expired.write_file("alice/a", vec![]).await,
            Err(StorageError::Denied { code, .. }) if code == "ExpiredToken"
        ));

        credentials.session_token = "forged".into();
        let forged = emulator.build_client("media", &credentials).unwrap();
        assert!(matches!(
            forged.write_file("alice/a", vec![]).await,
            Err(StorageError::Denied { code, .. }) if code == "InvalidToken"
        ));
    }

    #[tokio::test]
    async fn it_restricts_capabilities() {
        let emulator = Emulator::new(ROLE)
            .with_bucket("media")
            .with_capabilities([OperationKind::ReadFile]);
        let alice = client(&emulator, "alice").await;

        assert!(alice.supports(OperationKind::ReadFile));
        assert!(!alice.supports(OperationKind::WriteFile));
    }

    #[tokio::test]
    async fn it_reports_missing_buckets() {
        let emulator = Emulator::new(ROLE);
        let alice = client(&emulator, "alice").await;

        assert!(matches!(
            alice.write_file("alice/a", vec![]).await,
            Err(StorageError::Service { status: 404, .. })
        ));
    }

    #[tokio::test]
    async fn it_adds_buckets_while_the_state_is_in_use() {
        let emulator = Emulator::new(ROLE);
        let reading = emulator.state.read();

        let shared = emulator.clone();
        let adding = std::thread::spawn(move || shared.with_bucket("media"));
        std::thread::sleep(std::time::Duration::from_millis(20));
        drop(reading);
        adding.join().unwrap();

        let alice = client(&emulator, "alice").await;
        alice.write_file("alice/a", b"a".to_vec()).await.unwrap();
        assert_eq!(emulator.keys("media"), ["alice/a"]);
    }
}
