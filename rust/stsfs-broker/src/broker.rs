use chrono::Duration;
use stsfs_common::{Clock, ConditionalSync, SystemClock};
use stsfs_credentials::{AssumeRole, CredentialRecord, RoleAssumptionRequest};
use stsfs_policy::build_policy;
use tracing::{debug, error, instrument};

use crate::{BrokerConfig, Error};

/// Hands out scoped, short-lived credentials and decides when the ones a
/// caller holds must be replaced.
///
/// The broker keeps no state between calls: the caller holds the current
/// [`CredentialRecord`] and passes it back in.
#[derive(Debug, Clone)]
pub struct CredentialBroker<A, C = SystemClock> {
    config: BrokerConfig,
    assume: A,
    clock: C,
}

impl<A> CredentialBroker<A>
where
    A: AssumeRole,
{
    /// A broker assuming roles through `assume`, judging freshness by the
    /// system clock.
    pub fn new(config: BrokerConfig, assume: A) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            config,
            assume,
            clock: SystemClock,
        })
    }
}

impl<A, C> CredentialBroker<A, C>
where
    A: AssumeRole,
    C: Clock + ConditionalSync,
{
    /// Judge freshness, and time new records, by `clock` instead.
    pub fn with_clock<D>(self, clock: D) -> CredentialBroker<A, D>
    where
        D: Clock + ConditionalSync,
    {
        CredentialBroker {
            config: self.config,
            assume: self.assume,
            clock,
        }
    }

    /// The settings this broker runs with.
    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Whether `old` must be replaced before use.
    ///
    /// Missing records, and records without an issue time, must. Otherwise
    /// a record must be replaced once `issued_at + durationSeconds` falls
    /// before `now + refreshThresholdSeconds`. The expiration reported by
    /// the service plays no part.
    pub fn needs_refresh(&self, old: Option<&CredentialRecord>) -> bool {
        let Some(expires_at) = old.and_then(|old| old.expires_at(self.config.duration_seconds))
        else {
            return true;
        };
        let threshold = i64::try_from(self.config.refresh_threshold_seconds)
            .ok()
            .and_then(Duration::try_seconds);

        match threshold.and_then(|threshold| self.clock.now().checked_add_signed(threshold)) {
            Some(deadline) => expires_at < deadline,
            None => true,
        }
    }

    /// The request that would be sent to assume a role for `user_id` under
    /// `bucket_path`.
    pub fn role_assumption_request(
        &self,
        user_id: &str,
        bucket_path: &str,
    ) -> Result<RoleAssumptionRequest, Error> {
        let policy = build_policy(&self.config.policy_template, bucket_path, user_id)?;

        Ok(RoleAssumptionRequest::new(
            &self.config.role_arn,
            user_id,
            policy.to_json()?,
            self.config.duration_seconds,
        ))
    }

    /// Credentials for `user_id` under `bucket_path`: `old` if it is still
    /// fresh, otherwise a newly issued record.
    ///
    /// A role-assumption failure is returned as
    /// [`Error::CredentialAssumption`] without retrying.
    #[instrument(skip(self, old), fields(has_credentials = old.is_some()))]
    pub async fn ensure_credentials(
        &self,
        old: Option<&CredentialRecord>,
        user_id: &str,
        bucket_path: &str,
    ) -> Result<CredentialRecord, Error> {
        match old {
            Some(old) if !self.needs_refresh(Some(old)) => {
                debug!("credentials did not need updating");
                return Ok(old.clone());
            }
            Some(_) => debug!("token is about to expire or has expired; renewing"),
            None => debug!("no credentials held; issuing"),
        }

        let request = self.role_assumption_request(user_id, bucket_path)?;
        let issued_at = self.clock.now();
        let assumed = self.assume.assume_role(&request).await.map_err(|failure| {
            error!(error = %failure, "role assumption failed");
            Error::CredentialAssumption(failure)
        })?;

        debug!(access_key_id = %assumed.access_key_id, "successfully ensured credentials");
        Ok(CredentialRecord::issued(
            assumed,
            &self.config.region,
            issued_at,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use stsfs_common::helpers::ManualClock;
    use stsfs_credentials::AssumedCredentials;
    use stsfs_storage::emulator::Emulator;

    const ROLE: &str = "arn:aws:iam::000000000000:role/stsfs";

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 7, 5, 48, 59).unwrap()
    }

    fn record(issued_at: Option<DateTime<Utc>>) -> CredentialRecord {
        CredentialRecord {
            access_key_id: "ASIAEXAMPLE".into(),
            secret_access_key: "secret".into(),
            session_token: "token".into(),
            // Far in the future: must not influence the decision.
            expiration: start() + Duration::days(365),
            region: "us-east-1".into(),
            issued_at,
        }
    }

    fn broker(config: BrokerConfig, clock: &ManualClock) -> CredentialBroker<Emulator, ManualClock> {
        CredentialBroker::new(config, Emulator::new(ROLE))
            .unwrap()
            .with_clock(clock.clone())
    }

    #[test]
    fn it_refreshes_at_the_threshold() {
        let clock = ManualClock::at(start());
        let broker = broker(BrokerConfig::new(ROLE), &clock);
        let held = record(Some(start()));

        // expires at +900; refresh once now + 300 passes that.
        assert!(!broker.needs_refresh(Some(&held)));
        clock.advance(600);
        assert!(!broker.needs_refresh(Some(&held)));
        clock.advance(1);
        assert!(broker.needs_refresh(Some(&held)));
    }

    #[test]
    fn it_always_refreshes_missing_or_undated_records() {
        let clock = ManualClock::at(start());
        let broker = broker(BrokerConfig::new(ROLE), &clock);

        assert!(broker.needs_refresh(None));
        assert!(broker.needs_refresh(Some(&record(None))));
    }

    #[test]
    fn it_ignores_the_reported_expiration() {
        let clock = ManualClock::at(start());
        let broker = broker(BrokerConfig::new(ROLE), &clock);
        let mut held = record(Some(start()));

        held.expiration = start() - Duration::days(1);
        assert!(!broker.needs_refresh(Some(&held)));
    }

    #[test]
    fn it_always_refreshes_when_the_threshold_exceeds_the_duration() {
        let clock = ManualClock::at(start());
        let mut config = BrokerConfig::new(ROLE);
        config.refresh_threshold_seconds = 901;
        let broker = broker(config, &clock);

        assert!(broker.needs_refresh(Some(&record(Some(start())))));

        let mut config = BrokerConfig::new(ROLE);
        config.refresh_threshold_seconds = u64::MAX;
        let broker = self::broker(config, &clock);
        assert!(broker.needs_refresh(Some(&record(Some(start())))));
    }

    #[test]
    fn it_builds_a_scoped_request() {
        let clock = ManualClock::at(start());
        let broker = broker(BrokerConfig::new(ROLE), &clock);
        let request = broker.role_assumption_request("alice", "media").unwrap();

        assert_eq!(request.role_arn, ROLE);
        assert_eq!(request.session_name, "alice");
        assert_eq!(request.external_id, "alice");
        assert_eq!(request.duration_seconds, 900);
        assert!(request.policy.contains("arn:aws:s3:::media/alice/*"));

        assert!(matches!(
            broker.role_assumption_request("../bob", "media"),
            Err(Error::Configuration { source: Some(_), .. })
        ));
    }

    #[tokio::test]
    async fn it_stamps_records_with_the_request_time() {
        let clock = ManualClock::at(start());
        let mut config = BrokerConfig::new(ROLE);
        config.region = "ap-southeast-2".into();
        let broker = broker(config, &clock);

        let issued = broker.ensure_credentials(None, "alice", "media").await.unwrap();
        assert_eq!(issued.issued_at, Some(start()));
        assert_eq!(issued.region, "ap-southeast-2");
        assert_ne!(issued, record(None));
    }

    #[tokio::test]
    async fn it_surfaces_role_assumption_failures() {
        struct Refusing;

        #[async_trait::async_trait]
        impl AssumeRole for Refusing {
            async fn assume_role(
                &self,
                _: &RoleAssumptionRequest,
            ) -> Result<AssumedCredentials, stsfs_credentials::AssumeRoleError> {
                Err(stsfs_credentials::AssumeRoleError::Transport("offline".into()))
            }
        }

        let broker = CredentialBroker::new(BrokerConfig::new(ROLE), Refusing).unwrap();
        let result = broker.ensure_credentials(None, "alice", "media").await;

        assert_eq!(
            result,
            Err(Error::CredentialAssumption(
                stsfs_credentials::AssumeRoleError::Transport("offline".into())
            ))
        );
    }
}
