use std::path::Path;

use serde::{Deserialize, Serialize};
use stsfs_credentials::DEFAULT_DURATION_SECONDS;
use stsfs_policy::PolicyTemplate;

use crate::Error;

/// Seconds before local expiry at which credentials are regenerated.
pub const DEFAULT_REFRESH_THRESHOLD_SECONDS: u64 = 300;
/// Region attached to issued credentials.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Environment variable holding the role ARN
pub const ROLE_ARN_VAR: &str = "STSFS_ROLE_ARN";
/// Environment variable holding the refresh threshold
pub const REFRESH_THRESHOLD_VAR: &str = "STSFS_REFRESH_THRESHOLD_SECONDS";
/// Environment variable holding the session duration
pub const DURATION_VAR: &str = "STSFS_DURATION_SECONDS";
/// Environment variable holding the region
pub const REGION_VAR: &str = "STSFS_REGION";
/// Environment variable holding the policy template text
pub const POLICY_TEMPLATE_VAR: &str = "STSFS_POLICY_TEMPLATE";
/// Environment variable holding a path to the policy template
pub const POLICY_TEMPLATE_PATH_VAR: &str = "STSFS_POLICY_TEMPLATE_PATH";

/// Broker settings.
///
/// Read from JSON with camelCase keys:
///
/// ```json
/// {
///   "roleArn": "arn:aws:iam::123456789012:role/stsfs",
///   "refreshThresholdSeconds": 300,
///   "durationSeconds": 900,
///   "region": "eu-west-1",
///   "policyTemplate": { "Version": "2012-10-17", "Statement": [] }
/// }
/// ```
///
/// or from `STSFS_*` environment variables. Only `roleArn` is required.
/// A `refreshThresholdSeconds` larger than `durationSeconds` is allowed and
/// makes every call regenerate credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerConfig {
    /// Role to assume
    #[serde(default)]
    pub role_arn: String,
    /// Seconds before local expiry at which credentials are regenerated
    #[serde(default = "default_refresh_threshold")]
    pub refresh_threshold_seconds: u64,
    /// Requested session lifetime
    #[serde(default = "default_duration")]
    pub duration_seconds: u64,
    /// Region attached to issued credentials
    #[serde(default = "default_region")]
    pub region: String,
    /// Template rendered into each session's policy
    #[serde(default)]
    pub policy_template: PolicyTemplate,
}

fn default_refresh_threshold() -> u64 {
    DEFAULT_REFRESH_THRESHOLD_SECONDS
}

fn default_duration() -> u64 {
    DEFAULT_DURATION_SECONDS
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

impl BrokerConfig {
    /// Defaults for everything but the role.
    pub fn new(role_arn: impl Into<String>) -> Self {
        Self {
            role_arn: role_arn.into(),
            refresh_threshold_seconds: DEFAULT_REFRESH_THRESHOLD_SECONDS,
            duration_seconds: DEFAULT_DURATION_SECONDS,
            region: default_region(),
            policy_template: PolicyTemplate::default(),
        }
    }

    /// Parse and validate JSON settings.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let config = Self::parse_json(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON settings file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, Error> {
        let config = Self::read_path(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Settings from the file at `path`, if any, with the variables
    /// `lookup` resolves applied on top. Validated once, after both.
    pub fn load(
        path: Option<&Path>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, Error> {
        let config = match path {
            Some(path) => Self::read_path(path)?,
            None => Self::new(""),
        };
        config.overlay(lookup)
    }

    /// Parse JSON settings without validating them.
    fn parse_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json)
            .map_err(|error| Error::configuration(format!("unreadable settings: {error}")))
    }

    fn read_path(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|error| {
            Error::configuration(format!("cannot read {}: {error}", path.display()))
        })?;
        Self::parse_json(&json)
    }

    /// Settings from the process environment.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Settings from the variables `lookup` resolves, with defaults for
    /// the rest.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        Self::load(None, lookup)
    }

    /// Override these settings with whichever variables `lookup` resolves,
    /// then validate.
    pub fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        if let Some(role_arn) = lookup(ROLE_ARN_VAR) {
            self.role_arn = role_arn;
        }
        if let Some(threshold) = lookup(REFRESH_THRESHOLD_VAR) {
            self.refresh_threshold_seconds = parse_seconds(REFRESH_THRESHOLD_VAR, &threshold)?;
        }
        if let Some(duration) = lookup(DURATION_VAR) {
            self.duration_seconds = parse_seconds(DURATION_VAR, &duration)?;
        }
        if let Some(region) = lookup(REGION_VAR) {
            self.region = region;
        }
        if let Some(template) = lookup(POLICY_TEMPLATE_VAR) {
            self.policy_template = PolicyTemplate::parse(&template)?;
        } else if let Some(path) = lookup(POLICY_TEMPLATE_PATH_VAR) {
            let template = std::fs::read_to_string(&path).map_err(|error| {
                Error::configuration(format!("cannot read policy template {path}: {error}"))
            })?;
            self.policy_template = PolicyTemplate::parse(&template)?;
        }

        self.validate()?;
        Ok(self)
    }

    /// Check the settings can drive a broker.
    pub fn validate(&self) -> Result<(), Error> {
        if self.role_arn.trim().is_empty() {
            return Err(Error::configuration(format!(
                "roleArn is required (or set {ROLE_ARN_VAR})"
            )));
        }
        if !self.role_arn.starts_with("arn:") {
            return Err(Error::configuration(format!(
                "roleArn {:?} is not an ARN",
                self.role_arn
            )));
        }
        if self.duration_seconds == 0 {
            return Err(Error::configuration("durationSeconds must be positive"));
        }
        if self.region.trim().is_empty() {
            return Err(Error::configuration("region must not be empty"));
        }
        Ok(())
    }
}

fn parse_seconds(name: &str, value: &str) -> Result<u64, Error> {
    value
        .trim()
        .parse()
        .map_err(|error| Error::configuration(format!("{name}={value:?}: {error}")))
}
