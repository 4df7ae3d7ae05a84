//! The policy document model.
//!
//! Field names follow the AWS IAM JSON grammar so that a [`ScopedPolicy`]
//! serializes straight into the `Policy` parameter of a role assumption.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{BucketPath, PolicyError};

/// Policy language version used by the default template.
pub const POLICY_VERSION: &str = "2012-10-17";

fn default_version() -> String {
    POLICY_VERSION.to_string()
}

/// A policy document scoped to one user's prefix of a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopedPolicy {
    /// Policy language version
    #[serde(rename = "Version", default = "default_version")]
    pub version: String,
    /// Ordered statements
    #[serde(rename = "Statement")]
    pub statements: Vec<Statement>,
}

/// A single policy statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    /// Optional statement id
    #[serde(rename = "Sid", default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    /// Whether matching requests are allowed or denied
    #[serde(rename = "Effect")]
    pub effect: Effect,
    /// Actions the statement applies to
    #[serde(rename = "Action")]
    pub actions: OneOrMany,
    /// Resources the statement applies to
    #[serde(rename = "Resource")]
    pub resources: OneOrMany,
    /// Conditions keyed by operator, then by context key
    #[serde(
        rename = "Condition",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub condition: Condition,
}

/// `Condition` block: operator (e.g. `StringLike`) → context key → values.
pub type Condition = BTreeMap<String, BTreeMap<String, OneOrMany>>;

/// Statement effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    /// Grant matching requests
    Allow,
    /// Refuse matching requests, overriding any grant
    Deny,
}

/// IAM fields that accept either a single string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    /// A single value
    One(String),
    /// A list of values
    Many(Vec<String>),
}

impl OneOrMany {
    /// Iterate over the contained values.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let values: &[String] = match self {
            Self::One(value) => std::slice::from_ref(value),
            Self::Many(values) => values,
        };
        values.iter().map(String::as_str)
    }
}

impl From<&str> for OneOrMany {
    fn from(value: &str) -> Self {
        Self::One(value.to_string())
    }
}

impl ScopedPolicy {
    /// Serialize the policy into the compact JSON form sent to the
    /// role-assumption service.
    pub fn to_json(&self) -> Result<String, PolicyError> {
        serde_json::to_string(self).map_err(|error| PolicyError::Configuration(error.to_string()))
    }

    /// Parse a policy from its JSON form.
    pub fn from_json(json: &str) -> Result<Self, PolicyError> {
        serde_json::from_str(json).map_err(|error| PolicyError::Configuration(error.to_string()))
    }

    /// Check that every `Allow` statement is confined to `user_id`'s
    /// prefix of `bucket`.
    ///
    /// A statement is confined when every resource lies under
    /// `<bucket path>/<user id>/`, or when it carries a condition whose
    /// every value lies under the user's key prefix (a listing of that
    /// prefix only).
    pub fn confine(&self, bucket: &BucketPath, user_id: &str) -> Result<(), PolicyError> {
        let object_prefix = format!("{}/{}/", bucket.as_str(), user_id);
        let key_prefix = bucket.key(&format!("{user_id}/"));

        for (index, statement) in self.statements.iter().enumerate() {
            if statement.effect == Effect::Deny {
                continue;
            }

            let resources_confined = statement
                .resources
                .iter()
                .all(|resource| resource_path(resource).starts_with(&object_prefix));

            // Only operators that match values as given narrow the grant.
            let condition_confined = !statement.condition.is_empty()
                && statement.condition.iter().all(|(operator, entries)| {
                    matches!(operator.as_str(), "StringLike" | "StringEquals")
                        && entries
                            .values()
                            .flat_map(OneOrMany::iter)
                            .all(|value| value.starts_with(&key_prefix))
                });

            if !resources_confined && !condition_confined {
                let name = statement
                    .sid
                    .clone()
                    .unwrap_or_else(|| format!("#{index}"));
                return Err(PolicyError::Configuration(format!(
                    "statement {name} grants access outside of {object_prefix}"
                )));
            }
        }

        Ok(())
    }
}

/// The bucket/key part of an S3 ARN, or the whole string otherwise.
fn resource_path(resource: &str) -> &str {
    match resource.rfind(":::") {
        Some(position) => &resource[position + 3..],
        None => resource,
    }
}
