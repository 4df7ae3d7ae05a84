//! Policy templates and rendering.

use std::collections::BTreeSet;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::{BucketPath, PolicyError, ScopedPolicy, validate_user_id};

/// Placeholder replaced by the bucket path.
pub const BUCKET_PATH: &str = "bucketPath";
/// Placeholder replaced by the user id.
pub const USER_ID: &str = "userId";

/// Template granting list/get/put/delete under `<bucketPath>/<userId>/`.
///
/// Listing is granted on the bucket itself, restricted to `s3:prefix`
/// values under the user's prefix.
pub const DEFAULT_TEMPLATE: &str = r#"{
  "Version": "2012-10-17",
  "Statement": [
    {
      "Sid": "ListUserPrefix",
      "Effect": "Allow",
      "Action": ["s3:ListBucket"],
      "Resource": ["arn:aws:s3:::{{bucketPath}}"],
      "Condition": {
        "StringLike": { "s3:prefix": ["{{userId}}/", "{{userId}}/*"] }
      }
    },
    {
      "Sid": "ObjectsUnderUserPrefix",
      "Effect": "Allow",
      "Action": ["s3:GetObject", "s3:PutObject", "s3:DeleteObject"],
      "Resource": ["arn:aws:s3:::{{bucketPath}}/{{userId}}/*"]
    }
  ]
}"#;

/// A parsed policy template.
///
/// The template is a JSON document whose strings (keys or values) may
/// contain `{{bucketPath}}` and `{{userId}}`. Both placeholders must
/// appear and no other placeholder may.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyTemplate {
    document: Value,
}

impl PolicyTemplate {
    /// Parse a template from its JSON text.
    pub fn parse(text: &str) -> Result<Self, PolicyError> {
        let document: Value = serde_json::from_str(text)
            .map_err(|error| PolicyError::Configuration(format!("not JSON: {error}")))?;
        Self::from_document(document)
    }

    /// Wrap an already parsed JSON document.
    pub fn from_document(document: Value) -> Result<Self, PolicyError> {
        let mut found = BTreeSet::new();
        collect_placeholders(&document, &mut found)?;

        if let Some(unknown) = found
            .iter()
            .find(|name| name.as_str() != BUCKET_PATH && name.as_str() != USER_ID)
        {
            return Err(PolicyError::Configuration(format!(
                "unknown placeholder {{{{{unknown}}}}}"
            )));
        }
        for required in [BUCKET_PATH, USER_ID] {
            if !found.contains(required) {
                return Err(PolicyError::Configuration(format!(
                    "missing placeholder {{{{{required}}}}}"
                )));
            }
        }

        Ok(Self { document })
    }

    /// Render the template into a JSON document with every placeholder
    /// replaced. Inputs are not validated here, see [`build_policy`].
    pub fn render(&self, bucket_path: &str, user_id: &str) -> Value {
        let bindings = Bindings {
            bucket_path,
            user_id,
        };
        bindings.substitute_value(&self.document)
    }
}

impl Default for PolicyTemplate {
    fn default() -> Self {
        Self::parse(DEFAULT_TEMPLATE).expect("built-in template is valid")
    }
}

impl std::fmt::Display for PolicyTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.document)
    }
}

impl Serialize for PolicyTemplate {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.document.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PolicyTemplate {
    /// Accepts either the template document inline, or a string holding
    /// the template's JSON text.
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::String(text) => PolicyTemplate::parse(&text),
            document => PolicyTemplate::from_document(document),
        }
        .map_err(serde::de::Error::custom)
    }
}

/// Render `template` for `user_id` under `bucket_path`.
///
/// Validates both inputs, substitutes them into the parsed template, and
/// checks that the resulting policy is confined to the user's prefix.
pub fn build_policy(
    template: &PolicyTemplate,
    bucket_path: &str,
    user_id: &str,
) -> Result<ScopedPolicy, PolicyError> {
    validate_user_id(user_id)?;
    let bucket = BucketPath::parse(bucket_path)?;

    let rendered = template.render(bucket.as_str(), user_id);
    let policy: ScopedPolicy = serde_json::from_value(rendered).map_err(|error| {
        PolicyError::Configuration(format!("rendered document is not a policy: {error}"))
    })?;
    policy.confine(&bucket, user_id)?;

    Ok(policy)
}

fn collect_placeholders(value: &Value, found: &mut BTreeSet<String>) -> Result<(), PolicyError> {
    match value {
        Value::String(text) => scan(text, found),
        Value::Array(items) => items
            .iter()
            .try_for_each(|item| collect_placeholders(item, found)),
        Value::Object(entries) => entries.iter().try_for_each(|(key, item)| {
            scan(key, found)?;
            collect_placeholders(item, found)
        }),
        _ => Ok(()),
    }
}

fn scan(text: &str, found: &mut BTreeSet<String>) -> Result<(), PolicyError> {
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let end = after.find("}}").ok_or_else(|| {
            PolicyError::Configuration(format!("unterminated placeholder in {text:?}"))
        })?;
        found.insert(after[..end].trim().to_string());
        rest = &after[end + 2..];
    }
    Ok(())
}

struct Bindings<'a> {
    bucket_path: &'a str,
    user_id: &'a str,
}

impl<'a> Bindings<'a> {
    fn get(&self, name: &str) -> &'a str {
        match name {
            BUCKET_PATH => self.bucket_path,
            _ => self.user_id,
        }
    }

    fn substitute_value(&self, value: &Value) -> Value {
        match value {
            Value::String(text) => Value::String(self.substitute(text)),
            Value::Array(items) => {
                Value::Array(items.iter().map(|item| self.substitute_value(item)).collect())
            }
            Value::Object(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(key, item)| (self.substitute(key), self.substitute_value(item)))
                    .collect::<Map<String, Value>>(),
            ),
            other => other.clone(),
        }
    }

    /// Single pass replacement: substituted text is never rescanned.
    fn substitute(&self, text: &str) -> String {
        let mut output = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(start) = rest.find("{{") {
            output.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find("}}") {
                Some(end) => {
                    output.push_str(self.get(after[..end].trim()));
                    rest = &after[end + 2..];
                }
                None => {
                    output.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        output.push_str(rest);
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn it_renders_the_default_template() {
        let policy = build_policy(&PolicyTemplate::default(), "media", "alice").unwrap();

        assert_eq!(policy.statements.len(), 2);
        let objects = &policy.statements[1];
        assert_eq!(
            objects.resources.iter().collect::<Vec<_>>(),
            ["arn:aws:s3:::media/alice/*"]
        );
        let list = &policy.statements[0];
        assert_eq!(
            list.condition["StringLike"]["s3:prefix"]
                .iter()
                .collect::<Vec<_>>(),
            ["alice/", "alice/*"]
        );
    }

    #[test]
    fn it_leaves_no_placeholder_behind() {
        let policy = build_policy(&PolicyTemplate::default(), "media", "alice").unwrap();
        let json = policy.to_json().unwrap();

        assert!(!json.contains("{{"));
        assert!(!json.contains("}}"));
    }

    #[test]
    fn it_keeps_alice_out_of_other_prefixes() {
        let policy = build_policy(&PolicyTemplate::default(), "media", "alice").unwrap();
        let json = policy.to_json().unwrap();

        assert!(!json.contains("bob/"));
        assert!(!json.contains("deny_this/"));
        for statement in &policy.statements {
            for resource in statement.resources.iter() {
                assert!(!resource.ends_with("media/*"), "{resource} is bucket-wide");
            }
        }
    }

    #[test]
    fn it_substitutes_inside_keys() {
        let template = PolicyTemplate::parse(
            r#"{"Statement":[{"Effect":"Allow","Action":"s3:ListBucket",
                "Resource":"arn:aws:s3:::{{bucketPath}}",
                "Condition":{"StringEquals":{"s3:prefix":"{{userId}}/"}}},
                {"Effect":"Allow","Action":"s3:GetObject",
                "Resource":"arn:aws:s3:::{{ bucketPath }}/{{ userId }}/*"}]}"#,
        )
        .unwrap();
        let policy = build_policy(&template, "media", "carol").unwrap();

        assert_eq!(
            policy.statements[1].resources.iter().collect::<Vec<_>>(),
            ["arn:aws:s3:::media/carol/*"]
        );
    }

    #[test]
    fn it_rejects_injection_through_the_user_id() {
        let result = build_policy(
            &PolicyTemplate::default(),
            "media",
            r#"alice/*"]},{"Effect":"Allow","Action":"*","Resource":["*"#,
        );
        assert!(matches!(result, Err(PolicyError::InvalidUserId { .. })));
    }

    #[test]
    fn it_rejects_traversal_through_the_bucket_path() {
        let result = build_policy(&PolicyTemplate::default(), "media/..", "alice");
        assert!(matches!(result, Err(PolicyError::InvalidBucketPath { .. })));
    }

    #[test]
    fn it_rejects_malformed_templates() {
        for text in [
            "not json",
            r#"{"Statement":[{"Resource":"{{bucketPath}}"}]}"#,
            r#"{"Statement":[{"Resource":"{{bucketPath}}/{{userId}}/{{tenant}}"}]}"#,
            r#"{"Statement":[{"Resource":"{{bucketPath}}/{{userId"}]}"#,
        ] {
            assert!(
                matches!(
                    PolicyTemplate::parse(text),
                    Err(PolicyError::Configuration(_))
                ),
                "{text} accepted"
            );
        }
    }

    #[test]
    fn it_rejects_templates_that_render_to_non_policies() {
        let template =
            PolicyTemplate::parse(r#"{"Statement":"{{bucketPath}}/{{userId}}"}"#).unwrap();
        let result = build_policy(&template, "media", "alice");
        assert!(matches!(result, Err(PolicyError::Configuration(_))));
    }

    #[test]
    fn it_rejects_templates_granting_the_whole_bucket() {
        let template = PolicyTemplate::parse(
            r#"{"Statement":[{"Sid":"Everything","Effect":"Allow","Action":"s3:*",
                "Resource":["arn:aws:s3:::{{bucketPath}}/*"],
                "Condition":{"StringEquals":{"aws:userid":"{{userId}}"}}}]}"#,
        )
        .unwrap();
        let error = build_policy(&template, "media", "alice").unwrap_err();
        assert!(matches!(&error, PolicyError::Configuration(message) if message.contains("Everything")));
    }

    #[test]
    fn it_needs_a_custom_template_under_a_sub_path() {
        // The default listing condition names `alice/`, not the sub-path's
        // `tenants/alice/`, so it would let alice list outside her prefix.
        let error = build_policy(&PolicyTemplate::default(), "media/tenants", "alice").unwrap_err();
        assert!(matches!(&error, PolicyError::Configuration(message) if message.contains("ListUserPrefix")));

        let template = PolicyTemplate::parse(
            r#"{"Statement":[
                {"Effect":"Allow","Action":"s3:ListBucket","Resource":"arn:aws:s3:::media",
                 "Condition":{"StringLike":{"s3:prefix":["tenants/{{userId}}/","tenants/{{userId}}/*"]}}},
                {"Effect":"Allow","Action":"s3:GetObject",
                 "Resource":"arn:aws:s3:::{{bucketPath}}/{{userId}}/*"}]}"#,
        )
        .unwrap();
        let policy = build_policy(&template, "media/tenants", "alice").unwrap();
        assert!(policy.allows("s3:GetObject", "arn:aws:s3:::media/tenants/alice/a.txt", &[]));
        assert!(!policy.allows("s3:GetObject", "arn:aws:s3:::media/alice/a.txt", &[]));
    }

    #[test]
    fn it_deserializes_inline_and_textual_templates() {
        let inline: PolicyTemplate = serde_json::from_str(DEFAULT_TEMPLATE).unwrap();
        let textual: PolicyTemplate =
            serde_json::from_value(Value::String(DEFAULT_TEMPLATE.to_string())).unwrap();
        assert_eq!(inline, textual);
        assert_eq!(inline, PolicyTemplate::default());
    }
}
