//! Evaluation of the policy subset produced by scoped templates.
//!
//! This is deliberately not an IAM engine: it understands `Allow`/`Deny`,
//! `*`/`?` wildcards in actions and resources, and the `StringLike` and
//! `StringEquals` condition operators. Anything else fails closed.

use crate::{Effect, ScopedPolicy, Statement};

impl ScopedPolicy {
    /// Whether `action` on `resource` is permitted, given request context
    /// values such as `("s3:prefix", "alice/")`.
    ///
    /// An explicit `Deny` wins over any `Allow`; without a matching
    /// `Allow` the request is refused.
    pub fn allows(&self, action: &str, resource: &str, context: &[(&str, &str)]) -> bool {
        let mut allowed = false;
        for statement in &self.statements {
            if !statement.applies(action, resource, context) {
                continue;
            }
            match statement.effect {
                Effect::Deny => return false,
                Effect::Allow => allowed = true,
            }
        }
        allowed
    }
}

impl Statement {
    fn applies(&self, action: &str, resource: &str, context: &[(&str, &str)]) -> bool {
        // Action names are case-insensitive in IAM.
        let action = action.to_ascii_lowercase();
        self.actions
            .iter()
            .any(|pattern| glob_match(&pattern.to_ascii_lowercase(), &action))
            && self
                .resources
                .iter()
                .any(|pattern| glob_match(pattern, resource))
            && self.conditions_hold(context)
    }

    fn conditions_hold(&self, context: &[(&str, &str)]) -> bool {
        self.condition.iter().all(|(operator, entries)| {
            entries.iter().all(|(key, expected)| {
                let Some(actual) = context
                    .iter()
                    .find(|(name, _)| *name == key.as_str())
                    .map(|(_, value)| *value)
                else {
                    return false;
                };
                match operator.as_str() {
                    "StringLike" => expected.iter().any(|pattern| glob_match(pattern, actual)),
                    "StringEquals" => expected.iter().any(|value| value == actual),
                    _ => false,
                }
            })
        })
    }
}

/// Match `text` against a pattern where `*` matches any run of characters
/// (including none) and `?` matches exactly one.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    // Position of the last `*` seen and the text position it was tried at.
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(&c) if c == '?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star, tried)) => {
                    p = star + 1;
                    t = tried + 1;
                    backtrack = Some((star, tried + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PolicyTemplate, build_policy};

    #[test]
    fn it_matches_wildcards() {
        assert!(glob_match("*", ""));
        assert!(glob_match("alice/*", "alice/"));
        assert!(glob_match("alice/*", "alice/a/b.txt"));
        assert!(glob_match("a?c", "abc"));
        assert!(glob_match("*/message.txt", "alice/1/message.txt"));
        assert!(!glob_match("alice/*", "alicex/a"));
        assert!(!glob_match("alice/*", "bob/alice/a"));
        assert!(!glob_match("a?c", "ac"));
        assert!(!glob_match("", "a"));
    }

    #[test]
    fn it_allows_objects_under_the_user_prefix_only() {
        let policy = build_policy(&PolicyTemplate::default(), "media", "alice").unwrap();

        for action in ["s3:GetObject", "s3:PutObject", "s3:DeleteObject"] {
            assert!(policy.allows(action, "arn:aws:s3:::media/alice/1/message.txt", &[]));
            assert!(!policy.allows(action, "arn:aws:s3:::media/deny_this/message.txt", &[]));
            assert!(!policy.allows(action, "arn:aws:s3:::media/bob/message.txt", &[]));
            assert!(!policy.allows(action, "arn:aws:s3:::other/alice/message.txt", &[]));
        }
    }

    #[test]
    fn it_allows_listing_the_user_prefix_only() {
        let policy = build_policy(&PolicyTemplate::default(), "media", "alice").unwrap();
        let bucket = "arn:aws:s3:::media";

        assert!(policy.allows("s3:ListBucket", bucket, &[("s3:prefix", "alice/")]));
        assert!(policy.allows("s3:ListBucket", bucket, &[("s3:prefix", "alice/2024/")]));
        assert!(!policy.allows("s3:ListBucket", bucket, &[("s3:prefix", "deny_this/")]));
        assert!(!policy.allows("s3:ListBucket", bucket, &[("s3:prefix", "")]));
        assert!(!policy.allows("s3:ListBucket", bucket, &[]));
    }

    #[test]
    fn it_lets_deny_override_allow() {
        let policy = ScopedPolicy::from_json(
            r#"{"Statement":[
                {"Effect":"Allow","Action":"s3:*","Resource":"arn:aws:s3:::media/alice/*"},
                {"Effect":"Deny","Action":"s3:DeleteObject","Resource":"arn:aws:s3:::media/alice/keep/*"}
            ]}"#,
        )
        .unwrap();

        assert!(policy.allows("s3:DeleteObject", "arn:aws:s3:::media/alice/tmp", &[]));
        assert!(!policy.allows("s3:DeleteObject", "arn:aws:s3:::media/alice/keep/a", &[]));
        assert!(policy.allows("S3:GETOBJECT", "arn:aws:s3:::media/alice/keep/a", &[]));
    }

    #[test]
    fn it_fails_closed_on_unknown_operators() {
        let policy = ScopedPolicy::from_json(
            r#"{"Statement":[{"Effect":"Allow","Action":"s3:ListBucket","Resource":"*",
                "Condition":{"IpAddress":{"aws:SourceIp":"10.0.0.0/8"}}}]}"#,
        )
        .unwrap();

        assert!(!policy.allows("s3:ListBucket", "arn:aws:s3:::media", &[("aws:SourceIp", "10.0.0.1")]));
    }
}
