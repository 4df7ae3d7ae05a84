//! Validation of the two values substituted into a policy template.

use std::fmt::Display;

use crate::PolicyError;

/// Shortest user id accepted (STS session names need at least 2 characters).
pub const MIN_USER_ID_LEN: usize = 2;
/// Longest user id accepted (STS session names allow at most 64 characters).
pub const MAX_USER_ID_LEN: usize = 64;

/// Check that `user_id` can serve as a prefix segment, an STS session name
/// and an external id.
///
/// The accepted alphabet is the session-name alphabet `[A-Za-z0-9_+=,.@-]`.
/// That rules out `/` (prefix escape), `*` and `?` (wildcard widening) and
/// anything that could be mistaken for document structure.
pub fn validate_user_id(user_id: &str) -> Result<(), PolicyError> {
    let invalid = |reason| PolicyError::InvalidUserId {
        user_id: user_id.to_string(),
        reason,
    };

    let length = user_id.chars().count();
    if length < MIN_USER_ID_LEN {
        return Err(invalid("shorter than 2 characters"));
    }
    if length > MAX_USER_ID_LEN {
        return Err(invalid("longer than 64 characters"));
    }
    if !user_id.chars().all(is_session_name_char) {
        return Err(invalid(
            "only letters, digits and _+=,.@- are allowed",
        ));
    }
    if user_id.chars().all(|c| c == '.') {
        return Err(invalid("a path segment of dots is not a prefix"));
    }

    Ok(())
}

fn is_session_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '=' | ',' | '.' | '@' | '-')
}

/// A validated bucket path: a bucket name, optionally followed by a
/// `/`-separated sub-path under which all keys live.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketPath(String);

impl BucketPath {
    /// Validate and wrap `path`.
    pub fn parse(path: &str) -> Result<Self, PolicyError> {
        let invalid = |reason| PolicyError::InvalidBucketPath {
            bucket_path: path.to_string(),
            reason,
        };

        if path.is_empty() {
            return Err(invalid("empty"));
        }
        if path.starts_with('/') {
            return Err(invalid("must not start with /"));
        }
        if path
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || c == '*' || c == '?')
        {
            return Err(invalid("whitespace, control characters and wildcards are not allowed"));
        }
        if path
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..")
        {
            return Err(invalid("empty, . and .. segments are not allowed"));
        }

        Ok(Self(path.to_string()))
    }

    /// The full bucket path as given.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The bucket name (first segment).
    pub fn bucket(&self) -> &str {
        self.0.split('/').next().unwrap_or(&self.0)
    }

    /// The sub-path under the bucket, if any.
    pub fn sub_path(&self) -> Option<&str> {
        self.0.split_once('/').map(|(_, rest)| rest)
    }

    /// Object key for `path` relative to this bucket path.
    ///
    /// A leading `/` on `path` is ignored.
    pub fn key(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        match self.sub_path() {
            Some(sub_path) => format!("{sub_path}/{path}"),
            None => path.to_string(),
        }
    }
}

impl Display for BucketPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for BucketPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
