#![warn(missing_docs)]

//! Scoped access policies for per-user storage prefixes.
//!
//! A [`PolicyTemplate`] is an IAM policy document containing two
//! placeholders, `{{bucketPath}}` and `{{userId}}`. Rendering it with
//! [`build_policy`] produces a [`ScopedPolicy`] that grants access only
//! under the user's prefix of the bucket:
//!
//! ```
//! use stsfs_policy::{PolicyTemplate, build_policy};
//!
//! # fn example() -> Result<(), stsfs_policy::PolicyError> {
//! let template = PolicyTemplate::default();
//! let policy = build_policy(&template, "my-bucket", "alice")?;
//!
//! assert!(policy.allows("s3:PutObject", "arn:aws:s3:::my-bucket/alice/notes.txt", &[]));
//! assert!(!policy.allows("s3:PutObject", "arn:aws:s3:::my-bucket/bob/notes.txt", &[]));
//! # Ok(())
//! # }
//! ```
//!
//! Substitution happens on the parsed document, never on the raw text, so
//! the inputs cannot change the document's structure. The user id and
//! bucket path are additionally validated so that they cannot widen or
//! escape the prefix (no `/`, `..` or wildcards in a user id).

mod document;
pub use document::*;

mod error;
pub use error::*;

mod evaluate;
pub use evaluate::glob_match;

mod template;
pub use template::*;

mod validate;
pub use validate::*;
