#![warn(missing_docs)]

//! Storage clients built from temporary credentials.
//!
//! A [`ClientFactory`] turns a bucket path and a [`CredentialRecord`] into
//! a [`StorageClient`] without contacting the store. Clients expose a closed
//! set of [`Operation`]s over the keys below the bucket path:
//!
//! | operation | name | outcome |
//! |---|---|---|
//! | [`Operation::WriteFile`] | `writeFile` | [`Outcome::Written`] |
//! | [`Operation::ReadFile`] | `readFile` | [`Outcome::Contents`] |
//! | [`Operation::ReadDirRecursive`] | `readdirp` | [`Outcome::Listing`] |
//! | [`Operation::Unlink`] | `unlink` | [`Outcome::Removed`] |
//!
//! Two implementations ship with the crate: [`s3::S3ClientFactory`], which
//! talks to S3 (or a compatible store) over presigned requests, and
//! [`emulator::Emulator`], an in-process store that also issues sessions
//! and enforces their policies.
//!
//! [`CredentialRecord`]: stsfs_credentials::CredentialRecord

mod client;
pub use client::*;

mod error;
pub use error::*;

mod key;
pub use key::*;

mod operation;
pub use operation::*;

#[cfg(all(not(target_arch = "wasm32"), any(test, feature = "helpers")))]
pub mod helpers;

pub mod emulator;
pub mod s3;
