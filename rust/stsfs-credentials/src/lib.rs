#![warn(missing_docs)]

//! Temporary, scoped credentials.
//!
//! This crate holds the data that flows across the role-assumption
//! boundary ([`RoleAssumptionRequest`] in, [`AssumedCredentials`] out), the
//! [`CredentialRecord`] handed back to callers, and the plumbing needed to
//! talk to AWS: an [`AssumeRole`] implementation over the STS query API and
//! a SigV4 query-string signer shared with the S3 client.

mod assume;
pub use assume::*;

#[cfg(all(not(target_arch = "wasm32"), any(test, feature = "helpers")))]
pub mod helpers;

mod checksum;
pub use checksum::*;

mod record;
pub use record::*;

mod request;
pub use request::*;

pub mod sigv4;
pub use sigv4::{AccessKey, Authorization, AuthorizationError, Invocation};

pub mod sts;
pub use sts::StsClient;
