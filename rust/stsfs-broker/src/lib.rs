#![warn(missing_docs)]

//! Per-user, short-lived storage credentials, refreshed behind the
//! caller's back.
//!
//! The [`CredentialBroker`] decides whether the credentials a caller holds
//! are still usable and, when they are not, exchanges a policy scoped to
//! the user's prefix for new ones. The [`OperationProxy`] puts the broker in
//! front of a storage client: each call ensures credentials, builds a client
//! from them, performs one [`Operation`], and hands the outcome back together
//! with the credentials the caller should hold on to for the next call.
//!
//! ```
//! use stsfs_broker::{BrokerConfig, CredentialBroker, Operation, OperationProxy, Outcome};
//! use stsfs_storage::emulator::Emulator;
//!
//! # async fn example() -> Result<(), stsfs_broker::Error> {
//! let role = "arn:aws:iam::000000000000:role/stsfs";
//! let emulator = Emulator::new(role).with_bucket("media");
//! let broker = CredentialBroker::new(BrokerConfig::new(role), emulator.clone())?;
//! let proxy = OperationProxy::new(broker, emulator);
//!
//! let written = proxy
//!     .invoke(
//!         Operation::WriteFile { path: "alice/notes.txt".into(), content: b"hi".to_vec() },
//!         None,
//!         "alice",
//!         "media",
//!     )
//!     .await?;
//! let listed = proxy
//!     .invoke(
//!         Operation::ReadDirRecursive { prefix: "alice/".into() },
//!         Some(&written.credentials),
//!         "alice",
//!         "media",
//!     )
//!     .await?;
//! assert_eq!(listed.outcome, Outcome::Listing(vec!["notes.txt".into()]));
//! # Ok(())
//! # }
//! ```

mod broker;
pub use broker::*;

mod config;
pub use config::*;

mod error;
pub use error::*;

mod proxy;
pub use proxy::*;

pub use stsfs_credentials::CredentialRecord;
pub use stsfs_storage::{Operation, OperationKind, Outcome};
