use async_trait::async_trait;
use stsfs_common::{ConditionalSend, ConditionalSync};
use stsfs_credentials::CredentialRecord;

use crate::{Operation, OperationKind, Outcome, StorageError};

/// A handle on the objects below one bucket path, acting with one set of
/// credentials.
///
/// Paths given to the operations are relative to the bucket path.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait StorageClient: ConditionalSend + ConditionalSync {
    /// Whether this handle can perform operations of `kind`.
    fn supports(&self, kind: OperationKind) -> bool {
        let _ = kind;
        true
    }

    /// Store `content` at `path`, returning the entity tag.
    async fn write_file(&self, path: &str, content: Vec<u8>) -> Result<String, StorageError>;

    /// Fetch the body stored at `path`.
    async fn read_file(&self, path: &str) -> Result<Vec<u8>, StorageError>;

    /// Every key below the directory `prefix`, relative to it, in key order.
    async fn readdirp(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Remove the object at `path`. Removing a missing object succeeds.
    async fn unlink(&self, path: &str) -> Result<(), StorageError>;

    /// Perform `operation`.
    async fn perform(&self, operation: Operation) -> Result<Outcome, StorageError> {
        Ok(match operation {
            Operation::WriteFile { path, content } => Outcome::Written {
                etag: self.write_file(&path, content).await?,
            },
            Operation::ReadFile { path } => Outcome::Contents(self.read_file(&path).await?),
            Operation::ReadDirRecursive { prefix } => {
                Outcome::Listing(self.readdirp(&prefix).await?)
            }
            Operation::Unlink { path } => {
                self.unlink(&path).await?;
                Outcome::Removed
            }
        })
    }
}

/// Builds [`StorageClient`]s from credential records.
///
/// Building a client never contacts the store.
pub trait ClientFactory: ConditionalSend + ConditionalSync {
    /// The client type built
    type Client: StorageClient;

    /// A client for the objects below `bucket_path`, acting with
    /// `credentials`.
    fn build_client(
        &self,
        bucket_path: &str,
        credentials: &CredentialRecord,
    ) -> Result<Self::Client, StorageError>;
}
