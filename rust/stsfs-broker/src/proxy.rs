use serde_json::Value;
use stsfs_common::{Clock, ConditionalSync, SystemClock};
use stsfs_credentials::{AssumeRole, CredentialRecord};
use stsfs_storage::{
    ClientFactory, Operation, OperationKind, Outcome, StorageClient, UnknownOperation,
};
use tracing::{debug, instrument};

use crate::{CredentialBroker, Error};

/// The result of a proxied operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proxied {
    /// What the storage client returned, unchanged
    pub outcome: Outcome,
    /// The credentials the operation ran with. Callers hold on to these
    /// and pass them back on the next call.
    pub credentials: CredentialRecord,
}

/// Runs storage operations with broker-managed credentials.
#[derive(Debug, Clone)]
pub struct OperationProxy<A, F, C = SystemClock> {
    broker: CredentialBroker<A, C>,
    factory: F,
}

impl<A, F, C> OperationProxy<A, F, C>
where
    A: AssumeRole,
    F: ClientFactory,
    C: Clock + ConditionalSync,
{
    /// Proxy through clients built by `factory`, with credentials from
    /// `broker`.
    pub fn new(broker: CredentialBroker<A, C>, factory: F) -> Self {
        Self { broker, factory }
    }

    /// The broker supplying credentials.
    pub fn broker(&self) -> &CredentialBroker<A, C> {
        &self.broker
    }

    /// Perform `operation` for `user_id` under `bucket_path`.
    ///
    /// Credentials are refreshed first if `old` is missing or stale. The
    /// outcome is returned with the credentials used; storage failures,
    /// denials included, come back as [`Error::BackendOperation`].
    #[instrument(skip(self, operation, old), fields(operation = %operation.kind()))]
    pub async fn invoke(
        &self,
        operation: Operation,
        old: Option<&CredentialRecord>,
        user_id: &str,
        bucket_path: &str,
    ) -> Result<Proxied, Error> {
        let kind = operation.kind();
        let credentials = self
            .broker
            .ensure_credentials(old, user_id, bucket_path)
            .await?;

        let client = self
            .factory
            .build_client(bucket_path, &credentials)
            .map_err(|source| backend_failure(&operation, source))?;
        if !client.supports(kind) {
            return Err(Error::UnsupportedOperation {
                operation: kind.name().to_string(),
            });
        }

        debug!(path = operation.target(), "dispatching operation");
        let context = operation.target().to_string();
        let outcome = client
            .perform(operation)
            .await
            .map_err(|source| Error::BackendOperation {
                operation: kind.name().to_string(),
                context,
                source,
            })?;

        Ok(Proxied {
            outcome,
            credentials,
        })
    }

    /// Perform the operation called `name` with positional JSON `args`.
    ///
    /// The name is checked against the closed operation set before any
    /// remote call; an unknown name fails with
    /// [`Error::UnsupportedOperation`]. Arguments that do not fit the
    /// operation fail as [`Error::BackendOperation`].
    pub async fn invoke_named(
        &self,
        name: &str,
        args: Vec<Value>,
        old: Option<&CredentialRecord>,
        user_id: &str,
        bucket_path: &str,
    ) -> Result<Proxied, Error> {
        let kind: OperationKind = name
            .parse()
            .map_err(|UnknownOperation(operation)| Error::UnsupportedOperation { operation })?;
        let operation =
            Operation::from_args(kind, args).map_err(|source| Error::BackendOperation {
                operation: kind.name().to_string(),
                context: String::new(),
                source,
            })?;

        self.invoke(operation, old, user_id, bucket_path).await
    }
}

fn backend_failure(operation: &Operation, source: stsfs_storage::StorageError) -> Error {
    Error::BackendOperation {
        operation: operation.kind().name().to_string(),
        context: operation.target().to_string(),
        source,
    }
}
