//! Command line front end: one storage operation per invocation, with the
//! credentials carried from one invocation to the next in a file.

pub mod cli;
pub mod store;
pub mod telemetry;

use std::time::Duration;

use anyhow::{Context, Result};
use stsfs_broker::{BrokerConfig, CredentialBroker, Operation, OperationProxy, Outcome};
use stsfs_credentials::{AccessKey, StsClient};
use stsfs_storage::s3::S3ClientFactory;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::info;

use crate::cli::{Command, StsfsCli};

/// Long-lived caller key, read from the standard AWS variables.
pub fn caller_key(lookup: impl Fn(&str) -> Option<String>) -> Result<AccessKey> {
    let access_key_id = lookup("AWS_ACCESS_KEY_ID").context("AWS_ACCESS_KEY_ID not set")?;
    let secret_access_key =
        lookup("AWS_SECRET_ACCESS_KEY").context("AWS_SECRET_ACCESS_KEY not set")?;

    let key = AccessKey::new(access_key_id, secret_access_key);
    Ok(match lookup("AWS_SESSION_TOKEN") {
        Some(token) => key.with_session_token(token),
        None => key,
    })
}

/// Broker settings from `--config`, if given, overlaid with the
/// environment.
pub fn load_config(cli: &StsfsCli) -> Result<BrokerConfig> {
    Ok(BrokerConfig::load(cli.config.as_deref(), |name| {
        std::env::var(name).ok()
    })?)
}

/// Run the command line: perform one operation and persist the credentials
/// it ran with.
pub async fn run(cli: StsfsCli) -> Result<()> {
    let config = load_config(&cli)?;

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(cli.timeout))
        .build()?;

    let mut sts = StsClient::new(caller_key(|name| std::env::var(name).ok())?)
        .with_client(http.clone());
    if let Some(endpoint) = cli.sts_endpoint.clone() {
        sts = sts.with_endpoint(endpoint).with_region(config.region.clone());
    }
    let mut factory = S3ClientFactory::new().with_client(http);
    if let Some(endpoint) = cli.s3_endpoint.clone() {
        factory = factory.with_endpoint(endpoint);
    }
    let proxy = OperationProxy::new(CredentialBroker::new(config, sts)?, factory);

    let operation = match cli.command {
        Command::Write { path, content } => {
            let content = match content {
                Some(content) => content.into_bytes(),
                None => {
                    let mut content = Vec::new();
                    tokio::io::stdin().read_to_end(&mut content).await?;
                    content
                }
            };
            Operation::WriteFile { path, content }
        }
        Command::Read { path } => Operation::ReadFile { path },
        Command::List { prefix } => Operation::ReadDirRecursive { prefix },
        Command::Rm { path } => Operation::Unlink { path },
    };

    let held = store::load(&cli.credentials_file)?;
    let proxied = proxy
        .invoke(operation, held.as_ref(), &cli.user, &cli.bucket)
        .await?;
    if held.as_ref() != Some(&proxied.credentials) {
        info!(path = %cli.credentials_file.display(), "storing renewed credentials");
        store::save(&cli.credentials_file, &proxied.credentials)?;
    }

    let mut stdout = tokio::io::stdout();
    match proxied.outcome {
        Outcome::Written { etag } => stdout.write_all(format!("{etag}\n").as_bytes()).await?,
        Outcome::Contents(content) => stdout.write_all(&content).await?,
        Outcome::Listing(keys) => {
            for key in keys {
                stdout.write_all(format!("{key}\n").as_bytes()).await?;
            }
        }
        Outcome::Removed => {}
    }
    stdout.flush().await?;

    Ok(())
}
