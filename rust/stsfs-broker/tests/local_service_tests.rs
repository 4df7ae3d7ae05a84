//! The broker and the proxy over HTTP, against local STS and S3 servers.

#![cfg(not(target_arch = "wasm32"))]

use anyhow::Result;
use pretty_assertions::assert_eq;
use stsfs_broker::{BrokerConfig, CredentialBroker, Error, Operation, OperationProxy, Outcome};
use stsfs_credentials::{
    AccessKey, AssumeRoleError, StsClient,
    helpers::{LocalSts, StsSettings},
};
use stsfs_storage::{
    helpers::{LocalS3, S3Settings},
    s3::S3ClientFactory,
};
use url::Url;

struct Services {
    sts: LocalSts,
    s3: LocalS3,
    bucket: String,
    proxy: OperationProxy<StsClient, S3ClientFactory>,
}

async fn start(role_arn: &str) -> Result<Services> {
    let sts_settings = StsSettings::default();
    let s3_settings = S3Settings {
        access_key_id: sts_settings.issued_access_key_id.clone(),
        secret_access_key: sts_settings.issued_secret_access_key.clone(),
        page_size: 2,
        ..Default::default()
    };
    let sts = LocalSts::start(sts_settings.clone()).await?;
    let s3 = LocalS3::start(s3_settings.clone()).await?;

    let http = reqwest::Client::builder().no_proxy().build()?;
    let assume = StsClient::new(AccessKey::new(&sts_settings.caller_access_key_id, "caller-secret"))
        .with_endpoint(Url::parse(&sts.endpoint)?)
        .with_client(http.clone());
    let factory = S3ClientFactory::new()
        .with_endpoint(Url::parse(&s3.endpoint)?)
        .with_client(http);
    let broker = CredentialBroker::new(BrokerConfig::new(role_arn), assume)?;

    Ok(Services {
        sts,
        s3,
        bucket: s3_settings.bucket,
        proxy: OperationProxy::new(broker, factory),
    })
}

#[test_log::test(tokio::test)]
async fn it_runs_operations_with_assumed_credentials() -> Result<()> {
    let services = start(&StsSettings::default().trusted_role_arn).await?;
    let proxy = &services.proxy;
    let bucket = services.bucket.as_str();

    let written = proxy
        .invoke(
            Operation::WriteFile {
                path: "alice/1/message.txt".into(),
                content: b"hello".to_vec(),
            },
            None,
            "alice",
            bucket,
        )
        .await?;
    assert!(matches!(written.outcome, Outcome::Written { ref etag } if etag.starts_with('"')));
    assert_eq!(written.credentials.session_token, "local-session-alice");
    assert_eq!(services.s3.keys(bucket), ["alice/1/message.txt"]);

    let held = Some(&written.credentials);
    for path in ["alice/2/a", "alice/2/b"] {
        let proxied = proxy
            .invoke(
                Operation::WriteFile {
                    path: path.into(),
                    content: path.as_bytes().to_vec(),
                },
                held,
                "alice",
                bucket,
            )
            .await?;
        assert_eq!(proxied.credentials, written.credentials);
    }

    let listed = proxy
        .invoke(
            Operation::ReadDirRecursive {
                prefix: "alice/".into(),
            },
            held,
            "alice",
            bucket,
        )
        .await?;
    assert_eq!(
        listed.outcome,
        Outcome::Listing(vec!["1/message.txt".into(), "2/a".into(), "2/b".into()])
    );
    assert_eq!(services.s3.list_requests(), 2);

    let read = proxy
        .invoke(
            Operation::ReadFile {
                path: "alice/1/message.txt".into(),
            },
            held,
            "alice",
            bucket,
        )
        .await?;
    assert_eq!(read.outcome, Outcome::Contents(b"hello".to_vec()));

    let requests = services.sts.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["RoleSessionName"], "alice");
    assert!(requests[0]["Policy"].contains("arn:aws:s3:::test-bucket/alice/*"));

    services.sts.stop();
    services.s3.stop();
    Ok(())
}

#[test_log::test(tokio::test)]
async fn it_surfaces_refused_role_assumptions() -> Result<()> {
    let services = start("arn:aws:iam::000000000000:role/untrusted").await?;

    let result = services
        .proxy
        .invoke(
            Operation::ReadFile {
                path: "alice/a".into(),
            },
            None,
            "alice",
            &services.bucket,
        )
        .await;

    assert!(
        matches!(
            result,
            Err(Error::CredentialAssumption(AssumeRoleError::Denied { ref code, .. })) if code == "AccessDenied"
        ),
        "{result:?}"
    );
    assert!(result.is_err_and(|error| error.is_access_denied()));
    assert!(services.s3.keys(&services.bucket).is_empty());

    services.sts.stop();
    services.s3.stop();
    Ok(())
}
