//! A local STS for tests (native-only).
//!
//! [`LocalSts`] answers the `AssumeRole` query API over HTTP. It trusts a
//! single role and a single caller key, issues one fixed session key, and
//! records the query of every request it receives so tests can check what
//! was sent.

use std::{collections::BTreeMap, convert::Infallible, sync::Arc};

use bytes::Bytes;
use chrono::{Duration, SecondsFormat, Utc};
use http_body_util::Full;
use hyper::{
    Request, Response, StatusCode,
    body::Incoming,
    header::{CONTENT_TYPE, HeaderValue},
    server::conn::http1,
    service::service_fn,
};
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use tokio::net::TcpListener;

use crate::sts::API_VERSION;

/// Settings for [`LocalSts`].
#[derive(Debug, Clone)]
pub struct StsSettings {
    /// The only role that may be assumed
    pub trusted_role_arn: String,
    /// The only caller key accepted
    pub caller_access_key_id: String,
    /// Access key id of every issued session
    pub issued_access_key_id: String,
    /// Secret of every issued session
    pub issued_secret_access_key: String,
}

impl Default for StsSettings {
    fn default() -> Self {
        Self {
            trusted_role_arn: "arn:aws:iam::000000000000:role/stsfs".to_string(),
            caller_access_key_id: "test-caller-key".to_string(),
            issued_access_key_id: "test-session-key".to_string(),
            issued_secret_access_key: "test-session-secret".to_string(),
        }
    }
}

/// A running STS test server.
pub struct LocalSts {
    /// The endpoint URL where the server is listening
    pub endpoint: String,
    requests: Arc<Mutex<Vec<BTreeMap<String, String>>>>,
    shutdown_tx: tokio::sync::oneshot::Sender<()>,
}

impl LocalSts {
    /// Start a server on an ephemeral local port.
    pub async fn start(settings: StsSettings) -> anyhow::Result<Self> {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let issuer = Arc::new(Issuer {
            settings,
            requests: requests.clone(),
        });

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let endpoint = format!("http://{}/", listener.local_addr()?);

        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    result = listener.accept() => {
                        if let Ok((stream, _)) = result {
                            let issuer = issuer.clone();
                            let service = service_fn(move |request: Request<Incoming>| {
                                let response = issuer.answer(&request);
                                async move { Ok::<_, Infallible>(response) }
                            });
                            tokio::spawn(async move {
                                let _ = http1::Builder::new()
                                    .serve_connection(TokioIo::new(stream), service)
                                    .await;
                            });
                        }
                    }
                }
            }
        });

        Ok(LocalSts {
            endpoint,
            requests,
            shutdown_tx,
        })
    }

    /// Query parameters of every request received so far, in order.
    pub fn requests(&self) -> Vec<BTreeMap<String, String>> {
        self.requests.lock().clone()
    }

    /// Stop the server.
    pub fn stop(self) {
        let _ = self.shutdown_tx.send(());
    }
}

struct Issuer {
    settings: StsSettings,
    requests: Arc<Mutex<Vec<BTreeMap<String, String>>>>,
}

impl Issuer {
    fn answer(&self, request: &Request<Incoming>) -> Response<Full<Bytes>> {
        let query: BTreeMap<String, String> =
            url::form_urlencoded::parse(request.uri().query().unwrap_or_default().as_bytes())
                .into_owned()
                .collect();
        self.requests.lock().push(query.clone());

        let parameter = |name: &str| query.get(name).map(String::as_str).unwrap_or_default();

        if parameter("Action") != "AssumeRole" || parameter("Version") != API_VERSION {
            return failure(StatusCode::BAD_REQUEST, "InvalidAction", "unsupported action");
        }
        let caller = format!("{}/", self.settings.caller_access_key_id);
        if !parameter("X-Amz-Credential").starts_with(&caller) {
            return failure(
                StatusCode::FORBIDDEN,
                "InvalidClientTokenId",
                "The security token included in the request is invalid.",
            );
        }
        if parameter("RoleArn") != self.settings.trusted_role_arn {
            return failure(
                StatusCode::FORBIDDEN,
                "AccessDenied",
                "Not authorized to perform sts:AssumeRole",
            );
        }
        let Some(seconds) = parameter("DurationSeconds")
            .parse::<i64>()
            .ok()
            .filter(|seconds| (900..=43200).contains(seconds))
        else {
            return failure(
                StatusCode::BAD_REQUEST,
                "ValidationError",
                "DurationSeconds must be between 900 and 43200",
            );
        };
        if serde_json::from_str::<serde_json::Value>(parameter("Policy")).is_err() {
            return failure(
                StatusCode::BAD_REQUEST,
                "MalformedPolicyDocument",
                "The policy is not valid JSON",
            );
        }

        let session = parameter("RoleSessionName");
        let expiration =
            (Utc::now() + Duration::seconds(seconds)).to_rfc3339_opts(SecondsFormat::Secs, true);
        respond(
            StatusCode::OK,
            format!(
                r#"<AssumeRoleResponse xmlns="https://sts.amazonaws.com/doc/{API_VERSION}/">
  <AssumeRoleResult>
    <Credentials>
      <AccessKeyId>{}</AccessKeyId>
      <SecretAccessKey>{}</SecretAccessKey>
      <SessionToken>local-session-{session}</SessionToken>
      <Expiration>{expiration}</Expiration>
    </Credentials>
  </AssumeRoleResult>
</AssumeRoleResponse>"#,
                self.settings.issued_access_key_id, self.settings.issued_secret_access_key,
            ),
        )
    }
}

fn failure(status: StatusCode, code: &str, message: &str) -> Response<Full<Bytes>> {
    respond(
        status,
        format!(
            r#"<ErrorResponse xmlns="https://sts.amazonaws.com/doc/{API_VERSION}/">
  <Error><Type>Sender</Type><Code>{code}</Code><Message>{message}</Message></Error>
  <RequestId>local</RequestId>
</ErrorResponse>"#
        ),
    )
}

fn respond(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/xml"));
    response
}
