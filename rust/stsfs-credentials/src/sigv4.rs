//! AWS Signature Version 4, [query string authentication].
//!
//! Requests are authorized by presigning their URL: the signature and its
//! parameters travel in the query string, and the only headers a caller
//! must send are the ones returned in [`Authorization::headers`].
//!
//! [query string authentication]: https://docs.aws.amazon.com/AmazonS3/latest/API/sigv4-query-string-auth.html

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use thiserror::Error;
use url::Url;

use crate::Checksum;

/// Default URL expiration: 1 hour.
pub const DEFAULT_EXPIRES: u64 = 3600;

/// Payload hash placeholder used by S3 presigned URLs.
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// An access key, optionally bound to a session.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessKey {
    /// Access key id
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Session token of temporary credentials
    pub session_token: Option<String>,
}

impl AccessKey {
    /// A long-lived key.
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    /// Bind this key to a session.
    pub fn with_session_token(mut self, session_token: impl Into<String>) -> Self {
        self.session_token = Some(session_token.into());
        self
    }

    /// Presign `request`.
    ///
    /// The signing key is derived for the request's date, region and
    /// service. Query parameters already present on the request URL are
    /// signed along with the authentication parameters.
    pub fn authorize<I: Invocation>(&self, request: &I) -> Result<Authorization, AuthorizationError> {
        let timestamp = request.time().format("%Y%m%dT%H%M%SZ").to_string();
        let date = &timestamp[0..8];
        let region = request.region();
        let service = request.service();

        let key = SigningKey::derive(&self.secret_access_key, date, region, service);
        let scope = format!("{date}/{region}/{service}/aws4_request");

        let url = request.url();
        let hostname = url
            .host_str()
            .ok_or_else(|| AuthorizationError::InvalidEndpoint(url.to_string()))?;
        let host = match url.port() {
            Some(port) => format!("{hostname}:{port}"),
            None => hostname.to_string(),
        };

        let mut headers = vec![("host".to_string(), host)];
        if let Some(checksum) = request.checksum() {
            headers.push((
                format!("x-amz-checksum-{}", checksum.name()),
                checksum.to_string(),
            ));
        }
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        let signed_headers = headers
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>()
            .join(";");

        let payload_hash = request.payload_hash();
        let mut query: Vec<(String, String)> = vec![
            ("X-Amz-Algorithm".into(), ALGORITHM.into()),
            (
                "X-Amz-Credential".into(),
                format!("{}/{}", self.access_key_id, scope),
            ),
            ("X-Amz-Date".into(), timestamp.clone()),
            ("X-Amz-Expires".into(), request.expires().to_string()),
            ("X-Amz-SignedHeaders".into(), signed_headers.clone()),
        ];
        if payload_hash == UNSIGNED_PAYLOAD {
            query.push(("X-Amz-Content-Sha256".into(), UNSIGNED_PAYLOAD.into()));
        }
        if let Some(token) = &self.session_token {
            query.push(("X-Amz-Security-Token".into(), token.clone()));
        }
        for (name, value) in url.query_pairs() {
            query.push((name.into_owned(), value.into_owned()));
        }
        query.sort();

        let canonical_query = query
            .iter()
            .map(|(name, value)| format!("{}={}", percent_encode(name), percent_encode(value)))
            .collect::<Vec<_>>()
            .join("&");
        let canonical_headers = headers
            .iter()
            .map(|(name, value)| format!("{}:{}", name, value.trim()))
            .collect::<Vec<_>>()
            .join("\n");
        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n\n{}\n{}",
            request.method(),
            percent_encode_path(url.path()),
            canonical_query,
            canonical_headers,
            signed_headers,
            payload_hash,
        );

        let string_to_sign = format!(
            "{ALGORITHM}\n{timestamp}\n{scope}\n{}",
            hex_encode(&Sha256::digest(canonical_request.as_bytes()))
        );
        let signature = key.sign(string_to_sign.as_bytes());

        // The query is written with the same encoding that was signed.
        let mut url = url.clone();
        url.set_query(Some(&format!(
            "{canonical_query}&X-Amz-Signature={signature}"
        )));

        Ok(Authorization { url, headers })
    }
}

impl std::fmt::Debug for AccessKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessKey")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// What needs to be known about a request to sign it.
pub trait Invocation {
    /// HTTP method
    fn method(&self) -> &'static str;

    /// Request URL, including any query parameters to sign
    fn url(&self) -> &Url;

    /// Signing region (e.g. "us-east-1", "auto")
    fn region(&self) -> &str;

    /// Checksum of the body, sent as a signed header
    fn checksum(&self) -> Option<&Checksum> {
        None
    }

    /// Signing service name
    fn service(&self) -> &str {
        "s3"
    }

    /// Hex SHA-256 of the payload, or [`UNSIGNED_PAYLOAD`].
    ///
    /// Only S3 accepts unsigned payloads; other services need the real
    /// hash (usually that of an empty body).
    fn payload_hash(&self) -> &str {
        UNSIGNED_PAYLOAD
    }

    /// Seconds the presigned URL stays valid
    fn expires(&self) -> u64 {
        DEFAULT_EXPIRES
    }

    /// Signing time
    fn time(&self) -> DateTime<Utc> {
        stsfs_common::time::utc_now()
    }
}

/// A presigned request.
#[derive(Debug, Clone)]
pub struct Authorization {
    /// The presigned URL
    pub url: Url,
    /// Headers that must be sent with the request
    pub headers: Vec<(String, String)>,
}

/// Errors that can occur during signing.
#[derive(Error, Debug)]
pub enum AuthorizationError {
    /// The URL has no host to sign for
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

/// `HMAC(HMAC(HMAC(HMAC("AWS4" + secret, date), region), service), "aws4_request")`
struct SigningKey(Vec<u8>);

impl SigningKey {
    fn derive(secret: &str, date: &str, region: &str, service: &str) -> Self {
        let secret = format!("AWS4{secret}");
        let key = hmac(secret.as_bytes(), date.as_bytes());
        let key = hmac(&key, region.as_bytes());
        let key = hmac(&key, service.as_bytes());
        Self(hmac(&key, b"aws4_request"))
    }

    fn sign(&self, data: &[u8]) -> String {
        hex_encode(&hmac(&self.0, data))
    }
}

fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(key).expect("HMAC-SHA256 accepts keys of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// RFC 3986 encoding: everything but `A-Z a-z 0-9 - _ . ~` becomes `%XX`.
fn percent_encode(text: &str) -> String {
    let mut encoded = String::with_capacity(text.len() * 3);
    for byte in text.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}

/// Like [`percent_encode`], but `/` separators survive. The path is
/// decoded first so that keys are not encoded twice.
fn percent_encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| percent_encode(&percent_decode(segment)))
        .collect::<Vec<_>>()
        .join("/")
}

fn percent_decode(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        let escaped = (bytes[index] == b'%')
            .then(|| text.get(index + 1..index + 3))
            .flatten()
            .and_then(|hex| u8::from_str_radix(hex, 16).ok());
        match escaped {
            Some(byte) => {
                decoded.push(byte);
                index += 3;
            }
            None => {
                decoded.push(bytes[index]);
                index += 1;
            }
        }
    }
    String::from_utf8_lossy(&decoded).into_owned()
}
