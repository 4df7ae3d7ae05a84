//! Request types for the four object operations, and their execution.

use async_trait::async_trait;
use stsfs_credentials::{Checksum, Invocation};
use url::Url;

use super::S3Client;
use crate::StorageError;

/// Upload an object.
#[derive(Debug)]
pub struct Put {
    url: Url,
    region: String,
    body: Vec<u8>,
    checksum: Checksum,
}

impl Put {
    /// Upload `body` to `url`, with a SHA-256 checksum S3 verifies.
    pub fn new(url: Url, region: &str, body: Vec<u8>) -> Self {
        Self {
            checksum: Checksum::sha256(&body),
            url,
            region: region.to_string(),
            body,
        }
    }
}

impl Invocation for Put {
    fn method(&self) -> &'static str {
        "PUT"
    }

    fn url(&self) -> &Url {
        &self.url
    }

    fn region(&self) -> &str {
        &self.region
    }

    fn checksum(&self) -> Option<&Checksum> {
        Some(&self.checksum)
    }
}

impl Request for Put {
    fn body(&self) -> Option<&[u8]> {
        Some(&self.body)
    }
}

/// Bodiless request: GET an object or listing, DELETE an object.
#[derive(Debug, Clone)]
pub struct Bare {
    method: &'static str,
    url: Url,
    region: String,
}

impl Bare {
    /// Fetch an object.
    pub fn get(url: Url, region: &str) -> Self {
        Self {
            method: "GET",
            url,
            region: region.to_string(),
        }
    }

    /// Remove an object.
    pub fn delete(url: Url, region: &str) -> Self {
        Self {
            method: "DELETE",
            url,
            region: region.to_string(),
        }
    }

    /// One ListObjectsV2 page of the keys under `prefix`.
    pub fn list(mut url: Url, region: &str, prefix: &str, continuation_token: Option<&str>) -> Self {
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("list-type", "2");
            query.append_pair("prefix", prefix);
            if let Some(token) = continuation_token {
                query.append_pair("continuation-token", token);
            }
        }
        Self::get(url, region)
    }
}

impl Invocation for Bare {
    fn method(&self) -> &'static str {
        self.method
    }

    fn url(&self) -> &Url {
        &self.url
    }

    fn region(&self) -> &str {
        &self.region
    }
}

impl Request for Bare {}

/// A signable request that can be sent.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait Request: Invocation + Sync + Sized {
    /// The request body, if any.
    fn body(&self) -> Option<&[u8]> {
        None
    }

    /// Sign this request with `client`'s key and send it.
    async fn perform(&self, client: &S3Client) -> Result<reqwest::Response, StorageError> {
        let authorization = client
            .key
            .authorize(self)
            .map_err(|error| StorageError::Authorization(error.to_string()))?;

        let method = reqwest::Method::from_bytes(self.method().as_bytes())
            .map_err(|error| StorageError::Authorization(error.to_string()))?;
        let mut builder = client.http.request(method, authorization.url);
        for (name, value) in authorization.headers {
            if name != "host" {
                builder = builder.header(name, value);
            }
        }
        if let Some(body) = self.body() {
            builder = builder.body(body.to_vec());
        }

        Ok(builder.send().await?)
    }
}
