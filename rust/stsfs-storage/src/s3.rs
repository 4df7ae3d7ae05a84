//! S3 (or S3-compatible) storage, reached with presigned requests.
//!
//! ```no_run
//! use stsfs_storage::{ClientFactory, StorageClient, s3::S3ClientFactory};
//! # async fn example(
//! #     credentials: stsfs_credentials::CredentialRecord,
//! # ) -> Result<(), stsfs_storage::StorageError> {
//! let factory = S3ClientFactory::new();
//! let client = factory.build_client("my-bucket", &credentials)?;
//! client.write_file("alice/notes.txt", b"hello".to_vec()).await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use stsfs_credentials::{AccessKey, CredentialRecord};
use stsfs_policy::BucketPath;
use tracing::{debug, instrument};
use url::Url;

use crate::{ClientFactory, StorageClient, StorageError, listing_prefix, object_key};

mod list;
pub use list::*;

mod request;
pub use request::*;

/// Builds [`S3Client`]s.
///
/// By default buckets are addressed virtual-host style on AWS, in the
/// region of the credential record. With a custom endpoint, buckets are
/// addressed path style (`<endpoint>/<bucket>/<key>`), which is what most
/// S3-compatible stores expect.
#[derive(Debug, Clone, Default)]
pub struct S3ClientFactory {
    endpoint: Option<Url>,
    http: reqwest::Client,
}

impl S3ClientFactory {
    /// A factory for AWS S3.
    pub fn new() -> Self {
        Self::default()
    }

    /// Address buckets path style under `endpoint`.
    pub fn with_endpoint(mut self, endpoint: Url) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Send requests through `http` (to configure timeouts or proxies).
    pub fn with_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }
}

impl ClientFactory for S3ClientFactory {
    type Client = S3Client;

    fn build_client(
        &self,
        bucket_path: &str,
        credentials: &CredentialRecord,
    ) -> Result<S3Client, StorageError> {
        let bucket = BucketPath::parse(bucket_path)?;
        let (endpoint, path_style) = match &self.endpoint {
            Some(endpoint) => (endpoint.clone(), true),
            None => {
                let host = format!(
                    "https://{}.s3.{}.amazonaws.com/",
                    bucket.bucket(),
                    credentials.region
                );
                let endpoint =
                    Url::parse(&host).map_err(|error| StorageError::InvalidPath(error.to_string()))?;
                (endpoint, false)
            }
        };
        debug!(%bucket, %endpoint, path_style, "built S3 client");

        Ok(S3Client {
            bucket,
            endpoint,
            path_style,
            region: credentials.region.clone(),
            key: credentials.access_key(),
            http: self.http.clone(),
        })
    }
}

/// A [`StorageClient`] for one bucket path of an S3 store.
#[derive(Debug, Clone)]
pub struct S3Client {
    bucket: BucketPath,
    endpoint: Url,
    path_style: bool,
    region: String,
    key: AccessKey,
    http: reqwest::Client,
}

impl S3Client {
    /// URL of `key`, or of the bucket itself.
    fn url(&self, key: Option<&str>) -> Result<Url, StorageError> {
        let mut url = self.endpoint.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                StorageError::InvalidPath(format!("{} cannot be a base URL", self.endpoint))
            })?;
            segments.pop_if_empty();
            if self.path_style {
                segments.push(self.bucket.bucket());
            }
            if let Some(key) = key {
                segments.extend(key.split('/'));
            }
        }
        Ok(url)
    }

    async fn failure(response: reqwest::Response, key: &str) -> StorageError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        list::parse_error(status, &body, key)
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl StorageClient for S3Client {
    #[instrument(skip(self, content), fields(bucket = %self.bucket))]
    async fn write_file(&self, path: &str, content: Vec<u8>) -> Result<String, StorageError> {
        let key = object_key(&self.bucket, path)?;
        let response = Put::new(self.url(Some(&key))?, &self.region, content)
            .perform(self)
            .await?;

        if !response.status().is_success() {
            return Err(Self::failure(response, &key).await);
        }
        Ok(response
            .headers()
            .get("etag")
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string())
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn read_file(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let key = object_key(&self.bucket, path)?;
        let response = Bare::get(self.url(Some(&key))?, &self.region)
            .perform(self)
            .await?;

        if !response.status().is_success() {
            return Err(Self::failure(response, &key).await);
        }
        Ok(response.bytes().await?.to_vec())
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn readdirp(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let prefix = listing_prefix(&self.bucket, prefix);
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let response = Bare::list(
                self.url(None)?,
                &self.region,
                &prefix,
                continuation_token.as_deref(),
            )
            .perform(self)
            .await?;

            if !response.status().is_success() {
                return Err(Self::failure(response, &prefix).await);
            }
            let page = parse_list_page(&response.text().await?)?;
            keys.extend(
                page.keys
                    .iter()
                    .filter_map(|key| key.strip_prefix(&prefix))
                    .map(str::to_string),
            );

            match page.next_continuation_token {
                Some(token) => continuation_token = Some(token),
                None => break,
            }
        }

        debug!(count = keys.len(), "listed keys");
        Ok(keys)
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn unlink(&self, path: &str) -> Result<(), StorageError> {
        let key = object_key(&self.bucket, path)?;
        let response = Bare::delete(self.url(Some(&key))?, &self.region)
            .perform(self)
            .await?;

        if !response.status().is_success() {
            return Err(Self::failure(response, &key).await);
        }
        Ok(())
    }
}
