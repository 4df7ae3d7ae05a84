//! In-memory S3-compatible test server (native-only).
//!
//! [`LocalS3`] speaks the S3 REST API through `s3s`, authenticating every
//! request against a single key. Listings are cut into pages of a
//! configurable size so that clients have to follow continuation tokens.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::SystemTime,
};

use async_trait::async_trait;
use bytes::Bytes;
use hyper::server::conn::http1;
use hyper_util::{rt::TokioIo, service::TowerToHyperService};
use parking_lot::RwLock;
use s3s::{
    S3, S3Request, S3Response, S3Result,
    dto::{
        DeleteObjectInput, DeleteObjectOutput, ETag, GetObjectInput, GetObjectOutput,
        ListObjectsV2Input, ListObjectsV2Output, Object, PutObjectInput, PutObjectOutput,
        StreamingBlob, Timestamp,
    },
    s3_error,
    service::S3ServiceBuilder,
};
use tokio::net::TcpListener;

/// Settings for [`LocalS3`].
#[derive(Debug, Clone)]
pub struct S3Settings {
    /// Bucket created at start
    pub bucket: String,
    /// The only access key id accepted
    pub access_key_id: String,
    /// Its secret
    pub secret_access_key: String,
    /// Most keys returned in one listing page
    pub page_size: usize,
}

impl Default for S3Settings {
    fn default() -> Self {
        Self {
            bucket: "test-bucket".to_string(),
            access_key_id: "test-session-key".to_string(),
            secret_access_key: "test-session-secret".to_string(),
            page_size: 1000,
        }
    }
}

/// A running S3 test server instance.
pub struct LocalS3 {
    /// The endpoint URL where the server is listening
    pub endpoint: String,
    storage: InMemoryS3,
    shutdown_tx: tokio::sync::oneshot::Sender<()>,
}

impl LocalS3 {
    /// Start a server on an ephemeral local port.
    pub async fn start(settings: S3Settings) -> anyhow::Result<Self> {
        let storage = InMemoryS3 {
            page_size: settings.page_size.max(1),
            ..Default::default()
        };
        storage.create_bucket(&settings.bucket);

        let mut builder = S3ServiceBuilder::new(storage.clone());
        builder.set_auth(s3s::auth::SimpleAuth::from_single(
            settings.access_key_id.as_str(),
            settings.secret_access_key.as_str(),
        ));
        let service = builder.build();

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let endpoint = format!("http://{}", listener.local_addr()?);

        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    result = listener.accept() => {
                        if let Ok((stream, _)) = result {
                            let hyper_service = TowerToHyperService::new(service.clone());
                            tokio::spawn(async move {
                                let _ = http1::Builder::new()
                                    .serve_connection(TokioIo::new(stream), hyper_service)
                                    .await;
                            });
                        }
                    }
                }
            }
        });

        Ok(LocalS3 {
            endpoint,
            storage,
            shutdown_tx,
        })
    }

    /// Keys stored in `bucket`, in order.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.storage
            .buckets
            .read()
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// How many listing pages have been served.
    pub fn list_requests(&self) -> usize {
        self.storage.list_requests.load(Ordering::SeqCst)
    }

    /// Stop the server.
    pub fn stop(self) {
        let _ = self.shutdown_tx.send(());
    }
}

#[derive(Clone)]
struct StoredObject {
    data: Vec<u8>,
    e_tag: String,
    last_modified: Timestamp,
}

/// Structure: bucket name -> key -> object, keys kept in order for paging.
#[derive(Clone, Default)]
struct InMemoryS3 {
    buckets: Arc<RwLock<HashMap<String, BTreeMap<String, StoredObject>>>>,
    page_size: usize,
    list_requests: Arc<AtomicUsize>,
}

impl InMemoryS3 {
    fn create_bucket(&self, bucket: &str) {
        self.buckets.write().entry(bucket.to_string()).or_default();
    }
}

#[async_trait]
impl S3 for InMemoryS3 {
    async fn get_object(
        &self,
        req: S3Request<GetObjectInput>,
    ) -> S3Result<S3Response<GetObjectOutput>> {
        let object = self
            .buckets
            .read()
            .get(&req.input.bucket)
            .ok_or_else(|| s3_error!(NoSuchBucket))?
            .get(&req.input.key)
            .cloned()
            .ok_or_else(|| s3_error!(NoSuchKey))?;

        let output = GetObjectOutput {
            content_length: Some(object.data.len() as i64),
            body: Some(StreamingBlob::from(s3s::Body::from(Bytes::from(object.data)))),
            e_tag: Some(ETag::Strong(object.e_tag)),
            last_modified: Some(object.last_modified),
            ..Default::default()
        };
        Ok(S3Response::new(output))
    }

    async fn put_object(
        &self,
        req: S3Request<PutObjectInput>,
    ) -> S3Result<S3Response<PutObjectOutput>> {
        let bucket = req.input.bucket.clone();
        let key = req.input.key.clone();

        let mut data = Vec::new();
        if let Some(mut body) = req.input.body {
            use futures_util::StreamExt;
            while let Some(chunk) = body.next().await {
                let chunk = chunk.map_err(|_| s3_error!(IncompleteBody))?;
                data.extend_from_slice(&chunk);
            }
        }

        let e_tag = format!("{:x}", md5::compute(&data));
        let stored = StoredObject {
            data,
            e_tag: e_tag.clone(),
            last_modified: Timestamp::from(SystemTime::now()),
        };

        self.buckets
            .write()
            .get_mut(&bucket)
            .ok_or_else(|| s3_error!(NoSuchBucket))?
            .insert(key, stored);

        let output = PutObjectOutput {
            e_tag: Some(ETag::Strong(e_tag)),
            ..Default::default()
        };
        Ok(S3Response::new(output))
    }

    async fn delete_object(
        &self,
        req: S3Request<DeleteObjectInput>,
    ) -> S3Result<S3Response<DeleteObjectOutput>> {
        self.buckets
            .write()
            .get_mut(&req.input.bucket)
            .ok_or_else(|| s3_error!(NoSuchBucket))?
            .remove(&req.input.key);

        Ok(S3Response::new(DeleteObjectOutput::default()))
    }

    async fn list_objects_v2(
        &self,
        req: S3Request<ListObjectsV2Input>,
    ) -> S3Result<S3Response<ListObjectsV2Output>> {
        self.list_requests.fetch_add(1, Ordering::SeqCst);
        let prefix = req.input.prefix.clone().unwrap_or_default();
        let after = req.input.continuation_token.clone().unwrap_or_default();

        let buckets = self.buckets.read();
        let objects = buckets
            .get(&req.input.bucket)
            .ok_or_else(|| s3_error!(NoSuchBucket))?;

        // The continuation token is the last key of the previous page.
        let mut matching = objects
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter(|(key, _)| after.is_empty() || key.as_str() > after.as_str());

        let contents: Vec<Object> = matching
            .by_ref()
            .take(self.page_size)
            .map(|(key, object)| Object {
                key: Some(key.clone()),
                size: Some(object.data.len() as i64),
                e_tag: Some(ETag::Strong(object.e_tag.clone())),
                last_modified: Some(object.last_modified.clone()),
                ..Default::default()
            })
            .collect();
        let is_truncated = matching.next().is_some();
        let next_continuation_token = if is_truncated {
            contents.last().and_then(|object| object.key.clone())
        } else {
            None
        };

        let output = ListObjectsV2Output {
            name: Some(req.input.bucket.clone()),
            prefix: Some(prefix),
            key_count: Some(contents.len() as i32),
            contents: Some(contents),
            is_truncated: Some(is_truncated),
            continuation_token: req.input.continuation_token.clone(),
            next_continuation_token,
            ..Default::default()
        };
        Ok(S3Response::new(output))
    }
}
