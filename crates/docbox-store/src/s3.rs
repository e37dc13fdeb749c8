//! S3-compatible object storage backend.
//!
//! [`S3Backend`] implements the [`ObjectBackend`] trait using the
//! `object_store` crate, which owns request signing (SigV4) and HTTP
//! transport. The production endpoint, region, and path-style addressing are
//! fixed constants; only credentials and the bucket name vary.
//!
//! Conditional writes use `put_opts` with `PutMode::Create`, which maps to
//! the `If-None-Match: *` header on S3. The client is built with conditional
//! puts enabled and with retries disabled: a failed request is reported to
//! the caller at once.
//!
//! Keys are passed to `object_store` verbatim. Characters such as `#`, `[`
//! or `%` are stored under their literal name and listed back unchanged.
//! Keys `object_store` cannot carry losslessly (empty segments, a leading or
//! trailing `/`, `.` or `..` segments) are refused with
//! [`StoreError::UnsupportedKey`].

use std::borrow::Cow;

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::aws::{AmazonS3Builder, S3ConditionalPut};
use object_store::path::Path as ObjectPath;
use object_store::{
    Attribute, AttributeValue, Attributes, GetOptions, GetResult, ObjectMeta, ObjectStore,
    PutMode, PutOptions, PutPayload, RetryConfig,
};
use tracing::{debug, instrument};

use docbox_types::{ListPage, Metadata, ObjectHead, ObjectInfo, ObjectKey};

use crate::error::{StoreError, StoreResult};
use crate::traits::{ObjectBackend, PutRequest};

/// Endpoint of the S3-compatible service docbox targets.
pub const FILEBASE_ENDPOINT: &str = "https://s3.filebase.com";

/// Signing region expected by the endpoint.
pub const FILEBASE_REGION: &str = "us-east-1";

/// An [`ObjectBackend`] backed by an S3-compatible bucket.
pub struct S3Backend {
    store: Box<dyn ObjectStore>,
    bucket: String,
    base_url: String,
}

impl S3Backend {
    /// Connect to `bucket` on the fixed endpoint with static credentials.
    ///
    /// No request is sent; credentials are first exercised by the first
    /// operation.
    pub fn new(access_key_id: &str, secret_access_key: &str, bucket: &str) -> StoreResult<Self> {
        Self::connect(FILEBASE_ENDPOINT, access_key_id, secret_access_key, bucket)
    }

    fn connect(
        endpoint: &str,
        access_key_id: &str,
        secret_access_key: &str,
        bucket: &str,
    ) -> StoreResult<Self> {
        if bucket.is_empty() {
            return Err(StoreError::InvalidConfig("bucket name must not be empty".into()));
        }
        let store = AmazonS3Builder::new()
            .with_endpoint(endpoint)
            .with_allow_http(endpoint.starts_with("http://"))
            .with_region(FILEBASE_REGION)
            .with_bucket_name(bucket)
            .with_access_key_id(access_key_id)
            .with_secret_access_key(secret_access_key)
            .with_virtual_hosted_style_request(false)
            .with_conditional_put(S3ConditionalPut::ETagMatch)
            .with_retry(retry_config())
            .build()
            .map_err(|e| StoreError::InvalidConfig(format!("failed to create S3 client: {e}")))?;

        debug!(bucket, endpoint, "S3Backend initialised");

        Ok(Self::from_store(
            Box::new(store),
            bucket,
            format!("{endpoint}/{bucket}"),
        ))
    }

    /// Wrap an already-configured `object_store` client.
    ///
    /// `base_url` is the prefix used to build object locations.
    pub fn from_store(store: Box<dyn ObjectStore>, bucket: &str, base_url: String) -> Self {
        Self {
            store,
            bucket: bucket.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn path(key: &ObjectKey) -> StoreResult<ObjectPath> {
        raw_path(key.as_str())
    }

    async fn put_with_mode(
        &self,
        path: &ObjectPath,
        data: Bytes,
        attributes: Attributes,
        mode: PutMode,
    ) -> Result<(), object_store::Error> {
        let opts = PutOptions {
            mode,
            attributes,
            ..Default::default()
        };
        self.store
            .put_opts(path, PutPayload::from(data), opts)
            .await
            .map(|_| ())
    }

    /// Download-and-create fallback for stores without a native
    /// copy-if-not-exists.
    async fn copy_by_create(&self, src: &ObjectKey, dst: &ObjectKey) -> StoreResult<bool> {
        let dst_path = Self::path(dst)?;
        let result = self
            .store
            .get(&Self::path(src)?)
            .await
            .map_err(|e| map_error("get", src, e))?;
        let attributes = result.attributes.clone();
        let data = result
            .bytes()
            .await
            .map_err(|e| map_error("get", src, e))?;
        match self.put_with_mode(&dst_path, data, attributes, PutMode::Create).await {
            Ok(()) => Ok(true),
            Err(object_store::Error::AlreadyExists { .. })
            | Err(object_store::Error::Precondition { .. }) => Ok(false),
            Err(e) => Err(map_error("copy", dst, e)),
        }
    }
}

#[async_trait]
impl ObjectBackend for S3Backend {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn object_url(&self, key: &ObjectKey) -> String {
        format!("{}/{}", self.base_url, key)
    }

    #[instrument(skip(self, data, request), fields(key = %key, size = data.len()))]
    async fn put(&self, key: &ObjectKey, data: Bytes, request: &PutRequest) -> StoreResult<()> {
        let path = Self::path(key)?;
        self.put_with_mode(&path, data, to_attributes(request), PutMode::Overwrite)
            .await
            .map_err(|e| map_error("put", key, e))
    }

    #[instrument(skip(self, data, request), fields(key = %key, size = data.len()))]
    async fn put_if_absent(
        &self,
        key: &ObjectKey,
        data: Bytes,
        request: &PutRequest,
    ) -> StoreResult<bool> {
        let path = Self::path(key)?;
        match self
            .put_with_mode(&path, data, to_attributes(request), PutMode::Create)
            .await
        {
            Ok(()) => Ok(true),
            Err(object_store::Error::AlreadyExists { .. }) => Ok(false),
            // Some S3-compatible stores return Precondition instead of AlreadyExists
            Err(object_store::Error::Precondition { .. }) => Ok(false),
            Err(e) => Err(map_error("conditional put", key, e)),
        }
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn get(&self, key: &ObjectKey) -> StoreResult<Bytes> {
        let result = self
            .store
            .get(&Self::path(key)?)
            .await
            .map_err(|e| map_error("get", key, e))?;
        result.bytes().await.map_err(|e| map_error("get", key, e))
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn head(&self, key: &ObjectKey) -> StoreResult<Option<ObjectHead>> {
        let opts = GetOptions {
            head: true,
            ..Default::default()
        };
        match self.store.get_opts(&Self::path(key)?, opts).await {
            Ok(result) => Ok(Some(to_head(key, &result))),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(map_error("head", key, e)),
        }
    }

    #[instrument(skip(self))]
    async fn list(
        &self,
        prefix: Option<&str>,
        start_after: Option<&str>,
        max_keys: usize,
    ) -> StoreResult<ListPage> {
        // A prefix names a directory, so a trailing '/' is allowed here.
        let prefix_path = prefix
            .map(|p| {
                ObjectPath::parse(p).map_err(|e| StoreError::UnsupportedKey {
                    key: p.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()?;
        let offset = start_after.map(raw_path).transpose()?;
        let mut stream = match &offset {
            Some(after) => self.store.list_with_offset(prefix_path.as_ref(), after),
            None => self.store.list(prefix_path.as_ref()),
        };

        let mut objects = Vec::new();
        let mut truncated = false;
        while let Some(meta) = stream.try_next().await.map_err(|e| {
            StoreError::backend(format!("list failed for prefix {prefix:?}"), e)
        })? {
            if objects.len() == max_keys {
                truncated = true;
                break;
            }
            objects.push(to_info(&meta));
        }

        let next_start_after = if truncated {
            objects.last().map(|info: &ObjectInfo| info.key.clone())
        } else {
            None
        };
        debug!(count = objects.len(), truncated, "listed objects");
        Ok(ListPage {
            objects,
            next_start_after,
        })
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn delete(&self, key: &ObjectKey) -> StoreResult<()> {
        // S3 delete is idempotent; a NotFound from other stores means the same.
        match self.store.delete(&Self::path(key)?).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(map_error("delete", key, e)),
        }
    }

    #[instrument(skip(self), fields(src = %src, dst = %dst))]
    async fn copy(&self, src: &ObjectKey, dst: &ObjectKey) -> StoreResult<()> {
        self.store
            .copy(&Self::path(src)?, &Self::path(dst)?)
            .await
            .map_err(|e| map_error("copy", src, e))
    }

    #[instrument(skip(self), fields(src = %src, dst = %dst))]
    async fn copy_if_absent(&self, src: &ObjectKey, dst: &ObjectKey) -> StoreResult<bool> {
        match self
            .store
            .copy_if_not_exists(&Self::path(src)?, &Self::path(dst)?)
            .await
        {
            Ok(()) => Ok(true),
            Err(object_store::Error::AlreadyExists { .. })
            | Err(object_store::Error::Precondition { .. }) => Ok(false),
            Err(object_store::Error::NotSupported { .. })
            | Err(object_store::Error::NotImplemented) => {
                debug!("native copy-if-not-exists unavailable, copying by conditional put");
                self.copy_by_create(src, dst).await
            }
            Err(e) => Err(map_error("copy", src, e)),
        }
    }
}

impl std::fmt::Debug for S3Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Backend")
            .field("bucket", &self.bucket)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Requests are sent once; failures surface immediately.
fn retry_config() -> RetryConfig {
    RetryConfig {
        max_retries: 0,
        ..Default::default()
    }
}

/// The `object_store` path holding exactly `key`.
///
/// `Path::from` would percent-encode reserved characters and `Path::parse`
/// strips a leading or trailing `/`, so the parsed path is compared back
/// against the key.
fn raw_path(key: &str) -> StoreResult<ObjectPath> {
    let unsupported = |reason: String| StoreError::UnsupportedKey {
        key: key.to_string(),
        reason,
    };
    let path = ObjectPath::parse(key).map_err(|e| unsupported(e.to_string()))?;
    let raw: &str = path.as_ref();
    if raw != key {
        return Err(unsupported("leading or trailing '/'".into()));
    }
    Ok(path)
}

fn map_error(op: &str, key: &ObjectKey, err: object_store::Error) -> StoreError {
    match err {
        object_store::Error::NotFound { .. } => StoreError::NotFound(key.to_string()),
        object_store::Error::AlreadyExists { .. } => StoreError::AlreadyExists(key.to_string()),
        object_store::Error::PermissionDenied { .. }
        | object_store::Error::Unauthenticated { .. } => StoreError::PermissionDenied {
            key: key.to_string(),
            message: err.to_string(),
        },
        other => StoreError::backend(format!("S3 {op} failed for {key}"), other),
    }
}

fn to_attributes(request: &PutRequest) -> Attributes {
    let mut attributes = Attributes::new();
    if let Some(content_type) = &request.content_type {
        attributes.insert(
            Attribute::ContentType,
            AttributeValue::from(content_type.clone()),
        );
    }
    for (name, value) in &request.metadata {
        attributes.insert(
            Attribute::Metadata(Cow::Owned(name.clone())),
            AttributeValue::from(value.clone()),
        );
    }
    attributes
}

fn to_head(key: &ObjectKey, result: &GetResult) -> ObjectHead {
    let mut content_type = None;
    let mut metadata = Metadata::new();
    for (attribute, value) in result.attributes.iter() {
        let value: &str = value.as_ref();
        match attribute {
            Attribute::ContentType => content_type = Some(value.to_string()),
            Attribute::Metadata(name) => {
                metadata.insert(name.to_string(), value);
            }
            _ => {}
        }
    }
    ObjectHead {
        key: key.to_string(),
        size: result.meta.size as u64,
        content_type,
        last_modified: Some(result.meta.last_modified),
        e_tag: result.meta.e_tag.clone(),
        metadata,
    }
}

fn to_info(meta: &ObjectMeta) -> ObjectInfo {
    ObjectInfo {
        key: meta.location.to_string(),
        size: meta.size as u64,
        last_modified: Some(meta.last_modified),
        e_tag: meta.e_tag.clone(),
    }
}
