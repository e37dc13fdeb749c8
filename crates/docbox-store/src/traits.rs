use async_trait::async_trait;
use bytes::Bytes;

use docbox_types::{ListPage, Metadata, ObjectHead, ObjectKey};

use crate::error::StoreResult;

/// Per-write attributes stored alongside the object content.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PutRequest {
    pub content_type: Option<String>,
    pub metadata: Metadata,
}

impl PutRequest {
    pub fn new(content_type: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            content_type: Some(content_type.into()),
            metadata,
        }
    }
}

/// Primitive object API of a single bucket.
///
/// Implementations sign and execute requests; they hold no state beyond the
/// connection settings fixed at construction. There are no retries: every
/// failure is returned to the caller as-is.
#[async_trait]
pub trait ObjectBackend: Send + Sync {
    /// Name of the bucket this backend addresses.
    fn bucket(&self) -> &str;

    /// Public location of an object, as reported back to uploaders.
    fn object_url(&self, key: &ObjectKey) -> String;

    /// Write an object, overwriting any existing one.
    async fn put(&self, key: &ObjectKey, data: Bytes, request: &PutRequest) -> StoreResult<()>;

    /// Write an object only if the key is free.
    ///
    /// Returns `Ok(true)` if the object was created, `Ok(false)` if the key
    /// was already taken (nothing written).
    async fn put_if_absent(
        &self,
        key: &ObjectKey,
        data: Bytes,
        request: &PutRequest,
    ) -> StoreResult<bool>;

    /// Read an object's content.
    async fn get(&self, key: &ObjectKey) -> StoreResult<Bytes>;

    /// Read an object's attributes. Returns `Ok(None)` if it does not exist.
    async fn head(&self, key: &ObjectKey) -> StoreResult<Option<ObjectHead>>;

    /// Check whether an object exists.
    async fn exists(&self, key: &ObjectKey) -> StoreResult<bool> {
        Ok(self.head(key).await?.is_some())
    }

    /// List at most `max_keys` objects in key order, starting strictly after
    /// `start_after` when given.
    async fn list(
        &self,
        prefix: Option<&str>,
        start_after: Option<&str>,
        max_keys: usize,
    ) -> StoreResult<ListPage>;

    /// Delete an object. Deleting a missing key is not an error.
    async fn delete(&self, key: &ObjectKey) -> StoreResult<()>;

    /// Server-side copy, including content type and metadata.
    async fn copy(&self, src: &ObjectKey, dst: &ObjectKey) -> StoreResult<()>;

    /// Server-side copy that refuses to overwrite `dst`.
    ///
    /// Returns `Ok(false)` if `dst` already exists.
    async fn copy_if_absent(&self, src: &ObjectKey, dst: &ObjectKey) -> StoreResult<bool>;
}
