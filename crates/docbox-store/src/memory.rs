use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::debug;

use docbox_types::{ListPage, Metadata, ObjectHead, ObjectInfo, ObjectKey};

use crate::error::{StoreError, StoreResult};
use crate::traits::{ObjectBackend, PutRequest};

/// Backend operations, used to target injected faults and count calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Put,
    Get,
    Head,
    List,
    Delete,
    Copy,
}

#[derive(Clone, Debug)]
struct StoredObject {
    data: Bytes,
    content_type: Option<String>,
    metadata: Metadata,
    last_modified: DateTime<Utc>,
    e_tag: String,
}

impl StoredObject {
    fn new(data: Bytes, request: &PutRequest) -> Self {
        let e_tag = format!("\"{}\"", blake3::hash(&data).to_hex());
        Self {
            data,
            content_type: request.content_type.clone(),
            metadata: request.metadata.clone(),
            last_modified: Utc::now(),
            e_tag,
        }
    }

    fn head(&self, key: &str) -> ObjectHead {
        ObjectHead {
            key: key.to_string(),
            size: self.data.len() as u64,
            content_type: self.content_type.clone(),
            last_modified: Some(self.last_modified),
            e_tag: Some(self.e_tag.clone()),
            metadata: self.metadata.clone(),
        }
    }

    fn info(&self, key: &str) -> ObjectInfo {
        ObjectInfo {
            key: key.to_string(),
            size: self.data.len() as u64,
            last_modified: Some(self.last_modified),
            e_tag: Some(self.e_tag.clone()),
        }
    }
}

/// In-memory, `BTreeMap`-based backend for a single bucket.
///
/// Intended for tests and embedding. Objects live behind a `RwLock`; content
/// is shared through `Bytes` so reads do not copy. Faults can be injected per
/// [`Operation`] to drive failure paths such as a rename whose delete phase
/// fails after the copy landed.
pub struct InMemoryBackend {
    bucket: String,
    objects: RwLock<BTreeMap<String, StoredObject>>,
    faults: RwLock<HashMap<Operation, usize>>,
    calls: RwLock<HashMap<Operation, usize>>,
}

impl InMemoryBackend {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: RwLock::new(BTreeMap::new()),
            faults: RwLock::new(HashMap::new()),
            calls: RwLock::new(HashMap::new()),
        }
    }

    /// Make the next call of `op` fail with a backend error.
    ///
    /// Calling this repeatedly queues that many consecutive failures.
    pub fn fail_next(&self, op: Operation) {
        *self
            .faults
            .write()
            .expect("lock poisoned")
            .entry(op)
            .or_insert(0) += 1;
    }

    /// Number of times `op` has been invoked, including failed calls.
    pub fn calls(&self, op: Operation) -> usize {
        self.calls
            .read()
            .expect("lock poisoned")
            .get(&op)
            .copied()
            .unwrap_or(0)
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the bucket is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }

    /// All keys in lexicographic order.
    pub fn keys(&self) -> Vec<String> {
        self.objects
            .read()
            .expect("lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// Record the call and consume one injected fault for `op`, if any.
    fn enter(&self, op: Operation, key: &str) -> StoreResult<()> {
        *self
            .calls
            .write()
            .expect("lock poisoned")
            .entry(op)
            .or_insert(0) += 1;

        let mut faults = self.faults.write().expect("lock poisoned");
        if let Some(remaining) = faults.get_mut(&op) {
            if *remaining > 0 {
                *remaining -= 1;
                debug!(?op, key, "injected backend fault");
                return Err(StoreError::Backend {
                    message: format!("injected {op:?} failure for {key}"),
                    source: None,
                });
            }
        }
        Ok(())
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new("memory")
    }
}

#[async_trait]
impl ObjectBackend for InMemoryBackend {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn object_url(&self, key: &ObjectKey) -> String {
        format!("memory://{}/{}", self.bucket, key)
    }

    async fn put(&self, key: &ObjectKey, data: Bytes, request: &PutRequest) -> StoreResult<()> {
        self.enter(Operation::Put, key.as_str())?;
        let mut map = self.objects.write().expect("lock poisoned");
        map.insert(key.to_string(), StoredObject::new(data, request));
        Ok(())
    }

    async fn put_if_absent(
        &self,
        key: &ObjectKey,
        data: Bytes,
        request: &PutRequest,
    ) -> StoreResult<bool> {
        self.enter(Operation::Put, key.as_str())?;
        let mut map = self.objects.write().expect("lock poisoned");
        if map.contains_key(key.as_str()) {
            return Ok(false);
        }
        map.insert(key.to_string(), StoredObject::new(data, request));
        Ok(true)
    }

    async fn get(&self, key: &ObjectKey) -> StoreResult<Bytes> {
        self.enter(Operation::Get, key.as_str())?;
        let map = self.objects.read().expect("lock poisoned");
        map.get(key.as_str())
            .map(|obj| obj.data.clone())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn head(&self, key: &ObjectKey) -> StoreResult<Option<ObjectHead>> {
        self.enter(Operation::Head, key.as_str())?;
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.get(key.as_str()).map(|obj| obj.head(key.as_str())))
    }

    async fn list(
        &self,
        prefix: Option<&str>,
        start_after: Option<&str>,
        max_keys: usize,
    ) -> StoreResult<ListPage> {
        self.enter(Operation::List, prefix.unwrap_or(""))?;
        let map = self.objects.read().expect("lock poisoned");
        let lower = match start_after {
            Some(after) => Bound::Excluded(after.to_string()),
            None => Bound::Unbounded,
        };
        let mut matching = map
            .range((lower, Bound::Unbounded))
            .filter(|(key, _)| prefix.map_or(true, |p| key.starts_with(p)));

        let objects: Vec<ObjectInfo> = matching
            .by_ref()
            .take(max_keys)
            .map(|(key, obj)| obj.info(key))
            .collect();
        let next_start_after = match matching.next() {
            Some(_) => objects.last().map(|info| info.key.clone()),
            None => None,
        };
        Ok(ListPage {
            objects,
            next_start_after,
        })
    }

    async fn delete(&self, key: &ObjectKey) -> StoreResult<()> {
        self.enter(Operation::Delete, key.as_str())?;
        self.objects
            .write()
            .expect("lock poisoned")
            .remove(key.as_str());
        Ok(())
    }

    async fn copy(&self, src: &ObjectKey, dst: &ObjectKey) -> StoreResult<()> {
        self.enter(Operation::Copy, src.as_str())?;
        let mut map = self.objects.write().expect("lock poisoned");
        let mut obj = map
            .get(src.as_str())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(src.to_string()))?;
        obj.last_modified = Utc::now();
        map.insert(dst.to_string(), obj);
        Ok(())
    }

    async fn copy_if_absent(&self, src: &ObjectKey, dst: &ObjectKey) -> StoreResult<bool> {
        self.enter(Operation::Copy, src.as_str())?;
        let mut map = self.objects.write().expect("lock poisoned");
        let mut obj = map
            .get(src.as_str())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(src.to_string()))?;
        if map.contains_key(dst.as_str()) {
            return Ok(false);
        }
        obj.last_modified = Utc::now();
        map.insert(dst.to_string(), obj);
        Ok(true)
    }
}

impl std::fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBackend")
            .field("bucket", &self.bucket)
            .field("object_count", &self.len())
            .finish()
    }
}
