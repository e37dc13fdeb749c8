use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use docbox_store::{ObjectBackend, PutRequest, S3Backend};
use docbox_types::{
    content_type_for, Envelope, Failure, Metadata, ObjectHead, ObjectInfo, ObjectKey,
};

use crate::allocator;
use crate::config::{AllocationStrategy, ClientConfig, ClientOptions};
use crate::error::{SdkError, SdkResult};
use crate::rename::{self, ReconcileOutcome, RenameCoordinator, RenameReceipt};

/// Options for a single upload.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UploadOptions {
    /// Explicit content type. Inferred from the key's extension when unset.
    pub content_type: Option<String>,
    pub metadata: Metadata,
}

impl UploadOptions {
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Where an upload landed. `final_key` differs from the requested key when
/// the requested key was taken.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    pub location: String,
    pub final_key: String,
    pub size: u64,
    pub content_type: String,
}

/// Object content, base64-encoded for JSON transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Download {
    pub content_base64: String,
}

impl Download {
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.content_base64)
    }
}

/// A download written to local disk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedFile {
    pub key: String,
    pub path: PathBuf,
    pub size: u64,
}

/// Client facade over one bucket.
///
/// Every operation returns an [`Envelope`]; backend and I/O failures are
/// converted into failed envelopes and never propagate as errors or panics.
/// The client holds no mutable state: clones share the backend and operations
/// on different keys are independent.
///
/// Under [`AllocationStrategy::Probe`], concurrent uploads or renames to the
/// *same* desired key can both pick the same free candidate, and the later
/// write replaces the earlier one. Use
/// [`AllocationStrategy::ConditionalPut`] where the backend supports
/// create-only writes.
#[derive(Clone)]
pub struct DocBox {
    backend: Arc<dyn ObjectBackend>,
    options: ClientOptions,
}

impl DocBox {
    /// Connect to the configured bucket on the S3-compatible endpoint.
    pub fn connect(config: &ClientConfig) -> SdkResult<Self> {
        Self::connect_with_options(config, ClientOptions::default())
    }

    pub fn connect_with_options(config: &ClientConfig, options: ClientOptions) -> SdkResult<Self> {
        config.validate()?;
        let backend = S3Backend::new(
            &config.access_key_id,
            &config.secret_access_key,
            &config.bucket_name,
        )?;
        info!(bucket = %config.bucket_name, strategy = ?options.strategy, "docbox client ready");
        Ok(Self::with_backend(Arc::new(backend), options))
    }

    /// Build a client over any backend.
    pub fn with_backend(backend: Arc<dyn ObjectBackend>, options: ClientOptions) -> Self {
        Self { backend, options }
    }

    pub fn bucket(&self) -> &str {
        self.backend.bucket()
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    // ---- Uploads ----

    /// Upload a local file under `desired_key`, or under the first free
    /// suffixed variant if it is taken.
    pub async fn upload(
        &self,
        local_path: impl AsRef<Path>,
        desired_key: &str,
        metadata: Option<Metadata>,
    ) -> Envelope<UploadReceipt> {
        let options = UploadOptions {
            metadata: metadata.unwrap_or_default(),
            ..Default::default()
        };
        self.upload_with(local_path, desired_key, options).await
    }

    pub async fn upload_with(
        &self,
        local_path: impl AsRef<Path>,
        desired_key: &str,
        options: UploadOptions,
    ) -> Envelope<UploadReceipt> {
        let path = local_path.as_ref();
        let result: SdkResult<_> = async {
            let key = ObjectKey::new(desired_key)?;
            let data = tokio::fs::read(path).await.map_err(|source| SdkError::ReadFile {
                path: path.to_path_buf(),
                source,
            })?;
            self.store_new(&key, Bytes::from(data), options).await
        }
        .await;
        settle("upload", result, |r| format!("Uploaded \"{}\".", r.final_key))
    }

    /// Upload in-memory content with the same collision guarantee as
    /// [`upload`](Self::upload).
    pub async fn upload_bytes(
        &self,
        data: impl Into<Bytes>,
        desired_key: &str,
        options: UploadOptions,
    ) -> Envelope<UploadReceipt> {
        let data = data.into();
        let result: SdkResult<_> = async {
            let key = ObjectKey::new(desired_key)?;
            self.store_new(&key, data, options).await
        }
        .await;
        settle("upload", result, |r| format!("Uploaded \"{}\".", r.final_key))
    }

    async fn store_new(
        &self,
        desired: &ObjectKey,
        data: Bytes,
        options: UploadOptions,
    ) -> SdkResult<UploadReceipt> {
        let content_type = options
            .content_type
            .unwrap_or_else(|| content_type_for(desired.as_str()).to_string());
        let request = PutRequest::new(content_type.clone(), options.metadata);
        let size = data.len() as u64;
        let backend = self.backend.as_ref();

        let final_key = match self.options.strategy {
            AllocationStrategy::Probe => {
                let key = allocator::allocate(desired, move |candidate| async move {
                    backend.exists(&candidate).await.map_err(SdkError::from)
                })
                .await?;
                backend.put(&key, data, &request).await?;
                key
            }
            AllocationStrategy::ConditionalPut => {
                let request = &request;
                allocator::claim(desired, move |candidate| {
                    let data = data.clone();
                    async move {
                        backend
                            .put_if_absent(&candidate, data, request)
                            .await
                            .map_err(SdkError::from)
                    }
                })
                .await?
            }
        };

        info!(desired = %desired, final_key = %final_key, size, "uploaded object");
        Ok(UploadReceipt {
            location: backend.object_url(&final_key),
            final_key: final_key.into_string(),
            size,
            content_type,
        })
    }

    // ---- Reads ----

    /// Fetch an object's content as base64.
    pub async fn get(&self, key: &str) -> Envelope<Download> {
        let result: SdkResult<_> = async {
            let data = self.fetch(key).await?;
            Ok(Download {
                content_base64: STANDARD.encode(&data),
            })
        }
        .await;
        settle_quiet("get", result)
    }

    /// Fetch an object and write its decoded content to `local_path`.
    pub async fn download(&self, key: &str, local_path: impl AsRef<Path>) -> Envelope<SavedFile> {
        let path = local_path.as_ref();
        let result: SdkResult<_> = async {
            let data = self.fetch(key).await?;
            tokio::fs::write(path, &data)
                .await
                .map_err(|source| SdkError::WriteFile {
                    path: path.to_path_buf(),
                    source,
                })?;
            Ok(SavedFile {
                key: key.to_string(),
                path: path.to_path_buf(),
                size: data.len() as u64,
            })
        }
        .await;
        settle("download", result, |saved| {
            format!("Saved \"{}\" to {}.", saved.key, saved.path.display())
        })
    }

    async fn fetch(&self, key: &str) -> SdkResult<Bytes> {
        let key = ObjectKey::new(key)?;
        let data = self.backend.get(&key).await?;
        debug!(key = %key, size = data.len(), "fetched object");
        Ok(data)
    }

    /// An object's user metadata.
    pub async fn head_metadata(&self, key: &str) -> Envelope<Metadata> {
        self.head(key).await.map(|head| head.metadata)
    }

    /// An object's size, content type, timestamps, and metadata.
    pub async fn head(&self, key: &str) -> Envelope<ObjectHead> {
        let result: SdkResult<_> = async {
            let key = ObjectKey::new(key)?;
            self.backend
                .head(&key)
                .await?
                .ok_or_else(|| SdkError::NotFound(key.to_string()))
        }
        .await;
        settle_quiet("head", result)
    }

    /// The `cid` metadata field of an object, if it has one.
    pub async fn cid(&self, key: &str) -> Envelope<Option<String>> {
        self.head_metadata(key)
            .await
            .map(|metadata| metadata.cid().map(str::to_string))
    }

    // ---- Listing ----

    /// The first page of the bucket listing, at most 1000 entries.
    ///
    /// Further pages are not fetched; use [`list_all`](Self::list_all) for
    /// the complete listing.
    pub async fn list(&self) -> Envelope<Vec<ObjectInfo>> {
        let result: SdkResult<_> = async {
            let page = self
                .backend
                .list(None, None, self.options.page_size())
                .await?;
            if page.is_truncated() {
                debug!(count = page.objects.len(), "listing truncated to first page");
            }
            Ok(page.objects)
        }
        .await;
        settle_quiet("list", result)
    }

    /// Every object in the bucket, following listing cursors.
    pub async fn list_all(&self) -> Envelope<Vec<ObjectInfo>> {
        let result: SdkResult<_> = async {
            let mut objects = Vec::new();
            let mut cursor: Option<String> = None;
            loop {
                let page = self
                    .backend
                    .list(None, cursor.as_deref(), self.options.page_size())
                    .await?;
                objects.extend(page.objects);
                match page.next_start_after {
                    Some(next) => cursor = Some(next),
                    None => break,
                }
            }
            Ok(objects)
        }
        .await;
        settle_quiet("list", result)
    }

    // ---- Mutations ----

    /// Delete an existing object. Deleting a missing key fails with
    /// `not_found`.
    pub async fn delete(&self, key: &str) -> Envelope<()> {
        let result: SdkResult<_> = async {
            let key = ObjectKey::new(key)?;
            // The backend delete is idempotent, so absence is checked first.
            if !self.backend.exists(&key).await? {
                return Err(SdkError::NotFound(key.to_string()));
            }
            self.backend.delete(&key).await?;
            info!(key = %key, "deleted object");
            Ok(key)
        }
        .await;
        match result {
            Ok(key) => Envelope::ok_with_message((), format!("Object \"{key}\" deleted.")),
            Err(err) => fail("delete", err),
        }
    }

    /// Move `old_key` to `new_key`, or to the first free suffixed variant of
    /// `new_key`.
    ///
    /// If the copy succeeds but removing `old_key` fails, the envelope's
    /// failure kind is `partial_rename` and both keys hold the same content;
    /// [`reconcile_rename`](Self::reconcile_rename) finishes the move.
    pub async fn rename(&self, old_key: &str, new_key: &str) -> Envelope<RenameReceipt> {
        let result: SdkResult<_> = async {
            let old_key = ObjectKey::new(old_key)?;
            let new_key = ObjectKey::new(new_key)?;
            RenameCoordinator::new(self.backend.as_ref(), self.options.strategy)
                .run(&old_key, &new_key)
                .await
        }
        .await;
        settle("rename", result, |r| {
            format!("Renamed \"{}\" to \"{}\".", r.old_key, r.final_key)
        })
    }

    /// Finish a rename that stopped after its copy phase.
    pub async fn reconcile_rename(
        &self,
        old_key: &str,
        final_key: &str,
    ) -> Envelope<ReconcileOutcome> {
        let result: SdkResult<_> = async {
            let old_key = ObjectKey::new(old_key)?;
            let final_key = ObjectKey::new(final_key)?;
            rename::reconcile(self.backend.as_ref(), &old_key, &final_key).await
        }
        .await;
        settle("reconcile", result, |outcome| match outcome {
            ReconcileOutcome::Completed => "Removed the stale source object.".to_string(),
            ReconcileOutcome::AlreadyComplete => "Rename was already complete.".to_string(),
            ReconcileOutcome::CopyMissing => {
                "Destination is missing; the source was left in place.".to_string()
            }
        })
    }
}

impl std::fmt::Debug for DocBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocBox")
            .field("bucket", &self.bucket())
            .field("options", &self.options)
            .finish()
    }
}

fn fail<T>(op: &str, err: SdkError) -> Envelope<T> {
    warn!(op, error = %err, kind = err.kind().label(), "operation failed");
    Envelope::fail(Failure::from(err))
}

fn settle<T>(op: &str, result: SdkResult<T>, message: impl FnOnce(&T) -> String) -> Envelope<T> {
    match result {
        Ok(data) => {
            let message = message(&data);
            Envelope::ok_with_message(data, message)
        }
        Err(err) => fail(op, err),
    }
}

fn settle_quiet<T>(op: &str, result: SdkResult<T>) -> Envelope<T> {
    match result {
        Ok(data) => Envelope::ok(data),
        Err(err) => fail(op, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docbox_store::{InMemoryBackend, Operation};
    use docbox_types::FailureKind;

    fn client_with(strategy: AllocationStrategy) -> (Arc<InMemoryBackend>, DocBox) {
        let backend = Arc::new(InMemoryBackend::new("docs"));
        let options = ClientOptions {
            strategy,
            ..Default::default()
        };
        (backend.clone(), DocBox::with_backend(backend, options))
    }

    fn client() -> (Arc<InMemoryBackend>, DocBox) {
        client_with(AllocationStrategy::Probe)
    }

    fn local_file(dir: &tempfile::TempDir, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    // -----------------------------------------------------------------------
    // Upload
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn upload_round_trip() {
        let (_, docbox) = client();
        let dir = tempfile::tempdir().unwrap();
        let content = b"%PDF-1.7 \x00\xff binary body";
        let path = local_file(&dir, "x.pdf", content);

        let uploaded = docbox.upload(&path, "x.pdf", None).await;
        assert!(uploaded.is_success(), "{uploaded:?}");
        let receipt = uploaded.data().unwrap();
        assert_eq!(receipt.final_key, "x.pdf");
        assert_eq!(receipt.location, "memory://docs/x.pdf");
        assert_eq!(receipt.content_type, "application/pdf");

        let fetched = docbox.get(&receipt.final_key).await;
        assert_eq!(fetched.data().unwrap().decode().unwrap(), content);
    }

    #[tokio::test]
    async fn repeated_uploads_never_overwrite() {
        for strategy in [AllocationStrategy::Probe, AllocationStrategy::ConditionalPut] {
            let (backend, docbox) = client_with(strategy);
            let mut keys = Vec::new();
            for i in 0..5u8 {
                let env = docbox
                    .upload_bytes(vec![i], "report.pdf", UploadOptions::default())
                    .await;
                keys.push(env.data().unwrap().final_key.clone());
            }
            assert_eq!(
                keys,
                ["report.pdf", "report(1).pdf", "report(2).pdf", "report(3).pdf", "report(4).pdf"]
            );
            assert_eq!(backend.len(), 5);
            for (i, key) in keys.iter().enumerate() {
                let data = backend.get(&ObjectKey::new(key.as_str()).unwrap()).await.unwrap();
                assert_eq!(&data[..], &[i as u8]);
            }
        }
    }

    #[tokio::test]
    async fn upload_stores_metadata_and_explicit_content_type() {
        let (_, docbox) = client();
        let options = UploadOptions::default()
            .with_content_type("text/x-custom")
            .with_metadata(Metadata::new().with_cid("bafyabc"));
        docbox.upload_bytes("body", "a.txt", options).await;

        let head = docbox.head("a.txt").await;
        let head = head.data().unwrap();
        assert_eq!(head.content_type.as_deref(), Some("text/x-custom"));
        assert_eq!(docbox.cid("a.txt").await.data().unwrap().as_deref(), Some("bafyabc"));
        assert_eq!(docbox.head_metadata("a.txt").await.data().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn upload_missing_file_is_invalid_input() {
        let (backend, docbox) = client();
        let env = docbox.upload("/definitely/not/here.pdf", "a.pdf", None).await;
        assert!(!env.is_success());
        assert_eq!(env.kind(), Some(&FailureKind::InvalidInput));
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn upload_empty_key_is_invalid_input() {
        let (_, docbox) = client();
        let env = docbox.upload_bytes("x", "", UploadOptions::default()).await;
        assert_eq!(env.kind(), Some(&FailureKind::InvalidInput));
    }

    #[tokio::test]
    async fn collision_at_key_length_limit_is_invalid_input() {
        let (backend, docbox) = client();
        let desired = format!("{}.pdf", "a".repeat(docbox_types::MAX_KEY_LEN - 4));
        assert!(docbox.upload_bytes("1", &desired, UploadOptions::default()).await.is_success());

        let env = docbox.upload_bytes("2", &desired, UploadOptions::default()).await;
        assert_eq!(env.kind(), Some(&FailureKind::InvalidInput));
        assert_eq!(backend.len(), 1);
        assert_eq!(backend.calls(Operation::Put), 1);
    }

    #[tokio::test]
    async fn upload_write_failure_is_transport() {
        let (backend, docbox) = client();
        backend.fail_next(Operation::Put);
        let env = docbox.upload_bytes("x", "a.pdf", UploadOptions::default()).await;
        assert_eq!(env.kind(), Some(&FailureKind::Transport));
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn probe_failure_aborts_upload() {
        let (backend, docbox) = client();
        backend.fail_next(Operation::Head);
        let env = docbox.upload_bytes("x", "a.pdf", UploadOptions::default()).await;
        assert_eq!(env.kind(), Some(&FailureKind::Transport));
        assert_eq!(backend.calls(Operation::Put), 0);
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let (_, docbox) = client();
        let env = docbox.get("missing.pdf").await;
        assert_eq!(env.kind(), Some(&FailureKind::NotFound));
        assert_eq!(docbox.head_metadata("missing.pdf").await.kind(), Some(&FailureKind::NotFound));
    }

    #[tokio::test]
    async fn download_writes_decoded_bytes() {
        let (_, docbox) = client();
        docbox.upload_bytes(&b"payload"[..], "d.bin", UploadOptions::default()).await;
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.bin");

        let env = docbox.download("d.bin", &target).await;
        assert!(env.is_success());
        assert_eq!(env.data().unwrap().size, 7);
        assert_eq!(std::fs::read(&target).unwrap(), b"payload");
    }

    // -----------------------------------------------------------------------
    // Listing
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn list_returns_first_page_only() {
        let backend = Arc::new(InMemoryBackend::new("docs"));
        let docbox = DocBox::with_backend(
            backend.clone(),
            ClientOptions {
                list_page_size: 2,
                ..Default::default()
            },
        );
        for name in ["a", "b", "c"] {
            docbox.upload_bytes("x", name, UploadOptions::default()).await;
        }

        let first = docbox.list().await;
        let keys: Vec<_> = first.data().unwrap().iter().map(|o| o.key.clone()).collect();
        assert_eq!(keys, ["a", "b"]);

        let all = docbox.list_all().await;
        assert_eq!(all.data().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn list_failure_is_transport() {
        let (backend, docbox) = client();
        backend.fail_next(Operation::List);
        assert_eq!(docbox.list().await.kind(), Some(&FailureKind::Transport));
    }

    // -----------------------------------------------------------------------
    // Delete
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn delete_existing() {
        let (backend, docbox) = client();
        docbox.upload_bytes("x", "a.pdf", UploadOptions::default()).await;
        let env = docbox.delete("a.pdf").await;
        assert!(env.is_success());
        assert_eq!(env.message.as_deref(), Some("Object \"a.pdf\" deleted."));
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn delete_missing_is_not_found() {
        let (backend, docbox) = client();
        let env = docbox.delete("missing.pdf").await;
        assert!(!env.is_success());
        assert_eq!(env.kind(), Some(&FailureKind::NotFound));
        assert!(env.failure().unwrap().message.contains("missing.pdf"));
        assert_eq!(backend.calls(Operation::Delete), 0);
    }

    // -----------------------------------------------------------------------
    // Rename
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn rename_preserves_content() {
        let (_, docbox) = client();
        docbox.upload_bytes("original", "a.pdf", UploadOptions::default()).await;

        let env = docbox.rename("a.pdf", "b.pdf").await;
        assert!(env.is_success());
        assert_eq!(env.data().unwrap().final_key, "b.pdf");
        assert_eq!(env.message.as_deref(), Some("Renamed \"a.pdf\" to \"b.pdf\"."));

        let fetched = docbox.get("b.pdf").await;
        assert_eq!(fetched.data().unwrap().decode().unwrap(), b"original");
        assert_eq!(docbox.head("a.pdf").await.kind(), Some(&FailureKind::NotFound));
    }

    #[tokio::test]
    async fn rename_collision_uses_suffix() {
        let (_, docbox) = client();
        docbox.upload_bytes("A", "a.pdf", UploadOptions::default()).await;
        docbox.upload_bytes("B", "b.pdf", UploadOptions::default()).await;

        let env = docbox.rename("a.pdf", "b.pdf").await;
        assert_eq!(env.data().unwrap().final_key, "b(1).pdf");
        assert_eq!(docbox.get("b.pdf").await.data().unwrap().decode().unwrap(), b"B");
        assert_eq!(docbox.get("b(1).pdf").await.data().unwrap().decode().unwrap(), b"A");
    }

    #[tokio::test]
    async fn rename_missing_source() {
        let (_, docbox) = client();
        let env = docbox.rename("nope.pdf", "b.pdf").await;
        assert_eq!(env.kind(), Some(&FailureKind::NotFound));
        assert!(!env.is_partial_failure());
    }

    #[tokio::test]
    async fn rename_copy_failure_is_total() {
        let (backend, docbox) = client();
        docbox.upload_bytes("A", "a.pdf", UploadOptions::default()).await;
        backend.fail_next(Operation::Copy);

        let env = docbox.rename("a.pdf", "b.pdf").await;
        assert_eq!(env.kind(), Some(&FailureKind::Transport));
        assert!(!env.is_partial_failure());
        assert_eq!(backend.keys(), ["a.pdf"]);
    }

    #[tokio::test]
    async fn partial_rename_then_reconcile() {
        let (backend, docbox) = client();
        docbox.upload_bytes("A", "a.pdf", UploadOptions::default()).await;
        backend.fail_next(Operation::Delete);

        let env = docbox.rename("a.pdf", "b.pdf").await;
        assert!(env.is_partial_failure());
        assert_eq!(
            env.kind(),
            Some(&FailureKind::PartialRename {
                old_key: "a.pdf".into(),
                final_key: "b.pdf".into()
            })
        );
        assert_eq!(docbox.get("a.pdf").await, docbox.get("b.pdf").await);

        let fixed = docbox.reconcile_rename("a.pdf", "b.pdf").await;
        assert_eq!(fixed.data(), Some(&ReconcileOutcome::Completed));
        assert_eq!(backend.keys(), ["b.pdf"]);
    }

    #[tokio::test]
    async fn envelope_serializes_for_callers() {
        let (_, docbox) = client();
        let env = docbox.delete("missing.pdf").await;
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["kind"], "not_found");
    }

    #[test]
    fn client_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<DocBox>();
    }
}
