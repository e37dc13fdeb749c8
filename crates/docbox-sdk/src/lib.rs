//! High-level client for docbox.
//!
//! [`DocBox`] wraps an S3-compatible bucket with collision-free uploads,
//! two-phase renames, and a uniform [`Envelope`] result for every operation.
//! This is the main entry point for applications storing documents.
//!
//! ```no_run
//! # async fn demo() -> Result<(), docbox_sdk::SdkError> {
//! use docbox_sdk::{ClientConfig, DocBox, Metadata};
//!
//! let docbox = DocBox::connect(&ClientConfig::from_env()?)?;
//! let uploaded = docbox
//!     .upload("report.pdf", "reports/report.pdf", Some(Metadata::new().with_cid("bafy...")))
//!     .await;
//! if let Some(receipt) = uploaded.data() {
//!     println!("stored at {}", receipt.final_key);
//! }
//! # Ok(())
//! # }
//! ```

pub mod allocator;
pub mod client;
pub mod config;
pub mod error;
pub mod rename;

pub use client::{DocBox, Download, SavedFile, UploadOptions, UploadReceipt};
pub use config::{AllocationStrategy, ClientConfig, ClientOptions, FileConfig, MAX_LIST_KEYS};
pub use error::{SdkError, SdkResult};
pub use rename::{reconcile, ReconcileOutcome, RenameCoordinator, RenameReceipt, RenameState};

// Re-export key types
pub use docbox_store::{InMemoryBackend, ObjectBackend, S3Backend};
pub use docbox_types::{
    Envelope, Failure, FailureKind, Metadata, ObjectHead, ObjectInfo, ObjectKey,
};
