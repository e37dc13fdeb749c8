//! Two-phase rename over a backend without an atomic move.
//!
//! A rename runs `Allocating → Copying → Deleting → Done`. A failure before
//! the copy lands leaves the bucket untouched. A failure of the delete after
//! a successful copy leaves two objects with the same content and is reported
//! as [`SdkError::PartialRename`], so the caller can finish the job with
//! [`reconcile`] instead of repeating the copy.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use docbox_store::ObjectBackend;
use docbox_types::ObjectKey;

use crate::allocator;
use crate::config::AllocationStrategy;
use crate::error::{SdkError, SdkResult};

/// Progress of a rename.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenameState {
    Allocating,
    Copying,
    Deleting,
    Done,
}

impl fmt::Display for RenameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Allocating => "allocating",
            Self::Copying => "copying",
            Self::Deleting => "deleting",
            Self::Done => "done",
        };
        f.write_str(s)
    }
}

/// A completed rename.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameReceipt {
    pub old_key: String,
    pub requested_key: String,
    pub final_key: String,
}

/// Drives one rename through its states.
pub struct RenameCoordinator<'a> {
    backend: &'a dyn ObjectBackend,
    strategy: AllocationStrategy,
    state: RenameState,
}

impl<'a> RenameCoordinator<'a> {
    pub fn new(backend: &'a dyn ObjectBackend, strategy: AllocationStrategy) -> Self {
        Self {
            backend,
            strategy,
            state: RenameState::Allocating,
        }
    }

    /// The last state entered. After a failure this is the state that failed.
    pub fn state(&self) -> RenameState {
        self.state
    }

    fn enter(&mut self, state: RenameState) {
        debug!(from = %self.state, to = %state, "rename transition");
        self.state = state;
    }

    /// Move `old_key` to a free key derived from `new_key`.
    pub async fn run(&mut self, old_key: &ObjectKey, new_key: &ObjectKey) -> SdkResult<RenameReceipt> {
        let backend = self.backend;
        if !backend.exists(old_key).await? {
            return Err(SdkError::NotFound(old_key.to_string()));
        }

        let final_key = match self.strategy {
            AllocationStrategy::Probe => {
                let final_key = allocator::allocate(new_key, move |candidate| async move {
                    backend.exists(&candidate).await.map_err(SdkError::from)
                })
                .await?;
                self.enter(RenameState::Copying);
                backend.copy(old_key, &final_key).await?;
                final_key
            }
            AllocationStrategy::ConditionalPut => {
                // Allocation and copy are one step: each candidate is a
                // create-only copy.
                self.enter(RenameState::Copying);
                allocator::claim(new_key, move |candidate| async move {
                    backend
                        .copy_if_absent(old_key, &candidate)
                        .await
                        .map_err(SdkError::from)
                })
                .await?
            }
        };

        self.enter(RenameState::Deleting);
        if let Err(source) = backend.delete(old_key).await {
            warn!(
                old_key = %old_key,
                final_key = %final_key,
                error = %source,
                "rename copied but could not delete the source; both objects remain"
            );
            return Err(SdkError::PartialRename {
                old_key: old_key.to_string(),
                final_key: final_key.to_string(),
                source,
            });
        }

        self.enter(RenameState::Done);
        info!(old_key = %old_key, final_key = %final_key, "renamed object");
        Ok(RenameReceipt {
            old_key: old_key.to_string(),
            requested_key: new_key.to_string(),
            final_key: final_key.to_string(),
        })
    }
}

impl fmt::Debug for RenameCoordinator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenameCoordinator")
            .field("bucket", &self.backend.bucket())
            .field("strategy", &self.strategy)
            .field("state", &self.state)
            .finish()
    }
}

/// What [`reconcile`] found and did.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// Both objects held the same content; the stale source was deleted.
    Completed,
    /// Only the destination exists; the rename had already finished.
    AlreadyComplete,
    /// Only the source exists; the copy never landed. Nothing was changed.
    CopyMissing,
}

/// Finish an interrupted rename of `old_key` to `final_key`.
///
/// Idempotent: running it again after it succeeded reports
/// [`ReconcileOutcome::AlreadyComplete`]. The source is only deleted when
/// both objects hold byte-identical content.
pub async fn reconcile(
    backend: &dyn ObjectBackend,
    old_key: &ObjectKey,
    final_key: &ObjectKey,
) -> SdkResult<ReconcileOutcome> {
    if old_key == final_key {
        return Err(SdkError::Config(format!(
            "source and destination are the same key: {old_key}"
        )));
    }
    let old_exists = backend.exists(old_key).await?;
    let final_exists = backend.exists(final_key).await?;

    match (old_exists, final_exists) {
        (false, false) => Err(SdkError::NotFound(format!("{old_key} and {final_key}"))),
        (false, true) => Ok(ReconcileOutcome::AlreadyComplete),
        (true, false) => {
            warn!(old_key = %old_key, final_key = %final_key, "rename destination missing");
            Ok(ReconcileOutcome::CopyMissing)
        }
        (true, true) => {
            let old_digest = blake3::hash(&backend.get(old_key).await?);
            let final_digest = blake3::hash(&backend.get(final_key).await?);
            if old_digest != final_digest {
                return Err(SdkError::ContentMismatch {
                    old_key: old_key.to_string(),
                    final_key: final_key.to_string(),
                });
            }
            backend.delete(old_key).await?;
            info!(
                old_key = %old_key,
                final_key = %final_key,
                digest = %final_digest.to_hex(),
                "reconciled partial rename"
            );
            Ok(ReconcileOutcome::Completed)
        }
    }
}
