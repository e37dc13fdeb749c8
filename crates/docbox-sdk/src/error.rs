use std::path::PathBuf;

use thiserror::Error;

use docbox_store::StoreError;
use docbox_types::{Failure, FailureKind, TypeError};

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("invalid key: {0}")]
    InvalidKey(#[from] TypeError),

    #[error("failed to read {}: {source}", path.display())]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("no free key left after {0}")]
    KeySpaceExhausted(String),

    #[error("\"{old_key}\" and \"{final_key}\" hold different content")]
    ContentMismatch { old_key: String, final_key: String },

    #[error("copied \"{old_key}\" to \"{final_key}\" but could not delete \"{old_key}\": {source}")]
    PartialRename {
        old_key: String,
        final_key: String,
        source: StoreError,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl SdkError {
    /// The envelope failure kind for this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::NotFound(_) => FailureKind::NotFound,
            Self::InvalidKey(_) | Self::ReadFile { .. } | Self::WriteFile { .. } | Self::Config(_) => {
                FailureKind::InvalidInput
            }
            Self::KeySpaceExhausted(_) | Self::ContentMismatch { .. } => FailureKind::Conflict,
            Self::PartialRename {
                old_key, final_key, ..
            } => FailureKind::PartialRename {
                old_key: old_key.clone(),
                final_key: final_key.clone(),
            },
            Self::Store(err) => match err {
                StoreError::NotFound(_) => FailureKind::NotFound,
                StoreError::AlreadyExists(_) => FailureKind::Conflict,
                StoreError::PermissionDenied { .. } => FailureKind::PermissionDenied,
                StoreError::InvalidConfig(_) | StoreError::UnsupportedKey { .. } => {
                    FailureKind::InvalidInput
                }
                StoreError::Backend { .. } => FailureKind::Transport,
            },
        }
    }
}

impl From<SdkError> for Failure {
    fn from(err: SdkError) -> Self {
        Failure::new(err.kind(), err.to_string())
    }
}

pub type SdkResult<T> = Result<T, SdkError>;
