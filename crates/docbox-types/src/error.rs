use thiserror::Error;

/// Errors produced by type construction and validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("object key must not be empty")]
    EmptyKey,

    #[error("object key is {len} bytes, maximum is {max}")]
    KeyTooLong { len: usize, max: usize },

    #[error("invalid object key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("invalid metadata entry {0:?}: expected key=value")]
    InvalidMetadata(String),
}
