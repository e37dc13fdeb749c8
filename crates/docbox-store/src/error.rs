/// Errors from backend operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested object does not exist.
    #[error("object not found: {0}")]
    NotFound(String),

    /// A conditional write found the key already taken.
    #[error("object already exists: {0}")]
    AlreadyExists(String),

    /// The backend rejected the credentials or the request.
    #[error("permission denied for {key}: {message}")]
    PermissionDenied { key: String, message: String },

    /// The key cannot be stored under its exact name by this backend.
    #[error("key {key:?} is not representable by the backend: {reason}")]
    UnsupportedKey { key: String, reason: String },

    /// The backend could not be constructed from the given settings.
    #[error("invalid backend configuration: {0}")]
    InvalidConfig(String),

    /// Any other failure at the storage boundary.
    #[error("{message}")]
    Backend {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl StoreError {
    pub fn backend(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Backend {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result alias for backend operations.
pub type StoreResult<T> = Result<T, StoreError>;
