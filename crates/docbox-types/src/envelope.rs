//! The uniform result envelope returned by every docbox operation.
//!
//! Operations never surface failures as panics or bare errors. They return an
//! [`Envelope`] whose `success` flag says which of `data` or `error` is set.
//! The error is a structured [`Failure`] so callers branch on [`FailureKind`]
//! instead of parsing message text.

use serde::{Deserialize, Serialize};

/// Classification of a failed operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    /// The referenced key does not exist.
    NotFound,
    /// Bad caller input: empty key, unreadable local file, malformed config.
    InvalidInput,
    /// Network, signing, or backend failure.
    Transport,
    /// The backend rejected the credentials or the request.
    PermissionDenied,
    /// The target already exists, or two objects that should match do not.
    Conflict,
    /// A rename copied `old_key` to `final_key` but could not delete
    /// `old_key`. Both objects now hold the same content.
    PartialRename { old_key: String, final_key: String },
}

impl FailureKind {
    /// Short stable label, matching the serialized tag.
    pub fn label(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::InvalidInput => "invalid_input",
            Self::Transport => "transport",
            Self::PermissionDenied => "permission_denied",
            Self::Conflict => "conflict",
            Self::PartialRename { .. } => "partial_rename",
        }
    }
}

/// A failed operation: what kind of failure and a human-readable message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct Failure {
    #[serde(flatten)]
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(FailureKind::NotFound, message)
    }
}

/// `{ success, data, error, message }`: exactly one of `data` and `error` is
/// populated, according to `success`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Failure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            message: None,
        }
    }

    pub fn ok_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::ok(data)
        }
    }

    pub fn fail(failure: Failure) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(failure),
            message: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    pub fn failure(&self) -> Option<&Failure> {
        self.error.as_ref()
    }

    pub fn kind(&self) -> Option<&FailureKind> {
        self.error.as_ref().map(|f| &f.kind)
    }

    /// `true` for a rename that left both the old and the new object behind.
    pub fn is_partial_failure(&self) -> bool {
        matches!(self.kind(), Some(FailureKind::PartialRename { .. }))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Envelope<U> {
        Envelope {
            success: self.success,
            data: self.data.map(f),
            error: self.error,
            message: self.message,
        }
    }

    /// Convert back into a `Result`, dropping the message.
    pub fn into_result(self) -> Result<T, Failure> {
        match (self.data, self.error) {
            (Some(data), None) if self.success => Ok(data),
            (_, Some(failure)) => Err(failure),
            _ => Err(Failure::new(
                FailureKind::Transport,
                "malformed envelope: neither data nor error populated",
            )),
        }
    }
}

impl<T> From<Result<T, Failure>> for Envelope<T> {
    fn from(result: Result<T, Failure>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(failure) => Self::fail(failure),
        }
    }
}
