//! Foundation types for docbox.
//!
//! This crate provides the key, metadata, and result types shared by every
//! docbox crate. It performs no I/O.
//!
//! # Key Types
//!
//! - [`ObjectKey`] — Validated, non-empty object key
//! - [`CandidateKeys`] — The `base`, `base(1)`, `base(2)`, … probe sequence for a key
//! - [`Metadata`] — String-keyed user metadata with the well-known `cid` field
//! - [`ObjectInfo`] / [`ObjectHead`] — Listing entries and head results
//! - [`Envelope`] — Uniform `{ success, data, error, message }` result shape
//! - [`FailureKind`] — Structured failure taxonomy carried by failed envelopes

pub mod content_type;
pub mod envelope;
pub mod error;
pub mod key;
pub mod metadata;
pub mod object;

pub use content_type::{content_type_for, DEFAULT_CONTENT_TYPE};
pub use envelope::{Envelope, Failure, FailureKind};
pub use error::TypeError;
pub use key::{CandidateKeys, KeyParts, ObjectKey, MAX_KEY_LEN};
pub use metadata::{Metadata, CID_FIELD};
pub use object::{ListPage, ObjectHead, ObjectInfo};
