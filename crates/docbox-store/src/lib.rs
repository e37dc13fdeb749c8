//! Object backends for docbox.
//!
//! The backend is the only component that talks to storage. It exposes the
//! primitive object API (put, get, head, list, delete, copy) plus the
//! conditional variants used for race-free key allocation. It never chooses
//! keys; collision avoidance lives in `docbox-sdk`.
//!
//! # Backends
//!
//! All backends implement the [`ObjectBackend`] trait:
//!
//! - [`S3Backend`] -- any S3-compatible bucket through the `object_store` crate
//! - [`InMemoryBackend`] -- `BTreeMap`-based store for tests and embedding,
//!   with per-operation fault injection
//!
//! # Backend Rules
//!
//! 1. `get`, `copy`, and `copy_if_absent` report [`StoreError::NotFound`] for
//!    a missing source; `head` reports absence as `Ok(None)`.
//! 2. `delete` is idempotent, as on S3: deleting a missing key succeeds.
//! 3. `put` overwrites. Only `put_if_absent` and `copy_if_absent` refuse to.
//! 4. `list` returns keys in lexicographic order, one page at a time.

pub mod error;
pub mod memory;
pub mod s3;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::{InMemoryBackend, Operation};
pub use s3::{S3Backend, FILEBASE_ENDPOINT, FILEBASE_REGION};
pub use traits::{ObjectBackend, PutRequest};
