//! Collision-free key allocation.
//!
//! Both allocators walk the same candidate sequence (`a.pdf`, `a(1).pdf`,
//! `a(2).pdf`, …) and stop at the first usable key:
//!
//! - [`allocate`] asks an existence check about each candidate and returns the
//!   first one reported absent. Nothing is written, so the key can be taken by
//!   a concurrent writer between the check and the caller's write.
//! - [`claim`] attempts a create-only operation per candidate and returns the
//!   first one that succeeds. The write *is* the check, so no window exists.
//!
//! Each probe is one backend round trip; cost grows with the number of keys
//! already occupying the sequence.

use std::future::Future;

use tracing::debug;

use docbox_types::ObjectKey;

use crate::error::{SdkError, SdkResult};

/// Return the first candidate for `desired` that `exists` reports absent.
///
/// Returns `desired` unchanged when it is free. Any probe error aborts the
/// allocation, as does a taken key whose next candidate would exceed the key
/// length limit.
pub async fn allocate<F, Fut>(desired: &ObjectKey, mut exists: F) -> SdkResult<ObjectKey>
where
    F: FnMut(ObjectKey) -> Fut,
    Fut: Future<Output = SdkResult<bool>>,
{
    for candidate in desired.candidates() {
        let candidate = candidate?;
        if !exists(candidate.clone()).await? {
            debug!(desired = %desired, key = %candidate, "allocated key");
            return Ok(candidate);
        }
        debug!(key = %candidate, "key taken");
    }
    Err(SdkError::KeySpaceExhausted(desired.to_string()))
}

/// Return the first candidate for which `try_create` reports a successful
/// create-only write.
///
/// `try_create` returns `Ok(false)` when the key is already taken.
pub async fn claim<F, Fut>(desired: &ObjectKey, mut try_create: F) -> SdkResult<ObjectKey>
where
    F: FnMut(ObjectKey) -> Fut,
    Fut: Future<Output = SdkResult<bool>>,
{
    for candidate in desired.candidates() {
        let candidate = candidate?;
        if try_create(candidate.clone()).await? {
            debug!(desired = %desired, key = %candidate, "claimed key");
            return Ok(candidate);
        }
        debug!(key = %candidate, "create conflict");
    }
    Err(SdkError::KeySpaceExhausted(desired.to_string()))
}
