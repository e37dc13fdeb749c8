//! Object keys and the suffix-allocation candidate sequence.
//!
//! A key such as `reports/q3.pdf` splits into a stem (`reports/q3`) and an
//! extension (`.pdf`). Collisions are resolved by probing `reports/q3(1).pdf`,
//! `reports/q3(2).pdf`, … in order. The parentheses are reserved suffix
//! delimiters: a key that already carries a `(n)` suffix continues the same
//! sequence instead of nesting another suffix inside it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Maximum key length in bytes accepted by S3-compatible stores.
pub const MAX_KEY_LEN: usize = 1024;

/// A validated, non-empty object key.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Validate and wrap a key.
    ///
    /// Keys must be non-empty, at most [`MAX_KEY_LEN`] bytes, and free of
    /// control characters.
    pub fn new(key: impl Into<String>) -> Result<Self, TypeError> {
        let key = key.into();
        if key.is_empty() {
            return Err(TypeError::EmptyKey);
        }
        if key.len() > MAX_KEY_LEN {
            return Err(TypeError::KeyTooLong {
                len: key.len(),
                max: MAX_KEY_LEN,
            });
        }
        if let Some(ch) = key.chars().find(|c| c.is_control()) {
            return Err(TypeError::InvalidKey {
                key: key.clone(),
                reason: format!("contains control character {ch:?}"),
            });
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Split the key into stem, suffix, and extension.
    pub fn parts(&self) -> KeyParts<'_> {
        KeyParts::parse(&self.0)
    }

    /// The probe sequence for this key: the key itself, then every suffixed
    /// variant in increasing order.
    pub fn candidates(&self) -> CandidateKeys {
        CandidateKeys::new(self.clone())
    }

    /// The extension without its leading dot, if any.
    pub fn extension(&self) -> Option<&str> {
        let ext = self.parts().extension;
        ext.strip_prefix('.').filter(|e| !e.is_empty())
    }
}

impl fmt::Debug for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectKey({:?})", self.0)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ObjectKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ObjectKey {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for ObjectKey {
    type Error = TypeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ObjectKey> for String {
    fn from(key: ObjectKey) -> Self {
        key.0
    }
}

/// The decomposition of a key used to build suffixed candidates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyParts<'a> {
    /// Everything before the suffix and extension, including any directory prefix.
    pub stem: &'a str,
    /// The existing `(n)` suffix, if the key already carries one.
    pub suffix: Option<u64>,
    /// The extension including its leading dot, or empty.
    pub extension: &'a str,
}

impl<'a> KeyParts<'a> {
    /// Split `key` at the last `.` of its final path segment, then strip a
    /// trailing `(n)` suffix from the base.
    ///
    /// A dot that opens the final segment (`.env`) is part of the name, not an
    /// extension separator.
    pub fn parse(key: &'a str) -> Self {
        let segment_start = key.rfind('/').map_or(0, |i| i + 1);
        let (base, extension) = match key[segment_start..].rfind('.') {
            None | Some(0) => (key, ""),
            Some(i) => key.split_at(segment_start + i),
        };
        let (stem, suffix) = split_suffix(base, segment_start);
        Self {
            stem,
            suffix,
            extension,
        }
    }

    /// Render `stem(n)extension`.
    pub fn with_suffix(&self, n: u64) -> String {
        format!("{}({n}){}", self.stem, self.extension)
    }
}

/// Strip a trailing `(n)` where `n` is a positive integer without leading
/// zeros. Only the final path segment is considered.
fn split_suffix(base: &str, segment_start: usize) -> (&str, Option<u64>) {
    let Some(inner) = base.strip_suffix(')') else {
        return (base, None);
    };
    let Some(open) = inner.rfind('(') else {
        return (base, None);
    };
    if open < segment_start {
        return (base, None);
    }
    let digits = &inner[open + 1..];
    if digits.is_empty() || digits.starts_with('0') || !digits.bytes().all(|b| b.is_ascii_digit())
    {
        return (base, None);
    }
    match digits.parse::<u64>() {
        Ok(n) => (&inner[..open], Some(n)),
        Err(_) => (base, None),
    }
}

/// Iterator over allocation candidates for a desired key.
///
/// Yields the desired key first, then `stem(1)ext`, `stem(2)ext`, … skipping
/// the candidate equal to the desired key. Every yielded key is distinct and
/// the suffix strictly increases, so a probe loop over this iterator stops at
/// the first gap in the existing key set.
///
/// Suffixed candidates are validated like any other key. Candidates only grow,
/// so the first one over [`MAX_KEY_LEN`] is yielded as an error and ends the
/// sequence.
#[derive(Clone, Debug)]
pub struct CandidateKeys {
    desired: ObjectKey,
    next_suffix: Option<u64>,
    started: bool,
}

impl CandidateKeys {
    pub fn new(desired: ObjectKey) -> Self {
        Self {
            desired,
            next_suffix: Some(1),
            started: false,
        }
    }

    /// The key the sequence was built from.
    pub fn desired(&self) -> &ObjectKey {
        &self.desired
    }
}

impl Iterator for CandidateKeys {
    type Item = Result<ObjectKey, TypeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.started {
            self.started = true;
            return Some(Ok(self.desired.clone()));
        }
        let parts = self.desired.parts();
        loop {
            let n = self.next_suffix?;
            self.next_suffix = n.checked_add(1);
            if parts.suffix == Some(n) {
                continue;
            }
            let candidate = ObjectKey::new(parts.with_suffix(n));
            if candidate.is_err() {
                self.next_suffix = None;
            }
            return Some(candidate);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn key(s: &str) -> ObjectKey {
        ObjectKey::new(s).unwrap()
    }

    fn first(s: &str, n: usize) -> Vec<String> {
        key(s)
            .candidates()
            .take(n)
            .map(|k| k.unwrap().into_string())
            .collect()
    }

    #[test]
    fn rejects_empty_key() {
        assert_eq!(ObjectKey::new(""), Err(TypeError::EmptyKey));
    }

    #[test]
    fn rejects_oversized_key() {
        let long = "a".repeat(MAX_KEY_LEN + 1);
        assert!(matches!(
            ObjectKey::new(long),
            Err(TypeError::KeyTooLong { max: MAX_KEY_LEN, .. })
        ));
    }

    #[test]
    fn rejects_control_characters() {
        assert!(matches!(
            ObjectKey::new("bad\nkey.pdf"),
            Err(TypeError::InvalidKey { .. })
        ));
    }

    #[test]
    fn splits_at_last_dot() {
        let parts = KeyParts::parse("archive.tar.gz");
        assert_eq!(parts.stem, "archive.tar");
        assert_eq!(parts.extension, ".gz");
        assert_eq!(parts.suffix, None);
    }

    #[test]
    fn no_extension() {
        let parts = KeyParts::parse("README");
        assert_eq!(parts.stem, "README");
        assert_eq!(parts.extension, "");
    }

    #[test]
    fn leading_dot_is_not_an_extension() {
        let parts = KeyParts::parse("config/.env");
        assert_eq!(parts.stem, "config/.env");
        assert_eq!(parts.extension, "");
    }

    #[test]
    fn dot_in_directory_is_ignored() {
        let parts = KeyParts::parse("docs.v2/readme");
        assert_eq!(parts.stem, "docs.v2/readme");
        assert_eq!(parts.extension, "");
    }

    #[test]
    fn existing_suffix_is_stripped() {
        let parts = KeyParts::parse("a(12).pdf");
        assert_eq!(parts.stem, "a");
        assert_eq!(parts.suffix, Some(12));
        assert_eq!(parts.extension, ".pdf");
    }

    #[test]
    fn non_numeric_parentheses_are_kept() {
        assert_eq!(KeyParts::parse("draft(final).pdf").stem, "draft(final)");
        assert_eq!(KeyParts::parse("a(01).pdf").stem, "a(01)");
        assert_eq!(KeyParts::parse("a().pdf").stem, "a()");
    }

    #[test]
    fn suffix_in_directory_is_not_stripped() {
        let parts = KeyParts::parse("v(2)/report");
        assert_eq!(parts.stem, "v(2)/report");
        assert_eq!(parts.suffix, None);
    }

    #[test]
    fn candidate_sequence() {
        assert_eq!(first("a.pdf", 4), ["a.pdf", "a(1).pdf", "a(2).pdf", "a(3).pdf"]);
        assert_eq!(first("notes", 3), ["notes", "notes(1)", "notes(2)"]);
    }

    #[test]
    fn candidate_sequence_skips_desired_suffix() {
        assert_eq!(first("a(2).pdf", 4), ["a(2).pdf", "a(1).pdf", "a(3).pdf", "a(4).pdf"]);
    }

    #[test]
    fn oversized_candidate_ends_sequence() {
        let desired = key(&format!("{}.pdf", "a".repeat(MAX_KEY_LEN - 4)));
        assert_eq!(desired.as_str().len(), MAX_KEY_LEN);

        let mut candidates = desired.candidates();
        assert_eq!(candidates.next(), Some(Ok(desired.clone())));
        assert!(matches!(
            candidates.next(),
            Some(Err(TypeError::KeyTooLong { max: MAX_KEY_LEN, .. }))
        ));
        assert_eq!(candidates.next(), None);
    }

    #[test]
    fn candidates_up_to_the_limit_are_yielded() {
        // "(1)" adds three bytes
        let desired = key(&format!("{}.pdf", "a".repeat(MAX_KEY_LEN - 7)));
        let first = desired.candidates().nth(1).unwrap().unwrap();
        assert_eq!(first.as_str().len(), MAX_KEY_LEN);
    }

    #[test]
    fn extension_accessor() {
        assert_eq!(key("a.PDF").extension(), Some("PDF"));
        assert_eq!(key("a").extension(), None);
        assert_eq!(key("a.").extension(), None);
    }

    #[test]
    fn serde_validates() {
        let k: ObjectKey = serde_json::from_str("\"x.pdf\"").unwrap();
        assert_eq!(k.as_str(), "x.pdf");
        assert!(serde_json::from_str::<ObjectKey>("\"\"").is_err());
    }

    proptest! {
        #[test]
        fn candidates_are_distinct(stem in "[a-z]{1,8}", ext in "(\\.[a-z]{1,4})?", n in 1usize..64) {
            let desired = key(&format!("{stem}{ext}"));
            let keys: Vec<ObjectKey> = desired.candidates().take(n).map(Result::unwrap).collect();
            let unique: std::collections::HashSet<_> = keys.iter().collect();
            prop_assert_eq!(unique.len(), keys.len());
            for k in &keys {
                prop_assert!(k.as_str().ends_with(&ext));
            }
        }

        #[test]
        fn suffixed_candidates_share_stem(stem in "[a-z]{1,8}", n in 1u64..1000) {
            let desired = key(&format!("{stem}.pdf"));
            let suffixed = desired.candidates().nth(n as usize).unwrap().unwrap();
            prop_assert_eq!(suffixed.parts().stem, stem.as_str());
            prop_assert_eq!(suffixed.parts().suffix, Some(n));
        }
    }
}
