use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{SdkError, SdkResult};

/// Largest page an S3 listing returns.
pub const MAX_LIST_KEYS: usize = 1000;

pub const ENV_ACCESS_KEY_ID: &str = "DOCBOX_ACCESS_KEY_ID";
pub const ENV_SECRET_ACCESS_KEY: &str = "DOCBOX_SECRET_ACCESS_KEY";
pub const ENV_BUCKET: &str = "DOCBOX_BUCKET";

/// Credentials and bucket for a client. Endpoint, region, and signing are
/// fixed by the backend.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,
}

impl ClientConfig {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        bucket_name: impl Into<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            bucket_name: bucket_name.into(),
        }
    }

    /// Read credentials from `DOCBOX_ACCESS_KEY_ID`, `DOCBOX_SECRET_ACCESS_KEY`
    /// and `DOCBOX_BUCKET`.
    pub fn from_env() -> SdkResult<Self> {
        let var = |name: &str| {
            std::env::var(name).map_err(|_| SdkError::Config(format!("{name} is not set")))
        };
        let config = Self::new(
            var(ENV_ACCESS_KEY_ID)?,
            var(ENV_SECRET_ACCESS_KEY)?,
            var(ENV_BUCKET)?,
        );
        config.validate()?;
        Ok(config)
    }

    /// Every field must be non-empty.
    pub fn validate(&self) -> SdkResult<()> {
        for (name, value) in [
            ("access_key_id", &self.access_key_id),
            ("secret_access_key", &self.secret_access_key),
            ("bucket_name", &self.bucket_name),
        ] {
            if value.trim().is_empty() {
                return Err(SdkError::Config(format!("{name} must not be empty")));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("bucket_name", &self.bucket_name)
            .finish()
    }
}

/// How a collision-free key is obtained.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStrategy {
    /// Probe each candidate with a head request, then write the first free
    /// one. Two concurrent writers of the same key can both pick the same
    /// candidate; the later write wins.
    #[default]
    Probe,
    /// Attempt a create-only write (or copy) per candidate and advance on
    /// conflict. Race-free on backends that honour `If-None-Match: *`.
    ConditionalPut,
}

/// Client behaviour that does not identify the bucket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    pub strategy: AllocationStrategy,
    /// Page size for listings, capped at [`MAX_LIST_KEYS`].
    pub list_page_size: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            strategy: AllocationStrategy::Probe,
            list_page_size: MAX_LIST_KEYS,
        }
    }
}

impl ClientOptions {
    pub(crate) fn page_size(&self) -> usize {
        self.list_page_size.clamp(1, MAX_LIST_KEYS)
    }
}

/// On-disk configuration: credentials plus an optional `[options]` table.
///
/// ```toml
/// access_key_id = "..."
/// secret_access_key = "..."
/// bucket_name = "documents"
///
/// [options]
/// strategy = "conditional_put"
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(flatten)]
    pub client: ClientConfig,
    #[serde(default)]
    pub options: ClientOptions,
}

impl FileConfig {
    pub fn from_toml_str(s: &str) -> SdkResult<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| SdkError::Config(format!("invalid config: {e}")))?;
        config.client.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> SdkResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| SdkError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }
}
