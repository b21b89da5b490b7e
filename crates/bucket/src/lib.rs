//! Object storage for snapdex.
//!
//! The indexer only needs three operations from a bucket: list the objects
//! changed since a point in time, download one object to a scratch file, and
//! delete an object. [`LocalBucket`] implements them over a directory tree,
//! which is how screenshots synced by a desktop client usually arrive.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;

/// Prefix of scratch files created by [`LocalBucket::download`].
pub const TEMP_FILE_PREFIX: &str = "snapdex_";

/// An object listed from the bucket, considered for indexing in one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    pub key: String,
    pub last_modified: DateTime<Utc>,
}

/// Errors callers may want to tell apart.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object {0} not found")]
    NotFound(String),
    #[error("invalid object key {0:?}")]
    InvalidKey(String),
    #[error("invalid number of attempts, must be > 0")]
    NoAttempts,
}

/// Trait for the bucket the indexer reads screenshots from.
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// List objects modified at or after `since` whose key ends with `suffix`.
    ///
    /// The bound is inclusive: objects sharing the exact timestamp of the last
    /// indexed object are listed again.
    async fn list_files(&self, since: DateTime<Utc>, suffix: &str) -> Result<Vec<CandidateFile>>;

    /// Download an object into a scratch file that is removed when dropped.
    async fn download(&self, key: &str) -> Result<NamedTempFile>;

    async fn delete_file(&self, key: &str) -> Result<()>;
}

/// A directory used as a bucket. Object keys are `/`-separated paths relative
/// to the root.
#[derive(Debug, Clone)]
pub struct LocalBucket {
    root: PathBuf,
    temp_prefix: String,
}

impl LocalBucket {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            temp_prefix: TEMP_FILE_PREFIX.to_string(),
        }
    }

    pub fn with_temp_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.temp_prefix = prefix.into();
        self
    }

    /// Check that the bucket is reachable, retrying `attempts` times.
    pub async fn check_connectivity(&self, attempts: u32, delay: Duration) -> Result<()> {
        if attempts == 0 {
            return Err(StorageError::NoAttempts).context("checking connectivity");
        }
        let mut last_err = None;
        for attempt in 1..=attempts {
            match tokio::fs::metadata(&self.root).await {
                Ok(meta) if meta.is_dir() => return Ok(()),
                Ok(_) => {
                    last_err = Some(anyhow::anyhow!("{} is not a directory", self.root.display()));
                }
                Err(e) => last_err = Some(e.into()),
            }
            if attempt < attempts {
                log::warn!(
                    "bucket {} not reachable (attempt {}/{}), retrying in {:?}",
                    self.root.display(),
                    attempt,
                    attempts,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
        }
        let err = last_err.unwrap_or_else(|| anyhow::anyhow!("bucket not reachable"));
        Err(err.context("failed to initialize bucket client"))
    }

    /// Resolve a key to a path under the root, rejecting anything that could
    /// escape it.
    fn object_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let valid = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Option<Vec<&str>> = relative.components().map(|c| c.as_os_str().to_str()).collect();
        Some(parts?.join("/"))
    }

    fn list_blocking(&self, since: DateTime<Utc>, suffix: &str) -> Result<Vec<CandidateFile>> {
        let mut files = Vec::new();
        for entry in walkdir::WalkDir::new(&self.root) {
            let entry = entry.with_context(|| format!("listing objects from bucket {}", self.root.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(key) = self.key_for(entry.path()) else {
                log::warn!("skipping object with non utf-8 name: {}", entry.path().display());
                continue;
            };
            if !key.ends_with(suffix) {
                continue;
            }
            let modified = entry
                .metadata()
                .context("reading object metadata")?
                .modified()
                .context("reading object modification time")?;
            let last_modified = DateTime::<Utc>::from(modified);
            if last_modified < since {
                continue;
            }
            files.push(CandidateFile { key, last_modified });
        }
        files.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(files)
    }
}

fn scratch_suffix(key: &str) -> String {
    Path::new(key)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}

#[async_trait]
impl FileStorage for LocalBucket {
    async fn list_files(&self, since: DateTime<Utc>, suffix: &str) -> Result<Vec<CandidateFile>> {
        log::info!("listing objects with ext {} starting from {}", suffix, since);
        let bucket = self.clone();
        let suffix = suffix.to_string();
        let files = tokio::task::spawn_blocking(move || bucket.list_blocking(since, &suffix))
            .await
            .context("listing task failed")??;
        log::info!("{} files to process", files.len());
        Ok(files)
    }

    async fn download(&self, key: &str) -> Result<NamedTempFile> {
        let source = self.object_path(key)?;
        let prefix = self.temp_prefix.clone();
        // Image decoders pick the format from the extension, so keep it.
        let suffix = scratch_suffix(key);
        let key = key.to_string();
        tokio::task::spawn_blocking(move || -> Result<NamedTempFile> {
            let mut input = match std::fs::File::open(&source) {
                Ok(f) => f,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(StorageError::NotFound(key).into());
                }
                Err(e) => return Err(e).with_context(|| format!("opening object {}", key)),
            };
            let mut scratch = tempfile::Builder::new()
                .prefix(&prefix)
                .suffix(&suffix)
                .tempfile()
                .context("creating local image file")?;
            // On error the scratch file is dropped here, which removes it.
            std::io::copy(&mut input, scratch.as_file_mut())
                .with_context(|| format!("downloading image file {}", key))?;
            Ok(scratch)
        })
        .await
        .context("download task failed")?
    }

    async fn delete_file(&self, key: &str) -> Result<()> {
        let path = self.object_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()).into())
            }
            Err(e) => Err(e).with_context(|| format!("deleting file {} from bucket", key)),
        }
    }
}
