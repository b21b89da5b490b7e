//! Image description storage for snapdex.
//!
//! Holds one [`ImageRecord`] per indexed screenshot, keyed by its object key.
//! The indexer needs point lookups, an atomic upsert and the newest
//! modification time (the watermark); the read surface needs free-text search
//! and delete.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod sqlite;

pub use sqlite::SqliteImageRepo;

/// A persisted, searchable screenshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Object key in the bucket; the only unique key.
    pub file_id: String,
    pub description: String,
    /// Modification time of the object when it was indexed.
    pub last_modified: DateTime<Utc>,
    /// `None` when no embedding source is configured.
    pub embedding: Option<Vec<f32>>,
}

/// Outcome of a point lookup.
///
/// "not found" is a normal answer for the dedup check, so it is kept apart
/// from real failures instead of being encoded as an error.
#[derive(Debug)]
pub enum Lookup {
    Found(ImageRecord),
    NotFound,
    Failed(anyhow::Error),
}

impl Lookup {
    pub fn found(self) -> Option<ImageRecord> {
        match self {
            Lookup::Found(image) => Some(image),
            _ => None,
        }
    }
}

/// Largest page a search may ask for.
pub const MAX_PER_PAGE: u32 = 100;

/// Rejected pagination parameters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PageError {
    #[error("page must be greater than or equal to 1")]
    Page,
    #[error("per_page must be between 1 and {MAX_PER_PAGE}")]
    PerPage,
}

/// Validated 1-based pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    page: u32,
    per_page: u32,
}

impl Page {
    pub fn new(page: u32, per_page: u32) -> Result<Self, PageError> {
        if page < 1 {
            return Err(PageError::Page);
        }
        if per_page < 1 || per_page > MAX_PER_PAGE {
            return Err(PageError::PerPage);
        }
        Ok(Self { page, per_page })
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn limit(&self) -> u32 {
        self.per_page
    }

    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.per_page as u64
    }
}

/// Trait for the image description repository.
#[async_trait]
pub trait ImageRepo: Send + Sync {
    async fn get(&self, file_id: &str) -> Lookup;

    /// Newest `last_modified` across all records, or the Unix epoch when empty.
    async fn last_modified(&self) -> Result<DateTime<Utc>>;

    /// Insert or fully replace the record with the same `file_id`.
    async fn upsert(&self, image: &ImageRecord) -> Result<()>;

    /// Delete a record. Deleting an unknown id is not an error.
    async fn delete(&self, file_id: &str) -> Result<()>;

    /// Records whose description contains `query` (case-insensitive), newest
    /// first. An empty query matches every record.
    async fn search(&self, query: &str, page: Page) -> Result<Vec<ImageRecord>>;
}
