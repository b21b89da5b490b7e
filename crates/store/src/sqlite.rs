//! SQLite-backed image repository.
//!
//! Timestamps are stored as Unix nanoseconds so a record reads back exactly as
//! written; embeddings as little-endian `f32` blobs.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::{ImageRecord, ImageRepo, Lookup, Page};

const SELECT_COLUMNS: &str = "SELECT file_id, description, last_modified, embedding FROM image_descriptions";

/// SQLite image repository.
pub struct SqliteImageRepo {
    conn: Mutex<Connection>,
}

/// Row as stored, before decoding timestamps and vectors.
struct RawImage {
    file_id: String,
    description: String,
    last_modified: i64,
    embedding: Option<Vec<u8>>,
}

impl RawImage {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            file_id: row.get(0)?,
            description: row.get(1)?,
            last_modified: row.get(2)?,
            embedding: row.get(3)?,
        })
    }

    fn decode(self) -> Result<ImageRecord> {
        let embedding = self
            .embedding
            .map(|blob| decode_embedding(&blob))
            .transpose()
            .with_context(|| format!("decoding embedding of {}", self.file_id))?;
        Ok(ImageRecord {
            file_id: self.file_id,
            description: self.description,
            last_modified: DateTime::from_timestamp_nanos(self.last_modified),
            embedding,
        })
    }
}

impl SqliteImageRepo {
    /// Create or open the database file at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        Self::with_connection(conn)
    }

    /// Open a private in-memory database.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(r#"
            CREATE TABLE IF NOT EXISTS image_descriptions (
                file_id TEXT PRIMARY KEY,
                description TEXT NOT NULL,
                last_modified INTEGER NOT NULL,
                embedding BLOB
            );

            CREATE INDEX IF NOT EXISTS idx_image_descriptions_last_modified
                ON image_descriptions(last_modified);
        "#).context("Failed to create tables")?;

        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Database lock poisoned: {}", e))
    }

    /// Total number of records.
    pub fn count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM image_descriptions", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn get_blocking(&self, file_id: &str) -> Result<Option<ImageRecord>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE file_id = ?1"),
                params![file_id],
                RawImage::from_row,
            )
            .optional()
            .with_context(|| format!("looking up image {}", file_id))?;
        raw.map(RawImage::decode).transpose()
    }
}

#[async_trait]
impl ImageRepo for SqliteImageRepo {
    async fn get(&self, file_id: &str) -> Lookup {
        match self.get_blocking(file_id) {
            Ok(Some(image)) => Lookup::Found(image),
            Ok(None) => Lookup::NotFound,
            Err(e) => Lookup::Failed(e),
        }
    }

    async fn last_modified(&self) -> Result<DateTime<Utc>> {
        let conn = self.lock()?;
        let newest: Option<i64> = conn
            .query_row("SELECT MAX(last_modified) FROM image_descriptions", [], |row| row.get(0))
            .context("looking for last modified")?;
        Ok(newest
            .map(DateTime::from_timestamp_nanos)
            .unwrap_or(DateTime::UNIX_EPOCH))
    }

    async fn upsert(&self, image: &ImageRecord) -> Result<()> {
        if let Some(embedding) = &image.embedding {
            anyhow::ensure!(!embedding.is_empty(), "embedding of {} is empty", image.file_id);
        }
        let nanos = image
            .last_modified
            .timestamp_nanos_opt()
            .with_context(|| format!("last_modified of {} out of range", image.file_id))?;
        let blob = image.embedding.as_deref().map(encode_embedding);

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO image_descriptions (file_id, description, last_modified, embedding)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(file_id) DO UPDATE SET
                description = excluded.description,
                last_modified = excluded.last_modified,
                embedding = excluded.embedding",
            params![image.file_id, image.description, nanos, blob],
        )
        .with_context(|| format!("inserting image id={}", image.file_id))?;
        Ok(())
    }

    async fn delete(&self, file_id: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM image_descriptions WHERE file_id = ?1", params![file_id])
            .with_context(|| format!("deleting image id={}", file_id))?;
        Ok(())
    }

    async fn search(&self, query: &str, page: Page) -> Result<Vec<ImageRecord>> {
        let pattern = format!("%{}%", escape_like(query));
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "{SELECT_COLUMNS} WHERE description LIKE ?1 ESCAPE '\\'
             ORDER BY last_modified DESC, file_id ASC
             LIMIT ?2 OFFSET ?3"
        ))?;
        let rows = stmt
            .query_map(
                params![pattern, page.limit() as i64, page.offset() as i64],
                RawImage::from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("searching image descriptions")?;
        rows.into_iter().map(RawImage::decode).collect()
    }
}

/// Escape LIKE wildcards so the query is matched literally.
fn escape_like(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len());
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn encode_embedding(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_embedding(blob: &[u8]) -> Result<Vec<f32>> {
    anyhow::ensure!(
        !blob.is_empty() && blob.len() % 4 == 0,
        "embedding blob has invalid length {}",
        blob.len()
    );
    Ok(blob
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}
