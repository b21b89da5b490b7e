//! Test doubles for the indexer's collaborators.
#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use snapdex_core::{
    CandidateFile, CaptionSmith, EmbedError, FileStorage, ImageEmbedder, ImageRecord, ImageRepo,
    IndexTracker, Indexer, Lookup, OcrEngine, Page,
};
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

pub fn ts(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

pub fn file(key: &str, secs: i64) -> CandidateFile {
    CandidateFile { key: key.to_string(), last_modified: ts(secs) }
}

#[derive(Default)]
pub struct MemoryRepo {
    pub images: Mutex<HashMap<String, ImageRecord>>,
    pub failing_lookups: Mutex<HashSet<String>>,
    pub fail_watermark: bool,
    pub fail_upsert: bool,
    pub upserts: AtomicUsize,
}

impl MemoryRepo {
    pub fn with(images: Vec<ImageRecord>) -> Self {
        let repo = Self::default();
        {
            let mut map = repo.images.lock().unwrap();
            for image in images {
                map.insert(image.file_id.clone(), image);
            }
        }
        repo
    }

    pub fn image(&self, file_id: &str) -> Option<ImageRecord> {
        self.images.lock().unwrap().get(file_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.images.lock().unwrap().len()
    }
}

#[async_trait]
impl ImageRepo for MemoryRepo {
    async fn get(&self, file_id: &str) -> Lookup {
        if self.failing_lookups.lock().unwrap().contains(file_id) {
            return Lookup::Failed(anyhow::anyhow!("connection reset"));
        }
        match self.image(file_id) {
            Some(image) => Lookup::Found(image),
            None => Lookup::NotFound,
        }
    }

    async fn last_modified(&self) -> Result<DateTime<Utc>> {
        if self.fail_watermark {
            anyhow::bail!("database is down");
        }
        Ok(self
            .images
            .lock()
            .unwrap()
            .values()
            .map(|i| i.last_modified)
            .max()
            .unwrap_or(DateTime::UNIX_EPOCH))
    }

    async fn upsert(&self, image: &ImageRecord) -> Result<()> {
        if self.fail_upsert {
            anyhow::bail!("disk full");
        }
        self.upserts.fetch_add(1, Ordering::SeqCst);
        self.images.lock().unwrap().insert(image.file_id.clone(), image.clone());
        Ok(())
    }

    async fn delete(&self, file_id: &str) -> Result<()> {
        self.images.lock().unwrap().remove(file_id);
        Ok(())
    }

    async fn search(&self, query: &str, page: Page) -> Result<Vec<ImageRecord>> {
        let mut found: Vec<ImageRecord> = self
            .images
            .lock()
            .unwrap()
            .values()
            .filter(|i| i.description.contains(query))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        Ok(found
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .collect())
    }
}

/// Bucket that lists a fixed set of objects, honouring the inclusive bound.
#[derive(Default)]
pub struct FakeStorage {
    pub files: Vec<CandidateFile>,
    pub fail_listing: bool,
    pub fail_download: HashSet<String>,
    pub downloads: Mutex<Vec<String>>,
    pub listed_since: Mutex<Vec<DateTime<Utc>>>,
    pub scratch_paths: Mutex<Vec<PathBuf>>,
}

impl FakeStorage {
    pub fn with(files: Vec<CandidateFile>) -> Self {
        Self { files, ..Default::default() }
    }

    pub fn downloads(&self) -> Vec<String> {
        self.downloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl FileStorage for FakeStorage {
    async fn list_files(&self, since: DateTime<Utc>, suffix: &str) -> Result<Vec<CandidateFile>> {
        if self.fail_listing {
            anyhow::bail!("bucket unreachable");
        }
        self.listed_since.lock().unwrap().push(since);
        Ok(self
            .files
            .iter()
            .filter(|f| f.last_modified >= since && f.key.ends_with(suffix))
            .cloned()
            .collect())
    }

    async fn download(&self, key: &str) -> Result<NamedTempFile> {
        self.downloads.lock().unwrap().push(key.to_string());
        if self.fail_download.contains(key) {
            anyhow::bail!("object {} not found", key);
        }
        let mut scratch = NamedTempFile::new()?;
        write!(scratch, "{}", key)?;
        self.scratch_paths.lock().unwrap().push(scratch.path().to_path_buf());
        Ok(scratch)
    }

    async fn delete_file(&self, _key: &str) -> Result<()> {
        Ok(())
    }
}

/// OCR that echoes the scratch file's content (the object key).
#[derive(Default)]
pub struct EchoOcr {
    pub fail_for: HashSet<String>,
}

#[async_trait]
impl OcrEngine for EchoOcr {
    async fn run(&self, path: &Path) -> Result<String> {
        let content = tokio::fs::read_to_string(path).await?;
        if self.fail_for.contains(&content) {
            anyhow::bail!("tesseract crashed");
        }
        Ok(format!("text of {}", content))
    }
}

pub struct FixedCaption {
    pub text: String,
    pub fail: bool,
}

impl FixedCaption {
    pub fn new(text: &str) -> Self {
        Self { text: text.to_string(), fail: false }
    }
}

#[async_trait]
impl CaptionSmith for FixedCaption {
    async fn caption(&self, _path: &Path) -> Result<String> {
        if self.fail {
            anyhow::bail!("ollama returned 500");
        }
        Ok(self.text.clone())
    }
}

pub enum EmbedMode {
    Vector(Vec<f32>),
    Disabled,
    Failing,
}

pub struct FakeEmbedder(pub EmbedMode);

#[async_trait]
impl ImageEmbedder for FakeEmbedder {
    async fn embed_file(&self, _path: &Path) -> Result<Vec<f32>, EmbedError> {
        match &self.0 {
            EmbedMode::Vector(v) => Ok(v.clone()),
            EmbedMode::Disabled => Err(EmbedError::Disabled),
            EmbedMode::Failing => Err(EmbedError::Failed(anyhow::anyhow!("embeddings api timeout"))),
        }
    }
}

#[derive(Default)]
pub struct CountingTracker {
    pub indexed: AtomicUsize,
}

impl CountingTracker {
    pub fn count(&self) -> usize {
        self.indexed.load(Ordering::SeqCst)
    }
}

impl IndexTracker for CountingTracker {
    fn on_indexed(&self) {
        self.indexed.fetch_add(1, Ordering::SeqCst);
    }
}

/// All collaborators of one indexer, kept around for assertions.
pub struct Harness {
    pub repo: Arc<MemoryRepo>,
    pub storage: Arc<FakeStorage>,
    pub tracker: Arc<CountingTracker>,
    pub indexer: Indexer,
}

pub fn harness(
    repo: MemoryRepo,
    storage: FakeStorage,
    ocr: impl OcrEngine + 'static,
    caption: impl CaptionSmith + 'static,
    embedder: impl ImageEmbedder + 'static,
) -> Harness {
    let repo = Arc::new(repo);
    let storage = Arc::new(storage);
    let tracker = Arc::new(CountingTracker::default());
    let indexer = Indexer::new(
        repo.clone(),
        storage.clone(),
        Arc::new(ocr),
        Arc::new(caption),
        Arc::new(embedder),
        tracker.clone(),
    );
    Harness { repo, storage, tracker, indexer }
}
