#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use search::ImageSearcher;
use snapdex_core::{
    CandidateFile, FileStorage, ImageRecord, ImageRepo, Lookup, Page, StorageError, Tracker,
};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

pub fn image(file_id: &str, description: &str, secs: i64) -> ImageRecord {
    ImageRecord {
        file_id: file_id.to_string(),
        description: description.to_string(),
        last_modified: DateTime::from_timestamp(secs, 0).unwrap(),
        embedding: Some(vec![0.5; 4]),
    }
}

/// Repository that filters a fixed list and records every call.
#[derive(Default)]
pub struct ListRepo {
    pub images: Mutex<Vec<ImageRecord>>,
    pub fail: bool,
    pub searches: Mutex<Vec<(String, u32, u32)>>,
    pub deletes: Mutex<Vec<String>>,
}

impl ListRepo {
    pub fn with(images: Vec<ImageRecord>) -> Self {
        Self { images: Mutex::new(images), ..Default::default() }
    }

    pub fn failing() -> Self {
        Self { fail: true, ..Default::default() }
    }
}

#[async_trait]
impl ImageRepo for ListRepo {
    async fn get(&self, file_id: &str) -> Lookup {
        match self.images.lock().unwrap().iter().find(|i| i.file_id == file_id) {
            Some(i) => Lookup::Found(i.clone()),
            None => Lookup::NotFound,
        }
    }

    async fn last_modified(&self) -> Result<DateTime<Utc>> {
        Ok(DateTime::UNIX_EPOCH)
    }

    async fn upsert(&self, image: &ImageRecord) -> Result<()> {
        self.images.lock().unwrap().push(image.clone());
        Ok(())
    }

    async fn delete(&self, file_id: &str) -> Result<()> {
        if self.fail {
            anyhow::bail!("database is locked");
        }
        self.deletes.lock().unwrap().push(file_id.to_string());
        self.images.lock().unwrap().retain(|i| i.file_id != file_id);
        Ok(())
    }

    async fn search(&self, query: &str, page: Page) -> Result<Vec<ImageRecord>> {
        self.searches.lock().unwrap().push((query.to_string(), page.page(), page.limit()));
        if self.fail {
            anyhow::bail!("database is locked");
        }
        let query = query.to_lowercase();
        let mut found: Vec<ImageRecord> = self
            .images
            .lock()
            .unwrap()
            .iter()
            .filter(|i| i.description.to_lowercase().contains(&query))
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

pub enum DeleteOutcome {
    Ok,
    Missing,
    Broken,
}

pub struct FakeBucket {
    pub outcome: DeleteOutcome,
    pub deletes: Mutex<Vec<String>>,
}

impl FakeBucket {
    pub fn new(outcome: DeleteOutcome) -> Self {
        Self { outcome, deletes: Mutex::new(Vec::new()) }
    }
}

#[async_trait]
impl FileStorage for FakeBucket {
    async fn list_files(&self, _since: DateTime<Utc>, _suffix: &str) -> Result<Vec<CandidateFile>> {
        Ok(Vec::new())
    }

    async fn download(&self, key: &str) -> Result<NamedTempFile> {
        Err(StorageError::NotFound(key.to_string()).into())
    }

    async fn delete_file(&self, key: &str) -> Result<()> {
        self.deletes.lock().unwrap().push(key.to_string());
        match self.outcome {
            DeleteOutcome::Ok => Ok(()),
            DeleteOutcome::Missing => Err(StorageError::NotFound(key.to_string()).into()),
            DeleteOutcome::Broken => anyhow::bail!("permission denied"),
        }
    }
}

pub struct Fixture {
    pub repo: Arc<ListRepo>,
    pub bucket: Arc<FakeBucket>,
    pub tracker: Arc<Tracker>,
    pub searcher: Arc<ImageSearcher>,
}

pub fn fixture(repo: ListRepo, bucket: FakeBucket) -> Fixture {
    let repo = Arc::new(repo);
    let bucket = Arc::new(bucket);
    let tracker = Arc::new(Tracker::new());
    let searcher = Arc::new(ImageSearcher::new(repo.clone(), bucket.clone(), tracker.clone()));
    Fixture { repo, bucket, tracker, searcher }
}
