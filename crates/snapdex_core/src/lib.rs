//! Incremental screenshot indexing for snapdex.
//
// Discovers new objects in the bucket, enriches each one with OCR text, a
// caption and an optional embedding, and upserts the result into the
// repository.

use std::sync::Arc;
use anyhow::{Context, Result};

pub mod config;
pub mod description;
pub mod monitoring;
pub mod scheduler;

pub use bucket::{CandidateFile, FileStorage, StorageError};
pub use caption::CaptionSmith;
pub use embed::{EmbedError, ImageEmbedder};
pub use monitoring::{IndexTracker, Tracker, TrackerSnapshot};
pub use ocr::OcrEngine;
pub use scheduler::{IndexRunner, ListIndexer};
pub use store::{ImageRecord, ImageRepo, Lookup, Page};

/// Why a single file could not be indexed. Each variant names the stage that
/// failed; none of them leaves a record behind.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
	#[error("cannot download file, {0:#}")]
	Download(anyhow::Error),
	#[error("running ocr, {0:#}")]
	Ocr(anyhow::Error),
	#[error("running captioning, {0:#}")]
	Caption(anyhow::Error),
	#[error("creating embedding, {0:#}")]
	Embedding(anyhow::Error),
	#[error("inserting image, {0:#}")]
	Persist(anyhow::Error),
}

/// Events emitted during a discovery cycle for progress reporting.
#[derive(Debug)]
pub enum IndexEvent {
	/// Already in the repository.
	FileSkipped(String),
	/// The dedup lookup failed; the file is retried next cycle.
	LookupFailed(String, String),
	FileIndexed(String),
	FileError(String, IndexError),
	Done,
}

/// Summary of one discovery cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleSummary {
	pub listed: usize,
	pub indexed: usize,
	pub skipped: usize,
	pub lookup_failed: usize,
	pub failed: usize,
}

/// Main orchestrator for the indexing pipeline.
///
/// Files are processed one after another; only the three enrichment calls for
/// a single file run concurrently.
pub struct Indexer {
	repo: Arc<dyn ImageRepo>,
	storage: Arc<dyn FileStorage>,
	ocr: Arc<dyn OcrEngine>,
	captioner: Arc<dyn CaptionSmith>,
	embedder: Arc<dyn ImageEmbedder>,
	tracker: Arc<dyn IndexTracker>,
}

impl Indexer {
	pub fn new(
		repo: Arc<dyn ImageRepo>,
		storage: Arc<dyn FileStorage>,
		ocr: Arc<dyn OcrEngine>,
		captioner: Arc<dyn CaptionSmith>,
		embedder: Arc<dyn ImageEmbedder>,
		tracker: Arc<dyn IndexTracker>,
	) -> Self {
		Self { repo, storage, ocr, captioner, embedder, tracker }
	}

	/// Index every new object whose key ends with `ext`.
	///
	/// Only a failed watermark read or listing is returned as an error; per-file
	/// failures are logged and the file is picked up again next cycle.
	pub async fn index_new_list(&self, ext: &str) -> Result<()> {
		self.index_new_list_with_progress(ext, |_| ()).await?;
		Ok(())
	}

	/// Same as [`Indexer::index_new_list`], reporting progress via callback.
	pub async fn index_new_list_with_progress<F>(&self, ext: &str, mut cb: F) -> Result<CycleSummary>
	where
		F: FnMut(IndexEvent) + Send,
	{
		let last_modified = self.repo.last_modified().await
			.context("getting last modified")?;
		let files = self.storage.list_files(last_modified, ext).await
			.context("listing files")?;

		let mut summary = CycleSummary { listed: files.len(), ..Default::default() };

		for file in files {
			match self.repo.get(&file.key).await {
				Lookup::Found(_) => {
					log::info!("skipping, file already processed: {}", file.key);
					summary.skipped += 1;
					cb(IndexEvent::FileSkipped(file.key));
					continue;
				}
				Lookup::Failed(e) => {
					log::error!("getting image {} from the database: {:#}", file.key, e);
					summary.lookup_failed += 1;
					cb(IndexEvent::LookupFailed(file.key, format!("{:#}", e)));
					continue;
				}
				Lookup::NotFound => {}
			}

			match self.index(&file).await {
				Ok(()) => {
					log::info!("file processed: {}", file.key);
					self.tracker.on_indexed();
					summary.indexed += 1;
					cb(IndexEvent::FileIndexed(file.key));
				}
				Err(e) => {
					log::error!("indexing file {}: {}", file.key, e);
					summary.failed += 1;
					cb(IndexEvent::FileError(file.key, e));
				}
			}
		}

		log::info!(
			"cycle done: {} listed, {} indexed, {} skipped, {} lookup errors, {} failed",
			summary.listed, summary.indexed, summary.skipped, summary.lookup_failed, summary.failed
		);
		cb(IndexEvent::Done);
		Ok(summary)
	}

	/// Download, enrich and persist a single file.
	pub async fn index(&self, file: &CandidateFile) -> Result<(), IndexError> {
		// Removed from disk when dropped, on every return path below.
		let scratch = self.storage.download(&file.key).await
			.map_err(IndexError::Download)?;
		let path = scratch.path().to_path_buf();

		let ocr_task = {
			let (engine, path) = (self.ocr.clone(), path.clone());
			tokio::spawn(async move { engine.run(&path).await })
		};
		let caption_task = {
			let (captioner, path) = (self.captioner.clone(), path.clone());
			tokio::spawn(async move { captioner.caption(&path).await })
		};
		let embed_task = {
			let (embedder, path) = (self.embedder.clone(), path.clone());
			tokio::spawn(async move { embedder.embed_file(&path).await })
		};

		let (ocr, caption, embedding) = tokio::join!(ocr_task, caption_task, embed_task);

		let ocr = ocr.context("ocr task failed")
			.and_then(|r| r)
			.map_err(IndexError::Ocr)?;
		let caption = caption.context("captioning task failed")
			.and_then(|r| r)
			.map_err(IndexError::Caption)?;
		let embedding = match embedding {
			Ok(Ok(vector)) if vector.is_empty() => {
				return Err(IndexError::Embedding(anyhow::anyhow!("embedding source returned an empty vector")));
			}
			Ok(Ok(vector)) => Some(vector),
			Ok(Err(EmbedError::Disabled)) => None,
			Ok(Err(EmbedError::Failed(e))) => return Err(IndexError::Embedding(e)),
			Err(e) => return Err(IndexError::Embedding(anyhow::Error::new(e).context("embedding task failed"))),
		};

		let image = ImageRecord {
			file_id: file.key.clone(),
			description: description::compose(&ocr, &caption),
			last_modified: file.last_modified,
			embedding,
		};

		self.repo.upsert(&image).await
			.map_err(IndexError::Persist)?;

		if let Err(e) = scratch.close() {
			log::warn!("removing temp file {}: {}", path.display(), e);
		}
		Ok(())
	}
}
