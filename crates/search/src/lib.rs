//! Read surface for snapdex: paginated free-text search and delete.
//
// The HTTP adapter lives in [`http`]; the CLI calls [`ImageSearcher`]
// directly.

use std::sync::Arc;

use snapdex_core::{FileStorage, ImageRecord, ImageRepo, Page, StorageError, Tracker};

pub mod http;

/// Failure of a read-surface call.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
	/// Bad input from the caller; the message is safe to show.
	#[error("{0}")]
	Invalid(String),
	/// Repository or storage failure; details are only logged.
	#[error("internal error, {0:#}")]
	Internal(anyhow::Error),
}

pub struct ImageSearcher {
	repo: Arc<dyn ImageRepo>,
	storage: Arc<dyn FileStorage>,
	tracker: Arc<Tracker>,
}

impl ImageSearcher {
	pub fn new(repo: Arc<dyn ImageRepo>, storage: Arc<dyn FileStorage>, tracker: Arc<Tracker>) -> Self {
		Self { repo, storage, tracker }
	}

	pub fn tracker(&self) -> &Tracker {
		&self.tracker
	}

	/// Case-insensitive substring search over descriptions, newest first.
	/// An empty query lists everything.
	pub async fn search(&self, query: &str, page: u32, per_page: u32) -> Result<Vec<ImageRecord>, SearchError> {
		let page = Page::new(page, per_page).map_err(|e| SearchError::Invalid(e.to_string()))?;
		self.tracker.on_search();
		log::debug!("searching {:?}, page {}, per page {}", query, page.page(), page.limit());
		self.repo.search(query, page).await.map_err(SearchError::Internal)
	}

	/// Remove a screenshot from the bucket, then its record.
	///
	/// The two steps are not atomic. If the second one fails the record stays
	/// searchable but points at a missing object; deleting again clears it
	/// since a missing object is not treated as an error here.
	pub async fn delete(&self, file_id: &str) -> Result<(), SearchError> {
		if file_id.is_empty() {
			return Err(SearchError::Invalid("file_id is required".to_string()));
		}

		if let Err(e) = self.storage.delete_file(file_id).await {
			match e.downcast_ref::<StorageError>() {
				Some(StorageError::NotFound(_)) => {
					log::warn!("file {} already gone from the bucket", file_id);
				}
				Some(StorageError::InvalidKey(_)) => return Err(SearchError::Invalid(e.to_string())),
				_ => return Err(SearchError::Internal(e.context("deleting from bucket"))),
			}
		}

		self.repo.delete(file_id).await
			.map_err(|e| SearchError::Internal(e.context("deleting from the database")))?;
		log::info!("deleted {}", file_id);
		Ok(())
	}
}
