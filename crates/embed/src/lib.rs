//! Image embedding sources for snapdex.
//
// Provides a trait for turning a screenshot on disk into a vector embedding,
// plus the backends the indexer can be configured with.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use async_trait::async_trait;
use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use fastembed::{ImageEmbedding, ImageEmbeddingModel, ImageInitOptions};
use serde::{Deserialize, Serialize};

/// Failure of an embedding source.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
	/// The embedding source is switched off. Callers treat this as "no embedding".
	#[error("embeddings service is switched off")]
	Disabled,
	#[error(transparent)]
	Failed(#[from] anyhow::Error),
}

/// Trait for generating an embedding from an image file.
#[async_trait]
pub trait ImageEmbedder: Send + Sync {
	async fn embed_file(&self, path: &Path) -> Result<Vec<f32>, EmbedError>;
}

/// Embedder used when embeddings are turned off in the configuration.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEmbedder;

#[async_trait]
impl ImageEmbedder for NullEmbedder {
	async fn embed_file(&self, _path: &Path) -> Result<Vec<f32>, EmbedError> {
		Err(EmbedError::Disabled)
	}
}

#[derive(Serialize)]
struct EncodeRequest<'a> {
	file: &'a str,
}

#[derive(Deserialize)]
struct EncodeResponse {
	embedding: Vec<f32>,
}

/// Client for an external embeddings API exposing `POST /encode-base64`.
#[derive(Clone)]
pub struct HttpEmbedder {
	client: reqwest::Client,
	endpoint: String,
}

impl HttpEmbedder {
	pub fn new(base_url: &str) -> Result<Self> {
		Self::with_timeout(base_url, Duration::from_secs(120))
	}

	pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
		anyhow::ensure!(!base_url.trim().is_empty(), "missing embeddings api url");
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.context("failed to build embeddings HTTP client")?;
		let endpoint = format!("{}/encode-base64", base_url.trim_end_matches('/'));
		Ok(Self { client, endpoint })
	}

	/// Request an embedding for already base64-encoded image bytes.
	pub async fn embed_base64(&self, data: &str) -> Result<Vec<f32>> {
		let resp = self.client
			.post(&self.endpoint)
			.json(&EncodeRequest { file: data })
			.send()
			.await
			.context("request failed")?;

		let status = resp.status();
		if status != reqwest::StatusCode::OK {
			let body = resp.text().await.unwrap_or_default();
			log::error!("embeddings api response {}: {}", status, body);
			anyhow::bail!("invalid response code from embeddings api: {}", status);
		}

		let parsed: EncodeResponse = resp.json().await
			.context("cannot decode response")?;
		Ok(parsed.embedding)
	}
}

#[async_trait]
impl ImageEmbedder for HttpEmbedder {
	async fn embed_file(&self, path: &Path) -> Result<Vec<f32>, EmbedError> {
		log::debug!("creating embedding for file {}", path.display());
		let bytes = tokio::fs::read(path).await
			.with_context(|| format!("reading file locally {}", path.display()))?;
		let encoded = STANDARD.encode(bytes);
		Ok(self.embed_base64(&encoded).await?)
	}
}

/// In-process CLIP image embedder using fastembed (runs entirely offline).
pub struct LocalImageEmbedder {
	model: Arc<Mutex<ImageEmbedding>>,
	dim: usize,
}

impl LocalImageEmbedder {
	/// Create an embedder with the default model (CLIP ViT-B/32, 512 dimensions).
	pub fn new() -> Result<Self> {
		Self::with_model(ImageEmbeddingModel::ClipVitB32, 512)
	}

	/// Create an embedder with a specific model.
	pub fn with_model(model_name: ImageEmbeddingModel, dim: usize) -> Result<Self> {
		let options = ImageInitOptions::new(model_name).with_show_download_progress(true);
		let model = ImageEmbedding::try_new(options)?;
		Ok(Self { model: Arc::new(Mutex::new(model)), dim })
	}

	/// Return the embedding dimension.
	pub fn dimension(&self) -> usize {
		self.dim
	}
}

#[async_trait]
impl ImageEmbedder for LocalImageEmbedder {
	async fn embed_file(&self, path: &Path) -> Result<Vec<f32>, EmbedError> {
		let model = self.model.clone();
		let path: PathBuf = path.to_path_buf();
		let embeddings = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
			#[allow(unused_mut)]
			let mut model = model.lock()
				.map_err(|e| anyhow::anyhow!("embedding model lock poisoned: {}", e))?;
			let embeddings = model.embed(vec![path], None)?;
			Ok(embeddings)
		})
		.await
		.context("embedding task failed")??;

		embeddings.into_iter().next()
			.ok_or_else(|| EmbedError::Failed(anyhow::anyhow!("model returned no embedding")))
	}
}
