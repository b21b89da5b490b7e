//! Screenshot captioning for snapdex.
//
// Provides a trait for describing an image in natural language, backed by a
// multimodal model served through Ollama.

use std::path::Path;
use std::time::Duration;
use async_trait::async_trait;
use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

/// Trait for generating a caption for an image file.
#[async_trait]
pub trait CaptionSmith: Send + Sync {
	async fn caption(&self, path: &Path) -> Result<String>;
}

/// Captioner that returns the same text for every image.
///
/// Used when no captioning model is available; an empty text keeps the
/// description layout intact.
#[derive(Debug, Clone, Default)]
pub struct PlaceholderCaption {
	text: String,
}

impl PlaceholderCaption {
	pub fn new(text: impl Into<String>) -> Self {
		Self { text: text.into() }
	}
}

#[async_trait]
impl CaptionSmith for PlaceholderCaption {
	async fn caption(&self, _path: &Path) -> Result<String> {
		Ok(self.text.clone())
	}
}

#[derive(Serialize)]
struct ShowRequest<'a> {
	name: &'a str,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
	model: &'a str,
	prompt: &'a str,
	images: Vec<String>,
	stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
	response: String,
}

/// Ollama client generating captions with a vision model.
#[derive(Clone)]
pub struct OllamaClient {
	client: reqwest::Client,
	url: String,
	model: String,
	prompt: String,
}

impl OllamaClient {
	pub const DEFAULT_MODEL: &'static str = "llava";
	pub const DEFAULT_PROMPT: &'static str = "Describe this screenshot, please";

	/// Connect with the default model and prompt.
	pub async fn new(url: &str) -> Result<Self> {
		Self::with_model(url, Self::DEFAULT_MODEL, Self::DEFAULT_PROMPT).await
	}

	/// Connect and verify that `model` is available on the server.
	pub async fn with_model(url: &str, model: &str, prompt: &str) -> Result<Self> {
		anyhow::ensure!(!url.trim().is_empty(), "missing ollama url");
		let client = reqwest::Client::builder()
			// vision models on CPU can take minutes per image
			.timeout(Duration::from_secs(600))
			.build()
			.context("failed to build ollama HTTP client")?;
		let ollama = Self {
			client,
			url: url.trim_end_matches('/').to_string(),
			model: model.to_string(),
			prompt: prompt.to_string(),
		};
		ollama.check().await?;
		Ok(ollama)
	}

	async fn check(&self) -> Result<()> {
		let resp = self.client
			.post(format!("{}/api/show", self.url))
			.json(&ShowRequest { name: &self.model })
			.send()
			.await
			.with_context(|| format!("ollama unavailable, {}", self.url))?;
		if !resp.status().is_success() {
			anyhow::bail!("model {} unavailable, ollama returned {}", self.model, resp.status());
		}
		Ok(())
	}
}

#[async_trait]
impl CaptionSmith for OllamaClient {
	async fn caption(&self, path: &Path) -> Result<String> {
		log::debug!("captioning file {}", path.display());
		let bytes = tokio::fs::read(path).await
			.with_context(|| format!("cannot read file {}", path.display()))?;

		let req = GenerateRequest {
			model: &self.model,
			prompt: &self.prompt,
			images: vec![STANDARD.encode(bytes)],
			stream: false,
		};

		let resp = self.client
			.post(format!("{}/api/generate", self.url))
			.json(&req)
			.send()
			.await
			.with_context(|| format!("cannot get response from ollama, {}", self.url))?;

		if !resp.status().is_success() {
			anyhow::bail!("calling api, {}, code {}", self.url, resp.status());
		}

		let caption: GenerateResponse = resp.json().await.context("decoding response")?;
		Ok(caption.response)
	}
}
