//! Configuration file handling for snapdex.
//!
//! Loads settings from `snapdex.config.toml` with the following search order:
//! 1. Current directory
//! 2. ~/.config/snapdex/snapdex.config.toml (Linux/macOS)
//! 3. ~/.snapdex/snapdex.config.toml

use std::path::{Path, PathBuf};
use std::fs;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use anyhow::{Context, Result};

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SnapdexConfig {
    pub index: IndexConfig,
    pub bucket: BucketConfig,
    pub database: DatabaseConfig,
    pub ocr: OcrConfig,
    pub caption: CaptionConfig,
    pub embedding: EmbeddingConfig,
    pub web: WebConfig,
}

/// Indexing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Only objects whose key ends with this suffix are indexed.
    pub ext: String,
    /// Pause between two discovery cycles, in seconds.
    pub scrape_interval_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            ext: ".jpg".into(),
            scrape_interval_secs: 15 * 60,
        }
    }
}

/// Bucket configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketConfig {
    /// Directory holding the uploaded screenshots.
    pub root: Option<PathBuf>,
    /// How many times to check the bucket during startup (0 disables the check).
    pub retry_attempts: u32,
    /// Delay between startup checks, in seconds.
    pub retry_secs: u64,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            root: None,
            retry_attempts: 0,
            retry_secs: 15,
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file (default: <data dir>/snapdex.db).
    pub path: Option<PathBuf>,
}

/// OCR configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub command: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self { command: "tesseract".into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptionBackend {
    Ollama,
    Placeholder,
}

/// Captioning configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionConfig {
    pub backend: CaptionBackend,
    pub url: String,
    pub model: String,
    pub prompt: String,
    /// Caption used by the placeholder backend.
    pub placeholder: String,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            backend: CaptionBackend::Placeholder,
            url: "http://localhost:11434".into(),
            model: "llava".into(),
            prompt: "Describe this screenshot, please".into(),
            placeholder: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    Http,
    Local,
    Disabled,
}

/// Embedding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    /// Base url of the embeddings api (http backend).
    pub url: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Disabled,
            url: "http://localhost:5000".into(),
        }
    }
}

/// HTTP read surface configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self { enabled: true, port: 4000 }
    }
}

impl SnapdexConfig {
    /// Config file name.
    pub const FILENAME: &'static str = "snapdex.config.toml";

    /// Load configuration from file, searching standard locations.
    /// Returns default config if no file found.
    pub fn load() -> Result<Self> {
        if let Some(path) = Self::find_config_file() {
            log::info!("loading config from {}", path.display());
            Self::load_from(&path)
        } else {
            log::warn!("no {} found, using defaults", Self::FILENAME);
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: SnapdexConfig = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Find config file in standard locations.
    pub fn find_config_file() -> Option<PathBuf> {
        let current = PathBuf::from(Self::FILENAME);
        if current.exists() {
            return Some(current);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let path = config_dir.join("snapdex").join(Self::FILENAME);
            if path.exists() {
                return Some(path);
            }
        }

        if let Some(home) = dirs::home_dir() {
            let path = home.join(".snapdex").join(Self::FILENAME);
            if path.exists() {
                return Some(path);
            }
        }

        None
    }

    /// Directory for local state.
    pub fn data_dir(&self) -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("snapdex")
    }

    /// Path of the SQLite database (uses database.path or the data dir).
    pub fn database_path(&self) -> PathBuf {
        match &self.database.path {
            Some(path) => expand(path),
            None => self.data_dir().join("snapdex.db"),
        }
    }

    /// Bucket root with `~` expanded.
    pub fn bucket_root(&self) -> Option<PathBuf> {
        self.bucket.root.as_deref().map(expand)
    }

    pub fn scrape_interval(&self) -> Duration {
        Duration::from_secs(self.index.scrape_interval_secs)
    }

    /// Check values that serde alone cannot.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.index.ext.is_empty(), "index.ext must not be empty");
        anyhow::ensure!(self.index.scrape_interval_secs > 0, "index.scrape_interval_secs must be > 0");
        anyhow::ensure!(self.bucket.root.is_some(), "bucket.root is required");
        anyhow::ensure!(!self.ocr.command.trim().is_empty(), "ocr.command must not be empty");
        if self.caption.backend == CaptionBackend::Ollama {
            anyhow::ensure!(!self.caption.url.trim().is_empty(), "caption.url is required for the ollama backend");
            anyhow::ensure!(!self.caption.model.trim().is_empty(), "caption.model is required for the ollama backend");
        }
        if self.embedding.backend == EmbeddingBackend::Http {
            anyhow::ensure!(!self.embedding.url.trim().is_empty(), "embedding.url is required for the http backend");
        }
        if self.web.enabled {
            anyhow::ensure!(self.web.port != 0, "web.port must not be 0");
        }
        Ok(())
    }

    /// Generate a default config file with comments.
    pub fn generate_default_config() -> String {
        r#"# snapdex configuration
# Place this file at:
#   - ./snapdex.config.toml (current directory)
#   - ~/.config/snapdex/snapdex.config.toml (Linux/macOS)
#   - ~/.snapdex/snapdex.config.toml

[index]
# Only objects whose key ends with this suffix are indexed
ext = ".jpg"

# Seconds between discovery cycles
scrape_interval_secs = 900

[bucket]
# Directory the screenshots are uploaded to
root = "~/Screenshots"

# Check the bucket this many times during startup (0 = don't check)
retry_attempts = 0
retry_secs = 15

[database]
# SQLite file (default: ~/.local/share/snapdex/snapdex.db)
# path = "/custom/path/snapdex.db"

[ocr]
command = "tesseract"

[caption]
# "ollama" or "placeholder"
backend = "placeholder"
url = "http://localhost:11434"
model = "llava"
prompt = "Describe this screenshot, please"
placeholder = ""

[embedding]
# "http", "local" or "disabled"
backend = "disabled"
url = "http://localhost:5000"

[web]
enabled = true
port = 4000
"#.to_string()
    }
}

fn expand(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}
