//! OCR abstraction for snapdex.
//
// Provides a trait for extracting text from screenshots, backed by the
// tesseract command line tool.

use std::path::Path;
use async_trait::async_trait;
use anyhow::{Context, Result};
use tokio::process::Command;

/// Trait for OCR text extraction from an image on local disk.
#[async_trait]
pub trait OcrEngine: Send + Sync {
	async fn run(&self, path: &Path) -> Result<String>;
}

/// OCR engine that shells out to a tesseract binary.
#[derive(Debug, Clone)]
pub struct Tesseract {
	command: String,
}

impl Tesseract {
	/// Default binary name looked up on `PATH`.
	pub const DEFAULT_COMMAND: &'static str = "tesseract";

	/// Create an engine using `tesseract` from `PATH`.
	pub async fn new() -> Result<Self> {
		Self::with_command(Self::DEFAULT_COMMAND).await
	}

	/// Create an engine for a specific binary and verify it can be executed.
	pub async fn with_command(command: impl Into<String>) -> Result<Self> {
		let engine = Self { command: command.into() };
		engine.check().await
			.context("tesseract initialization failed")?;
		Ok(engine)
	}

	async fn check(&self) -> Result<()> {
		let output = Command::new(&self.command)
			.arg("--version")
			.output()
			.await
			.with_context(|| format!("testing tesseract installation ({})", self.command))?;
		if !output.status.success() {
			anyhow::bail!("`{} --version` exited with {}", self.command, output.status);
		}
		Ok(())
	}
}

#[async_trait]
impl OcrEngine for Tesseract {
	async fn run(&self, path: &Path) -> Result<String> {
		log::debug!("running ocr on {}", path.display());
		let output = Command::new(&self.command)
			.arg(path)
			.args(["stdout", "quiet"])
			.output()
			.await
			.context("running tesseract")?;

		if !output.status.success() {
			let stderr = String::from_utf8_lossy(&output.stderr);
			anyhow::bail!("tesseract exited with {}: {}", output.status, stderr.trim());
		}

		Ok(String::from_utf8_lossy(&output.stdout).into_owned())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	// `echo` accepts any arguments, which is enough to exercise the process plumbing.
	#[cfg(unix)]
	#[tokio::test]
	async fn runs_command_with_file_and_stdout_args() {
		let engine = Tesseract::with_command("echo").await.unwrap();
		let text = engine.run(Path::new("/tmp/shot.jpg")).await.unwrap();
		assert_eq!(text.trim(), "/tmp/shot.jpg stdout quiet");
	}

	#[tokio::test]
	async fn missing_binary_fails_initialization() {
		let err = Tesseract::with_command("snapdex-no-such-tesseract").await.unwrap_err();
		assert!(format!("{:#}", err).contains("tesseract initialization failed"));
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn non_zero_exit_is_an_error() {
		// `false --version` exits non-zero as well, so build the engine by hand.
		let engine = Tesseract { command: "false".to_string() };
		assert!(engine.run(Path::new("shot.jpg")).await.is_err());
	}
}
