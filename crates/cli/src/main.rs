//! CLI entrypoint for snapdex.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use bucket::LocalBucket;
use caption::{OllamaClient, PlaceholderCaption};
use embed::{HttpEmbedder, LocalImageEmbedder, NullEmbedder};
use ocr::Tesseract;
use search::{http, ImageSearcher};
use snapdex_core::config::{CaptionBackend, EmbeddingBackend, SnapdexConfig};
use snapdex_core::{
	CaptionSmith, ImageEmbedder, IndexEvent, IndexRunner, Indexer, Tracker,
};
use store::SqliteImageRepo;

#[derive(Parser)]
#[command(name = "snapdex")]
#[command(about = "snapdex: searchable index of your uploaded screenshots", long_about = None)]
struct Cli {
	/// Config file (default: search the standard locations)
	#[arg(long, global = true)]
	config: Option<PathBuf>,
	/// Override index.ext
	#[arg(long, global = true)]
	ext: Option<String>,
	/// Override index.scrape_interval_secs
	#[arg(long, global = true)]
	interval_secs: Option<u64>,
	/// Override web.port
	#[arg(long, global = true)]
	port: Option<u16>,
	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand)]
enum Commands {
	/// Index periodically and serve the search API
	Run,
	/// Run a single discovery cycle
	Index,
	/// Search screenshot descriptions
	Search {
		query: String,
		#[arg(long, default_value_t = 1)]
		page: u32,
		#[arg(long, default_value_t = 20)]
		per_page: u32,
		#[arg(long)]
		json: bool,
	},
	/// Delete a screenshot from the bucket and the index
	Delete {
		file_id: String,
	},
	/// Print a default config file
	Config,
}

#[tokio::main]
async fn main() -> Result<()> {
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
	let cli = Cli::parse();

	if let Commands::Config = cli.command {
		print!("{}", SnapdexConfig::generate_default_config());
		return Ok(());
	}

	let config = load_config(&cli)?;
	match cli.command {
		Commands::Run => run(&config).await,
		Commands::Index => index_once(&config).await,
		Commands::Search { query, page, per_page, json } => {
			search_cmd(&config, &query, page, per_page, json).await
		}
		Commands::Delete { file_id } => {
			let searcher = ImageSearcher::new(open_repo(&config)?, open_bucket(&config)?, Arc::new(Tracker::new()));
			searcher.delete(&file_id).await?;
			println!("deleted {}", file_id);
			Ok(())
		}
		Commands::Config => Ok(()),
	}
}

fn load_config(cli: &Cli) -> Result<SnapdexConfig> {
	let mut config = match &cli.config {
		Some(path) => SnapdexConfig::load_from(path)?,
		None => SnapdexConfig::load()?,
	};
	if let Some(ext) = &cli.ext {
		config.index.ext = ext.clone();
	}
	if let Some(secs) = cli.interval_secs {
		config.index.scrape_interval_secs = secs;
	}
	if let Some(port) = cli.port {
		config.web.port = port;
	}
	config.validate().context("invalid configuration")?;
	Ok(config)
}

fn open_bucket(config: &SnapdexConfig) -> Result<Arc<LocalBucket>> {
	let root = config.bucket_root().context("bucket.root is required")?;
	Ok(Arc::new(LocalBucket::new(root)))
}

fn open_repo(config: &SnapdexConfig) -> Result<Arc<SqliteImageRepo>> {
	let path = config.database_path();
	log::info!("using database {}", path.display());
	Ok(Arc::new(SqliteImageRepo::open(&path)?))
}

async fn build_indexer(
	config: &SnapdexConfig,
	repo: Arc<SqliteImageRepo>,
	bucket: Arc<LocalBucket>,
	tracker: Arc<Tracker>,
) -> Result<Indexer> {
	if config.bucket.retry_attempts > 0 {
		bucket
			.check_connectivity(config.bucket.retry_attempts, Duration::from_secs(config.bucket.retry_secs))
			.await?;
	}

	let ocr = Tesseract::with_command(config.ocr.command.clone()).await
		.context("creating ocr")?;

	let captioner: Arc<dyn CaptionSmith> = match config.caption.backend {
		CaptionBackend::Ollama => Arc::new(
			OllamaClient::with_model(&config.caption.url, &config.caption.model, &config.caption.prompt).await
				.context("creating ollama client")?,
		),
		CaptionBackend::Placeholder => Arc::new(PlaceholderCaption::new(config.caption.placeholder.clone())),
	};

	let embedder: Arc<dyn ImageEmbedder> = match config.embedding.backend {
		EmbeddingBackend::Http => Arc::new(HttpEmbedder::new(&config.embedding.url)?),
		EmbeddingBackend::Local => Arc::new(LocalImageEmbedder::new().context("loading image embedding model")?),
		EmbeddingBackend::Disabled => Arc::new(NullEmbedder),
	};

	Ok(Indexer::new(repo, bucket, Arc::new(ocr), captioner, embedder, tracker))
}

async fn run(config: &SnapdexConfig) -> Result<()> {
	let tracker = Arc::new(Tracker::new());
	// One connection shared by the indexer and the read surface.
	let repo = open_repo(config)?;
	let bucket = open_bucket(config)?;
	let indexer = Arc::new(build_indexer(config, repo.clone(), bucket.clone(), tracker.clone()).await?);
	let runner = IndexRunner::new(indexer, config.index.ext.clone(), config.scrape_interval());

	let cancel = CancellationToken::new();
	tokio::spawn({
		let cancel = cancel.clone();
		async move {
			if tokio::signal::ctrl_c().await.is_ok() {
				log::info!("shutting down");
				cancel.cancel();
			}
		}
	});

	// Whichever side stops first takes the other one down with it.
	let indexing = async {
		let res = runner.start(cancel.clone()).await;
		cancel.cancel();
		res
	};

	if !config.web.enabled {
		return indexing.await;
	}

	let searcher = Arc::new(ImageSearcher::new(repo, bucket, tracker));
	let serving = async {
		let res = http::serve(http::router(searcher), config.web.port, cancel.clone()).await;
		cancel.cancel();
		res
	};

	let (indexed, served) = tokio::join!(indexing, serving);
	indexed?;
	served
}

async fn index_once(config: &SnapdexConfig) -> Result<()> {
	let indexer = build_indexer(config, open_repo(config)?, open_bucket(config)?, Arc::new(Tracker::new())).await?;
	let summary = indexer
		.index_new_list_with_progress(&config.index.ext, |event| match event {
			IndexEvent::FileIndexed(key) => println!("indexed {}", key),
			IndexEvent::FileSkipped(key) => println!("skipped {}", key),
			IndexEvent::LookupFailed(key, e) => eprintln!("lookup failed {}: {}", key, e),
			IndexEvent::FileError(key, e) => eprintln!("failed {}: {}", key, e),
			IndexEvent::Done => {}
		})
		.await?;
	println!(
		"done: {} listed, {} indexed, {} skipped, {} failed",
		summary.listed,
		summary.indexed,
		summary.skipped,
		summary.failed + summary.lookup_failed
	);
	Ok(())
}

async fn search_cmd(config: &SnapdexConfig, query: &str, page: u32, per_page: u32, json: bool) -> Result<()> {
	let searcher = ImageSearcher::new(open_repo(config)?, open_bucket(config)?, Arc::new(Tracker::new()));
	let images = searcher.search(query, page, per_page).await?;

	if json {
		let views: Vec<http::ImageView> = images
			.into_iter()
			.map(|i| http::ImageView { file_id: i.file_id, description: i.description, last_modified: i.last_modified })
			.collect();
		println!("{}", serde_json::to_string_pretty(&views)?);
		return Ok(());
	}

	if images.is_empty() {
		println!("no results");
		return Ok(());
	}
	for image in images {
		println!("{}  {}", image.last_modified.to_rfc3339(), image.file_id);
		for line in image.description.lines() {
			println!("    {}", line);
		}
	}
	Ok(())
}
