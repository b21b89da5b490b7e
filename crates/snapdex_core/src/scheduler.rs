//! Periodic discovery.
//!
//! Runs a discovery cycle right away and then once per interval until the
//! cancellation token fires. The interval is measured from the end of the
//! previous cycle, so cycles never overlap.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::Indexer;

/// Anything that can run one discovery cycle.
#[async_trait]
pub trait ListIndexer: Send + Sync {
    async fn index_new_list(&self, ext: &str) -> Result<()>;
}

#[async_trait]
impl ListIndexer for Indexer {
    async fn index_new_list(&self, ext: &str) -> Result<()> {
        Indexer::index_new_list(self, ext).await
    }
}

/// Drives an indexer on a fixed schedule.
pub struct IndexRunner<I: ?Sized> {
    indexer: Arc<I>,
    ext: String,
    interval: Duration,
}

impl<I: ListIndexer + ?Sized> IndexRunner<I> {
    pub fn new(indexer: Arc<I>, ext: impl Into<String>, interval: Duration) -> Self {
        Self { indexer, ext: ext.into(), interval }
    }

    /// Run until `cancel` fires (`Ok`) or a cycle fails (`Err`).
    ///
    /// A cycle already in progress is allowed to finish after cancellation.
    /// Failed cycles are not retried here; restarting is left to whoever
    /// supervises the process.
    pub async fn start(&self, cancel: CancellationToken) -> Result<()> {
        log::info!("running indexer for {} every {:?}", self.ext, self.interval);
        loop {
            if cancel.is_cancelled() {
                break;
            }

            self.indexer
                .index_new_list(&self.ext)
                .await
                .context("indexing new")?;

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
        log::info!("indexer stopped");
        Ok(())
    }
}
