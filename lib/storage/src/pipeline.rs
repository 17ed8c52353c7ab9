use crate::article_store::{ArticleStore, MergeReport};
use crate::retrieval::{AddReport, RetrievalService};
use newsrag_core::{Article, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Result of fanning a batch out to both stores.
///
/// The two legs are independent: one may succeed while the other fails.
/// Re-running the same batch is safe because both legs deduplicate by id.
#[derive(Debug)]
pub struct IngestReport {
    pub store: Result<MergeReport>,
    pub index: Result<AddReport>,
}

impl IngestReport {
    pub fn is_complete(&self) -> bool {
        self.store.is_ok() && self.index.is_ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub stored_articles: usize,
    pub indexed_articles: usize,
}

/// Ingestion path: durable article store plus semantic index
pub struct IngestPipeline {
    store: Arc<ArticleStore>,
    retrieval: Arc<RetrievalService>,
}

impl IngestPipeline {
    pub fn new(store: Arc<ArticleStore>, retrieval: Arc<RetrievalService>) -> Self {
        Self { store, retrieval }
    }

    pub fn store(&self) -> &Arc<ArticleStore> {
        &self.store
    }

    pub fn retrieval(&self) -> &Arc<RetrievalService> {
        &self.retrieval
    }

    /// Persist and index `articles`, running both legs concurrently.
    pub fn ingest(&self, articles: Vec<Article>) -> IngestReport {
        let (store, index) = rayon::join(
            || self.store.merge_insert(articles.clone()),
            || self.retrieval.add_articles(&articles),
        );

        let report = IngestReport { store, index };
        if let Err(e) = &report.store {
            warn!(error = %e, "article store leg of ingestion failed");
        }
        if let Err(e) = &report.index {
            warn!(error = %e, "index leg of ingestion failed");
        }
        if report.is_complete() {
            info!(articles = articles.len(), "ingestion complete");
        }
        report
    }

    /// Stored articles in stored order, optionally truncated to `limit`
    pub fn read_all(&self, limit: Option<usize>) -> Result<Vec<Article>> {
        let mut articles = self.store.read()?;
        if let Some(limit) = limit {
            articles.truncate(limit);
        }
        Ok(articles)
    }

    pub fn get_stats(&self) -> Result<Stats> {
        Ok(Stats {
            stored_articles: self.store.stats()?,
            indexed_articles: self.retrieval.count(),
        })
    }

    /// Empty both the article store and the index
    pub fn clear(&self) -> Result<()> {
        self.store.clear()?;
        self.retrieval.clear_storage()
    }
}
