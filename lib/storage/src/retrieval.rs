use crate::index_store::{IndexSnapshot, IndexStore};
use newsrag_core::{
    similarity_score, Article, Distance, Embedder, Error, IndexConfig, IndexedRecord, Result, VectorIndex,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Configuration for a [`RetrievalService`]
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub distance: Distance,
    /// Characters of document text kept in [`SearchHit::preview`]
    pub preview_chars: usize,
    /// Records returned by [`RetrievalService::get_status`]
    pub status_sample: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            distance: Distance::SquaredEuclidean,
            preview_chars: 200,
            status_sample: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct AddReport {
    pub added: usize,
    pub duplicates: usize,
}

/// One ranked search result
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub title: String,
    pub url: String,
    pub source_name: String,
    pub published_at: String,
    /// `1 / (1 + distance)`
    pub score: f32,
    pub distance: f32,
    /// Full indexed text, for answer generation
    pub document: String,
    /// Leading characters of `document`, for display
    pub preview: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSample {
    pub id: String,
    pub title: String,
    pub url: String,
    pub document: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStatus {
    pub model_id: String,
    pub total_documents: usize,
    pub sample: Vec<StatusSample>,
}

/// Semantic retrieval over articles.
///
/// Owns the only write path into its [`VectorIndex`]. The embedder is fixed at
/// construction; a persisted index built by another model is refused.
pub struct RetrievalService {
    embedder: Arc<dyn Embedder>,
    index: VectorIndex,
    snapshots: Option<IndexStore>,
    config: RetrievalConfig,
    write_lock: Mutex<()>,
}

impl RetrievalService {
    /// Open a persistent service, restoring the snapshot in `snapshots` if any.
    pub fn open(embedder: Arc<dyn Embedder>, snapshots: IndexStore, config: RetrievalConfig) -> Result<Self> {
        let index_config = IndexConfig {
            dimension: embedder.dimension(),
            distance: config.distance,
        };

        let index = match snapshots.load()? {
            Some(snapshot) => {
                if snapshot.model_id != embedder.model_id() || snapshot.dimension != embedder.dimension() {
                    return Err(Error::ModelMismatch {
                        expected: embedder.model_id().to_string(),
                        found: format!("{} ({} dims)", snapshot.model_id, snapshot.dimension),
                    });
                }
                if snapshot.distance != config.distance {
                    warn!(
                        stored = %snapshot.distance,
                        configured = %config.distance,
                        "index snapshot was ranked with another distance metric, using the configured one"
                    );
                }
                let index = VectorIndex::from_records(index_config, snapshot.records)?;
                info!(records = index.count(), path = ?snapshots.path(), "vector index restored");
                index
            }
            None => {
                info!(path = ?snapshots.path(), "starting with an empty vector index");
                VectorIndex::new(index_config)
            }
        };

        info!(model = %embedder.model_id(), dimension = embedder.dimension(), "retrieval service ready");
        Ok(Self {
            embedder,
            index,
            snapshots: Some(snapshots),
            config,
            write_lock: Mutex::new(()),
        })
    }

    /// Non-persistent service
    pub fn in_memory(embedder: Arc<dyn Embedder>, config: RetrievalConfig) -> Self {
        let index = VectorIndex::new(IndexConfig {
            dimension: embedder.dimension(),
            distance: config.distance,
        });
        Self {
            embedder,
            index,
            snapshots: None,
            config,
            write_lock: Mutex::new(()),
        }
    }

    pub fn model_id(&self) -> &str {
        self.embedder.model_id()
    }

    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    pub fn count(&self) -> usize {
        self.index.count()
    }

    /// Embed and index every article whose id is not indexed yet.
    ///
    /// Each article is one step: embed, then insert. If embedding fails the
    /// articles before it stay committed and the error is returned.
    pub fn add_articles(&self, articles: &[Article]) -> Result<AddReport> {
        if articles.is_empty() {
            debug!("no articles to add");
            return Ok(AddReport::default());
        }

        let _guard = self.write_lock.lock();
        let mut report = AddReport::default();
        let mut outcome = Ok(());

        for article in articles {
            if self.index.contains(article.id()) {
                debug!(id = article.id(), "article already indexed");
                report.duplicates += 1;
                continue;
            }

            let document = article.full_text();
            let embedding = match self.embedder.embed(&document) {
                Ok(embedding) => embedding,
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            };

            let record = IndexedRecord {
                id: article.id().to_string(),
                embedding,
                document,
                metadata: article.metadata(),
            };
            match self.index.insert_if_absent(record) {
                Ok(true) => report.added += 1,
                Ok(false) => report.duplicates += 1,
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }

        if report.added > 0 {
            if let Err(e) = self.persist() {
                if outcome.is_ok() {
                    return Err(e);
                }
                warn!(error = %e, "failed to persist partially added batch");
            }
        }

        info!(added = report.added, duplicates = report.duplicates, "indexed articles");
        outcome.map(|_| report)
    }

    /// Rank indexed articles against a natural-language query, best first.
    pub fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        if top_k == 0 || self.index.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed(query)?;
        let hits: Vec<SearchHit> = self
            .index
            .nearest(&query_vector, top_k)?
            .into_iter()
            .map(|(record, distance)| self.to_hit(record, distance))
            .collect();

        debug!(query, results = hits.len(), "search complete");
        Ok(hits)
    }

    fn to_hit(&self, record: IndexedRecord, distance: f32) -> SearchHit {
        let preview = record.document.chars().take(self.config.preview_chars).collect();
        SearchHit {
            id: record.id,
            title: record.metadata.title,
            url: record.metadata.url,
            source_name: record.metadata.source_name,
            published_at: record.metadata.published_at,
            score: similarity_score(distance),
            distance,
            document: record.document,
            preview,
        }
    }

    pub fn get_status(&self) -> IndexStatus {
        let sample = self
            .index
            .peek(self.config.status_sample)
            .into_iter()
            .map(|record| StatusSample {
                id: record.id,
                title: record.metadata.title,
                url: record.metadata.url,
                document: record.document,
            })
            .collect();

        IndexStatus {
            model_id: self.embedder.model_id().to_string(),
            total_documents: self.index.count(),
            sample,
        }
    }

    /// Discard every indexed record, on disk as well.
    ///
    /// The empty snapshot is written first; if that fails the in-memory index
    /// is left untouched, so memory and disk never disagree.
    pub fn clear_storage(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.save_snapshot(Vec::new())?;
        self.index.reset();
        info!("vector index cleared");
        Ok(())
    }

    fn persist(&self) -> Result<()> {
        self.save_snapshot(self.index.records())
    }

    fn save_snapshot(&self, records: Vec<IndexedRecord>) -> Result<()> {
        if let Some(snapshots) = &self.snapshots {
            let snapshot = IndexSnapshot::new(
                self.embedder.model_id(),
                self.embedder.dimension(),
                self.config.distance,
                records,
            );
            snapshots.save(&snapshot)?;
        }
        Ok(())
    }
}
