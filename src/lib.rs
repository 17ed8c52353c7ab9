//! # newsrag
//!
//! Retrieval core for a news question-answering service: a deduplicating
//! article store and a semantic index over the same articles.
//!
//! ## Quick Start
//!
//! ### As a Server
//!
//! ```bash
//! newsrag --data-dir ./data --http-port 8000
//! ```
//!
//! ### As a Library
//!
//! ```rust,no_run
//! use newsrag::prelude::*;
//! use std::sync::Arc;
//!
//! let embedder = Arc::new(HttpEmbedder::new(HttpEmbedderConfig::default()).unwrap());
//! let store = Arc::new(ArticleStore::open("./data/articles.json").unwrap());
//! let snapshots = IndexStore::new("./data/index/vectors.bin").unwrap();
//! let retrieval = Arc::new(RetrievalService::open(embedder, snapshots, RetrievalConfig::default()).unwrap());
//! let pipeline = IngestPipeline::new(store, retrieval.clone());
//!
//! let article = Article::new(
//!     "Cats are mammals", "", "", "https://example.com/cats", "Example", "2024-01-01", None,
//! ).unwrap();
//! let report = pipeline.ingest(vec![article]);
//! assert!(report.is_complete());
//!
//! for hit in retrieval.search("feline pets", 5).unwrap() {
//!     println!("{:.3} {}", hit.score, hit.title);
//! }
//! ```
//!
//! ## Crate Structure
//!
//! - `newsrag-core` - Articles, embedders, the NewsAPI client and the in-memory vector index
//! - `newsrag-storage` - Article store, index snapshots and the ingestion pipeline
//! - `newsrag-api` - REST API

pub use newsrag_core::{
    article_id, parse_feed, similarity_score, Article, ArticleMetadata, Distance, Embedder, Error, FeedArticle,
    FetchRequest, HashingEmbedder, HttpEmbedder, HttpEmbedderConfig, IndexConfig, IndexedRecord, NewsApiConfig,
    NewsFetcher, Result, Vector, VectorIndex,
};

pub use newsrag_storage::{
    AddReport, ArticleStore, IndexStatus, IndexStore, IngestPipeline, IngestReport, MergeReport, RetrievalConfig,
    RetrievalService, SearchHit, Stats,
};

pub use newsrag_api::RestApi;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        Article, ArticleStore, Distance, Embedder, Error, FetchRequest, HashingEmbedder, HttpEmbedder,
        HttpEmbedderConfig, IndexStore, IngestPipeline, NewsFetcher, Result, RetrievalConfig, RetrievalService,
        SearchHit, Vector,
    };
}
