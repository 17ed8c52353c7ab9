//! # newsrag Core
//!
//! Core library for the newsrag retrieval subsystem.
//!
//! This crate provides the in-memory building blocks:
//!
//! - [`Article`] - Immutable news article whose id is derived from its URL
//! - [`Vector`] - Dense embedding vector
//! - [`Embedder`] - Text to vector function pinned to one model
//! - [`VectorIndex`] - Deduplicating nearest-neighbor index over articles
//! - [`NewsFetcher`] - NewsAPI client producing articles
//!
//! ## Example
//!
//! ```rust
//! use newsrag_core::{Article, Embedder, HashingEmbedder, IndexConfig, IndexedRecord, VectorIndex};
//!
//! let embedder = HashingEmbedder::new(64).unwrap();
//! let index = VectorIndex::new(IndexConfig { dimension: 64, ..Default::default() });
//!
//! let article = Article::new(
//!     "Cats are mammals", "", "", "https://example.com/cats", "Example", "2024-01-01", None,
//! ).unwrap();
//! let record = IndexedRecord {
//!     id: article.id().to_string(),
//!     embedding: embedder.embed(&article.full_text()).unwrap(),
//!     document: article.full_text(),
//!     metadata: article.metadata(),
//! };
//! assert!(index.insert_if_absent(record.clone()).unwrap());
//! assert!(!index.insert_if_absent(record).unwrap());
//!
//! let query = embedder.embed("cats").unwrap();
//! let results = index.nearest(&query, 5).unwrap();
//! assert_eq!(results.len(), 1);
//! ```

pub mod article;
pub mod embedder;
pub mod error;
pub mod feed;
pub mod index;
pub mod vector;

pub use article::{article_id, parse_feed, Article, ArticleMetadata, ArticleRecord, FeedArticle, FeedSource};
pub use embedder::{Embedder, HashingEmbedder, HttpEmbedder, HttpEmbedderConfig};
pub use error::{Error, Result};
pub use feed::{FetchRequest, NewsApiConfig, NewsFetcher};
pub use index::{similarity_score, Distance, IndexConfig, IndexedRecord, VectorIndex};
pub use vector::Vector;
