pub mod article_store;
pub mod index_store;
pub mod pipeline;
pub mod retrieval;

pub use article_store::{ArticleStore, MergeReport};
pub use index_store::{IndexSnapshot, IndexStore};
pub use pipeline::{IngestPipeline, IngestReport, Stats};
pub use retrieval::{AddReport, IndexStatus, RetrievalConfig, RetrievalService, SearchHit, StatusSample};
