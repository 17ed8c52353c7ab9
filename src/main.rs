use clap::{Parser, ValueEnum};
use newsrag_api::RestApi;
use newsrag_core::{
    Distance, Embedder, HashingEmbedder, HttpEmbedder, HttpEmbedderConfig, NewsApiConfig, NewsFetcher,
};
use newsrag_storage::{ArticleStore, IndexStore, IngestPipeline, RetrievalConfig, RetrievalService};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EmbedderKind {
    /// OpenAI-compatible embeddings endpoint serving a sentence-embedding model
    Http,
    /// Offline feature hashing; lexical only, no synonyms
    Hashing,
}

/// Retrieval service for news articles: deduplicating store plus semantic search
#[derive(Parser, Debug)]
#[command(name = "newsrag")]
#[command(about = "News article store with semantic search", long_about = None)]
struct Args {
    /// Path to the data directory
    #[arg(short, long, default_value = "./data", env = "NEWSRAG_DATA_DIR")]
    data_dir: PathBuf,

    /// HTTP API port
    #[arg(long, default_value_t = 8000, env = "NEWSRAG_HTTP_PORT")]
    http_port: u16,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Embedding backend
    #[arg(long, value_enum, default_value_t = EmbedderKind::Http)]
    embedder: EmbedderKind,

    /// Base URL of the embeddings endpoint (http embedder)
    #[arg(long, default_value = "http://localhost:11434/v1", env = "EMBEDDING_URL")]
    embedding_url: String,

    /// Embedding model name (http embedder)
    #[arg(long, default_value = "all-minilm", env = "EMBEDDING_MODEL")]
    embedding_model: String,

    /// API key sent as a bearer token (http embedder)
    #[arg(long, env = "EMBEDDING_API_KEY", hide_env_values = true)]
    embedding_api_key: Option<String>,

    /// Embedding vector length
    #[arg(long, default_value_t = 384)]
    embedding_dim: usize,

    /// Per-request embedding timeout in seconds (http embedder)
    #[arg(long, default_value_t = 30)]
    embed_timeout_secs: u64,

    /// Distance metric: l2, euclidean or cosine
    #[arg(long, default_value = "l2")]
    distance: Distance,

    /// Characters of article text returned as a search preview
    #[arg(long, default_value_t = 200)]
    preview_chars: usize,

    /// NewsAPI key; without it `/fetch-news` is disabled
    #[arg(long, env = "NEWS_API_KEY", hide_env_values = true)]
    news_api_key: Option<String>,

    /// NewsAPI base URL
    #[arg(long, default_value = "https://newsapi.org/v2", env = "NEWS_API_URL")]
    news_api_url: String,

    /// Per-request news fetch timeout in seconds
    #[arg(long, default_value_t = 30)]
    news_timeout_secs: u64,
}

fn build_embedder(args: &Args) -> anyhow::Result<Arc<dyn Embedder>> {
    let embedder: Arc<dyn Embedder> = match args.embedder {
        EmbedderKind::Hashing => Arc::new(HashingEmbedder::new(args.embedding_dim)?),
        EmbedderKind::Http => Arc::new(HttpEmbedder::new(HttpEmbedderConfig {
            base_url: args.embedding_url.clone(),
            model: args.embedding_model.clone(),
            api_key: args.embedding_api_key.clone(),
            dimension: args.embedding_dim,
            timeout: Duration::from_secs(args.embed_timeout_secs),
        })?),
    };
    Ok(embedder)
}

fn build_fetcher(args: &Args) -> anyhow::Result<Option<Arc<NewsFetcher>>> {
    match args.news_api_key.as_deref().filter(|k| !k.trim().is_empty()) {
        Some(key) => {
            let fetcher = NewsFetcher::new(NewsApiConfig {
                base_url: args.news_api_url.clone(),
                api_key: key.to_string(),
                timeout: Duration::from_secs(args.news_timeout_secs),
            })?;
            Ok(Some(Arc::new(fetcher)))
        }
        None => {
            warn!("NEWS_API_KEY not set, news fetching disabled");
            Ok(None)
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting newsrag v{}", env!("CARGO_PKG_VERSION"));
    info!("Data directory: {:?}", args.data_dir);
    info!("HTTP API port: {}", args.http_port);

    let embedder = build_embedder(&args)?;
    info!("Embedding model: {}", embedder.model_id());

    let store = Arc::new(ArticleStore::open(args.data_dir.join("articles.json"))?);
    let snapshots = IndexStore::new(args.data_dir.join("index").join("vectors.bin"))?;
    let retrieval = Arc::new(RetrievalService::open(
        embedder,
        snapshots,
        RetrievalConfig {
            distance: args.distance,
            preview_chars: args.preview_chars,
            ..Default::default()
        },
    )?);
    let pipeline = Arc::new(IngestPipeline::new(store, retrieval));
    info!("Storage initialized");
    let fetcher = build_fetcher(&args)?;

    // The blocking HTTP clients must be released outside the server runtime.
    let server_pipeline = pipeline.clone();
    let server_fetcher = fetcher.clone();
    let http_port = args.http_port;
    let sys = actix_web::rt::System::new();
    sys.block_on(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
            }
            res = RestApi::start(server_pipeline, server_fetcher, http_port) => {
                match res {
                    Ok(()) => info!("HTTP server stopped"),
                    Err(e) => error!("HTTP server error: {}", e),
                }
            }
        }
    });

    info!("Shutting down...");
    drop(sys);
    drop(pipeline);
    drop(fetcher);
    Ok(())
}
