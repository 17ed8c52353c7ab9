use actix_cors::Cors;
use actix_web::http::StatusCode;
use actix_web::{web, App, HttpResponse, HttpServer, Result as ActixResult};
use newsrag_core::{parse_feed, Article, ArticleRecord, Error, FeedArticle, FetchRequest, NewsFetcher};
use newsrag_storage::IngestPipeline;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

const DEFAULT_LIST_LIMIT: usize = 10;
const MAX_TOP_K: usize = 20;

#[derive(Deserialize)]
struct ListArticlesQuery {
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct IngestRequest {
    articles: Vec<FeedArticle>,
}

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default = "default_top_k")]
    top_k: usize,
}

fn default_top_k() -> usize {
    5
}

#[derive(Serialize)]
struct SearchResult {
    id: String,
    title: String,
    source_name: String,
    url: String,
    similarity_score: f32,
    content_preview: String,
}

#[derive(Serialize)]
struct SearchResponse {
    query: String,
    results: Vec<SearchResult>,
    total_results: usize,
}

pub struct RestApi;

impl RestApi {
    /// Serve until stopped. `/fetch-news` answers 503 when `fetcher` is `None`.
    pub async fn start(
        pipeline: Arc<IngestPipeline>,
        fetcher: Option<Arc<NewsFetcher>>,
        port: u16,
    ) -> std::io::Result<()> {
        info!("REST API listening on 0.0.0.0:{}", port);
        HttpServer::new(move || {
            let cors = Cors::default()
                .allow_any_origin()
                .allow_any_method()
                .allow_any_header()
                .max_age(3600);

            let mut app = App::new()
                .wrap(cors)
                .app_data(web::Data::new(pipeline.clone()));
            if let Some(fetcher) = &fetcher {
                app = app.app_data(web::Data::new(fetcher.clone()));
            }
            app.configure(RestApi::configure)
        })
        .bind(("0.0.0.0", port))?
        .run()
        .await
    }

    /// Register every route. Expects `web::Data<Arc<IngestPipeline>>` app data,
    /// and optionally `web::Data<Arc<NewsFetcher>>`.
    pub fn configure(cfg: &mut web::ServiceConfig) {
        cfg.route("/", web::get().to(root))
            .route("/fetch-news", web::post().to(fetch_news))
            .route("/stats", web::get().to(get_stats))
            .route("/articles", web::get().to(list_articles))
            .route("/articles", web::post().to(ingest_articles))
            .route("/search", web::post().to(search_articles))
            .route("/index/status", web::get().to(index_status))
            .route("/clear", web::delete().to(clear_all));
    }
}

fn status_for(e: &Error) -> StatusCode {
    match e {
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        e if e.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(e: &Error) -> HttpResponse {
    HttpResponse::build(status_for(e)).json(serde_json::json!({
        "error": e.to_string(),
        "retryable": e.is_retryable(),
    }))
}

fn bad_request(message: &str) -> HttpResponse {
    HttpResponse::BadRequest().json(serde_json::json!({
        "error": message
    }))
}

/// Run a blocking core call on the blocking pool.
async fn run_blocking<F, T>(f: F) -> Result<T, HttpResponse>
where
    F: FnOnce() -> newsrag_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    match web::block(f).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(error_response(&e)),
        Err(e) => Err(HttpResponse::InternalServerError().json(serde_json::json!({
            "error": e.to_string()
        }))),
    }
}

async fn root() -> ActixResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "newsrag retrieval API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
    })))
}

async fn get_stats(pipeline: web::Data<Arc<IngestPipeline>>) -> ActixResult<HttpResponse> {
    let pipeline = pipeline.get_ref().clone();
    match run_blocking(move || pipeline.get_stats()).await {
        Ok(stats) => Ok(HttpResponse::Ok().json(stats)),
        Err(resp) => Ok(resp),
    }
}

async fn list_articles(
    pipeline: web::Data<Arc<IngestPipeline>>,
    query: web::Query<ListArticlesQuery>,
) -> ActixResult<HttpResponse> {
    let pipeline = pipeline.get_ref().clone();
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);

    match run_blocking(move || pipeline.read_all(Some(limit))).await {
        Ok(articles) => {
            let records: Vec<ArticleRecord> = articles.iter().map(ArticleRecord::from).collect();
            Ok(HttpResponse::Ok().json(records))
        }
        Err(resp) => Ok(resp),
    }
}

async fn ingest_articles(
    pipeline: web::Data<Arc<IngestPipeline>>,
    req: web::Json<IngestRequest>,
) -> ActixResult<HttpResponse> {
    let articles = parse_feed(req.into_inner().articles);
    if articles.is_empty() {
        return Ok(bad_request("No valid articles in request"));
    }
    ingest_response(pipeline.get_ref().clone(), articles).await
}

async fn fetch_news(
    pipeline: web::Data<Arc<IngestPipeline>>,
    fetcher: Option<web::Data<Arc<NewsFetcher>>>,
    req: web::Json<FetchRequest>,
) -> ActixResult<HttpResponse> {
    let Some(fetcher) = fetcher else {
        return Ok(HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "error": "news fetching is not configured"
        })));
    };

    let request = req.into_inner();
    if let Err(e) = request.validate() {
        return Ok(error_response(&e));
    }

    let fetcher = fetcher.get_ref().clone();
    let articles = match run_blocking(move || fetcher.fetch(&request)).await {
        Ok(articles) => articles,
        Err(resp) => return Ok(resp),
    };
    if articles.is_empty() {
        return Ok(HttpResponse::NotFound().json(serde_json::json!({
            "error": "No articles found for the given parameters"
        })));
    }
    ingest_response(pipeline.get_ref().clone(), articles).await
}

/// Ingest `articles` and describe both legs; a failed leg sets the status.
async fn ingest_response(pipeline: Arc<IngestPipeline>, articles: Vec<Article>) -> ActixResult<HttpResponse> {
    let records: Vec<ArticleRecord> = articles.iter().map(ArticleRecord::from).collect();
    let report = match web::block(move || pipeline.ingest(articles)).await {
        Ok(report) => report,
        Err(e) => {
            return Ok(HttpResponse::InternalServerError().json(serde_json::json!({
                "error": e.to_string()
            })));
        }
    };

    let status = match (&report.store, &report.index) {
        (Err(e), _) | (_, Err(e)) => status_for(e),
        _ => StatusCode::OK,
    };
    let store = match &report.store {
        Ok(merge) => serde_json::json!(merge),
        Err(e) => serde_json::json!({ "error": e.to_string() }),
    };
    let index = match &report.index {
        Ok(added) => serde_json::json!(added),
        Err(e) => serde_json::json!({ "error": e.to_string() }),
    };

    Ok(HttpResponse::build(status).json(serde_json::json!({
        "articles": records,
        "store": store,
        "index": index,
    })))
}

async fn search_articles(
    pipeline: web::Data<Arc<IngestPipeline>>,
    req: web::Json<SearchRequest>,
) -> ActixResult<HttpResponse> {
    let SearchRequest { query, top_k } = req.into_inner();
    if query.trim().is_empty() {
        return Ok(bad_request("query must not be empty"));
    }
    if !(1..=MAX_TOP_K).contains(&top_k) {
        return Ok(bad_request("top_k must be between 1 and 20"));
    }

    let retrieval = pipeline.retrieval().clone();
    let search_query = query.clone();
    let hits = match run_blocking(move || retrieval.search(&search_query, top_k)).await {
        Ok(hits) => hits,
        Err(resp) => return Ok(resp),
    };

    let results: Vec<SearchResult> = hits
        .into_iter()
        .map(|hit| SearchResult {
            id: hit.id,
            title: hit.title,
            source_name: hit.source_name,
            url: hit.url,
            similarity_score: hit.score,
            content_preview: hit.preview,
        })
        .collect();

    Ok(HttpResponse::Ok().json(SearchResponse {
        query,
        total_results: results.len(),
        results,
    }))
}

async fn index_status(pipeline: web::Data<Arc<IngestPipeline>>) -> ActixResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(pipeline.retrieval().get_status()))
}

async fn clear_all(pipeline: web::Data<Arc<IngestPipeline>>) -> ActixResult<HttpResponse> {
    let pipeline = pipeline.get_ref().clone();
    match run_blocking(move || pipeline.clear()).await {
        Ok(()) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "status": "cleared"
        }))),
        Err(resp) => Ok(resp),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test;
    use newsrag_core::{HashingEmbedder, NewsApiConfig};
    use std::collections::HashMap;
    use newsrag_storage::{ArticleStore, RetrievalConfig, RetrievalService};

    fn pipeline(dir: &std::path::Path) -> Arc<IngestPipeline> {
        let store = Arc::new(ArticleStore::open(dir.join("articles.json")).unwrap());
        let retrieval = Arc::new(RetrievalService::in_memory(
            Arc::new(HashingEmbedder::new(256).unwrap()),
            RetrievalConfig::default(),
        ));
        Arc::new(IngestPipeline::new(store, retrieval))
    }

    fn feed() -> serde_json::Value {
        serde_json::json!({
            "articles": [
                {
                    "source": {"id": null, "name": "Daily Planet"},
                    "author": "Lois Lane",
                    "title": "Rocket launch delayed by weather",
                    "description": "Launch pushed to Friday",
                    "url": "https://planet.example/rocket",
                    "publishedAt": "2024-05-01T10:00:00Z",
                    "content": "The rocket will now launch on Friday."
                },
                {
                    "source": {"name": "Gazette"},
                    "title": "Local cat show draws crowds",
                    "url": "https://gazette.example/cats",
                    "publishedAt": "2024-05-02T09:00:00Z",
                    "content": "Hundreds of cats competed."
                }
            ]
        })
    }

    #[actix_web::test]
    async fn test_ingest_search_stats_clear() {
        let dir = tempfile::tempdir().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(pipeline(dir.path())))
                .configure(RestApi::configure),
        )
        .await;

        let req = test::TestRequest::post().uri("/articles").set_json(feed()).to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["articles"].as_array().unwrap().len(), 2);
        assert_eq!(body["store"]["new"], 2);
        assert_eq!(body["index"]["added"], 2);

        let req = test::TestRequest::post()
            .uri("/search")
            .set_json(serde_json::json!({"query": "rocket launch", "top_k": 2}))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["total_results"], 2);
        assert_eq!(body["results"][0]["url"], "https://planet.example/rocket");

        let req = test::TestRequest::get().uri("/stats").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["stored_articles"], 2);
        assert_eq!(body["indexed_articles"], 2);

        let req = test::TestRequest::get().uri("/articles?limit=1").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.as_array().unwrap().len(), 1);

        let req = test::TestRequest::delete().uri("/clear").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let req = test::TestRequest::get().uri("/index/status").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["total_documents"], 0);
    }

    #[actix_web::test]
    async fn test_search_validation() {
        let dir = tempfile::tempdir().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(pipeline(dir.path())))
                .configure(RestApi::configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/search")
            .set_json(serde_json::json!({"query": "x", "top_k": 21}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri("/search")
            .set_json(serde_json::json!({"query": "anything"}))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["total_results"], 0);

        let req = test::TestRequest::post()
            .uri("/articles")
            .set_json(serde_json::json!({"articles": [{"title": "no url"}]}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_status_mapping() {
        assert_eq!(status_for(&Error::Validation("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(&Error::store_unavailable("busy", true)),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&Error::embedding("bad key", false)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    fn unauthorized(q: &HashMap<String, String>) -> Option<HttpResponse> {
        if q.get("apiKey").map(String::as_str) == Some("test-key") {
            return None;
        }
        Some(HttpResponse::Unauthorized().json(serde_json::json!({
            "status": "error",
            "code": "apiKeyInvalid",
            "message": "Your API key is invalid"
        })))
    }

    async fn mock_headlines(q: web::Query<HashMap<String, String>>) -> HttpResponse {
        if let Some(resp) = unauthorized(&q) {
            return resp;
        }
        let country = q.get("country").cloned().unwrap_or_default();
        let category = q.get("category").cloned().unwrap_or_default();
        let articles = if category == "empty" {
            serde_json::json!([])
        } else {
            serde_json::json!([
                {
                    "source": {"id": null, "name": "Wire"},
                    "author": null,
                    "title": format!("{} {} headline", country, category),
                    "description": null,
                    "url": format!("https://wire.example/{}/{}/1", country, category),
                    "publishedAt": "2024-05-01T10:00:00Z",
                    "content": null
                },
                {
                    "source": {"name": "Wire"},
                    "title": format!("{} {} roundup", country, category),
                    "url": format!("https://wire.example/{}/{}/2", country, category),
                    "publishedAt": "2024-05-01T11:00:00Z"
                },
                {"title": "[Removed]", "url": null}
            ])
        };
        HttpResponse::Ok().json(serde_json::json!({"status": "ok", "articles": articles}))
    }

    async fn mock_everything(q: web::Query<HashMap<String, String>>) -> HttpResponse {
        if let Some(resp) = unauthorized(&q) {
            return resp;
        }
        let query = q.get("q").cloned().unwrap_or_default();
        HttpResponse::Ok().json(serde_json::json!({
            "status": "ok",
            "articles": [{
                "source": {"name": "Journal"},
                "title": format!("{} explained", query),
                "url": format!("https://journal.example/{}", query.replace(' ', "-")),
                "publishedAt": "2024-05-02T08:00:00Z",
                "content": "Long read."
            }]
        }))
    }

    /// Serve a fake NewsAPI on its own thread and return its address.
    fn spawn_news_api() -> std::net::SocketAddr {
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            actix_web::rt::System::new().block_on(async move {
                let server = HttpServer::new(|| {
                    App::new()
                        .route("/v2/top-headlines", web::get().to(mock_headlines))
                        .route("/v2/everything", web::get().to(mock_everything))
                })
                .workers(1)
                .bind(("127.0.0.1", 0))
                .unwrap();
                tx.send(server.addrs()[0]).unwrap();
                server.run().await.unwrap();
            })
        });
        rx.recv().unwrap()
    }

    async fn news_fetcher(addr: std::net::SocketAddr, api_key: &str) -> Arc<NewsFetcher> {
        let config = NewsApiConfig {
            base_url: format!("http://{}/v2", addr),
            api_key: api_key.to_string(),
            ..Default::default()
        };
        // the blocking client must be built off the async thread
        Arc::new(web::block(move || NewsFetcher::new(config)).await.unwrap().unwrap())
    }

    #[actix_web::test]
    async fn test_fetch_news_ingests_page() {
        let addr = spawn_news_api();
        let dir = tempfile::tempdir().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(pipeline(dir.path())))
                .app_data(web::Data::new(news_fetcher(addr, "test-key").await))
                .configure(RestApi::configure),
        )
        .await;

        // headlines by country and category; the record without a url is dropped
        let req = test::TestRequest::post()
            .uri("/fetch-news")
            .set_json(serde_json::json!({"country": "gb", "category": "science"}))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        let articles = body["articles"].as_array().unwrap();
        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0]["title"], "gb science headline");
        assert_eq!(articles[0]["description"], "");
        assert_eq!(body["store"]["new"], 2);
        assert_eq!(body["index"]["added"], 2);

        // a custom query switches to keyword search
        let req = test::TestRequest::post()
            .uri("/fetch-news")
            .set_json(serde_json::json!({"query": "solar power", "page_size": 5}))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["articles"][0]["title"], "solar power explained");
        assert_eq!(body["store"]["total"], 3);

        // fetching the same page again adds nothing
        let req = test::TestRequest::post()
            .uri("/fetch-news")
            .set_json(serde_json::json!({"country": "gb", "category": "science"}))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["store"]["new"], 0);
        assert_eq!(body["index"]["duplicates"], 2);

        let req = test::TestRequest::post()
            .uri("/fetch-news")
            .set_json(serde_json::json!({"category": "empty"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::post()
            .uri("/fetch-news")
            .set_json(serde_json::json!({"page_size": 50}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_fetch_news_upstream_rejection() {
        let addr = spawn_news_api();
        let dir = tempfile::tempdir().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(pipeline(dir.path())))
                .app_data(web::Data::new(news_fetcher(addr, "wrong-key").await))
                .configure(RestApi::configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/fetch-news")
            .set_json(serde_json::json!({}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().unwrap().contains("apiKeyInvalid"));
        assert_eq!(body["retryable"], false);
    }

    #[actix_web::test]
    async fn test_fetch_news_requires_fetcher() {
        let dir = tempfile::tempdir().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(pipeline(dir.path())))
                .configure(RestApi::configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/fetch-news")
            .set_json(serde_json::json!({}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
