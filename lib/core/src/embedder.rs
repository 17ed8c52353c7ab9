//! Embedding functions
//!
//! An [`Embedder`] turns text into a fixed-length [`Vector`]. Every vector in
//! an index must come from the same embedder: vectors from different models
//! are not comparable, so each embedder reports a [`model_id`](Embedder::model_id)
//! that the index snapshot is pinned to.
//!
//! Two implementations ship with the crate:
//!
//! - [`HttpEmbedder`] - any OpenAI-compatible `/embeddings` endpoint, e.g. a
//!   local server hosting all-MiniLM-L6-v2. This is the semantic model the
//!   server uses by default.
//! - [`HashingEmbedder`] - offline feature hashing over character trigrams and
//!   words. Deterministic, no model download, but purely lexical: it does not
//!   know that "feline" and "cats" are related. Meant for tests and offline use.

use crate::{Error, Result, Vector};
use reqwest::blocking::Client;
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::debug;

/// Default dimension for the hashing embedder
pub const DEFAULT_HASHING_DIM: usize = 384;

/// Text to vector function with a stable model identity
pub trait Embedder: Send + Sync {
    /// Identifier of the model and version producing the vectors
    fn model_id(&self) -> &str;

    /// Length of every vector returned by [`embed`](Embedder::embed)
    fn dimension(&self) -> usize;

    /// Embed one text. Empty text still yields a vector of the right length.
    fn embed(&self, text: &str) -> Result<Vector>;
}

/// Feature-hashing embedder over character trigrams and whole words
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dim: usize,
    model_id: String,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Result<Self> {
        if dim == 0 {
            return Err(Error::InvalidConfig("embedding dimension must be positive".to_string()));
        }
        Ok(Self {
            dim,
            model_id: format!("hashing-trigram-v1/{}", dim),
        })
    }

    #[inline]
    fn bucket(&self, feature: &str) -> usize {
        let digest = Sha256::digest(feature.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        (u64::from_le_bytes(head) % self.dim as u64) as usize
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self {
            dim: DEFAULT_HASHING_DIM,
            model_id: format!("hashing-trigram-v1/{}", DEFAULT_HASHING_DIM),
        }
    }
}

impl Embedder for HashingEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn embed(&self, text: &str) -> Result<Vector> {
        let mut components = vec![0.0f32; self.dim];
        let normalized = text.to_lowercase();

        for trigram in trigrams(&normalized) {
            components[self.bucket(&trigram)] += 1.0;
        }

        // words carry more signal than trigrams
        for word in normalized.split_whitespace() {
            components[self.bucket(word)] += 2.0;
        }

        let mut vector = Vector::new(components);
        vector.normalize();
        Ok(vector)
    }
}

fn trigrams(s: &str) -> Vec<String> {
    let padded = format!("  {}  ", s);
    let chars: Vec<char> = padded.chars().collect();
    chars.windows(3).map(|w| w.iter().collect()).collect()
}

/// Settings for [`HttpEmbedder`]
#[derive(Debug, Clone)]
pub struct HttpEmbedderConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub dimension: usize,
    pub timeout: Duration,
}

impl Default for HttpEmbedderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".to_string(),
            model: "all-minilm".to_string(),
            api_key: None,
            dimension: 384,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Blocking client for OpenAI-compatible embedding endpoints.
///
/// No retries happen here; retryable failures are flagged on the returned
/// error and left to the caller.
#[derive(Clone)]
pub struct HttpEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    model_id: String,
    dimension: usize,
}

impl HttpEmbedder {
    pub fn new(config: HttpEmbedderConfig) -> Result<Self> {
        if config.model.trim().is_empty() {
            return Err(Error::InvalidConfig("embedding model name is required".to_string()));
        }
        if config.dimension == 0 {
            return Err(Error::InvalidConfig("embedding dimension must be positive".to_string()));
        }

        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(key) = config.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            let auth = format!("Bearer {}", key.trim());
            let value = HeaderValue::from_str(&auth)
                .map_err(|_| Error::InvalidConfig("invalid embedding API key".to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("failed to build embedding client: {}", e)))?;

        let endpoint = format!("{}/embeddings", config.base_url.trim_end_matches('/'));
        Ok(Self {
            client,
            model_id: format!("{}/{}", config.model, config.dimension),
            endpoint,
            model: config.model,
            dimension: config.dimension,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Embedder for HttpEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Vector> {
        // Hosted endpoints reject empty input.
        if text.trim().is_empty() {
            return Ok(Vector::zeros(self.dimension));
        }

        let request = EmbeddingRequest {
            model: &self.model,
            input: [text],
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .map_err(|e| {
                let retryable = e.is_timeout() || e.is_connect() || e.is_request() || e.is_body();
                Error::embedding(format!("embedding request failed: {}", e), retryable)
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(Error::embedding(
                format!("embedding endpoint returned {}: {}", status, body),
                is_retryable_status(status),
            ));
        }

        let parsed: EmbeddingResponse = resp
            .json()
            .map_err(|e| Error::embedding(format!("failed to parse embedding response: {}", e), false))?;
        let embedding = parsed
            .data
            .into_iter()
            .min_by_key(|entry| entry.index)
            .map(|entry| entry.embedding)
            .ok_or_else(|| Error::embedding("embedding response contained no vectors", false))?;

        if embedding.len() != self.dimension {
            return Err(Error::InvalidDimension {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        if embedding.iter().any(|x| !x.is_finite()) {
            return Err(Error::embedding("embedding response contained non-finite values", false));
        }

        debug!(chars = text.len(), model = %self.model, "embedded text");
        Ok(Vector::new(embedding))
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: [&'a str; 1],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashing_is_deterministic() {
        let embedder = HashingEmbedder::new(64).unwrap();
        let v1 = embedder.embed("Rockets use liquid fuel").unwrap();
        let v2 = embedder.embed("Rockets use liquid fuel").unwrap();
        assert_eq!(v1, v2);
        assert_eq!(v1.dim(), 64);
        assert!((v1.norm() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_hashing_empty_text() {
        let embedder = HashingEmbedder::default();
        let v = embedder.embed("").unwrap();
        assert_eq!(v.dim(), DEFAULT_HASHING_DIM);
        assert!(v.as_slice().iter().all(|x| x.is_finite()));
    }

    #[test]
    fn test_hashing_similar_texts_are_closer() {
        let embedder = HashingEmbedder::new(256).unwrap();
        let base = embedder.embed("central bank raises interest rates").unwrap();
        let near = embedder.embed("central bank raises rates again").unwrap();
        let far = embedder.embed("volcano erupts on remote island").unwrap();
        assert!(base.cosine_similarity(&near) > base.cosine_similarity(&far));
    }

    #[test]
    fn test_model_id_includes_dimension() {
        let a = HashingEmbedder::new(64).unwrap();
        let b = HashingEmbedder::new(128).unwrap();
        assert_ne!(a.model_id(), b.model_id());
        assert!(HashingEmbedder::new(0).is_err());
    }

    #[test]
    fn test_http_embedder_config_validation() {
        let config = HttpEmbedderConfig {
            model: " ".to_string(),
            ..Default::default()
        };
        assert!(matches!(HttpEmbedder::new(config), Err(Error::InvalidConfig(_))));

        let embedder = HttpEmbedder::new(HttpEmbedderConfig {
            base_url: "http://localhost:9999/v1/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(embedder.endpoint(), "http://localhost:9999/v1/embeddings");
        assert_eq!(embedder.dimension(), 384);
        assert_eq!(embedder.model_id(), "all-minilm/384");

        // empty text never reaches the network
        let v = embedder.embed("  ").unwrap();
        assert_eq!(v.dim(), 384);
    }

    #[test]
    fn test_retryable_status() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(!is_retryable_status(StatusCode::UNAUTHORIZED));
    }
}
