//! OpenAI-compatible embedding client with a short-lived result cache
//!
//! Query texts repeat heavily in support traffic (the Hybrid static probe is
//! a fixed string), so embeddings are cached by content hash with a TTL.

use crate::config::{ModelConfig, RetrievalConfig};
use crate::error::{Result, SupportError};
use crate::metrics::METRICS;
use moka::future::Cache;
use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Client for the `/embeddings` endpoint of an OpenAI-compatible API
pub struct EmbeddingClient {
    http: reqwest::Client,
    api_base: String,
    api_key: Option<SecretString>,
    model: String,
    cache: Cache<String, Arc<Vec<f32>>>,
    retry_attempts: usize,
    backoff_base: Duration,
}

enum FetchError {
    /// Transport failures, 5xx, and 429 are worth another attempt
    Retryable(String),
    /// Client errors and malformed bodies are not
    Fatal(String),
}

impl EmbeddingClient {
    pub fn new(models: &ModelConfig, retrieval: &RetrievalConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(models.request_timeout())
            .build()
            .map_err(|e| SupportError::Configuration(format!("HTTP client: {}", e)))?;

        let cache = Cache::builder()
            .max_capacity(retrieval.embedding_cache_capacity)
            .time_to_live(retrieval.embedding_cache_ttl())
            .build();

        Ok(Self {
            http,
            api_base: models.api_base.trim_end_matches('/').to_string(),
            api_key: models.api_key.clone(),
            model: models.embedding_model.clone(),
            cache,
            retry_attempts: models.retry_attempts,
            backoff_base: models.retry_backoff(),
        })
    }

    /// Embed a query text, serving repeats from cache. Transient upstream
    /// failures are retried with backoff before surfacing an error.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let key = self.cache_key(text);

        if let Some(cached) = self.cache.get(&key).await {
            METRICS.record_embedding_cache(true);
            debug!(model = %self.model, "embedding cache hit");
            return Ok(cached.as_ref().clone());
        }
        METRICS.record_embedding_cache(false);

        let max_attempts = self.retry_attempts + 1;
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            match self.fetch_embedding(text).await {
                Ok(vector) => {
                    self.cache.insert(key, Arc::new(vector.clone())).await;
                    return Ok(vector);
                }
                Err(FetchError::Fatal(msg)) => return Err(SupportError::Embedding(msg)),
                Err(FetchError::Retryable(msg)) => {
                    let retrying = attempt < max_attempts;
                    warn!(
                        model = %self.model,
                        attempt,
                        error = %msg,
                        retrying,
                        "embedding attempt failed"
                    );
                    last_error = msg;
                    if retrying {
                        tokio::time::sleep(self.backoff_delay(attempt)).await;
                    }
                }
            }
        }

        Err(SupportError::Embedding(last_error))
    }

    /// Backoff for the attempt that just failed: base doubled per attempt,
    /// plus up to 50% uniform jitter to spread thundering retries.
    fn backoff_delay(&self, attempt: usize) -> Duration {
        let base_ms = self.backoff_base.as_millis() as u64;
        let scaled = base_ms.saturating_mul(1 << (attempt.saturating_sub(1) as u32).min(16));
        let jitter = rand::thread_rng().gen_range(0..=scaled / 2);
        Duration::from_millis(scaled + jitter)
    }

    async fn fetch_embedding(&self, text: &str) -> std::result::Result<Vec<f32>, FetchError> {
        let url = format!("{}/embeddings", self.api_base);
        let body = EmbeddingRequest {
            model: &self.model,
            input: text,
        };

        let mut request = self.http.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::Retryable(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let message = format!(
                "API returned {}: {}",
                status,
                detail.chars().take(200).collect::<String>()
            );
            return if status.is_server_error() || status.as_u16() == 429 {
                Err(FetchError::Retryable(message))
            } else {
                Err(FetchError::Fatal(message))
            };
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Fatal(format!("invalid response: {}", e)))?;

        let vector = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| FetchError::Fatal("response contained no embedding".to_string()))?;

        if vector.is_empty() {
            return Err(FetchError::Fatal("empty embedding vector".to_string()));
        }

        Ok(vector)
    }

    fn cache_key(&self, text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.model.as_bytes());
        hasher.update(b"\x00");
        hasher.update(text.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}
