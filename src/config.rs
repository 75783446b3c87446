//! Configuration for the support routing service
//!
//! Settings are layered: built-in defaults, then an optional
//! `config/default.toml`, then `SUPPORT__`-prefixed environment variables,
//! then a handful of well-known flat variables kept for operational
//! compatibility (OPENAI_API_KEY, SESSION_TIMEOUT_MINUTES, ...).

use crate::error::{Result, SupportError};
use secrecy::SecretString;
use serde::Deserialize;
use std::time::Duration;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub models: ModelConfig,
    pub retrieval: RetrievalConfig,
    pub session: SessionConfig,
    pub corpus: CorpusConfig,
}

/// HTTP server settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Comma-separated list of allowed CORS origins
    #[serde(default = "default_cors_origins")]
    pub cors_origins: String,

    /// Maximum accepted request body size in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// Language-model and generation settings
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// OpenAI-compatible API base URL
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// API key (read from env OPENAI_API_KEY if not set)
    #[serde(default)]
    pub api_key: Option<SecretString>,

    #[serde(default = "default_supervisor_model")]
    pub supervisor_model: String,

    #[serde(default = "default_billing_model")]
    pub billing_model: String,

    #[serde(default = "default_technical_model")]
    pub technical_model: String,

    #[serde(default = "default_policy_model")]
    pub policy_model: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Per-request timeout for generation and embedding calls
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Retries after the first failed attempt
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: usize,

    /// Base backoff, doubled per attempt with jitter on top
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Cap on in-flight generation calls
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_generations: usize,

    /// Assembled context is clamped to this many tokens before prompting
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,

    /// Circuit breaker failure threshold
    #[serde(default = "default_breaker_failures")]
    pub circuit_breaker_failures: usize,

    /// Circuit breaker reset timeout in seconds
    #[serde(default = "default_breaker_reset")]
    pub circuit_breaker_reset_secs: u64,
}

/// Similarity-search and embedding settings
#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,

    #[serde(default = "default_collection_name")]
    pub collection_name: String,

    /// Final result count for the technical knowledge-base search
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Result count for the billing static and dynamic searches
    #[serde(default = "default_hybrid_top_k")]
    pub hybrid_top_k: usize,

    /// Candidates over-fetched per final result for diversity re-ranking
    #[serde(default = "default_fetch_multiplier")]
    pub fetch_multiplier: usize,

    /// Relevance/diversity balance for MMR selection (1.0 = pure relevance)
    #[serde(default = "default_mmr_lambda")]
    pub mmr_lambda: f32,

    #[serde(default = "default_search_timeout_ms")]
    pub search_timeout_ms: u64,

    #[serde(default = "default_embedding_cache_capacity")]
    pub embedding_cache_capacity: u64,

    #[serde(default = "default_embedding_cache_ttl")]
    pub embedding_cache_ttl_secs: u64,
}

/// Session store settings
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Sessions idle at least this long are removed by the sweep
    #[serde(default = "default_idle_timeout_minutes")]
    pub idle_timeout_minutes: i64,

    /// Stored conversation turns kept per session
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Interval for the background expiry sweep
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

/// Static corpus settings
#[derive(Debug, Clone, Deserialize)]
pub struct CorpusConfig {
    /// Directory holding the static policy documents (*.txt)
    #[serde(default = "default_policies_path")]
    pub policies_path: String,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8000 }
fn default_cors_origins() -> String { "http://localhost:3000,http://localhost:3001".to_string() }
fn default_max_body_bytes() -> usize { 64 * 1024 }
fn default_api_base() -> String { "https://api.openai.com/v1".to_string() }
fn default_supervisor_model() -> String { "gpt-4o-mini".to_string() }
fn default_billing_model() -> String { "gpt-4o".to_string() }
fn default_technical_model() -> String { "gpt-4o".to_string() }
fn default_policy_model() -> String { "gpt-4o-mini".to_string() }
fn default_embedding_model() -> String { "text-embedding-3-small".to_string() }
fn default_request_timeout_ms() -> u64 { 30_000 }
fn default_retry_attempts() -> usize { 2 }
fn default_retry_backoff_ms() -> u64 { 200 }
fn default_max_concurrent() -> usize { 16 }
fn default_max_context_tokens() -> usize { 6000 }
fn default_breaker_failures() -> usize { 5 }
fn default_breaker_reset() -> u64 { 30 }
fn default_qdrant_url() -> String { "http://localhost:6334".to_string() }
fn default_collection_name() -> String { "support_chunks".to_string() }
fn default_top_k() -> usize { 5 }
fn default_hybrid_top_k() -> usize { 3 }
fn default_fetch_multiplier() -> usize { 4 }
fn default_mmr_lambda() -> f32 { 0.7 }
fn default_search_timeout_ms() -> u64 { 10_000 }
fn default_embedding_cache_capacity() -> u64 { 2048 }
fn default_embedding_cache_ttl() -> u64 { 600 }
fn default_idle_timeout_minutes() -> i64 { 30 }
fn default_history_window() -> usize { 10 }
fn default_sweep_interval_secs() -> u64 { 300 }
fn default_policies_path() -> String { "./data/policies".to_string() }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: default_cors_origins(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            api_key: None,
            supervisor_model: default_supervisor_model(),
            billing_model: default_billing_model(),
            technical_model: default_technical_model(),
            policy_model: default_policy_model(),
            embedding_model: default_embedding_model(),
            request_timeout_ms: default_request_timeout_ms(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_concurrent_generations: default_max_concurrent(),
            max_context_tokens: default_max_context_tokens(),
            circuit_breaker_failures: default_breaker_failures(),
            circuit_breaker_reset_secs: default_breaker_reset(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            qdrant_url: default_qdrant_url(),
            collection_name: default_collection_name(),
            top_k: default_top_k(),
            hybrid_top_k: default_hybrid_top_k(),
            fetch_multiplier: default_fetch_multiplier(),
            mmr_lambda: default_mmr_lambda(),
            search_timeout_ms: default_search_timeout_ms(),
            embedding_cache_capacity: default_embedding_cache_capacity(),
            embedding_cache_ttl_secs: default_embedding_cache_ttl(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_minutes: default_idle_timeout_minutes(),
            history_window: default_history_window(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            policies_path: default_policies_path(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment layers
    pub fn load() -> Result<Self> {
        let layered = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::Environment::with_prefix("SUPPORT").separator("__"))
            .build()
            .map_err(|e| SupportError::Configuration(e.to_string()))?;

        let loaded: Config = layered
            .try_deserialize()
            .map_err(|e| SupportError::Configuration(e.to_string()))?;

        let loaded = loaded.apply_env_overrides();
        loaded.validate()?;
        Ok(loaded)
    }

    /// Apply the flat environment variables kept for compatibility
    pub fn apply_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("OPENAI_API_KEY") {
            self.models.api_key = Some(SecretString::new(val));
        }

        if let Ok(val) = std::env::var("OPENAI_API_BASE") {
            self.models.api_base = val;
        }

        if let Ok(val) = std::env::var("SUPERVISOR_MODEL") {
            self.models.supervisor_model = val;
        }

        if let Ok(val) = std::env::var("BILLING_MODEL") {
            self.models.billing_model = val;
        }

        if let Ok(val) = std::env::var("TECHNICAL_MODEL") {
            self.models.technical_model = val;
        }

        if let Ok(val) = std::env::var("POLICY_MODEL") {
            self.models.policy_model = val;
        }

        if let Ok(val) = std::env::var("EMBEDDING_MODEL") {
            self.models.embedding_model = val;
        }

        if let Ok(val) = std::env::var("SESSION_TIMEOUT_MINUTES") {
            if let Ok(minutes) = val.parse() {
                self.session.idle_timeout_minutes = minutes;
            }
        }

        if let Ok(val) = std::env::var("HISTORY_WINDOW") {
            if let Ok(window) = val.parse() {
                self.session.history_window = window;
            }
        }

        if let Ok(val) = std::env::var("CORS_ORIGINS") {
            self.server.cors_origins = val;
        }

        if let Ok(val) = std::env::var("QDRANT_URL") {
            self.retrieval.qdrant_url = val;
        }

        if let Ok(val) = std::env::var("POLICIES_PATH") {
            self.corpus.policies_path = val;
        }

        self
    }

    /// Validate cross-field consistency
    pub fn validate(&self) -> Result<()> {
        if self.session.history_window == 0 {
            return Err(SupportError::Configuration(
                "session.history_window must be at least 1".to_string(),
            ));
        }
        if self.retrieval.top_k == 0 || self.retrieval.hybrid_top_k == 0 {
            return Err(SupportError::Configuration(
                "retrieval top_k values must be at least 1".to_string(),
            ));
        }
        if self.retrieval.fetch_multiplier == 0 {
            return Err(SupportError::Configuration(
                "retrieval.fetch_multiplier must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.retrieval.mmr_lambda) {
            return Err(SupportError::Configuration(format!(
                "retrieval.mmr_lambda must be within [0, 1], got {}",
                self.retrieval.mmr_lambda
            )));
        }
        if self.session.idle_timeout_minutes <= 0 {
            return Err(SupportError::Configuration(
                "session.idle_timeout_minutes must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse CORS origins into a list
    pub fn cors_origins_list(&self) -> Vec<String> {
        self.server
            .cors_origins
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect()
    }
}

impl ModelConfig {
    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Get retry backoff base as Duration
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Get circuit breaker reset timeout as Duration
    pub fn breaker_reset_timeout(&self) -> Duration {
        Duration::from_secs(self.circuit_breaker_reset_secs)
    }
}

impl RetrievalConfig {
    /// Get search timeout as Duration
    pub fn search_timeout(&self) -> Duration {
        Duration::from_millis(self.search_timeout_ms)
    }

    /// Get embedding cache TTL as Duration
    pub fn embedding_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.embedding_cache_ttl_secs)
    }

    /// Candidates to over-fetch for a given final count
    pub fn fetch_k(&self, top_k: usize) -> usize {
        top_k.saturating_mul(self.fetch_multiplier)
    }
}

impl SessionConfig {
    /// Get idle timeout as a chrono Duration
    pub fn idle_timeout(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.idle_timeout_minutes)
    }

    /// Get sweep interval as Duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.models.supervisor_model, "gpt-4o-mini");
        assert_eq!(config.models.billing_model, "gpt-4o");
        assert_eq!(config.session.idle_timeout_minutes, 30);
        assert_eq!(config.session.history_window, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cors_origins_list() {
        let mut config = Config::default();
        config.server.cors_origins = "http://a.example, http://b.example ,".to_string();
        assert_eq!(
            config.cors_origins_list(),
            vec!["http://a.example".to_string(), "http://b.example".to_string()]
        );
    }

    #[test]
    fn test_fetch_k() {
        let retrieval = RetrievalConfig::default();
        assert_eq!(retrieval.fetch_k(5), 20);
        assert_eq!(retrieval.fetch_k(3), 12);
    }

    #[test]
    fn test_duration_conversions() {
        let config = Config::default();
        assert_eq!(config.models.request_timeout(), Duration::from_millis(30_000));
        assert_eq!(config.models.retry_backoff(), Duration::from_millis(200));
        assert_eq!(config.session.idle_timeout(), chrono::Duration::minutes(30));
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let mut config = Config::default();
        config.session.history_window = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_lambda() {
        let mut config = Config::default();
        config.retrieval.mmr_lambda = 1.5;
        assert!(config.validate().is_err());
    }
}
