//! Chat-completion backend for an OpenAI-compatible API
//!
//! Wraps the upstream with a concurrency cap, per-profile circuit breaker,
//! and bounded retries with jittered exponential backoff. Callers above this
//! layer translate any remaining error into degraded output; nothing here
//! reaches the user directly.

use super::breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::config::ModelConfig;
use crate::error::SupportError;
use crate::metrics::METRICS;
use async_trait::async_trait;
use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Failure modes of a generation call
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("generation timed out after {0}ms")]
    Timeout(u64),

    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("upstream returned {status}: {detail}")]
    Upstream { status: u16, detail: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("circuit open for profile {0}")]
    CircuitOpen(String),
}

impl GenerationError {
    /// Transient failures are worth another attempt; client errors and
    /// malformed bodies are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            GenerationError::Timeout(_) | GenerationError::RequestFailed(_) => true,
            GenerationError::Upstream { status, .. } => *status >= 500 || *status == 429,
            GenerationError::InvalidResponse(_) | GenerationError::CircuitOpen(_) => false,
        }
    }
}

/// One message in the chat transcript sent upstream
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// A fully assembled generation call
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

/// Generation capability consumed by the supervisor and responders
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Reqwest-based backend for `/chat/completions`
pub struct OpenAiGeneration {
    http: reqwest::Client,
    api_base: String,
    api_key: Option<SecretString>,
    semaphore: Semaphore,
    breaker: CircuitBreaker,
    retry_attempts: usize,
    backoff_base: Duration,
    timeout_ms: u64,
}

impl OpenAiGeneration {
    pub fn new(config: &ModelConfig) -> crate::error::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| SupportError::Configuration(format!("HTTP client: {}", e)))?;

        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: config.circuit_breaker_failures,
            reset_timeout: config.breaker_reset_timeout(),
        });

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            semaphore: Semaphore::new(config.max_concurrent_generations.max(1)),
            breaker,
            retry_attempts: config.retry_attempts,
            backoff_base: config.retry_backoff(),
            timeout_ms: config.request_timeout_ms,
        })
    }

    /// Backoff for the attempt that just failed: base doubled per attempt,
    /// plus up to 50% uniform jitter to spread thundering retries.
    fn backoff_delay(&self, attempt: usize) -> Duration {
        let base_ms = self.backoff_base.as_millis() as u64;
        let scaled = base_ms.saturating_mul(1 << (attempt.saturating_sub(1) as u32).min(16));
        let jitter = rand::thread_rng().gen_range(0..=scaled / 2);
        Duration::from_millis(scaled + jitter)
    }

    async fn try_once(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let url = format!("{}/chat/completions", self.api_base);
        let body = ChatCompletionRequest {
            model: &request.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let mut http_request = self.http.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            http_request = http_request.bearer_auth(key.expose_secret());
        }

        let response = http_request.send().await.map_err(|e| {
            if e.is_timeout() {
                GenerationError::Timeout(self.timeout_ms)
            } else {
                GenerationError::RequestFailed(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(GenerationError::Upstream {
                status: status.as_u16(),
                detail: detail.chars().take(200).collect(),
            });
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                GenerationError::InvalidResponse("response contained no message".to_string())
            })?;

        Ok(content)
    }
}

#[async_trait]
impl GenerationBackend for OpenAiGeneration {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        if self.breaker.is_open(&request.model) {
            METRICS.record_generation(&request.model, "rejected");
            return Err(GenerationError::CircuitOpen(request.model.clone()));
        }

        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| GenerationError::RequestFailed("concurrency limiter closed".to_string()))?;

        let started = Instant::now();
        let max_attempts = self.retry_attempts + 1;
        let mut last_error = GenerationError::RequestFailed("no attempts made".to_string());

        for attempt in 1..=max_attempts {
            match self.try_once(request).await {
                Ok(text) => {
                    self.breaker.mark_success(&request.model);
                    METRICS.record_generation(&request.model, "success");
                    METRICS.observe_generation_duration(
                        &request.model,
                        started.elapsed().as_secs_f64(),
                    );
                    debug!(model = %request.model, attempt, "generation succeeded");
                    return Ok(text);
                }
                Err(e) => {
                    self.breaker.mark_failure(&request.model);
                    let retryable = e.is_retryable() && attempt < max_attempts;
                    warn!(
                        model = %request.model,
                        attempt,
                        error = %e,
                        retrying = retryable,
                        "generation attempt failed"
                    );

                    if !retryable {
                        METRICS.record_generation(&request.model, "failure");
                        return Err(e);
                    }

                    METRICS.record_generation_retry(&request.model);
                    last_error = e;
                    tokio::time::sleep(self.backoff_delay(attempt)).await;
                }
            }
        }

        METRICS.record_generation(&request.model, "failure");
        Err(last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn backend_for(url: &str, retries: usize, breaker_threshold: usize) -> OpenAiGeneration {
        let mut config = Config::default();
        config.models.api_base = url.to_string();
        config.models.api_key = Some(SecretString::new("test-key".to_string()));
        config.models.retry_attempts = retries;
        config.models.retry_backoff_ms = 1;
        config.models.circuit_breaker_failures = breaker_threshold;
        OpenAiGeneration::new(&config.models).unwrap()
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            model: "gpt-4o".to_string(),
            messages: vec![
                ChatMessage::system("You are a support agent."),
                ChatMessage::user("hello"),
            ],
            temperature: 0.1,
            max_tokens: None,
        }
    }

    fn completion_body(content: &str) -> String {
        serde_json::json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }]
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_generate_parses_first_choice() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(completion_body("Hi there!"))
            .create_async()
            .await;

        let backend = backend_for(&server.url(), 2, 100);
        let answer = backend.generate(&request()).await.unwrap();
        assert_eq!(answer, "Hi there!");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_errors_are_retried_to_exhaustion() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(500)
            .with_body("boom")
            .expect(3)
            .create_async()
            .await;

        let backend = backend_for(&server.url(), 2, 100);
        let err = backend.generate(&request()).await.unwrap_err();
        assert!(matches!(err, GenerationError::Upstream { status: 500, .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(400)
            .with_body("bad request")
            .expect(1)
            .create_async()
            .await;

        let backend = backend_for(&server.url(), 2, 100);
        let err = backend.generate(&request()).await.unwrap_err();
        assert!(matches!(err, GenerationError::Upstream { status: 400, .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_circuit_opens_and_rejects_without_calling_upstream() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(500)
            .with_body("boom")
            .expect(3)
            .create_async()
            .await;

        let backend = backend_for(&server.url(), 2, 2);

        let first = backend.generate(&request()).await;
        assert!(first.is_err());

        let second = backend.generate(&request()).await.unwrap_err();
        assert!(matches!(second, GenerationError::CircuitOpen(_)));

        // three attempts from the first call, none from the rejected one
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_choices_is_invalid_response() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": "x", "object": "chat.completion", "choices": []}"#)
            .create_async()
            .await;

        let backend = backend_for(&server.url(), 0, 100);
        let err = backend.generate(&request()).await.unwrap_err();
        assert!(matches!(err, GenerationError::InvalidResponse(_)));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(GenerationError::Timeout(1000).is_retryable());
        assert!(GenerationError::RequestFailed("conn refused".into()).is_retryable());
        assert!(GenerationError::Upstream { status: 502, detail: String::new() }.is_retryable());
        assert!(GenerationError::Upstream { status: 429, detail: String::new() }.is_retryable());
        assert!(!GenerationError::Upstream { status: 401, detail: String::new() }.is_retryable());
        assert!(!GenerationError::InvalidResponse("bad json".into()).is_retryable());
    }

    #[test]
    fn test_backoff_grows_with_jitter_bounds() {
        let backend = {
            let mut config = Config::default();
            config.models.retry_backoff_ms = 200;
            OpenAiGeneration::new(&config.models).unwrap()
        };

        for _ in 0..20 {
            let first = backend.backoff_delay(1).as_millis() as u64;
            assert!((200..=300).contains(&first), "first backoff {}", first);

            let second = backend.backoff_delay(2).as_millis() as u64;
            assert!((400..=600).contains(&second), "second backoff {}", second);
        }
    }
}
