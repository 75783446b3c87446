//! Metrics collection for observability

use crate::agents::SupportRole;
use crate::retrieval::Partition;
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec_with_registry, register_counter_with_registry,
    register_histogram_vec_with_registry, register_histogram_with_registry,
    register_int_gauge_with_registry, Counter, CounterVec, Histogram, HistogramVec, IntGauge,
    Opts, Registry,
};
use std::sync::Arc;

/// Global metrics registry
pub static METRICS: Lazy<Arc<Metrics>> = Lazy::new(|| {
    Arc::new(Metrics::new().expect("Failed to initialize metrics"))
});

/// Metrics collector
pub struct Metrics {
    registry: Registry,

    // Chat pipeline metrics
    pub chat_requests: Counter,
    pub routing_decisions: CounterVec,
    pub degraded_responses: CounterVec,
    pub request_duration: Histogram,

    // Session metrics
    pub sessions_active: IntGauge,
    pub sessions_created: Counter,
    pub sessions_swept: Counter,

    // Retrieval metrics
    pub similarity_searches: CounterVec,
    pub embedding_cache_lookups: CounterVec,

    // Generation metrics
    pub generation_requests: CounterVec,
    pub generation_retries: CounterVec,
    pub generation_duration: HistogramVec,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let registry = Registry::new();

        let chat_requests = register_counter_with_registry!(
            Opts::new("chat_requests_total", "Total chat requests received"),
            registry
        )?;

        let routing_decisions = register_counter_vec_with_registry!(
            Opts::new("routing_decisions_total", "Routing decisions by role and source"),
            &["role", "source"],
            registry
        )?;

        let degraded_responses = register_counter_vec_with_registry!(
            Opts::new("degraded_responses_total", "Responses served from the degrade path"),
            &["role"],
            registry
        )?;

        let request_duration = register_histogram_with_registry!(
            "chat_request_duration_seconds",
            "End-to-end chat request duration in seconds",
            registry
        )?;

        let sessions_active = register_int_gauge_with_registry!(
            Opts::new("sessions_active", "Live sessions in the registry"),
            registry
        )?;

        let sessions_created = register_counter_with_registry!(
            Opts::new("sessions_created_total", "Total sessions created"),
            registry
        )?;

        let sessions_swept = register_counter_with_registry!(
            Opts::new("sessions_swept_total", "Total sessions removed by expiry sweeps"),
            registry
        )?;

        let similarity_searches = register_counter_vec_with_registry!(
            Opts::new("similarity_searches_total", "Similarity searches by partition"),
            &["partition"],
            registry
        )?;

        let embedding_cache_lookups = register_counter_vec_with_registry!(
            Opts::new("embedding_cache_lookups_total", "Embedding cache lookups by result"),
            &["result"],
            registry
        )?;

        let generation_requests = register_counter_vec_with_registry!(
            Opts::new("generation_requests_total", "Generation calls by model and outcome"),
            &["model", "outcome"],
            registry
        )?;

        let generation_retries = register_counter_vec_with_registry!(
            Opts::new("generation_retries_total", "Generation retry attempts by model"),
            &["model"],
            registry
        )?;

        let generation_duration = register_histogram_vec_with_registry!(
            "generation_duration_seconds",
            "Generation call duration in seconds",
            &["model"],
            registry
        )?;

        Ok(Self {
            registry,
            chat_requests,
            routing_decisions,
            degraded_responses,
            request_duration,
            sessions_active,
            sessions_created,
            sessions_swept,
            similarity_searches,
            embedding_cache_lookups,
            generation_requests,
            generation_retries,
            generation_duration,
        })
    }

    /// Get the metrics registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record an incoming chat request
    pub fn record_request(&self) {
        self.chat_requests.inc();
    }

    /// Record a routing decision
    pub fn record_route(&self, role: SupportRole, source: &str) {
        self.routing_decisions
            .with_label_values(&[role.topic(), source])
            .inc();
    }

    /// Record a degraded response
    pub fn record_degraded(&self, role: SupportRole) {
        self.degraded_responses.with_label_values(&[role.topic()]).inc();
    }

    /// Record end-to-end request duration
    pub fn observe_request_duration(&self, seconds: f64) {
        self.request_duration.observe(seconds);
    }

    /// Record a new session
    pub fn record_session_created(&self) {
        self.sessions_created.inc();
    }

    /// Update the live session gauge
    pub fn set_active_sessions(&self, count: usize) {
        self.sessions_active.set(count as i64);
    }

    /// Record sessions removed by a sweep
    pub fn record_sessions_swept(&self, count: usize) {
        self.sessions_swept.inc_by(count as f64);
    }

    /// Record a similarity search
    pub fn record_search(&self, partition: Partition) {
        self.similarity_searches
            .with_label_values(&[partition.as_str()])
            .inc();
    }

    /// Record an embedding cache lookup
    pub fn record_embedding_cache(&self, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        self.embedding_cache_lookups.with_label_values(&[result]).inc();
    }

    /// Record a completed generation call
    pub fn record_generation(&self, model: &str, outcome: &str) {
        self.generation_requests
            .with_label_values(&[model, outcome])
            .inc();
    }

    /// Record a generation retry
    pub fn record_generation_retry(&self, model: &str) {
        self.generation_retries.with_label_values(&[model]).inc();
    }

    /// Record generation call duration
    pub fn observe_generation_duration(&self, model: &str, seconds: f64) {
        self.generation_duration
            .with_label_values(&[model])
            .observe(seconds);
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap_or_default();

        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialization() {
        let metrics = Metrics::new();
        assert!(metrics.is_ok());
    }

    #[test]
    fn test_record_pipeline_events() {
        let metrics = Metrics::new().unwrap();
        metrics.record_request();
        metrics.record_route(SupportRole::Billing, "model");
        metrics.record_degraded(SupportRole::Technical);
        metrics.observe_request_duration(0.25);
        metrics.record_search(Partition::Technical);
        metrics.record_embedding_cache(true);
        metrics.record_generation("gpt-4o", "success");
        // Metrics should be recorded without panicking
    }

    #[test]
    fn test_export_includes_registered_series() {
        let metrics = Metrics::new().unwrap();
        metrics.record_request();
        metrics.set_active_sessions(3);

        let exported = metrics.export_prometheus();
        assert!(exported.contains("chat_requests_total"));
        assert!(exported.contains("sessions_active 3"));
    }
}
