//! Supervisor classifier
//!
//! Single-shot constrained classification over the closed role set. The
//! model is told to answer with a label only; whatever comes back is coerced
//! into the set, so free text can never act as a control signal.

use super::generation::{ChatMessage, GenerationBackend, GenerationRequest};
use super::SupportRole;
use crate::config::ModelConfig;
use std::sync::Arc;
use tracing::{debug, warn};

const CLASSIFIER_PROMPT: &str = "\
You are a customer service supervisor. Classify the incoming query into exactly one routing label:

- Billing Support: pricing, invoices, payments, refunds, billing cycles
- Technical Support: features, bugs, troubleshooting, how-to, technical issues
- Policy & Compliance: terms of service, privacy policy, data handling, compliance

If the query spans multiple domains, choose the PRIMARY domain by its explicit keywords.
Be decisive: answer with exactly one label from the list and nothing else.";

/// How a routing decision was reached, for logs and metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingSource {
    /// Classifier answered with a recognized label
    Model,
    /// Output was outside the closed set and had to be coerced
    Coerced,
    /// Classifier call itself failed
    CapabilityFallback,
}

impl RoutingSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingSource::Model => "model",
            RoutingSource::Coerced => "coerced",
            RoutingSource::CapabilityFallback => "capability_fallback",
        }
    }
}

/// The routed role plus how it was determined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingDecision {
    pub role: SupportRole,
    pub source: RoutingSource,
}

/// Routes queries to a responder role
pub struct Supervisor {
    backend: Arc<dyn GenerationBackend>,
    model: String,
}

impl Supervisor {
    pub fn new(backend: Arc<dyn GenerationBackend>, config: &ModelConfig) -> Self {
        Self {
            backend,
            model: config.supervisor_model.clone(),
        }
    }

    /// Classify a query. Never fails: classifier errors and unparseable
    /// output both default-route to the fallback role.
    pub async fn classify(&self, query: &str) -> RoutingDecision {
        let request = GenerationRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(CLASSIFIER_PROMPT),
                ChatMessage::user(query),
            ],
            // deterministic routing
            temperature: 0.0,
            max_tokens: Some(16),
        };

        match self.backend.generate(&request).await {
            Ok(raw) => {
                let (role, source) = Self::parse_label(&raw);
                debug!(
                    raw = raw.trim(),
                    label = role.label(),
                    source = source.as_str(),
                    "query classified"
                );
                RoutingDecision { role, source }
            }
            Err(e) => {
                warn!(
                    error = %e,
                    fallback = SupportRole::fallback().label(),
                    "classification failed, using fallback route"
                );
                RoutingDecision {
                    role: SupportRole::fallback(),
                    source: RoutingSource::CapabilityFallback,
                }
            }
        }
    }

    /// Map arbitrary classifier output into the closed role set.
    ///
    /// Exact labels and known aliases match directly; otherwise the text is
    /// scanned for a single unambiguous role mention. Anything else, empty
    /// output and multi-role answers included, coerces to the fallback role.
    pub fn coerce_label(raw: &str) -> SupportRole {
        Self::parse_label(raw).0
    }

    fn parse_label(raw: &str) -> (SupportRole, RoutingSource) {
        let cleaned = raw
            .trim()
            .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '*' | '.' | ':'))
            .trim()
            .to_lowercase();

        match cleaned.as_str() {
            "billing support" | "billing" | "billing_support" => {
                return (SupportRole::Billing, RoutingSource::Model)
            }
            "technical support" | "technical" | "technical_support" => {
                return (SupportRole::Technical, RoutingSource::Model)
            }
            "policy & compliance" | "policy and compliance" | "policy support"
            | "policy_support" | "policy" | "compliance" => {
                return (SupportRole::Policy, RoutingSource::Model)
            }
            _ => {}
        }

        let billing = cleaned.contains("billing");
        let technical = cleaned.contains("technical");
        let policy = cleaned.contains("policy") || cleaned.contains("compliance");

        let role = match (billing, technical, policy) {
            (true, false, false) => SupportRole::Billing,
            (false, true, false) => SupportRole::Technical,
            (false, false, true) => SupportRole::Policy,
            _ => SupportRole::fallback(),
        };
        (role, RoutingSource::Coerced)
    }
}
