//! Supervisor, responders, and the generation plumbing underneath them

pub mod breaker;
pub mod generation;
pub mod responder;
pub mod supervisor;

pub use breaker::{BreakerState, CircuitBreaker, CircuitBreakerConfig};
pub use generation::{
    ChatMessage, GenerationBackend, GenerationError, GenerationRequest, OpenAiGeneration,
};
pub use responder::{fallback_answer, Answer, Responder, EMPTY_REPLY_FALLBACK};
pub use supervisor::{RoutingDecision, RoutingSource, Supervisor};

/// Closed set of responder roles a query can be routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SupportRole {
    Billing,
    Technical,
    Policy,
}

impl SupportRole {
    pub const ALL: [SupportRole; 3] = [
        SupportRole::Billing,
        SupportRole::Technical,
        SupportRole::Policy,
    ];

    /// Customer-facing routing label
    pub fn label(&self) -> &'static str {
        match self {
            SupportRole::Billing => "Billing Support",
            SupportRole::Technical => "Technical Support",
            SupportRole::Policy => "Policy & Compliance",
        }
    }

    /// Short topic word used in fallback wording
    pub fn topic(&self) -> &'static str {
        match self {
            SupportRole::Billing => "billing",
            SupportRole::Technical => "technical",
            SupportRole::Policy => "policy",
        }
    }

    /// Default route when classification is ambiguous or unavailable
    pub fn fallback() -> Self {
        SupportRole::Technical
    }
}

impl std::fmt::Display for SupportRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
