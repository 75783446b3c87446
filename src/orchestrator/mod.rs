//! Request orchestration
//!
//! Drives each chat request through a fixed phase sequence: resolve the
//! session, route via the supervisor, assemble context with the role's
//! strategy, generate the answer, record both turns, return. A generation
//! failure lands in the degraded phase instead of aborting, so the caller
//! always receives a complete exchange.

use crate::agents::{Answer, Responder, Supervisor, SupportRole};
use crate::metrics::METRICS;
use crate::retrieval::RetrievalStrategy;
use crate::session::{SessionRegistry, TurnRole};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Pipeline phase, logged as each request advances
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestPhase {
    Received,
    SessionResolved,
    Routed,
    ContextAssembled,
    Answered,
    Degraded,
    Recorded,
    Returned,
}

/// An incoming chat query
#[derive(Debug, Clone)]
pub struct ChatQuery {
    pub message: String,
    pub session_id: Option<String>,
    pub customer_id: Option<String>,
}

/// The completed exchange handed back to the HTTP layer
#[derive(Debug, Clone)]
pub struct ChatExchange {
    pub answer: String,
    pub routed_to: SupportRole,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub degraded: bool,
    pub is_new_session: bool,
}

/// A responder role's strategy and generation pairing
pub struct RoleBundle {
    pub strategy: Arc<dyn RetrievalStrategy>,
    pub responder: Responder,
}

/// Coordinates one request across registry, supervisor, and responders
pub struct Orchestrator {
    registry: Arc<SessionRegistry>,
    supervisor: Supervisor,
    billing: RoleBundle,
    technical: RoleBundle,
    policy: RoleBundle,
    history_limit: usize,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<SessionRegistry>,
        supervisor: Supervisor,
        billing: RoleBundle,
        technical: RoleBundle,
        policy: RoleBundle,
        history_limit: usize,
    ) -> Self {
        Self {
            registry,
            supervisor,
            billing,
            technical,
            policy,
            history_limit,
        }
    }

    fn bundle(&self, role: SupportRole) -> &RoleBundle {
        match role {
            SupportRole::Billing => &self.billing,
            SupportRole::Technical => &self.technical,
            SupportRole::Policy => &self.policy,
        }
    }

    /// Handle one chat query end to end. Never returns an error: every
    /// internal failure has already degraded into an apology answer.
    pub async fn handle(&self, query: ChatQuery) -> ChatExchange {
        let started = Instant::now();
        METRICS.record_request();
        debug!(phase = ?RequestPhase::Received, "handling chat query");

        let (session, is_new_session) = self
            .registry
            .resolve(query.session_id.as_deref(), query.customer_id.as_deref());
        debug!(
            session_id = %session.id,
            is_new_session,
            phase = ?RequestPhase::SessionResolved,
            "session resolved"
        );

        let decision = self.supervisor.classify(&query.message).await;
        let routed_to = decision.role;
        METRICS.record_route(routed_to, decision.source.as_str());
        info!(
            session_id = %session.id,
            routed_to = routed_to.label(),
            source = decision.source.as_str(),
            phase = ?RequestPhase::Routed,
            "query routed"
        );

        let bundle = self.bundle(routed_to);

        // Hold the session lock from context assembly through recording so
        // concurrent requests on the same session cannot interleave their
        // updates to the static cache or the history.
        let mut state = session.state.lock().await;

        let context = bundle.strategy.assemble(&query.message, &mut state).await;
        debug!(
            session_id = %session.id,
            context_bytes = context.len(),
            phase = ?RequestPhase::ContextAssembled,
            "context assembled"
        );

        let history = state.recent_history(self.history_limit).to_vec();
        let Answer { text, degraded } = bundle
            .responder
            .respond(&query.message, &context, &history)
            .await;

        if degraded {
            METRICS.record_degraded(routed_to);
            debug!(session_id = %session.id, phase = ?RequestPhase::Degraded, "degraded answer");
        } else {
            debug!(session_id = %session.id, phase = ?RequestPhase::Answered, "answer generated");
        }

        self.registry
            .record_exchange(&mut state, TurnRole::User, &query.message);
        self.registry
            .record_exchange(&mut state, TurnRole::Assistant, &text);
        state.routing_history.push(routed_to);
        drop(state);
        session.touch();
        debug!(session_id = %session.id, phase = ?RequestPhase::Recorded, "exchange recorded");

        METRICS.observe_request_duration(started.elapsed().as_secs_f64());
        debug!(
            session_id = %session.id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            phase = ?RequestPhase::Returned,
            "request complete"
        );

        ChatExchange {
            answer: text,
            routed_to,
            session_id: session.id.clone(),
            timestamp: Utc::now(),
            degraded,
            is_new_session,
        }
    }
}
