//! Session data types

use crate::agents::SupportRole;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Speaker of a recorded conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One recorded turn of the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(role: TurnRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            at: Utc::now(),
        }
    }
}

/// Mutable per-session state
///
/// Always accessed through the owning handle's lock, so a request's
/// read-modify-write of history and the billing static cache never
/// interleaves with another request on the same session.
#[derive(Debug, Default)]
pub struct SessionState {
    /// Caller-supplied account reference, passed through unused by routing
    pub customer_id: Option<String>,
    pub history: Vec<ConversationTurn>,
    /// Billing static policy block, computed at most once per session
    pub cached_static_context: Option<String>,
    pub routing_history: Vec<SupportRole>,
    /// User messages handled in this session
    pub message_count: u64,
}

impl SessionState {
    /// Most recent `limit` turns, oldest first
    pub fn recent_history(&self, limit: usize) -> &[ConversationTurn] {
        let start = self.history.len().saturating_sub(limit);
        &self.history[start..]
    }
}
