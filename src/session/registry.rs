//! In-memory session registry with idle expiry
//!
//! Lookup and creation are lock-free reads on a concurrent map. Each session
//! carries its own async mutex so mutation is serialized per session while
//! different sessions proceed fully in parallel.

use super::models::{ConversationTurn, SessionState, TurnRole};
use crate::config::SessionConfig;
use crate::metrics::METRICS;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

/// Shared handle to one live session
pub struct SessionHandle {
    pub id: String,
    pub created_at: DateTime<Utc>,
    /// Millisecond timestamp of the last resolve, updated without locking
    last_active_ms: AtomicI64,
    pub state: Mutex<SessionState>,
}

impl SessionHandle {
    fn new(id: String, customer_id: Option<String>) -> Arc<Self> {
        let now = Utc::now();
        Arc::new(Self {
            id,
            created_at: now,
            last_active_ms: AtomicI64::new(now.timestamp_millis()),
            state: Mutex::new(SessionState {
                customer_id,
                ..SessionState::default()
            }),
        })
    }

    pub fn last_active(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.last_active_ms.load(Ordering::Relaxed))
            .unwrap_or_else(Utc::now)
    }

    /// Refresh the activity timestamp
    pub fn touch(&self) {
        self.last_active_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    #[cfg(test)]
    pub fn backdate(&self, to: DateTime<Utc>) {
        self.last_active_ms
            .store(to.timestamp_millis(), Ordering::Relaxed);
    }
}

/// Registry of live sessions keyed by id
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<SessionHandle>>,
    history_window: usize,
}

impl SessionRegistry {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            history_window: config.history_window,
        }
    }

    /// Look up a session by id, creating a fresh one when the id is absent
    /// or unknown. Unknown ids are never an error; the caller gets a new
    /// session under a newly generated id.
    pub fn resolve(
        &self,
        session_id: Option<&str>,
        customer_id: Option<&str>,
    ) -> (Arc<SessionHandle>, bool) {
        if let Some(id) = session_id {
            if let Some(existing) = self.sessions.get(id) {
                let handle = existing.clone();
                drop(existing);
                handle.touch();
                return (handle, false);
            }
        }

        let id = Uuid::new_v4().to_string();
        let handle = SessionHandle::new(id.clone(), customer_id.map(String::from));
        self.sessions.insert(id.clone(), handle.clone());

        METRICS.record_session_created();
        METRICS.set_active_sessions(self.sessions.len());
        debug!(session_id = %id, "created session");

        (handle, true)
    }

    /// Append one turn to the session history, bounded to the configured
    /// window. User turns bump the per-session message counter.
    pub fn record_exchange(&self, state: &mut SessionState, role: TurnRole, text: &str) {
        state.history.push(ConversationTurn::new(role, text));

        if state.history.len() > self.history_window {
            let excess = state.history.len() - self.history_window;
            state.history.drain(..excess);
        }

        if role == TurnRole::User {
            state.message_count += 1;
        }
    }

    /// Remove every session idle for at least `idle_timeout`
    pub fn sweep_expired(&self, idle_timeout: Duration) -> usize {
        let now = Utc::now();
        let before = self.sessions.len();

        self.sessions
            .retain(|_, handle| now.signed_duration_since(handle.last_active()) < idle_timeout);

        let removed = before - self.sessions.len();
        if removed > 0 {
            info!(removed, remaining = self.sessions.len(), "swept idle sessions");
            METRICS.record_sessions_swept(removed);
        }
        METRICS.set_active_sessions(self.sessions.len());
        removed
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    #[cfg(test)]
    pub fn get(&self, id: &str) -> Option<Arc<SessionHandle>> {
        self.sessions.get(id).map(|entry| entry.clone())
    }
}
