//! Circuit breaker guarding the generation upstream
//!
//! Tracked per model profile, so a misbehaving strong model does not take
//! the cheap classifier profile down with it.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
struct BreakerEntry {
    state: BreakerState,
    failure_count: usize,
    opened_at: Option<Instant>,
}

impl BreakerEntry {
    fn new() -> Self {
        Self {
            state: BreakerState::Closed,
            failure_count: 0,
            opened_at: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: usize,
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

/// Per-profile circuit breaker
pub struct CircuitBreaker {
    entries: Mutex<HashMap<String, BreakerEntry>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Whether calls for this profile should be rejected right now.
    /// An open circuit transitions to half-open once the reset timeout
    /// has elapsed, letting one probe call through.
    pub fn is_open(&self, profile: &str) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .entry(profile.to_string())
            .or_insert_with(BreakerEntry::new);

        match entry.state {
            BreakerState::Closed => false,
            BreakerState::Open => {
                if let Some(opened_at) = entry.opened_at {
                    if opened_at.elapsed() >= self.config.reset_timeout {
                        entry.state = BreakerState::HalfOpen;
                        false
                    } else {
                        true
                    }
                } else {
                    true
                }
            }
            BreakerState::HalfOpen => false,
        }
    }

    pub fn mark_success(&self, profile: &str) {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .entry(profile.to_string())
            .or_insert_with(BreakerEntry::new);

        entry.state = BreakerState::Closed;
        entry.failure_count = 0;
        entry.opened_at = None;
    }

    pub fn mark_failure(&self, profile: &str) {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .entry(profile.to_string())
            .or_insert_with(BreakerEntry::new);

        entry.failure_count += 1;
        if entry.failure_count >= self.config.failure_threshold {
            entry.state = BreakerState::Open;
            entry.opened_at = Some(Instant::now());
        }
    }

    pub fn state(&self, profile: &str) -> BreakerState {
        let entries = self.entries.lock().unwrap();
        entries
            .get(profile)
            .map(|e| e.state)
            .unwrap_or(BreakerState::Closed)
    }
}
