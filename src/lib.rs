//! Customer support query routing service
//!
//! A supervisor classifier routes each inbound message to a billing,
//! technical, or policy responder. Each responder is paired with the
//! retrieval strategy that fits its knowledge source: live vector search
//! for technical queries, a cached policy corpus for compliance queries,
//! and a hybrid of both for billing. Sessions carry conversation history
//! across turns and expire after a configurable idle window.

pub mod agents;
pub mod api;
pub mod config;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod retrieval;
pub mod session;

pub use agents::SupportRole;
pub use config::Config;
pub use error::{Result, SupportError};
pub use orchestrator::{ChatExchange, ChatQuery, Orchestrator};
pub use session::SessionRegistry;
