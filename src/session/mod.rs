//! Session tracking

pub mod models;
pub mod registry;

pub use models::{ConversationTurn, SessionState, TurnRole};
pub use registry::{SessionHandle, SessionRegistry};
