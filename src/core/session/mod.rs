//! Per-call session orchestration.

pub mod buffer;
pub mod events;
pub mod orchestrator;

pub use events::SessionEvent;
pub use orchestrator::{CallSession, SessionError, TtsConnector};
