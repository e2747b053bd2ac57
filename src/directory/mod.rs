//! Agent directory: which voice agent answers a given phone number.
//!
//! The session orchestrator only sees [`CallResolver`]: call SID in, agent
//! profile out (or `None` when no agent is bound to the number). The default
//! implementation resolves the destination number through the Twilio REST API
//! and then consults a static, config-backed directory.

pub mod twilio;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::AgentProfile;
use twilio::TwilioCallLookup;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Call lookup request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Call lookup returned status {0}")]
    Status(u16),

    #[error("Call lookup response missing destination number")]
    MissingDestination,
}

/// Maps a destination phone number to the agent configured for it.
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    async fn lookup_by_destination_number(&self, number: &str) -> Option<AgentProfile>;
}

/// Resolves a call SID all the way to an agent profile.
#[async_trait]
pub trait CallResolver: Send + Sync {
    /// `Ok(None)` means the call was resolved but no agent is bound to the
    /// destination number; errors mean the lookup itself failed.
    async fn resolve(&self, call_sid: &str) -> Result<Option<AgentProfile>, DirectoryError>;
}

/// Directory backed by the configuration's `agents` map.
pub struct StaticAgentDirectory {
    agents: HashMap<String, AgentProfile>,
}

impl StaticAgentDirectory {
    pub fn new(agents: HashMap<String, AgentProfile>) -> Self {
        Self { agents }
    }
}

#[async_trait]
impl AgentDirectory for StaticAgentDirectory {
    async fn lookup_by_destination_number(&self, number: &str) -> Option<AgentProfile> {
        self.agents.get(number).cloned()
    }
}

/// Default resolver: Twilio call fetch for the destination number, then a
/// directory lookup on that number.
pub struct TwilioCallResolver {
    lookup: TwilioCallLookup,
    directory: Arc<dyn AgentDirectory>,
}

impl TwilioCallResolver {
    pub fn new(lookup: TwilioCallLookup, directory: Arc<dyn AgentDirectory>) -> Self {
        Self { lookup, directory }
    }
}

#[async_trait]
impl CallResolver for TwilioCallResolver {
    async fn resolve(&self, call_sid: &str) -> Result<Option<AgentProfile>, DirectoryError> {
        let destination = self.lookup.destination_number(call_sid).await?;
        Ok(self
            .directory
            .lookup_by_destination_number(&destination)
            .await)
    }
}
