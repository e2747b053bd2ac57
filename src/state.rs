//! Shared application state passed to every handler.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::directory::{CallResolver, StaticAgentDirectory, TwilioCallResolver};
use crate::directory::twilio::TwilioCallLookup;

/// Application state shared across all connections.
///
/// Everything in here is read-only after startup; sessions own their own
/// mutable state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Shared HTTP client for Twilio REST and LLM requests.
    pub http: reqwest::Client,
    /// Resolves a call SID to the agent answering that number.
    pub resolver: Arc<dyn CallResolver>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let config = Arc::new(config);
        let http = reqwest::Client::new();
        let directory = Arc::new(StaticAgentDirectory::new(config.agents.clone()));
        let lookup = TwilioCallLookup::new(
            http.clone(),
            config.twilio_api_url.clone(),
            config.twilio_account_sid.clone(),
            config.twilio_auth_token.clone(),
        );
        let resolver = Arc::new(TwilioCallResolver::new(lookup, directory));

        Self {
            config,
            http,
            resolver,
        }
    }
}
