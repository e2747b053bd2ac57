//! Configuration for the voicebridge server
//!
//! Configuration comes from environment variables (a `.env` file is loaded in
//! `main.rs` before this module runs) plus an optional YAML agent directory
//! file. Priority: actual ENV vars > .env values > defaults.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Default Deepgram STT websocket endpoint.
pub const DEFAULT_DEEPGRAM_STT_URL: &str = "wss://api.deepgram.com/v1/listen";
/// Default Deepgram TTS websocket endpoint.
pub const DEFAULT_DEEPGRAM_TTS_URL: &str = "wss://api.deepgram.com/v1/speak";
/// Default OpenAI-compatible API base.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
/// Default Twilio REST API base.
pub const DEFAULT_TWILIO_API_URL: &str = "https://api.twilio.com";

/// One entry in the agent directory: the voice agent bound to a phone number.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AgentProfile {
    /// Persona prompt sent as the system message of every generation request.
    pub persona_prompt: String,
    /// Greeting spoken as soon as the call starts.
    pub welcome_message: String,
    /// Synthesis voice model (e.g. "aura-asteria-en").
    pub voice_id: String,
}

/// Server configuration
///
/// Contains everything needed to run the voicebridge server: listen address,
/// provider API keys (Deepgram, OpenAI, Twilio), provider endpoints (all
/// overridable for testing), the public host Twilio connects back to, and the
/// agent directory mapping destination phone numbers to agent profiles.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    /// Public hostname Twilio reaches this server at. Used to build the
    /// `wss://{host}/streams` URL in the TwiML response.
    pub webhook_host: String,

    // Provider API keys
    pub deepgram_api_key: String,
    pub openai_api_key: String,
    pub twilio_account_sid: String,
    pub twilio_auth_token: String,

    // Provider endpoints (overridable, mainly for tests)
    pub deepgram_stt_url: String,
    pub deepgram_tts_url: String,
    pub openai_base_url: String,
    pub twilio_api_url: String,

    /// Chat model used for generation.
    pub openai_model: String,

    /// Destination phone number (E.164) -> agent profile.
    pub agents: HashMap<String, AgentProfile>,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// `VOICEBRIDGE_AGENTS_FILE` may point at a YAML file mapping phone
    /// numbers to agent profiles; without it the directory starts empty.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = match std::env::var("PORT") {
            Ok(value) => value
                .parse::<u16>()
                .map_err(|_| format!("Invalid PORT value: {value}"))?,
            Err(_) => 8080,
        };

        let webhook_host = std::env::var("WEBHOOK_HOST")
            .map_err(|_| "WEBHOOK_HOST must be set (public hostname for Twilio webhooks)")?;

        let deepgram_api_key = require_env("DEEPGRAM_API_KEY")?;
        let openai_api_key = require_env("OPENAI_API_KEY")?;
        let twilio_account_sid = require_env("TWILIO_ACCOUNT_SID")?;
        let twilio_auth_token = require_env("TWILIO_AUTH_TOKEN")?;

        let agents = match std::env::var("VOICEBRIDGE_AGENTS_FILE") {
            Ok(path) => load_agents_file(Path::new(&path))?,
            Err(_) => HashMap::new(),
        };

        let config = Self {
            host,
            port,
            webhook_host,
            deepgram_api_key,
            openai_api_key,
            twilio_account_sid,
            twilio_auth_token,
            deepgram_stt_url: env_or("DEEPGRAM_STT_URL", DEFAULT_DEEPGRAM_STT_URL),
            deepgram_tts_url: env_or("DEEPGRAM_TTS_URL", DEFAULT_DEEPGRAM_TTS_URL),
            openai_base_url: env_or("OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL),
            twilio_api_url: env_or("TWILIO_API_URL", DEFAULT_TWILIO_API_URL),
            openai_model: env_or("OPENAI_MODEL", "gpt-3.5-turbo"),
            agents,
        };

        config.validate()?;
        Ok(config)
    }

    /// Get the server address as a string in "host:port" form.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The websocket URL Twilio is told to stream call audio to.
    pub fn stream_url(&self) -> String {
        format!("wss://{}/streams", self.webhook_host)
    }

    fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.webhook_host.contains("://") {
            return Err(format!(
                "WEBHOOK_HOST must be a bare hostname, got '{}'",
                self.webhook_host
            )
            .into());
        }
        for (number, agent) in &self.agents {
            if agent.voice_id.is_empty() {
                return Err(format!("Agent for {number} has an empty voice_id").into());
            }
        }
        Ok(())
    }
}

fn require_env(name: &str) -> Result<String, String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| format!("{name} must be set"))
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Load the agent directory YAML: a map of phone number -> profile.
pub fn load_agents_file(
    path: &Path,
) -> Result<HashMap<String, AgentProfile>, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read agents file {}: {e}", path.display()))?;
    let agents: HashMap<String, AgentProfile> = serde_yaml::from_str(&contents)
        .map_err(|e| format!("Invalid agents file {}: {e}", path.display()))?;
    Ok(agents)
}

/// CLI/file loading entry used by `main.rs` when `--agents` is passed.
pub fn merge_agents_file(
    config: &mut ServerConfig,
    path: &PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let agents = load_agents_file(path)?;
    config.agents.extend(agents);
    Ok(())
}
