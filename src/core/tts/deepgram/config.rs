//! Configuration for the Deepgram Speak WebSocket.

use url::Url;

use crate::core::tts::base::{TtsConfig, TtsError};

/// Deepgram-specific TTS configuration.
#[derive(Debug, Clone)]
pub struct DeepgramTtsConfig {
    pub base: TtsConfig,
    /// Websocket endpoint, e.g. `wss://api.deepgram.com/v1/speak`.
    pub endpoint: String,
}

impl DeepgramTtsConfig {
    pub fn from_base(base: TtsConfig, endpoint: String) -> Self {
        Self { base, endpoint }
    }

    /// Build the full websocket URL with query parameters.
    ///
    /// `container=none` yields raw audio frames with no file header, which is
    /// what the telephony transport relays verbatim.
    pub fn build_websocket_url(&self) -> Result<String, TtsError> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| TtsError::ConfigurationError(format!("Invalid TTS endpoint: {e}")))?;

        url.query_pairs_mut()
            .append_pair("model", &self.base.voice_id)
            .append_pair("encoding", &self.base.encoding)
            .append_pair("sample_rate", &self.base.sample_rate.to_string())
            .append_pair("container", "none");

        Ok(url.to_string())
    }
}
