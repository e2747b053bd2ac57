//! Configuration for the Deepgram live transcription WebSocket.

use url::Url;

use crate::core::stt::base::{SttConfig, SttError};

/// Endpointing silence window in milliseconds.
pub const DEFAULT_ENDPOINTING_MS: u32 = 300;

/// Silence gap after which Deepgram emits an `UtteranceEnd` message.
pub const DEFAULT_UTTERANCE_END_MS: u32 = 1000;

/// Deepgram-specific STT configuration.
#[derive(Debug, Clone)]
pub struct DeepgramSttConfig {
    pub base: SttConfig,
    /// Websocket endpoint, e.g. `wss://api.deepgram.com/v1/listen`.
    pub endpoint: String,
    pub interim_results: bool,
    pub endpointing_ms: u32,
    pub utterance_end_ms: u32,
}

impl DeepgramSttConfig {
    pub fn from_base(base: SttConfig, endpoint: String) -> Self {
        Self {
            base,
            endpoint,
            interim_results: true,
            endpointing_ms: DEFAULT_ENDPOINTING_MS,
            utterance_end_ms: DEFAULT_UTTERANCE_END_MS,
        }
    }

    /// Build the full websocket URL with query parameters.
    pub fn build_websocket_url(&self) -> Result<String, SttError> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| SttError::ConfigurationError(format!("Invalid STT endpoint: {e}")))?;

        url.query_pairs_mut()
            .append_pair("model", &self.base.model)
            .append_pair("encoding", &self.base.encoding)
            .append_pair("sample_rate", &self.base.sample_rate.to_string())
            .append_pair("channels", &self.base.channels.to_string())
            .append_pair("interim_results", &self.interim_results.to_string())
            .append_pair("endpointing", &self.endpointing_ms.to_string())
            .append_pair("utterance_end_ms", &self.utterance_end_ms.to_string());

        Ok(url.to_string())
    }
}
