//! Base trait and shared types for streaming STT providers.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;

/// Errors that can occur during STT operations.
#[derive(Debug, Error)]
pub enum SttError {
    #[error("STT connection failed: {0}")]
    ConnectionFailed(String),

    #[error("STT authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("STT network error: {0}")]
    NetworkError(String),

    #[error("STT configuration error: {0}")]
    ConfigurationError(String),

    #[error("STT provider error: {0}")]
    ProviderError(String),
}

/// Provider-independent STT configuration.
#[derive(Debug, Clone)]
pub struct SttConfig {
    pub api_key: String,
    pub model: String,
    pub encoding: String,
    pub sample_rate: u32,
    pub channels: u32,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "nova-2-phonecall".to_string(),
            encoding: "mulaw".to_string(),
            sample_rate: 8000,
            channels: 1,
        }
    }
}

/// One recognition result from the provider.
#[derive(Debug, Clone)]
pub struct SttResult {
    pub transcript: String,
    /// Final results are stable; interim results may still be revised.
    pub is_final: bool,
    /// The provider considers the speaker done with this stretch of speech.
    pub speech_final: bool,
    /// Explicit silence-based utterance boundary. Carries no transcript.
    pub utterance_end: bool,
}

impl SttResult {
    pub fn transcript(transcript: String, is_final: bool, speech_final: bool) -> Self {
        Self {
            transcript,
            is_final,
            speech_final,
            utterance_end: false,
        }
    }

    pub fn utterance_end() -> Self {
        Self {
            transcript: String::new(),
            is_final: false,
            speech_final: false,
            utterance_end: true,
        }
    }

    /// True when this result closes out the current utterance.
    pub fn is_utterance_boundary(&self) -> bool {
        self.utterance_end || (self.is_final && self.speech_final)
    }
}

/// Async callback invoked for every recognition result.
pub type SttResultCallback = Arc<
    dyn Fn(SttResult) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync,
>;

/// Async callback invoked when the provider connection fails.
pub type SttErrorCallback =
    Arc<dyn Fn(SttError) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Base trait for streaming speech-to-text providers.
#[async_trait::async_trait]
pub trait BaseStt: Send {
    async fn connect(&mut self) -> Result<(), SttError>;

    async fn disconnect(&mut self) -> Result<(), SttError>;

    fn is_ready(&self) -> bool;

    /// Queue one audio chunk for recognition. Non-blocking apart from channel
    /// backpressure.
    async fn send_audio(&mut self, audio: Bytes) -> Result<(), SttError>;

    async fn on_result(&mut self, callback: SttResultCallback) -> Result<(), SttError>;

    async fn on_error(&mut self, callback: SttErrorCallback) -> Result<(), SttError>;

    fn provider_name(&self) -> &'static str;
}
