//! Base trait and shared types for streaming TTS providers.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;

/// Errors that can occur during TTS operations.
#[derive(Debug, Error)]
pub enum TtsError {
    #[error("TTS connection failed: {0}")]
    ConnectionFailed(String),

    #[error("TTS authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("TTS network error: {0}")]
    NetworkError(String),

    #[error("TTS configuration error: {0}")]
    ConfigurationError(String),

    #[error("TTS provider error: {0}")]
    ProviderError(String),
}

/// Provider-independent TTS configuration.
#[derive(Debug, Clone)]
pub struct TtsConfig {
    pub api_key: String,
    /// Voice model, e.g. "aura-asteria-en".
    pub voice_id: String,
    pub encoding: String,
    pub sample_rate: u32,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            voice_id: "aura-asteria-en".to_string(),
            encoding: "mulaw".to_string(),
            sample_rate: 8000,
        }
    }
}

/// What the synthesis stream produces.
#[derive(Debug, Clone)]
pub enum TtsOutput {
    /// One chunk of synthesized audio, in arrival order.
    Audio(Bytes),
    /// All text sent before the flush has been fully synthesized.
    Flushed,
    /// The server dropped its synthesis buffer after a clear.
    Cleared,
}

/// Async callback invoked for every synthesis output.
pub type TtsOutputCallback =
    Arc<dyn Fn(TtsOutput) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Async callback invoked when the provider connection fails.
pub type TtsErrorCallback =
    Arc<dyn Fn(TtsError) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Base trait for streaming text-to-speech providers.
#[async_trait::async_trait]
pub trait BaseTts: Send {
    async fn connect(&mut self) -> Result<(), TtsError>;

    async fn disconnect(&mut self) -> Result<(), TtsError>;

    fn is_ready(&self) -> bool;

    /// Queue a text fragment for synthesis.
    async fn speak(&mut self, text: &str) -> Result<(), TtsError>;

    /// Force synthesis of everything queued so far.
    async fn flush(&mut self) -> Result<(), TtsError>;

    /// Drop all queued and in-flight synthesis output. Used for barge-in.
    async fn clear(&mut self) -> Result<(), TtsError>;

    async fn on_output(&mut self, callback: TtsOutputCallback) -> Result<(), TtsError>;

    async fn on_error(&mut self, callback: TtsErrorCallback) -> Result<(), TtsError>;

    fn provider_name(&self) -> &'static str;
}
