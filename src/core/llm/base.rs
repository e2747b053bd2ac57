//! Base trait for streaming text generation providers.

use std::pin::Pin;

use futures::Stream;
use thiserror::Error;

/// Errors that can occur during generation.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Request(String),

    #[error("LLM returned status {0}: {1}")]
    Status(u16, String),

    #[error("LLM stream error: {0}")]
    Stream(String),
}

/// Ordered, finite stream of text deltas.
///
/// Dropping the stream aborts the underlying HTTP body, which is how barge-in
/// cancellation stops generation mid-flight.
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// Base trait for streaming completion providers.
#[async_trait::async_trait]
pub trait BaseLlm: Send + Sync {
    /// Start a completion for a single utterance against a persona prompt.
    ///
    /// No conversation history is carried; each utterance stands alone.
    async fn stream_completion(
        &self,
        persona_prompt: &str,
        utterance: &str,
    ) -> Result<CompletionStream, LlmError>;

    fn provider_name(&self) -> &'static str;
}
