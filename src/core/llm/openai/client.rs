//! Streaming chat completion client over SSE.
//!
//! The request pairs the agent's persona prompt with the single most recent
//! caller utterance; no multi-turn history is sent. Deltas are yielded in
//! production order, and dropping the returned stream aborts the HTTP body,
//! which is how barge-in stops generation.

use async_stream::try_stream;
use futures::StreamExt;
use tracing::{debug, warn};

use super::messages::{ChatChunk, ChatMessage, ChatRequest, SSE_DONE, sse_data};
use crate::core::llm::base::{BaseLlm, CompletionStream, LlmError};

/// OpenAI-compatible streaming completion client.
pub struct OpenAiLlm {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiLlm {
    pub fn new(client: reqwest::Client, base_url: String, api_key: String, model: String) -> Self {
        Self {
            client,
            base_url,
            api_key,
            model,
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait::async_trait]
impl BaseLlm for OpenAiLlm {
    async fn stream_completion(
        &self,
        persona_prompt: &str,
        utterance: &str,
    ) -> Result<CompletionStream, LlmError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(persona_prompt),
                ChatMessage::user(utterance),
            ],
            stream: true,
        };

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status(status.as_u16(), body));
        }

        let mut body = response.bytes_stream();

        let stream = try_stream! {
            // SSE events can split across network reads; buffer until newline.
            let mut pending = String::new();

            'outer: while let Some(chunk) = body.next().await {
                let chunk = chunk.map_err(|e| LlmError::Stream(e.to_string()))?;
                pending.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(newline) = pending.find('\n') {
                    let line = pending[..newline].to_string();
                    pending.drain(..=newline);

                    let Some(data) = sse_data(&line) else {
                        continue;
                    };
                    if data == SSE_DONE {
                        break 'outer;
                    }

                    match serde_json::from_str::<ChatChunk>(data) {
                        Ok(parsed) => {
                            if let Some(content) = parsed.content() {
                                if !content.is_empty() {
                                    yield content.to_string();
                                }
                            }
                        }
                        Err(e) => {
                            warn!("Failed to parse completion chunk: {}", e);
                        }
                    }
                }
            }

            debug!("Completion stream finished");
        };

        Ok(Box::pin(stream))
    }

    fn provider_name(&self) -> &'static str {
        "OpenAI Chat Completions"
    }
}
