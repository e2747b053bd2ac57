//! Request/response types for the chat completions streaming API.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
}

/// Incremental content inside a streamed chunk.
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChunkChoice {
    pub delta: ChunkDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// One server-sent chunk of a streamed completion.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

impl ChatChunk {
    /// The text delta carried by this chunk, if any.
    pub fn content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.delta.content.as_deref())
    }
}

/// Strip the SSE framing from one line.
///
/// Returns `Some(payload)` for `data:` lines, `None` for comments, blank
/// lines and other SSE fields.
pub fn sse_data(line: &str) -> Option<&str> {
    let line = line.trim_end_matches('\r');
    line.strip_prefix("data: ")
        .or_else(|| line.strip_prefix("data:"))
        .map(str::trim_start)
}

/// Sentinel payload ending a streamed completion.
pub const SSE_DONE: &str = "[DONE]";
