//! WebSocket message types for the Deepgram Speak API.
//!
//! Audio arrives as raw binary frames; everything else is JSON text tagged by
//! a `type` field.
//!
//! - **Incoming messages**: Messages received from server
//!   - [`MetadataMessage`]: request/model information at connect time
//!   - [`FlushedMessage`]: everything sent before the flush is synthesized
//!   - [`ClearedMessage`]: the synthesis buffer was dropped
//!   - [`WarningMessage`]: non-fatal problem with a submitted text fragment
//!
//! - **Outgoing messages**: Messages sent to server
//!   - [`SpeakMessage`]: queue a text fragment for synthesis
//!   - [`FlushMessage`]: force synthesis of queued text
//!   - [`ClearMessage`]: drop queued and in-flight synthesis
//!   - [`CloseMessage`]: graceful shutdown request

use serde::{Deserialize, Serialize};

// =============================================================================
// Incoming Messages (Server to Client)
// =============================================================================

/// Connection metadata sent when the stream opens.
#[derive(Debug, Clone, Deserialize)]
pub struct MetadataMessage {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub model_name: Option<String>,
}

/// Acknowledges a `Flush`: all queued text has been synthesized.
#[derive(Debug, Clone, Deserialize)]
pub struct FlushedMessage {
    #[serde(default)]
    pub sequence_id: Option<u64>,
}

/// Acknowledges a `Clear`: the synthesis buffer was dropped.
#[derive(Debug, Clone, Deserialize)]
pub struct ClearedMessage {
    #[serde(default)]
    pub sequence_id: Option<u64>,
}

/// Non-fatal warning about a submitted fragment.
#[derive(Debug, Clone, Deserialize)]
pub struct WarningMessage {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

// =============================================================================
// Outgoing Messages (Client to Server)
// =============================================================================

/// Queue a text fragment for synthesis.
#[derive(Debug, Clone, Serialize)]
pub struct SpeakMessage {
    #[serde(rename = "type")]
    pub message_type: &'static str,
    pub text: String,
}

impl SpeakMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            message_type: "Speak",
            text: text.into(),
        }
    }
}

/// Force synthesis of everything queued so far.
#[derive(Debug, Clone, Serialize)]
pub struct FlushMessage {
    #[serde(rename = "type")]
    pub message_type: &'static str,
}

impl Default for FlushMessage {
    fn default() -> Self {
        Self {
            message_type: "Flush",
        }
    }
}

/// Drop queued and in-flight synthesis output.
#[derive(Debug, Clone, Serialize)]
pub struct ClearMessage {
    #[serde(rename = "type")]
    pub message_type: &'static str,
}

impl Default for ClearMessage {
    fn default() -> Self {
        Self {
            message_type: "Clear",
        }
    }
}

/// Graceful shutdown request.
#[derive(Debug, Clone, Serialize)]
pub struct CloseMessage {
    #[serde(rename = "type")]
    pub message_type: &'static str,
}

impl Default for CloseMessage {
    fn default() -> Self {
        Self {
            message_type: "Close",
        }
    }
}

// =============================================================================
// Message Enum and Parsing
// =============================================================================

/// Enum for all possible JSON messages from the Deepgram Speak API.
#[derive(Debug)]
pub enum DeepgramTtsMessage {
    Metadata(MetadataMessage),
    Flushed(FlushedMessage),
    Cleared(ClearedMessage),
    Warning(WarningMessage),
    /// Unknown message type (for forward compatibility)
    Unknown(String),
}

impl DeepgramTtsMessage {
    /// Parse a WebSocket text message into the appropriate type.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        // First, peek at the type field
        #[derive(Deserialize)]
        struct TypePeek {
            #[serde(rename = "type")]
            message_type: String,
        }

        let peek: TypePeek = serde_json::from_str(text)?;

        match peek.message_type.as_str() {
            "Metadata" => {
                let msg: MetadataMessage = serde_json::from_str(text)?;
                Ok(DeepgramTtsMessage::Metadata(msg))
            }
            "Flushed" => {
                let msg: FlushedMessage = serde_json::from_str(text)?;
                Ok(DeepgramTtsMessage::Flushed(msg))
            }
            "Cleared" => {
                let msg: ClearedMessage = serde_json::from_str(text)?;
                Ok(DeepgramTtsMessage::Cleared(msg))
            }
            "Warning" => {
                let msg: WarningMessage = serde_json::from_str(text)?;
                Ok(DeepgramTtsMessage::Warning(msg))
            }
            _ => Ok(DeepgramTtsMessage::Unknown(text.to_string())),
        }
    }
}
