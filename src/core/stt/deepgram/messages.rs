//! WebSocket message types for the Deepgram live transcription API.
//!
//! - **Incoming messages**: Messages received from server
//!   - [`ResultsMessage`]: interim/final transcription results
//!   - [`UtteranceEndMessage`]: silence-based end-of-utterance marker
//!   - [`SpeechStartedMessage`]: voice activity onset
//!   - [`MetadataMessage`]: stream metadata, sent at close
//!
//! - **Outgoing messages**: Messages sent to server
//!   - Binary audio data (sent directly, no JSON wrapper)
//!   - [`KeepAliveMessage`]: heartbeat to hold the connection open
//!   - [`CloseStreamMessage`]: graceful shutdown request

use serde::{Deserialize, Serialize};

// =============================================================================
// Incoming Messages (Server to Client)
// =============================================================================

/// One transcription alternative.
#[derive(Debug, Clone, Deserialize)]
pub struct Alternative {
    pub transcript: String,
    #[serde(default)]
    pub confidence: f64,
}

/// Channel block containing the alternatives for a result.
#[derive(Debug, Clone, Deserialize)]
pub struct ResultChannel {
    #[serde(default)]
    pub alternatives: Vec<Alternative>,
}

/// Transcription result, interim or final.
#[derive(Debug, Clone, Deserialize)]
pub struct ResultsMessage {
    pub channel: ResultChannel,
    #[serde(default)]
    pub is_final: bool,
    /// Endpointing fired: the speaker paused long enough to close the segment.
    #[serde(default)]
    pub speech_final: bool,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub start: Option<f64>,
}

impl ResultsMessage {
    /// The top transcription alternative, if any.
    pub fn transcript(&self) -> &str {
        self.channel
            .alternatives
            .first()
            .map(|alt| alt.transcript.as_str())
            .unwrap_or("")
    }
}

/// Emitted after `utterance_end_ms` of silence following speech.
///
/// Note the `channel` field here is an index array, not a result block.
#[derive(Debug, Clone, Deserialize)]
pub struct UtteranceEndMessage {
    #[serde(default)]
    pub channel: Vec<u32>,
    #[serde(default)]
    pub last_word_end: Option<f64>,
}

/// Voice activity detected.
#[derive(Debug, Clone, Deserialize)]
pub struct SpeechStartedMessage {
    #[serde(default)]
    pub timestamp: Option<f64>,
}

/// Stream metadata, typically delivered when the stream closes.
#[derive(Debug, Clone, Deserialize)]
pub struct MetadataMessage {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
}

// =============================================================================
// Outgoing Messages (Client to Server)
// =============================================================================

/// Heartbeat keeping the websocket open during silence.
#[derive(Debug, Clone, Serialize)]
pub struct KeepAliveMessage {
    #[serde(rename = "type")]
    pub message_type: &'static str,
}

impl Default for KeepAliveMessage {
    fn default() -> Self {
        Self {
            message_type: "KeepAlive",
        }
    }
}

/// Request a graceful close; Deepgram flushes pending results first.
#[derive(Debug, Clone, Serialize)]
pub struct CloseStreamMessage {
    #[serde(rename = "type")]
    pub message_type: &'static str,
}

impl Default for CloseStreamMessage {
    fn default() -> Self {
        Self {
            message_type: "CloseStream",
        }
    }
}

// =============================================================================
// Message Enum and Parsing
// =============================================================================

/// Enum for all possible WebSocket messages from Deepgram live transcription.
#[derive(Debug)]
pub enum DeepgramSttMessage {
    Results(ResultsMessage),
    UtteranceEnd(UtteranceEndMessage),
    SpeechStarted(SpeechStartedMessage),
    Metadata(MetadataMessage),
    /// Unknown message type (for forward compatibility)
    Unknown(String),
}

impl DeepgramSttMessage {
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
            "Results" => {
                let msg: ResultsMessage = serde_json::from_str(text)?;
                Ok(DeepgramSttMessage::Results(msg))
            }
            "UtteranceEnd" => {
                let msg: UtteranceEndMessage = serde_json::from_str(text)?;
                Ok(DeepgramSttMessage::UtteranceEnd(msg))
            }
            "SpeechStarted" => {
                let msg: SpeechStartedMessage = serde_json::from_str(text)?;
                Ok(DeepgramSttMessage::SpeechStarted(msg))
            }
            "Metadata" => {
                let msg: MetadataMessage = serde_json::from_str(text)?;
                Ok(DeepgramSttMessage::Metadata(msg))
            }
            _ => Ok(DeepgramSttMessage::Unknown(text.to_string())),
        }
    }
}
