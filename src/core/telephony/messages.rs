//! Message types for the Twilio Media Streams WebSocket protocol.
//!
//! Twilio sends JSON text frames tagged by an `event` field:
//!
//! - [`ConnectedEvent`]: protocol handshake, first frame on the socket
//! - [`StartEvent`]: stream metadata (stream SID, call SID, media format)
//! - [`MediaEvent`]: one base64 mu-law audio frame (inbound or outbound track)
//! - [`StopEvent`]: the call ended
//! - [`MarkEvent`]: playback checkpoint acknowledgement
//!
//! Outbound frames are built with [`outbound_media`], [`outbound_clear`] and
//! [`outbound_mark`]; `clear` tells Twilio to drop its buffered playback and
//! is used exclusively for barge-in.

use serde::{Deserialize, Serialize};

// =============================================================================
// Incoming Events (Twilio to Server)
// =============================================================================

/// Handshake event sent once when Twilio opens the stream.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectedEvent {
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// Metadata block inside a `start` event.
#[derive(Debug, Clone, Deserialize)]
pub struct StartMetadata {
    #[serde(rename = "streamSid")]
    pub stream_sid: String,
    #[serde(rename = "callSid")]
    pub call_sid: String,
    #[serde(rename = "accountSid", default)]
    pub account_sid: Option<String>,
    #[serde(default)]
    pub tracks: Vec<String>,
}

/// Start event: the stream is live and frames will follow.
#[derive(Debug, Clone, Deserialize)]
pub struct StartEvent {
    pub start: StartMetadata,
    #[serde(rename = "streamSid")]
    pub stream_sid: String,
}

/// Audio payload inside a `media` event.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaPayload {
    /// "inbound" (caller audio) or "outbound" (our own playback echoed back).
    #[serde(default)]
    pub track: Option<String>,
    /// Base64-encoded mu-law 8 kHz mono audio.
    pub payload: String,
}

/// One audio frame from the call.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaEvent {
    pub media: MediaPayload,
    #[serde(rename = "streamSid", default)]
    pub stream_sid: Option<String>,
}

impl MediaEvent {
    /// Only inbound-track frames carry caller audio worth recognizing.
    pub fn is_inbound(&self) -> bool {
        match self.media.track.as_deref() {
            Some(track) => track == "inbound",
            // Twilio omits the track field on single-track streams.
            None => true,
        }
    }
}

/// Stop event: the call (or the stream) has ended.
#[derive(Debug, Clone, Deserialize)]
pub struct StopEvent {
    #[serde(rename = "streamSid", default)]
    pub stream_sid: Option<String>,
}

/// Mark acknowledgement from Twilio after playback reaches a named point.
#[derive(Debug, Clone, Deserialize)]
pub struct MarkEvent {
    pub mark: MarkName,
    #[serde(rename = "streamSid", default)]
    pub stream_sid: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MarkName {
    pub name: String,
}

// =============================================================================
// Event Enum and Parsing
// =============================================================================

/// All events Twilio can send over the media stream socket.
#[derive(Debug)]
pub enum TwilioEvent {
    Connected(ConnectedEvent),
    Start(StartEvent),
    Media(MediaEvent),
    Stop(StopEvent),
    Mark(MarkEvent),
    /// Unknown event type (for forward compatibility)
    Unknown(String),
}

impl TwilioEvent {
    /// Parse a WebSocket text frame into the appropriate event type.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        // First, peek at the event field
        #[derive(Deserialize)]
        struct EventPeek {
            event: String,
        }

        let peek: EventPeek = serde_json::from_str(text)?;

        match peek.event.as_str() {
            "connected" => {
                let msg: ConnectedEvent = serde_json::from_str(text)?;
                Ok(TwilioEvent::Connected(msg))
            }
            "start" => {
                let msg: StartEvent = serde_json::from_str(text)?;
                Ok(TwilioEvent::Start(msg))
            }
            "media" => {
                let msg: MediaEvent = serde_json::from_str(text)?;
                Ok(TwilioEvent::Media(msg))
            }
            "stop" => {
                let msg: StopEvent = serde_json::from_str(text)?;
                Ok(TwilioEvent::Stop(msg))
            }
            "mark" => {
                let msg: MarkEvent = serde_json::from_str(text)?;
                Ok(TwilioEvent::Mark(msg))
            }
            _ => Ok(TwilioEvent::Unknown(text.to_string())),
        }
    }
}

// =============================================================================
// Outgoing Events (Server to Twilio)
// =============================================================================

/// Build an outbound `media` frame carrying base64 mu-law audio.
pub fn outbound_media(stream_sid: &str, payload_b64: &str) -> String {
    serde_json::json!({
        "event": "media",
        "streamSid": stream_sid,
        "media": { "payload": payload_b64 }
    })
    .to_string()
}

/// Build a `clear` frame telling Twilio to drop buffered playback.
pub fn outbound_clear(stream_sid: &str) -> String {
    serde_json::json!({
        "event": "clear",
        "streamSid": stream_sid
    })
    .to_string()
}

/// Build a `mark` frame; Twilio echoes it back once playback reaches it.
pub fn outbound_mark(stream_sid: &str, name: &str) -> String {
    serde_json::json!({
        "event": "mark",
        "streamSid": stream_sid,
        "mark": { "name": name }
    })
    .to_string()
}
