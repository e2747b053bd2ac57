//! Outbound side of the telephony transport.
//!
//! A pure protocol translator: synthesized audio goes out as base64 `media`
//! frames tagged with the stream SID, and barge-in goes out as a single
//! `clear` frame. The actual websocket writer lives in the stream handler;
//! this type only produces the JSON text frames and pushes them down a
//! bounded channel.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

use super::messages;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Telephony socket closed")]
    Closed,

    #[error("Invalid base64 audio payload: {0}")]
    Payload(#[from] base64::DecodeError),
}

/// Sends protocol frames for one media stream.
pub struct TelephonyTransport {
    stream_sid: String,
    sink: mpsc::Sender<String>,
}

impl TelephonyTransport {
    pub fn new(stream_sid: String, sink: mpsc::Sender<String>) -> Self {
        Self { stream_sid, sink }
    }

    pub fn stream_sid(&self) -> &str {
        &self.stream_sid
    }

    /// Relay one synthesized mu-law chunk to the caller.
    pub async fn send_audio(&self, audio: &Bytes) -> Result<(), TransportError> {
        let payload = BASE64.encode(audio);
        let frame = messages::outbound_media(&self.stream_sid, &payload);
        self.sink
            .send(frame)
            .await
            .map_err(|_| TransportError::Closed)
    }

    /// Tell Twilio to drop everything it has buffered for playback.
    pub async fn clear(&self) -> Result<(), TransportError> {
        let frame = messages::outbound_clear(&self.stream_sid);
        self.sink
            .send(frame)
            .await
            .map_err(|_| TransportError::Closed)
    }

    /// Insert a named playback checkpoint.
    pub async fn mark(&self, name: &str) -> Result<(), TransportError> {
        let frame = messages::outbound_mark(&self.stream_sid, name);
        self.sink
            .send(frame)
            .await
            .map_err(|_| TransportError::Closed)
    }
}

/// Decode the base64 payload of an inbound media frame.
pub fn decode_media_payload(payload: &str) -> Result<Bytes, TransportError> {
    Ok(Bytes::from(BASE64.decode(payload)?))
}
