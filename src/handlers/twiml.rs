//! TwiML webhook: tells Twilio to stream call audio to this server.

use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use tracing::debug;

use crate::state::AppState;

/// Build the TwiML document pointing Twilio at the stream websocket.
pub fn twiml_document(stream_url: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
  <Connect>
    <Stream url="{stream_url}" />
  </Connect>
</Response>
"#
    )
}

/// Twilio fetches this when a call comes in.
pub async fn twiml(State(state): State<AppState>) -> Response {
    let stream_url = state.config.stream_url();
    debug!(stream_url = %stream_url, "Serving TwiML");

    (
        [(header::CONTENT_TYPE, "text/xml")],
        twiml_document(&stream_url),
    )
        .into_response()
}
