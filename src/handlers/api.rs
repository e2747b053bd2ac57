//! Health check and Twilio status callback handlers.

use axum::Json;
use axum::extract::Form;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::errors::{AppError, AppResult};

/// Health check endpoint.
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "voicebridge",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Call status transition reported by Twilio.
#[derive(Debug, Deserialize)]
pub struct StatusCallback {
    #[serde(rename = "CallSid", default)]
    pub call_sid: Option<String>,
    #[serde(rename = "CallStatus", default)]
    pub call_status: Option<String>,
}

/// Twilio posts call lifecycle transitions here; we only log them.
pub async fn status_callback(Form(status): Form<StatusCallback>) -> AppResult<()> {
    let call_sid = status
        .call_sid
        .ok_or_else(|| AppError::BadRequest("CallSid is required".to_string()))?;

    info!(
        call_sid = %call_sid,
        call_status = ?status.call_status,
        "Call status update"
    );
    Ok(())
}
