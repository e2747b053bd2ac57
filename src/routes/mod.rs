//! Router construction.

use axum::Router;
use axum::routing::{get, post};

use crate::handlers;
use crate::state::AppState;

/// Build the full application router.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::api::health_check))
        .route(
            "/twiml",
            get(handlers::twiml::twiml).post(handlers::twiml::twiml),
        )
        .route("/status-callback", post(handlers::api::status_callback))
        .route("/streams", get(handlers::stream::stream_handler))
}
