//! Chat routes: the `/api/chat` relay and `/api/chat/status`.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use promptflam_chat::relay;
use promptflam_chat::ChatRequest;
use tokio_stream::StreamExt;
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/chat", post(relay_chat))
        .route("/chat/status", get(get_status))
}

// ---------------------------------------------------------------
// Status
// ---------------------------------------------------------------

async fn get_status(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let config = &state.relay;
    Json(serde_json::json!({
        "llmAvailable": config.is_configured(),
        "provider": "perplexity",
        "model": config.model,
        "endpoint": config.endpoint,
    }))
}

// ---------------------------------------------------------------
// Streaming relay (SSE)
// ---------------------------------------------------------------

/// Validate, open the upstream stream, then relay it.
///
/// Everything up to the upstream's response headers fails with a JSON
/// `{error}` body. Once the SSE response is committed, a transport failure
/// can only abort the body.
async fn relay_chat(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let turns = ChatRequest::parse(&body)?;
    let upstream = relay::open_upstream(&state.client, &state.relay, &turns).await?;

    info!("Relaying chat stream ({} turns)", turns.len());

    let events = relay::relay_events(upstream.bytes_stream())
        .map(|event| event.map(|e| Event::default().data(e.payload())));

    Ok((
        [(header::CONNECTION, "keep-alive")],
        Sse::new(events),
    )
        .into_response())
}
