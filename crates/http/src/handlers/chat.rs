//! Chat turn endpoint: streams turn events to the client as SSE.

use std::convert::Infallible;
use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::{StreamExt, stream};
use threadline_llm::{LlmError, TurnEvent};

use crate::AppState;
use crate::request_types::ChatTurnRequest;

/// POST /api/chat
///
/// Error surface is plain text by contract with existing clients: missing
/// user id is a 400, any failure before the first stream event is a 500.
/// Once streaming has started, failures become error frames instead; the
/// status code is already on the wire.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatTurnRequest>,
) -> Response {
    let Some(user_id) =
        request.user_id.as_deref().map(str::trim).filter(|id| !id.is_empty())
    else {
        return (StatusCode::BAD_REQUEST, "User ID is required").into_response();
    };

    let mut turn = state.reconciler.begin_turn(user_id, request.messages);
    // Peek the first event so setup failures surface as a clean 500 rather
    // than an error frame on an already-committed stream.
    match turn.next().await {
        Some(Ok(first)) => {
            let events = stream::once(async move { Ok(first) }).chain(turn).map(sse_frame);
            Sse::new(events).keep_alive(KeepAlive::default()).into_response()
        },
        Some(Err(e)) => {
            tracing::error!(user_id = %user_id, error = %e, "chat turn failed before streaming");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        },
        None => {
            tracing::error!(user_id = %user_id, "chat turn produced no events");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        },
    }
}

fn sse_frame(event: Result<TurnEvent, LlmError>) -> Result<Event, Infallible> {
    match event {
        Ok(event) => {
            let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_owned());
            Ok(Event::default().data(data))
        },
        Err(e) => {
            tracing::error!(error = %e, "model stream failed mid-turn");
            Ok(Event::default().data(r#"{"type":"error"}"#))
        },
    }
}
