//! Session row endpoints: fetch, delete, manual task override.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use threadline_core::Session;
use threadline_storage::SessionStore;

use crate::AppState;
use crate::api_error::ApiError;
use crate::request_types::TaskUpdateRequest;
use crate::response_types::{SessionDeleteResponse, TaskUpdateResponse};

/// GET /api/session/{user_id}
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    match state.storage.get_session(&user_id).await? {
        Some(session) => Ok(Json(session)),
        None => Err(ApiError::NotFound(format!("no session for user '{user_id}'"))),
    }
}

/// DELETE /api/session/{user_id}
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<SessionDeleteResponse>, ApiError> {
    let deleted = state.storage.delete_session(&user_id).await?;
    Ok(Json(SessionDeleteResponse { deleted, user_id }))
}

/// PUT /api/session/{user_id}/task
pub async fn update_task(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(request): Json<TaskUpdateRequest>,
) -> Result<Json<TaskUpdateResponse>, ApiError> {
    let updated = state
        .storage
        .update_task(&user_id, request.current_task.as_deref(), request.task_status)
        .await?;
    if !updated {
        return Err(ApiError::NotFound(format!("no session for user '{user_id}'")));
    }
    Ok(Json(TaskUpdateResponse {
        user_id,
        current_task: request.current_task,
        task_status: request.task_status,
    }))
}
