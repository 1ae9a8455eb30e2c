//! `POST /api/v1/actions/available`, `POST /api/v1/actions/submit`
//! (`SPEC_FULL.md` §4.3, §6).

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use sf_domain::model::TaskPriority;
use sf_registries::ContextInput;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AvailableRequest {
    context: ContextInput,
}

pub async fn available(
    State(state): State<AppState>,
    Json(req): Json<AvailableRequest>,
) -> impl IntoResponse {
    Json(state.actions.resolve(&req.context))
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    action_id: String,
    #[serde(default)]
    context: Value,
    #[serde(default)]
    params: Value,
    #[serde(default)]
    priority: TaskPriority,
    #[serde(default)]
    group_id: Option<Uuid>,
}

#[derive(Serialize)]
pub struct SubmitResponse {
    task_id: Uuid,
}

pub async fn submit(
    State(state): State<AppState>,
    Json(req): Json<SubmitRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let task = state
        .tasks
        .submit(&req.action_id, req.context, req.params, req.priority, req.group_id)?;
    Ok(Json(SubmitResponse { task_id: task.id }))
}
