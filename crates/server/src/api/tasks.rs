//! `/api/v1/tasks*` — submit-adjacent task inspection, cancellation, and
//! per-task SSE event stream (`SPEC_FULL.md` §4.5, §6).

use std::convert::Infallible;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::stream::Stream;
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use sf_domain::model::TaskStatus;
use sf_tasks::TaskFilter;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    service: Option<String>,
    #[serde(default)]
    status: Option<TaskStatus>,
}

pub async fn list_tasks(State(state): State<AppState>, Query(q): Query<ListQuery>) -> impl IntoResponse {
    let filter = TaskFilter {
        service: q.service,
        status: q.status,
    };
    Json(state.tasks.list(&filter))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    limit: usize,
    #[serde(default)]
    service: Option<String>,
    #[serde(default)]
    status: Option<TaskStatus>,
}

fn default_history_limit() -> usize {
    100
}

pub async fn history(State(state): State<AppState>, Query(q): Query<HistoryQuery>) -> impl IntoResponse {
    Json(state.tasks.history(q.limit, q.service.as_deref(), q.status))
}

pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .tasks
        .get(id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("task {id}")))
}

pub async fn cancel_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.tasks.cancel(id) {
        return Err(ApiError::not_found(format!("task {id}")));
    }
    Ok(Json(serde_json::json!({ "cancelled": true })))
}

pub async fn task_events_sse(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    let Some(task) = state.tasks.get(id) else {
        let stream = futures_util::stream::once(async {
            Ok::<_, Infallible>(Event::default().event("error").data(r#"{"error":"task not found"}"#))
        });
        return Sse::new(stream).keep_alive(KeepAlive::default()).into_response();
    };

    if task.status.is_terminal() {
        let data = serde_json::to_string(&task).unwrap_or_default();
        let stream = futures_util::stream::once(async move {
            Ok::<_, Infallible>(Event::default().event("task.snapshot").data(data))
        });
        return Sse::new(stream).keep_alive(KeepAlive::default()).into_response();
    }

    let rx = state.events.subscribe();
    let stream = single_task_stream(rx, id);
    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

fn single_task_stream(
    mut rx: tokio::sync::broadcast::Receiver<crate::events::TaskEventFrame>,
    task_id: Uuid,
) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(frame) if frame.task_id == task_id => {
                    let terminal = frame.status.is_terminal();
                    let data = serde_json::to_string(&frame).unwrap_or_default();
                    yield Ok(Event::default().event(frame.event).data(data));
                    if terminal {
                        break;
                    }
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(n)) => {
                    yield Ok(Event::default().event("warning").data(format!("{{\"warning\":\"missed {n} events\"}}")));
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
}
