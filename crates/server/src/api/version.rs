//! `GET /api/v1/version` (`SPEC_FULL.md` §6).

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
struct VersionResponse {
    version: String,
    frontend_min_version: String,
    /// The original tracked an Alembic migration head for its relational
    /// schema; this codebase has no such schema (every store is a
    /// JSONL/snapshot file), so there is nothing to report here.
    db_alembic_head: Option<String>,
}

pub async fn version(State(state): State<AppState>) -> impl IntoResponse {
    Json(VersionResponse {
        version: state.config.plugins.backend_version.clone(),
        frontend_min_version: state.config.plugins.backend_version.clone(),
        db_alembic_head: None,
    })
}
