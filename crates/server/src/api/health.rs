//! `GET /api/v1/system/health` (`SPEC_FULL.md` §6).

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
enum HealthStatus {
    Healthy,
    Warn,
    Error,
}

#[derive(Serialize)]
struct HealthResponse {
    status: HealthStatus,
    backend_version: String,
    database: String,
}

/// There is no relational database to ping; "database" here reports the
/// on-disk store layer instead — whether the plugin metadata snapshot is
/// reachable under `plugins_root`.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let plugins_root = state.plugins.plugins_root();
    let database = if plugins_root.exists() || plugins_root.parent().map(|p| p.exists()).unwrap_or(true) {
        "ok".to_string()
    } else {
        "unreachable".to_string()
    };
    let status = if database == "ok" {
        HealthStatus::Healthy
    } else {
        HealthStatus::Error
    };

    Json(HealthResponse {
        status,
        backend_version: state.config.plugins.backend_version.clone(),
        database,
    })
}
