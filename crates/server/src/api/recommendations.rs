//! `/api/v1/recommendations/*` (`SPEC_FULL.md` §4.3, §6).

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use sf_registries::{RecContext, RecommendationQuery};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ContextQuery {
    context: RecContext,
}

pub async fn list_recommenders(
    State(state): State<AppState>,
    Query(q): Query<ContextQuery>,
) -> impl IntoResponse {
    Json(state.recommenders.list_for_context(q.context))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    context: RecContext,
    recommender_id: String,
    #[serde(default)]
    config: Value,
    #[serde(default)]
    seed_scene_ids: Vec<String>,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
}

fn default_limit() -> usize {
    20
}

pub async fn query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let query = RecommendationQuery {
        seed_scene_ids: req.seed_scene_ids,
        config: req.config,
        limit: req.limit,
        offset: req.offset,
    };
    let page = state
        .recommenders
        .query(&req.recommender_id, req.context, query)
        .await?;
    Ok(Json(page))
}
