//! `POST /api/v1/interactions/sync` (`SPEC_FULL.md` §4.6, §6).

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use sf_interactions::{ingest_events, InboundEvent};

use crate::state::AppState;

/// Wire shape for one inbound event. Mirrors [`InboundEvent`] exactly;
/// kept separate since that type has no `Deserialize` impl of its own —
/// the only place this crate needs one.
#[derive(Debug, Deserialize)]
pub struct InboundEventDto {
    #[serde(default)]
    client_event_id: Option<String>,
    session_id: String,
    event_type: String,
    entity_type: String,
    entity_id: String,
    client_ts: DateTime<Utc>,
    #[serde(default)]
    metadata: Value,
}

impl From<InboundEventDto> for InboundEvent {
    fn from(dto: InboundEventDto) -> Self {
        InboundEvent {
            client_event_id: dto.client_event_id,
            session_id: dto.session_id,
            event_type: dto.event_type,
            entity_type: dto.entity_type,
            entity_id: dto.entity_id,
            client_ts: dto.client_ts,
            metadata: dto.metadata,
        }
    }
}

pub async fn sync(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(batch): Json<Vec<InboundEventDto>>,
) -> impl IntoResponse {
    let fingerprint = headers
        .get("x-client-fingerprint")
        .and_then(|v| v.to_str().ok());

    let events = batch.into_iter().map(InboundEvent::from).collect();
    let result = ingest_events(
        &state.interactions,
        events,
        fingerprint,
        Utc::now(),
        &state.config.interactions,
    );
    Json(result)
}
