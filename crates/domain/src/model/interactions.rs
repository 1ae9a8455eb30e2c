use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_event_id: Option<String>,
    pub session_id: String,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub client_ts: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionSession {
    pub session_id: String,
    pub client_fingerprint: String,
    pub session_start_ts: DateTime<Utc>,
    pub last_event_ts: DateTime<Utc>,
    pub last_entity_type: Option<String>,
    pub last_entity_id: Option<String>,
    pub last_entity_event_ts: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl InteractionSession {
    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }
}

/// An alias maps a session id observed at ingest time to the canonical
/// session it was merged into (fingerprint dedupe within the merge TTL).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionSessionAlias {
    pub alias_session_id: String,
    pub canonical_session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneWatch {
    pub session_id: String,
    pub scene_id: String,
    pub page_entered_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_left_at: Option<DateTime<Utc>>,
    pub total_watched_s: f64,
    pub watch_percent: f64,
    pub last_processed_event_ts: DateTime<Utc>,
}

/// A closed interval in media-time. `start_s < end_s` is an invariant
/// enforced by the ingestor before a segment is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SceneWatchSegment {
    pub start_s: f64,
    pub end_s: f64,
}

impl SceneWatchSegment {
    pub fn watched_s(&self) -> f64 {
        self.end_s - self.start_s
    }

    /// Whether `other` lies within `gap` seconds of this segment, i.e.
    /// the two should be merged into one by the windowed recomputation.
    pub fn mergeable_with(&self, other: &SceneWatchSegment, gap: f64) -> bool {
        other.start_s <= self.end_s + gap
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EntityDerived {
    pub view_count: u64,
    pub derived_o_count: u64,
    pub last_viewed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionLibrarySearch {
    pub session_id: String,
    pub library: String,
    pub query: String,
    #[serde(default)]
    pub filters: Value,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(a: f64, b: f64) -> SceneWatchSegment {
        SceneWatchSegment { start_s: a, end_s: b }
    }

    #[test]
    fn watched_s_is_interval_length() {
        assert_eq!(seg(1.0, 3.5).watched_s(), 2.5);
    }

    #[test]
    fn mergeable_within_gap_tolerance() {
        let a = seg(0.0, 10.0);
        assert!(a.mergeable_with(&seg(10.4, 12.0), 0.5));
        assert!(!a.mergeable_with(&seg(11.0, 12.0), 0.5));
    }
}
