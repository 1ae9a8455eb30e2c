use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AIModelRunStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AIModel {
    pub service: String,
    pub model_id: Option<String>,
    pub name: String,
    pub version: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub extra: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AIModelRun {
    pub id: uuid::Uuid,
    pub service: String,
    pub entity_type: String,
    pub entity_id: String,
    pub status: AIModelRunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub input_params: Value,
    pub result_metadata: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AIModelRunModel {
    pub run_id: uuid::Uuid,
    pub model_name: String,
    pub input_params: Value,
    /// Sampling interval in seconds between processed frames, used to
    /// resolve the default `end` of a zero-length timespan.
    pub frame_interval_s: Option<f64>,
}

/// A labeled timespan within a run's entity. `end_s` defaults to `start_s`
/// (a zero-width span) when the source frame carries no explicit end —
/// this mirrors the original ingest pipeline's behavior exactly, not the
/// `start_s + frame_interval` reading a literal spec description might
/// suggest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AIResultTimespan {
    pub run_id: uuid::Uuid,
    pub entity_id: String,
    pub payload_type: String,
    pub category: Option<String>,
    pub label: String,
    pub reference_id: Option<String>,
    pub start_s: f64,
    pub end_s: f64,
    pub confidence: f64,
}

impl AIResultTimespan {
    pub fn zero_width(
        run_id: uuid::Uuid,
        entity_id: impl Into<String>,
        payload_type: impl Into<String>,
        category: Option<String>,
        label: impl Into<String>,
        reference_id: Option<String>,
        start_s: f64,
        confidence: f64,
    ) -> Self {
        Self {
            run_id,
            entity_id: entity_id.into(),
            payload_type: payload_type.into(),
            category,
            label: label.into(),
            reference_id,
            start_s,
            end_s: start_s,
            confidence,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AIResultAggregate {
    pub run_id: uuid::Uuid,
    pub entity_id: String,
    pub payload_type: String,
    pub category: String,
    pub label: String,
    pub metric: String,
    pub value: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_width_timespan_has_equal_start_and_end() {
        let run_id = uuid::Uuid::nil();
        let ts = AIResultTimespan::zero_width(
            run_id, "scene-1", "tag", None, "kissing", None, 12.5, 0.9,
        );
        assert_eq!(ts.start_s, ts.end_s);
    }
}
