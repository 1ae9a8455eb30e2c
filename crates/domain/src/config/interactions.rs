use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Interaction ingestor configuration (static fallback; see system
// settings INTERACTION_* / SEGMENT_* for the runtime-mutable layer)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionConfig {
    #[serde(default = "default_min_session_minutes")]
    pub min_session_minutes: f64,
    #[serde(default = "default_merge_ttl_seconds")]
    pub merge_ttl_seconds: f64,
    #[serde(default = "default_segment_merge_gap_seconds")]
    pub segment_merge_gap_seconds: f64,
    #[serde(default = "default_segment_time_margin_seconds")]
    pub segment_time_margin_seconds: f64,
    #[serde(default = "default_segment_min_duration_seconds")]
    pub segment_min_duration_seconds: f64,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            min_session_minutes: default_min_session_minutes(),
            merge_ttl_seconds: default_merge_ttl_seconds(),
            segment_merge_gap_seconds: default_segment_merge_gap_seconds(),
            segment_time_margin_seconds: default_segment_time_margin_seconds(),
            segment_min_duration_seconds: default_segment_min_duration_seconds(),
        }
    }
}

fn default_min_session_minutes() -> f64 {
    10.0
}
fn default_merge_ttl_seconds() -> f64 {
    120.0
}
fn default_segment_merge_gap_seconds() -> f64 {
    0.5
}
fn default_segment_time_margin_seconds() -> f64 {
    2.0
}
fn default_segment_min_duration_seconds() -> f64 {
    1.5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_original_seed_values() {
        let cfg = InteractionConfig::default();
        assert_eq!(cfg.min_session_minutes, 10.0);
        assert_eq!(cfg.merge_ttl_seconds, 120.0);
        assert_eq!(cfg.segment_merge_gap_seconds, 0.5);
        assert_eq!(cfg.segment_time_margin_seconds, 2.0);
        assert_eq!(cfg.segment_min_duration_seconds, 1.5);
    }
}
