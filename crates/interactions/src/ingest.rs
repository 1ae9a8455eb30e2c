//! `ingest_events` entry point: phases 1-3 of batch ingestion
//! (`SPEC_FULL.md` §4.6).

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use sf_domain::config::InteractionConfig;
use sf_domain::model::{InteractionEvent, SceneWatch};

use crate::playback::{is_control_event, replay, ReplayEvent};
use crate::segments::{extend_latest, reconcile, total_watched_s};
use crate::session::find_or_create_session_id;
use crate::store::InteractionStore;

#[derive(Debug, Clone, Serialize, Default)]
pub struct IngestResult {
    pub accepted: usize,
    pub duplicates: usize,
    pub errors: Vec<String>,
}

/// One inbound event as received over the wire, before canonical session
/// resolution.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub client_event_id: Option<String>,
    pub session_id: String,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub client_ts: DateTime<Utc>,
    pub metadata: Value,
}

const CONTROL_EVENT_LOOKBACK: usize = 5;

pub fn ingest_events(
    store: &InteractionStore,
    mut batch: Vec<InboundEvent>,
    client_fingerprint: Option<&str>,
    now: DateTime<Utc>,
    config: &InteractionConfig,
) -> IngestResult {
    let mut result = IngestResult::default();
    if batch.is_empty() {
        return result;
    }

    // Phase 1 — preprocess.
    batch.sort_by_key(|e| e.client_ts);

    let mut seen_client_ids: HashSet<String> = HashSet::new();
    let mut session_cache: HashMap<String, String> = HashMap::new();

    // Phase 2 — per-event commit.
    let mut touched_scenes: HashSet<(String, String)> = HashSet::new();
    let mut scene_last_seen: HashMap<String, DateTime<Utc>> = HashMap::new();

    for event in &batch {
        let outcome = (|| -> Result<bool, String> {
            if let Some(client_event_id) = &event.client_event_id {
                if !seen_client_ids.insert(client_event_id.clone()) {
                    return Ok(false); // in-batch duplicate
                }
                if store.has_event_id(client_event_id) {
                    return Ok(false); // already-persisted duplicate
                }
            }

            let canonical = session_cache
                .entry(event.session_id.clone())
                .or_insert_with(|| {
                    find_or_create_session_id(store, &event.session_id, client_fingerprint, now, config)
                })
                .clone();

            if event.event_type == "scene_watch_progress" {
                if event.entity_type == "scene" || event.entity_type == "image" || event.entity_type == "gallery" {
                    store.update_last_entity(&canonical, &event.entity_type, &event.entity_id, event.client_ts);
                } else {
                    store.advance_last_event(&canonical, event.client_ts);
                }
            } else {
                store.insert_event(InteractionEvent {
                    client_event_id: event.client_event_id.clone(),
                    session_id: canonical.clone(),
                    event_type: event.event_type.clone(),
                    entity_type: event.entity_type.clone(),
                    entity_id: event.entity_id.clone(),
                    client_ts: event.client_ts,
                    metadata: event.metadata.clone(),
                });
                store.advance_last_event(&canonical, event.client_ts);
                if matches!(event.entity_type.as_str(), "scene" | "image" | "gallery") {
                    store.update_last_entity(&canonical, &event.entity_type, &event.entity_id, event.client_ts);
                } else if event.entity_type == "session" {
                    if let Some(last_entity) = event.metadata.get("last_entity") {
                        if let (Some(t), Some(i)) = (
                            last_entity.get("type").and_then(Value::as_str),
                            last_entity.get("id").and_then(Value::as_str),
                        ) {
                            let ts = last_entity
                                .get("ts")
                                .and_then(parse_flexible_ts)
                                .unwrap_or(event.client_ts);
                            store.update_last_entity(&canonical, t, i, ts);
                        }
                    }
                }
            }

            if event.entity_type == "scene" {
                touched_scenes.insert((canonical.clone(), event.entity_id.clone()));
                let seen = scene_last_seen.entry(event.entity_id.clone()).or_insert(event.client_ts);
                if event.client_ts > *seen {
                    *seen = event.client_ts;
                }
            }

            Ok(true)
        })();

        match outcome {
            Ok(true) => result.accepted += 1,
            Ok(false) => result.duplicates += 1,
            Err(message) => result.errors.push(message),
        }
    }

    // Phase 3 — scene summaries.
    for (session_id, scene_id) in &touched_scenes {
        if let Err(message) = summarize_scene(store, &batch, &session_cache, session_id, scene_id, config) {
            result.errors.push(message);
        }
    }

    let unique_scene_ids: HashSet<&String> = touched_scenes.iter().map(|(_, scene_id)| scene_id).collect();
    for scene_id in unique_scene_ids {
        if let Some(ts) = scene_last_seen.get(scene_id) {
            store.bump_view("scene", scene_id, *ts);
        }
    }

    result
}

fn parse_flexible_ts(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| s.parse::<i64>().ok().and_then(|ms| DateTime::from_timestamp_millis(ms))),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

fn summarize_scene(
    store: &InteractionStore,
    batch: &[InboundEvent],
    session_cache: &HashMap<String, String>,
    session_id: &str,
    scene_id: &str,
    config: &InteractionConfig,
) -> Result<(), String> {
    let scene_batch: Vec<&InboundEvent> = batch
        .iter()
        .filter(|e| e.entity_type == "scene" && e.entity_id == scene_id)
        .filter(|e| session_cache.get(&e.session_id).map(String::as_str) == Some(session_id))
        .collect();
    if scene_batch.is_empty() {
        return Ok(());
    }

    let batch_min_ts = scene_batch.iter().map(|e| e.client_ts).min().unwrap();
    let batch_max_ts = scene_batch.iter().map(|e| e.client_ts).max().unwrap();

    let session = store.get_session(session_id);

    let mut watch = store.get_scene_watch(session_id, scene_id).unwrap_or(SceneWatch {
        session_id: session_id.to_string(),
        scene_id: scene_id.to_string(),
        page_entered_at: batch_min_ts,
        page_left_at: None,
        total_watched_s: 0.0,
        watch_percent: 0.0,
        last_processed_event_ts: batch_min_ts,
    });

    if let Some(entered) = scene_batch
        .iter()
        .filter(|e| matches!(e.event_type.as_str(), "scene_page_enter" | "scene_view"))
        .map(|e| e.client_ts)
        .min()
    {
        if entered < watch.page_entered_at {
            watch.page_entered_at = entered;
        }
    }
    // An explicit leave event always extends `page_left_at`, regardless of
    // whether the user's last-known entity still matches this scene.
    if let Some(left) = scene_batch
        .iter()
        .filter(|e| e.event_type == "scene_page_leave")
        .map(|e| e.client_ts)
        .max()
    {
        watch.page_left_at = Some(watch.page_left_at.map_or(left, |prev| prev.max(left)));
    }

    // No explicit leave event ever arrived for this scene: infer one only
    // if the session has since moved on to a different entity, using
    // whichever of its last-entity/last-event timestamps is available.
    if watch.page_left_at.is_none() {
        if let Some(session) = session.as_ref() {
            let last_entity_differs = session.last_entity_type.as_deref() != Some("scene")
                || session.last_entity_id.as_deref() != Some(scene_id);
            if last_entity_differs {
                if let Some(candidate) = session.last_entity_event_ts.or(Some(session.last_event_ts)) {
                    if candidate >= watch.page_entered_at {
                        watch.page_left_at = Some(candidate);
                    }
                }
            }
        }
    }

    let has_watch_events = scene_batch.iter().any(|e| {
        matches!(
            e.event_type.as_str(),
            "scene_watch_start" | "scene_watch_pause" | "scene_watch_complete" | "scene_watch_progress" | "scene_seek"
        )
    });

    let mut duration_hint: Option<f64> = scene_batch
        .iter()
        .filter_map(|e| e.metadata.get("duration").and_then(Value::as_f64))
        .last();

    if has_watch_events {
        recompute_segments(store, session_id, scene_id, &scene_batch, batch_min_ts, batch_max_ts, &mut watch, config);
    }

    if duration_hint.is_none() {
        if let (Some(entered), Some(left)) = (Some(watch.page_entered_at), watch.page_left_at) {
            let d = (left - entered).num_milliseconds() as f64 / 1000.0;
            if d > 0.0 {
                duration_hint = Some(d);
            }
        }
    }
    if let Some(duration) = duration_hint {
        if duration > 0.0 {
            watch.watch_percent = (watch.total_watched_s / duration * 100.0).min(100.0);
        }
    }

    store.upsert_scene_watch(watch);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn recompute_segments(
    store: &InteractionStore,
    session_id: &str,
    scene_id: &str,
    scene_batch: &[&InboundEvent],
    batch_min_ts: DateTime<Utc>,
    batch_max_ts: DateTime<Utc>,
    watch: &mut SceneWatch,
    config: &InteractionConfig,
) {
    let margin = chrono::Duration::milliseconds((config.segment_time_margin_seconds * 1000.0) as i64);
    let window_start = batch_min_ts - margin;
    let window_end = batch_max_ts + margin;

    let mut context: Vec<InteractionEvent> = store.recent_scene_events_before(session_id, scene_id, window_start, CONTROL_EVENT_LOOKBACK);
    if !context.iter().any(|e| is_control_event(&e.event_type)) {
        if let Some(control) = store
            .recent_scene_events_before(session_id, scene_id, window_start, usize::MAX)
            .into_iter()
            .find(|e| is_control_event(&e.event_type))
        {
            context.push(control);
        }
    }
    context.sort_by_key(|e| e.client_ts);

    let mut in_window = store.scene_events_in_window(session_id, scene_id, window_start, window_end);

    let append_fast = batch_min_ts > watch.last_processed_event_ts + margin;
    let mut after_window = None;
    if !append_fast {
        after_window = store.next_scene_event_after(session_id, scene_id, window_end);
    }

    let mut sequence: Vec<ReplayEvent> = context
        .into_iter()
        .map(|e| ReplayEvent::new(e.event_type, e.metadata))
        .collect();
    in_window.sort_by_key(|e| e.client_ts);
    sequence.extend(in_window.into_iter().map(|e| ReplayEvent::new(e.event_type, e.metadata)));
    for event in scene_batch {
        if event.event_type != "scene_page_enter" && event.event_type != "scene_page_leave" && event.event_type != "scene_view" {
            sequence.push(ReplayEvent::new(event.event_type.clone(), event.metadata.clone()));
        }
    }
    if let Some(e) = after_window {
        sequence.push(ReplayEvent::new(e.event_type, e.metadata));
    }

    let fresh = replay(&sequence);
    let existing = store.get_segments(session_id, scene_id);

    let only_progress = scene_batch.iter().all(|e| e.event_type == "scene_watch_progress");
    let segments = if fresh.is_empty() && only_progress && !existing.is_empty() {
        let max_progress = scene_batch
            .iter()
            .filter_map(|e| e.metadata.get("position").and_then(Value::as_f64))
            .fold(f64::MIN, f64::max);
        let mut extended = existing;
        if max_progress > f64::MIN {
            extend_latest(&mut extended, max_progress, config.segment_merge_gap_seconds);
        }
        extended
    } else {
        reconcile(&existing, &fresh, config.segment_merge_gap_seconds, config.segment_min_duration_seconds)
    };

    watch.total_watched_s = total_watched_s(&segments);
    watch.last_processed_event_ts = batch_max_ts;
    store.set_segments(session_id, scene_id, segments);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn ts(s: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(s, 0).unwrap()
    }

    fn event(session: &str, ts_s: i64, event_type: &str, entity_type: &str, entity_id: &str, metadata: Value) -> InboundEvent {
        InboundEvent {
            client_event_id: None,
            session_id: session.into(),
            event_type: event_type.into(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            client_ts: ts(ts_s),
            metadata,
        }
    }

    #[test]
    fn dedupe_same_client_event_id_in_one_batch() {
        let store = InteractionStore::new();
        let config = InteractionConfig::default();
        let mut e1 = event("s1", 0, "scene_view", "scene", "42", json!({}));
        e1.client_event_id = Some("e1".into());
        let mut e2 = e1.clone();
        e2.client_event_id = Some("e1".into());
        let result = ingest_events(&store, vec![e1, e2], None, ts(0), &config);
        assert_eq!(result.accepted, 1);
        assert_eq!(result.duplicates, 1);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn segment_reconstruction_from_start_progress_pause() {
        let store = InteractionStore::new();
        let config = InteractionConfig::default();
        let batch = vec![
            event("s1", 0, "scene_watch_start", "scene", "42", json!({"position": 0.0})),
            event("s1", 10, "scene_watch_progress", "scene", "42", json!({"position": 10.0})),
            event("s1", 15, "scene_watch_complete", "scene", "42", json!({"position": 15.0, "duration": 60.0})),
        ];
        let result = ingest_events(&store, batch, None, ts(15), &config);
        assert!(result.errors.is_empty());

        let watch = store.get_scene_watch("s1", "42").unwrap();
        assert_eq!(watch.total_watched_s, 15.0);
        assert_eq!(watch.watch_percent, 25.0);

        let segments = store.get_segments("s1", "42");
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].start_s, 0.0);
        assert_eq!(segments[0].end_s, 15.0);
    }

    #[test]
    fn seek_splits_into_two_segments_when_gap_exceeds_merge_tolerance() {
        let store = InteractionStore::new();
        let config = InteractionConfig::default();
        let batch = vec![
            event("s1", 0, "scene_watch_start", "scene", "42", json!({"position": 0.0})),
            event("s1", 5, "scene_seek", "scene", "42", json!({"from": 5.0, "to": 30.0})),
            event("s1", 40, "scene_watch_pause", "scene", "42", json!({"position": 40.0})),
        ];
        let result = ingest_events(&store, batch, None, ts(40), &config);
        assert!(result.errors.is_empty());

        let segments = store.get_segments("s1", "42");
        assert_eq!(segments.len(), 2);
        assert_eq!((segments[0].start_s, segments[0].end_s), (0.0, 5.0));
        assert_eq!((segments[1].start_s, segments[1].end_s), (30.0, 40.0));

        let watch = store.get_scene_watch("s1", "42").unwrap();
        assert_eq!(watch.total_watched_s, 15.0);
    }

    #[test]
    fn progress_events_never_persist_as_rows() {
        let store = InteractionStore::new();
        let config = InteractionConfig::default();
        let batch = vec![
            event("s1", 0, "scene_watch_start", "scene", "42", json!({"position": 0.0})),
            event("s1", 5, "scene_watch_progress", "scene", "42", json!({"position": 5.0})),
        ];
        let result = ingest_events(&store, batch, None, ts(5), &config);
        assert_eq!(result.accepted, 2);
        assert!(!store.has_event_id("irrelevant"));
    }
}
