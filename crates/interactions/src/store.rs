//! In-memory interaction state with optional disk persistence, mirroring
//! the `JsonSnapshot`/`JsonlLog` split used by the task history store:
//! naturally append-only rows (events) go to a jsonl log, small mutable
//! tables (sessions, aliases, scene watches, segments, derived counts) go
//! to one whole-file snapshot.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use sf_domain::error::Result;
use sf_domain::model::{
    EntityDerived, InteractionEvent, InteractionSession, SceneWatch, SceneWatchSegment,
};
use sf_domain::storage::{JsonSnapshot, JsonlLog};

fn scene_key(session_id: &str, scene_id: &str) -> String {
    format!("{session_id}\u{1}{scene_id}")
}

fn entity_key(entity_type: &str, entity_id: &str) -> String {
    format!("{entity_type}\u{1}{entity_id}")
}

#[derive(Default, Serialize, Deserialize)]
struct State {
    sessions: HashMap<String, InteractionSession>,
    aliases: HashMap<String, String>,
    scene_watches: HashMap<String, SceneWatch>,
    segments: HashMap<String, Vec<SceneWatchSegment>>,
    derived: HashMap<String, EntityDerived>,
}

pub struct InteractionStore {
    state: RwLock<State>,
    snapshot: Option<JsonSnapshot>,
    events_log: Option<JsonlLog>,
    events: RwLock<Vec<InteractionEvent>>,
}

impl Default for InteractionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InteractionStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            snapshot: None,
            events_log: None,
            events: RwLock::new(Vec::new()),
        }
    }

    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let snapshot = JsonSnapshot::new(dir.join("interactions_state.json"));
        let state: State = snapshot.load()?;
        let events_log = JsonlLog::new(dir.join("interactions_events.jsonl"));
        let events: Vec<InteractionEvent> = events_log.load_all()?;
        Ok(Self {
            state: RwLock::new(state),
            snapshot: Some(snapshot),
            events_log: Some(events_log),
            events: RwLock::new(events),
        })
    }

    fn persist(&self, state: &State) {
        if let Some(snapshot) = &self.snapshot {
            if let Err(e) = snapshot.save(state) {
                tracing::warn!(error = %e, "failed to persist interaction state snapshot");
            }
        }
    }

    // ----- sessions -----

    pub fn get_session(&self, id: &str) -> Option<InteractionSession> {
        self.state.read().sessions.get(id).cloned()
    }

    pub fn is_canonical(&self, id: &str) -> bool {
        self.state.read().sessions.contains_key(id)
    }

    pub fn resolve_alias(&self, alias: &str) -> Option<String> {
        self.state.read().aliases.get(alias).cloned()
    }

    pub fn insert_alias(&self, alias: impl Into<String>, canonical: impl Into<String>) {
        let mut state = self.state.write();
        state.aliases.insert(alias.into(), canonical.into());
        self.persist(&state);
    }

    /// Most recent non-finalized session for `fingerprint` whose
    /// `last_event_ts >= now - merge_ttl`.
    pub fn most_recent_mergeable_session(
        &self,
        fingerprint: &str,
        now: DateTime<Utc>,
        merge_ttl_seconds: f64,
    ) -> Option<String> {
        let cutoff = now - chrono::Duration::milliseconds((merge_ttl_seconds * 1000.0) as i64);
        let state = self.state.read();
        state
            .sessions
            .values()
            .filter(|s| s.client_fingerprint == fingerprint)
            .filter(|s| s.is_active())
            .filter(|s| s.last_event_ts >= cutoff)
            .max_by_key(|s| s.last_event_ts)
            .map(|s| s.session_id.clone())
    }

    pub fn create_session(
        &self,
        session_id: impl Into<String>,
        fingerprint: impl Into<String>,
        ts: DateTime<Utc>,
    ) -> InteractionSession {
        let session = InteractionSession {
            session_id: session_id.into(),
            client_fingerprint: fingerprint.into(),
            session_start_ts: ts,
            last_event_ts: ts,
            last_entity_type: None,
            last_entity_id: None,
            last_entity_event_ts: None,
            ended_at: None,
        };
        let mut state = self.state.write();
        state.sessions.insert(session.session_id.clone(), session.clone());
        self.persist(&state);
        session
    }

    pub fn advance_last_event(&self, session_id: &str, ts: DateTime<Utc>) {
        let mut state = self.state.write();
        if let Some(session) = state.sessions.get_mut(session_id) {
            if ts > session.last_event_ts {
                session.last_event_ts = ts;
            }
        }
        self.persist(&state);
    }

    pub fn update_last_entity(
        &self,
        session_id: &str,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        ts: DateTime<Utc>,
    ) {
        let mut state = self.state.write();
        if let Some(session) = state.sessions.get_mut(session_id) {
            session.last_entity_type = Some(entity_type.into());
            session.last_entity_id = Some(entity_id.into());
            session.last_entity_event_ts = Some(ts);
            if ts > session.last_event_ts {
                session.last_event_ts = ts;
            }
        }
        self.persist(&state);
    }

    /// Finalize every non-finalized session with `fingerprint` whose
    /// `last_event_ts < now - merge_ttl`. Returns the entities (type, id)
    /// that earned derived credit (duration >= min_session_seconds and a
    /// last-entity present).
    pub fn finalize_stale_sessions(
        &self,
        fingerprint: &str,
        now: DateTime<Utc>,
        merge_ttl_seconds: f64,
        min_session_seconds: f64,
    ) -> Vec<(String, String)> {
        let cutoff = now - chrono::Duration::milliseconds((merge_ttl_seconds * 1000.0) as i64);
        let mut credited = Vec::new();
        let mut state = self.state.write();
        let stale_ids: Vec<String> = state
            .sessions
            .values()
            .filter(|s| s.client_fingerprint == fingerprint)
            .filter(|s| s.is_active())
            .filter(|s| s.last_event_ts < cutoff)
            .map(|s| s.session_id.clone())
            .collect();
        for id in stale_ids {
            let session = state.sessions.get_mut(&id).expect("just matched above");
            let duration_s = (session.last_event_ts - session.session_start_ts).num_milliseconds() as f64 / 1000.0;
            session.ended_at = Some(session.last_event_ts);
            if duration_s >= min_session_seconds {
                if let (Some(t), Some(i)) = (session.last_entity_type.clone(), session.last_entity_id.clone()) {
                    credited.push((t, i));
                }
            }
        }
        self.persist(&state);
        credited
    }

    // ----- events -----

    pub fn has_event_id(&self, client_event_id: &str) -> bool {
        self.events.read().iter().any(|e| e.client_event_id.as_deref() == Some(client_event_id))
    }

    pub fn insert_event(&self, event: InteractionEvent) {
        if let Some(log) = &self.events_log {
            if let Err(e) = log.append(&event) {
                tracing::warn!(error = %e, "failed to persist interaction event");
            }
        }
        self.events.write().push(event);
    }

    /// Up to `limit` scene events strictly before `before`, most-recent-first.
    pub fn recent_scene_events_before(
        &self,
        session_id: &str,
        scene_id: &str,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Vec<InteractionEvent> {
        let events = self.events.read();
        let mut matching: Vec<InteractionEvent> = events
            .iter()
            .filter(|e| e.session_id == session_id && e.entity_id == scene_id && e.entity_type == "scene")
            .filter(|e| e.client_ts < before)
            .cloned()
            .collect();
        matching.sort_by_key(|e| std::cmp::Reverse(e.client_ts));
        matching.truncate(limit);
        matching
    }

    pub fn scene_events_in_window(
        &self,
        session_id: &str,
        scene_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Vec<InteractionEvent> {
        let events = self.events.read();
        let mut matching: Vec<InteractionEvent> = events
            .iter()
            .filter(|e| e.session_id == session_id && e.entity_id == scene_id && e.entity_type == "scene")
            .filter(|e| e.client_ts >= from && e.client_ts <= to)
            .cloned()
            .collect();
        matching.sort_by_key(|e| e.client_ts);
        matching
    }

    pub fn next_scene_event_after(
        &self,
        session_id: &str,
        scene_id: &str,
        after: DateTime<Utc>,
    ) -> Option<InteractionEvent> {
        let events = self.events.read();
        events
            .iter()
            .filter(|e| e.session_id == session_id && e.entity_id == scene_id && e.entity_type == "scene")
            .filter(|e| e.client_ts > after)
            .min_by_key(|e| e.client_ts)
            .cloned()
    }

    // ----- scene watches / segments -----

    pub fn get_scene_watch(&self, session_id: &str, scene_id: &str) -> Option<SceneWatch> {
        self.state.read().scene_watches.get(&scene_key(session_id, scene_id)).cloned()
    }

    pub fn upsert_scene_watch(&self, watch: SceneWatch) {
        let mut state = self.state.write();
        state
            .scene_watches
            .insert(scene_key(&watch.session_id, &watch.scene_id), watch);
        self.persist(&state);
    }

    pub fn get_segments(&self, session_id: &str, scene_id: &str) -> Vec<SceneWatchSegment> {
        self.state
            .read()
            .segments
            .get(&scene_key(session_id, scene_id))
            .cloned()
            .unwrap_or_default()
    }

    pub fn set_segments(&self, session_id: &str, scene_id: &str, segments: Vec<SceneWatchSegment>) {
        let mut state = self.state.write();
        state.segments.insert(scene_key(session_id, scene_id), segments);
        self.persist(&state);
    }

    // ----- derived counts -----

    pub fn get_derived(&self, entity_type: &str, entity_id: &str) -> EntityDerived {
        self.state
            .read()
            .derived
            .get(&entity_key(entity_type, entity_id))
            .copied()
            .unwrap_or_default()
    }

    pub fn bump_view(&self, entity_type: &str, entity_id: &str, ts: DateTime<Utc>) {
        let mut state = self.state.write();
        let entry = state.derived.entry(entity_key(entity_type, entity_id)).or_default();
        entry.view_count += 1;
        entry.last_viewed_at = Some(entry.last_viewed_at.map_or(ts, |prev| prev.max(ts)));
        self.persist(&state);
    }

    pub fn bump_derived_o_count(&self, entity_type: &str, entity_id: &str) {
        let mut state = self.state.write();
        let entry = state.derived.entry(entity_key(entity_type, entity_id)).or_default();
        entry.derived_o_count += 1;
        self.persist(&state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(s: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(s, 0).unwrap()
    }

    #[test]
    fn create_and_fetch_session() {
        let store = InteractionStore::new();
        store.create_session("s1", "fp1", ts(0));
        let session = store.get_session("s1").unwrap();
        assert_eq!(session.client_fingerprint, "fp1");
        assert!(session.is_active());
    }

    #[test]
    fn finalize_stale_credits_entity_when_duration_and_entity_present() {
        let store = InteractionStore::new();
        store.create_session("s1", "fp1", ts(0));
        store.update_last_entity("s1", "scene", "42", ts(700));
        store.advance_last_event("s1", ts(700));
        let credited = store.finalize_stale_sessions("fp1", ts(1000), 120.0, 600.0);
        assert_eq!(credited, vec![("scene".to_string(), "42".to_string())]);
        assert!(store.get_session("s1").unwrap().ended_at.is_some());
    }

    #[test]
    fn finalize_stale_below_threshold_earns_no_credit() {
        let store = InteractionStore::new();
        store.create_session("s1", "fp1", ts(0));
        store.advance_last_event("s1", ts(5));
        let credited = store.finalize_stale_sessions("fp1", ts(1000), 120.0, 600.0);
        assert!(credited.is_empty());
        assert!(store.get_session("s1").unwrap().ended_at.is_some());
    }

    #[test]
    fn open_persists_state_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = InteractionStore::open(dir.path()).unwrap();
            store.create_session("s1", "fp1", ts(0));
        }
        let reopened = InteractionStore::open(dir.path()).unwrap();
        assert!(reopened.get_session("s1").is_some());
    }

    #[test]
    fn dedupe_by_client_event_id() {
        let store = InteractionStore::new();
        store.insert_event(InteractionEvent {
            client_event_id: Some("e1".into()),
            session_id: "s1".into(),
            event_type: "scene_view".into(),
            entity_type: "scene".into(),
            entity_id: "42".into(),
            client_ts: ts(0),
            metadata: serde_json::json!({}),
        });
        assert!(store.has_event_id("e1"));
        assert!(!store.has_event_id("e2"));
    }
}
