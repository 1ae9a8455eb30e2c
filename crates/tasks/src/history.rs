//! Terminal-state history: a projection of top-level (non-child) tasks,
//! retained up to a soft cap and pruned oldest-first on overflow
//! (`SPEC_FULL.md` §3, §4.5). Best-effort — callers swallow write errors
//! per §4.5 ("Best-effort — errors are swallowed").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use sf_domain::error::Result;
use sf_domain::model::{TaskRecord, TaskStatus};
use sf_domain::storage::JsonSnapshot;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskHistoryRow {
    pub id: Uuid,
    pub action_id: String,
    pub service: String,
    pub status: TaskStatus,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub child_count: usize,
    pub item_id: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TaskHistoryRow {
    /// Build a row from a just-terminalized top-level task. `child_count`
    /// is supplied by the caller (a scan of tasks with `group_id == id`).
    pub fn from_task(task: &TaskRecord, child_count: usize) -> Self {
        let finished_at = task.finished_at.unwrap_or_else(Utc::now);
        let started_at = task.started_at.unwrap_or(task.submitted_at);
        let duration_ms = (finished_at - started_at).num_milliseconds();
        let item_id = extract_item_id(&task.context);
        Self {
            id: task.id,
            action_id: task.action_id.clone(),
            service: task.service.clone(),
            status: task.status,
            submitted_at: task.submitted_at,
            finished_at,
            duration_ms,
            child_count,
            item_id,
            error: task.error.clone(),
            created_at: finished_at,
        }
    }
}

/// Best-effort extraction of an `item_id` field from an opaque UI context
/// blob, for quick history display without re-joining task params.
fn extract_item_id(context: &Value) -> Option<String> {
    context.get("entityId").and_then(|v| match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

#[derive(Default, Serialize, Deserialize)]
struct Snapshot {
    rows: Vec<TaskHistoryRow>,
}

pub struct TaskHistoryStore {
    rows: parking_lot::RwLock<Vec<TaskHistoryRow>>,
    snapshot: Option<JsonSnapshot>,
    cap: usize,
    prune_to: usize,
}

impl TaskHistoryStore {
    pub fn new(cap: usize, prune_to: usize) -> Self {
        Self {
            rows: parking_lot::RwLock::new(Vec::new()),
            snapshot: None,
            cap,
            prune_to,
        }
    }

    pub fn open(path: impl Into<std::path::PathBuf>, cap: usize, prune_to: usize) -> Result<Self> {
        let snapshot = JsonSnapshot::new(path.into());
        let loaded: Snapshot = snapshot.load()?;
        Ok(Self {
            rows: parking_lot::RwLock::new(loaded.rows),
            snapshot: Some(snapshot),
            cap,
            prune_to,
        })
    }

    /// Insert one terminal row; prune oldest-by-`created_at` down to
    /// `prune_to` if the total now exceeds `cap`.
    pub fn record(&self, row: TaskHistoryRow) {
        let mut rows = self.rows.write();
        rows.push(row);
        if rows.len() > self.cap {
            rows.sort_by_key(|r| r.created_at);
            let drop_count = rows.len() - self.prune_to;
            rows.drain(0..drop_count);
        }
        if let Some(snapshot) = &self.snapshot {
            if let Err(e) = snapshot.save(&Snapshot { rows: rows.clone() }) {
                tracing::warn!(error = %e, "failed to persist task history snapshot");
            }
        }
    }

    pub fn list(&self, limit: usize, service: Option<&str>, status: Option<TaskStatus>) -> Vec<TaskHistoryRow> {
        let rows = self.rows.read();
        let mut out: Vec<TaskHistoryRow> = rows
            .iter()
            .filter(|r| service.map(|s| r.service == s).unwrap_or(true))
            .filter(|r| status.map(|s| r.status == s).unwrap_or(true))
            .cloned()
            .collect();
        out.sort_by_key(|r| std::cmp::Reverse(r.created_at));
        out.truncate(limit);
        out
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sf_domain::model::{DedupeFingerprint, TaskPriority};

    fn terminal_task(status: TaskStatus) -> TaskRecord {
        let mut t = TaskRecord::new(
            "tag_scene",
            "svc",
            TaskPriority::Normal,
            json!({"entityId": "42"}),
            json!({}),
            DedupeFingerprint { ctx_key: "c".into(), params_key: "p".into() },
            None,
            false,
        );
        t.status = status;
        t.started_at = Some(t.submitted_at);
        t.finished_at = Some(t.submitted_at + chrono::Duration::milliseconds(250));
        t
    }

    #[test]
    fn record_extracts_item_id_and_duration() {
        let store = TaskHistoryStore::new(600, 500);
        let row = TaskHistoryRow::from_task(&terminal_task(TaskStatus::Completed), 0);
        assert_eq!(row.item_id.as_deref(), Some("42"));
        assert_eq!(row.duration_ms, 250);
        store.record(row);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn overflow_prunes_oldest_first_down_to_prune_to() {
        let store = TaskHistoryStore::new(5, 3);
        for i in 0..6 {
            let mut row = TaskHistoryRow::from_task(&terminal_task(TaskStatus::Completed), 0);
            row.created_at = chrono::Utc::now() + chrono::Duration::seconds(i);
            row.id = Uuid::new_v4();
            store.record(row);
        }
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn list_filters_by_service_and_status_newest_first() {
        let store = TaskHistoryStore::new(600, 500);
        let mut completed = TaskHistoryRow::from_task(&terminal_task(TaskStatus::Completed), 0);
        completed.created_at = chrono::Utc::now();
        let mut failed = TaskHistoryRow::from_task(&terminal_task(TaskStatus::Failed), 0);
        failed.created_at = chrono::Utc::now() + chrono::Duration::seconds(1);
        store.record(completed);
        store.record(failed);

        let only_failed = store.list(10, None, Some(TaskStatus::Failed));
        assert_eq!(only_failed.len(), 1);
        assert_eq!(only_failed[0].status, TaskStatus::Failed);

        let all = store.list(10, Some("svc"), None);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].status, TaskStatus::Failed, "newest first");
    }

    #[test]
    fn open_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        {
            let store = TaskHistoryStore::open(&path, 600, 500).unwrap();
            store.record(TaskHistoryRow::from_task(&terminal_task(TaskStatus::Completed), 0));
        }
        let reopened = TaskHistoryStore::open(&path, 600, 500).unwrap();
        assert_eq!(reopened.len(), 1);
    }
}
