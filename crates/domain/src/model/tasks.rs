use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Task status / priority
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Running,
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Lower value sorts first in the per-service priority queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    High = 0,
    Normal = 1,
    Low = 2,
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Normal
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Task record
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A dedupe fingerprint pair: a task resubmitted with the same
/// `(ctx_key, params_key)` while an existing queued/running task shares it
/// is coalesced rather than enqueued again (see the task manager's
/// `find_duplicate` algorithm).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DedupeFingerprint {
    pub ctx_key: String,
    pub params_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: Uuid,
    pub action_id: String,
    pub service: String,
    #[serde(default)]
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub submitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub context: Value,
    pub params: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<Uuid>,
    #[serde(default)]
    pub skip_concurrency: bool,
    #[serde(default)]
    pub cancel_requested: bool,
    pub fingerprint: DedupeFingerprint,
}

impl TaskRecord {
    pub fn new(
        action_id: impl Into<String>,
        service: impl Into<String>,
        priority: TaskPriority,
        context: Value,
        params: Value,
        fingerprint: DedupeFingerprint,
        group_id: Option<Uuid>,
        skip_concurrency: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            action_id: action_id.into(),
            service: service.into(),
            priority,
            status: TaskStatus::Queued,
            submitted_at: Utc::now(),
            started_at: None,
            finished_at: None,
            context,
            params,
            result: None,
            error: None,
            group_id,
            skip_concurrency,
            cancel_requested: false,
            fingerprint,
        }
    }

    /// Only top-level (non-child) tasks produce `TaskHistory` rows.
    pub fn is_top_level(&self) -> bool {
        self.group_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_task_starts_queued_and_top_level() {
        let t = TaskRecord::new(
            "tag_scene",
            "svc.ai",
            TaskPriority::Normal,
            json!({}),
            json!({}),
            DedupeFingerprint { ctx_key: "c".into(), params_key: "p".into() },
            None,
            false,
        );
        assert_eq!(t.status, TaskStatus::Queued);
        assert!(t.is_top_level());
    }

    #[test]
    fn priority_ordering_high_before_low() {
        assert!(TaskPriority::High < TaskPriority::Normal);
        assert!(TaskPriority::Normal < TaskPriority::Low);
    }
}
