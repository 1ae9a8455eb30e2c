//! Broadcasts task-manager events to WebSocket and SSE subscribers
//! (`SPEC_FULL.md` §6 "WebSocket").

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

use sf_domain::model::TaskStatus;
use sf_tasks::{TaskEvent, TaskEventKind, TaskManager};

fn kind_name(kind: TaskEventKind) -> &'static str {
    match kind {
        TaskEventKind::Queued => "queued",
        TaskEventKind::Started => "started",
        TaskEventKind::Progress => "progress",
        TaskEventKind::Completed => "completed",
        TaskEventKind::Failed => "failed",
        TaskEventKind::Cancelled => "cancelled",
    }
}

/// One frame on the task event stream: `{event, task_id, status, fields…}`.
#[derive(Debug, Clone, Serialize)]
pub struct TaskEventFrame {
    pub event: &'static str,
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub action_id: String,
    pub service: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

impl From<&TaskEvent> for TaskEventFrame {
    fn from(event: &TaskEvent) -> Self {
        Self {
            event: kind_name(event.kind),
            task_id: event.task.id,
            status: event.task.status,
            action_id: event.task.action_id.clone(),
            service: event.task.service.clone(),
            result: event.task.result.clone(),
            error: event.task.error.clone(),
            extra: event.extra.clone(),
        }
    }
}

/// Fan-out hub: the task manager calls a single synchronous listener per
/// event; this rebroadcasts it to any number of async subscribers
/// (WebSocket connections, SSE streams).
pub struct EventHub {
    sender: broadcast::Sender<TaskEventFrame>,
}

impl EventHub {
    pub fn new() -> Arc<Self> {
        let (sender, _) = broadcast::channel(1024);
        Arc::new(Self { sender })
    }

    /// Register this hub as a listener on `tasks`. Call once at startup.
    pub fn attach(self: &Arc<Self>, tasks: &TaskManager) {
        let hub = self.clone();
        tasks.on_event(Arc::new(move |event: &TaskEvent| {
            // `send` only errors when there are no subscribers; that's
            // the common case between connections and is not a failure.
            let _ = hub.sender.send(TaskEventFrame::from(event));
        }));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEventFrame> {
        self.sender.subscribe()
    }
}
