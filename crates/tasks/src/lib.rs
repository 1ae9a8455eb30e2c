//! In-process asynchronous task scheduler: per-service priority queues,
//! concurrency accounting, cooperative cancellation, dedupe, and
//! terminal-state history (`SPEC_FULL.md` §4.5).

mod cancel;
mod history;
mod manager;
mod queue;

pub use cancel::CancelRegistry;
pub use history::{TaskHistoryRow, TaskHistoryStore};
pub use manager::{TaskEvent, TaskEventKind, TaskFilter, TaskManager, TaskManagerConfig};
pub use queue::ServiceQueue;
