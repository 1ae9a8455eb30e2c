//! Per-task cooperative cancellation signal.
//!
//! Cancellation here is advisory, not preemptive (`SPEC_FULL.md` §5):
//! dropping a task's flag does not abort an in-flight handler. Controller
//! handlers, which receive the owning `TaskRecord`, are expected to clone
//! the flag for their task id (via [`CancelRegistry::flag`]) and poll it
//! between units of work to exit early. Even if a handler never polls the
//! flag, the task manager checks it itself right after the handler's
//! future resolves and forces the task to `cancelled` if it was ever set —
//! a handler cannot "win" against a cancel request simply by ignoring it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct CancelRegistry {
    flags: RwLock<HashMap<Uuid, Arc<AtomicBool>>>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh, unset flag for a newly submitted task.
    pub fn register(&self, task_id: Uuid) {
        self.flags
            .write()
            .insert(task_id, Arc::new(AtomicBool::new(false)));
    }

    /// Fetch the live cancellation flag for a task, for a handler to poll.
    pub fn flag(&self, task_id: Uuid) -> Option<Arc<AtomicBool>> {
        self.flags.read().get(&task_id).cloned()
    }

    /// Signal cancellation. No-op if the task has no registered flag
    /// (already reaped).
    pub fn request(&self, task_id: Uuid) {
        if let Some(flag) = self.flags.read().get(&task_id) {
            flag.store(true, Ordering::SeqCst);
        }
    }

    pub fn is_requested(&self, task_id: Uuid) -> bool {
        self.flags
            .read()
            .get(&task_id)
            .map(|f| f.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Drop the flag once a task reaches a terminal state.
    pub fn remove(&self, task_id: Uuid) {
        self.flags.write().remove(&task_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_then_flag_observes_cancellation() {
        let reg = CancelRegistry::new();
        let id = Uuid::new_v4();
        reg.register(id);
        let flag = reg.flag(id).unwrap();
        assert!(!flag.load(Ordering::SeqCst));
        reg.request(id);
        assert!(flag.load(Ordering::SeqCst));
        assert!(reg.is_requested(id));
    }

    #[test]
    fn request_on_unknown_task_is_a_noop() {
        let reg = CancelRegistry::new();
        reg.request(Uuid::new_v4());
    }
}
