//! The task manager: submission, the priority-queue runner loop,
//! cancellation cascades, and event emission (`SPEC_FULL.md` §4.5).

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;
use uuid::Uuid;

use sf_domain::config::TaskConfig;
use sf_domain::error::{Error, Result};
use sf_domain::model::{DedupeFingerprint, TaskPriority, TaskRecord, TaskStatus};
use sf_registries::{ActionHandlerKind, ActionRegistry, ServiceRegistry};

use crate::cancel::CancelRegistry;
use crate::history::{TaskHistoryRow, TaskHistoryStore};
use crate::queue::ServiceQueue;

pub type TaskManagerConfig = TaskConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskEventKind {
    Queued,
    Started,
    Progress,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct TaskEvent {
    pub kind: TaskEventKind,
    pub task: TaskRecord,
    pub extra: Option<Value>,
}

type Listener = Arc<dyn Fn(&TaskEvent) + Send + Sync>;

#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub service: Option<String>,
    pub status: Option<TaskStatus>,
}

pub struct TaskManager {
    tasks: RwLock<HashMap<Uuid, TaskRecord>>,
    queues: RwLock<HashMap<String, ServiceQueue>>,
    running_counts: RwLock<HashMap<String, usize>>,
    seq: AtomicU64,
    cancel: Arc<CancelRegistry>,
    listeners: RwLock<Vec<Listener>>,
    history: TaskHistoryStore,
    actions: Arc<ActionRegistry>,
    services: Arc<ServiceRegistry>,
    config: RwLock<TaskManagerConfig>,
}

impl TaskManager {
    pub fn new(
        actions: Arc<ActionRegistry>,
        services: Arc<ServiceRegistry>,
        config: TaskManagerConfig,
    ) -> Arc<Self> {
        let history = TaskHistoryStore::new(config.history_cap, config.history_prune_to);
        Arc::new(Self {
            tasks: RwLock::new(HashMap::new()),
            queues: RwLock::new(HashMap::new()),
            running_counts: RwLock::new(HashMap::new()),
            seq: AtomicU64::new(0),
            cancel: Arc::new(CancelRegistry::new()),
            listeners: RwLock::new(Vec::new()),
            history,
            actions,
            services,
            config: RwLock::new(config),
        })
    }

    /// Reread `loop_interval_ms` / `debug` — called from the
    /// backend-refresh hub when system settings change (`SPEC_FULL.md`
    /// §4.5 "Configuration reload").
    pub fn reload_config(&self, config: TaskManagerConfig) {
        *self.config.write() = config;
    }

    pub fn on_event(&self, listener: Listener) {
        self.listeners.write().push(listener);
    }

    pub fn cancel_registry(&self) -> Arc<CancelRegistry> {
        self.cancel.clone()
    }

    // ── submission ──────────────────────────────────────────────────

    pub fn submit(
        &self,
        action_id: &str,
        context: Value,
        params: Value,
        priority: TaskPriority,
        group_id: Option<Uuid>,
    ) -> Result<TaskRecord> {
        if let Some(parent) = group_id {
            if !self.tasks.read().contains_key(&parent) {
                return Err(Error::NotFound(format!("parent task {parent}")));
            }
        }
        let registered = self
            .actions
            .get(action_id)
            .ok_or_else(|| Error::NotFound(format!("action {action_id}")))?;

        let fingerprint = DedupeFingerprint {
            ctx_key: canonical_key(&context),
            params_key: canonical_key(&params),
        };
        let record = TaskRecord::new(
            action_id,
            registered.descriptor.service.clone(),
            priority,
            context,
            params,
            fingerprint,
            group_id,
            registered.descriptor.controller,
        );

        self.tasks.write().insert(record.id, record.clone());
        self.cancel.register(record.id);
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        self.queues
            .write()
            .entry(record.service.clone())
            .or_default()
            .push(record.priority, seq, record.id);

        self.emit(TaskEventKind::Queued, &record, None);
        Ok(record)
    }

    /// First existing queued/running/streaming task matching `(action_id,
    /// service, fingerprint)`. Best-effort — no lock held between this
    /// call and a subsequent `submit` (`SPEC_FULL.md` §5 dedupe semantics).
    pub fn find_duplicate(
        &self,
        action_id: &str,
        service: &str,
        context: &Value,
        params: &Value,
    ) -> Option<TaskRecord> {
        let fingerprint = DedupeFingerprint {
            ctx_key: canonical_key(context),
            params_key: canonical_key(params),
        };
        let tasks = self.tasks.read();
        let mut candidates: Vec<&TaskRecord> = tasks
            .values()
            .filter(|t| {
                t.action_id == action_id
                    && t.service == service
                    && matches!(t.status, TaskStatus::Queued | TaskStatus::Running | TaskStatus::Streaming)
                    && t.fingerprint == fingerprint
            })
            .collect();
        candidates.sort_by_key(|t| t.submitted_at);
        candidates.into_iter().next().cloned()
    }

    pub fn get(&self, task_id: Uuid) -> Option<TaskRecord> {
        self.tasks.read().get(&task_id).cloned()
    }

    pub fn list(&self, filter: &TaskFilter) -> Vec<TaskRecord> {
        self.tasks
            .read()
            .values()
            .filter(|t| filter.service.as_deref().map(|s| s == t.service).unwrap_or(true))
            .filter(|t| filter.status.map(|s| s == t.status).unwrap_or(true))
            .cloned()
            .collect()
    }

    pub fn history(&self, limit: usize, service: Option<&str>, status: Option<TaskStatus>) -> Vec<TaskHistoryRow> {
        self.history.list(limit, service, status)
    }

    /// Promote a running task to "controller": it stops occupying a
    /// concurrency slot, e.g. once it has spawned its children and is now
    /// just waiting on them (`SPEC_FULL.md` §4.3).
    pub fn mark_controller(&self, task_id: Uuid) -> bool {
        let mut tasks = self.tasks.write();
        let Some(task) = tasks.get_mut(&task_id) else {
            return false;
        };
        if task.status != TaskStatus::Running || task.skip_concurrency {
            return false;
        }
        task.skip_concurrency = true;
        let service = task.service.clone();
        drop(tasks);
        let mut counts = self.running_counts.write();
        if let Some(c) = counts.get_mut(&service) {
            *c = c.saturating_sub(1);
        }
        true
    }

    // ── cancellation ────────────────────────────────────────────────

    /// Cancel a task and cascade into its children. Returns `false` for an
    /// unknown or already-terminal task.
    pub fn cancel(&self, task_id: Uuid) -> bool {
        let status = match self.tasks.read().get(&task_id) {
            Some(t) => t.status,
            None => return false,
        };
        if status.is_terminal() {
            return false;
        }

        if status == TaskStatus::Queued {
            let service = {
                let mut tasks = self.tasks.write();
                let task = tasks.get_mut(&task_id).unwrap();
                task.status = TaskStatus::Cancelled;
                task.cancel_requested = true;
                task.finished_at = Some(Utc::now());
                task.service.clone()
            };
            self.queues.write().entry(service).or_default().remove(task_id);
            let record = self.tasks.read().get(&task_id).cloned().unwrap();
            self.emit(TaskEventKind::Cancelled, &record, None);
            self.cancel.remove(task_id);
        } else {
            {
                let mut tasks = self.tasks.write();
                if let Some(task) = tasks.get_mut(&task_id) {
                    task.cancel_requested = true;
                }
            }
            self.cancel.request(task_id);
            // The runner transitions running tasks to `cancelled` at its
            // own completion checkpoint; no event fires here.
        }

        let children: Vec<Uuid> = self
            .tasks
            .read()
            .values()
            .filter(|t| t.group_id == Some(task_id))
            .map(|t| t.id)
            .collect();
        for child in children {
            self.cancel(child);
        }

        true
    }

    // ── runner loop ─────────────────────────────────────────────────

    pub async fn run_forever(self: Arc<Self>) {
        loop {
            let interval = Duration::from_millis(self.config.read().loop_interval_ms);
            tokio::time::sleep(interval).await;
            self.dispatch_tick().await;
        }
    }

    pub async fn dispatch_tick(self: &Arc<Self>) {
        let service_names: Vec<String> = self.queues.read().keys().cloned().collect();
        for service in service_names {
            let max_concurrency = self
                .services
                .get(&service)
                .map(|d| d.max_concurrency)
                .unwrap_or(usize::MAX);
            let running = *self.running_counts.read().get(&service).unwrap_or(&0);
            if running >= max_concurrency {
                continue;
            }
            if !self.services.is_ready(&service).await {
                continue;
            }

            let next = loop {
                let popped = self.queues.write().get_mut(&service).and_then(|q| q.pop());
                match popped {
                    None => break None,
                    Some(id) => {
                        if self.tasks.read().get(&id).map(|t| t.status) == Some(TaskStatus::Queued) {
                            break Some(id);
                        }
                        // Already cancelled/reaped out from under us; keep draining.
                    }
                }
            };

            if let Some(task_id) = next {
                tokio::spawn(self.clone().run_task(task_id));
            }
        }
    }

    async fn run_task(self: Arc<Self>, task_id: Uuid) {
        let Some(mut record) = self.tasks.read().get(&task_id).cloned() else {
            return;
        };

        if !record.skip_concurrency {
            *self.running_counts.write().entry(record.service.clone()).or_insert(0) += 1;
        }

        record.status = TaskStatus::Running;
        record.started_at = Some(Utc::now());
        self.tasks.write().insert(task_id, record.clone());
        self.emit(TaskEventKind::Started, &record, None);

        let registered = self.actions.get(&record.action_id);
        let outcome = match registered {
            None => Err(Error::NotFound(format!(
                "action {} no longer registered",
                record.action_id
            ))),
            Some(registered) => match registered.handler {
                ActionHandlerKind::Plain(ref handler) => {
                    handler.call(record.context.clone(), record.params.clone()).await
                }
                ActionHandlerKind::Controller(ref handler) => {
                    handler
                        .call(record.context.clone(), record.params.clone(), &record)
                        .await
                }
            },
        };

        // The scheduler checks the cancel token itself immediately after the
        // handler's future resolves, independent of whether the handler body
        // polled it. A token cancelled at any point during the run forces
        // `cancelled`, discarding the handler's own result either way.
        let cancel_requested_now = self.cancel.is_requested(task_id);
        let (status, result, error) = if cancel_requested_now {
            (TaskStatus::Cancelled, None, None)
        } else {
            match outcome {
                Ok(value) => (TaskStatus::Completed, Some(value), None),
                Err(e) => (TaskStatus::Failed, None, Some(e.to_string())),
            }
        };

        record.status = status;
        record.result = result;
        record.error = error;
        record.finished_at = Some(Utc::now());
        // `record` was cloned at the top of this function; re-read
        // `skip_concurrency` from the live map before deciding whether to
        // decrement, since `mark_controller` may have flipped it (and
        // already decremented once) while the handler was running.
        let skip_concurrency = self
            .tasks
            .read()
            .get(&task_id)
            .map(|t| t.skip_concurrency)
            .unwrap_or(record.skip_concurrency);
        record.skip_concurrency = skip_concurrency;
        self.tasks.write().insert(task_id, record.clone());

        if !skip_concurrency {
            let mut counts = self.running_counts.write();
            if let Some(c) = counts.get_mut(&record.service) {
                *c = c.saturating_sub(1);
            }
        }
        self.cancel.remove(task_id);

        let kind = match status {
            TaskStatus::Completed => TaskEventKind::Completed,
            TaskStatus::Failed => TaskEventKind::Failed,
            TaskStatus::Cancelled => TaskEventKind::Cancelled,
            _ => unreachable!("terminal match above only produces terminal statuses"),
        };
        self.emit(kind, &record, None);
    }

    // ── event emission / history ────────────────────────────────────

    fn emit(&self, kind: TaskEventKind, task: &TaskRecord, extra: Option<Value>) {
        let event = TaskEvent {
            kind,
            task: task.clone(),
            extra,
        };
        for listener in self.listeners.read().iter() {
            let listener = listener.clone();
            let event_ref = &event;
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| listener(event_ref)));
            if let Err(_panic) = result {
                tracing::warn!(task_id = %task.id, "task event listener panicked; swallowing");
            }
        }
        if task.status.is_terminal() && task.is_top_level() {
            let child_count = self
                .tasks
                .read()
                .values()
                .filter(|t| t.group_id == Some(task.id))
                .count();
            self.history.record(TaskHistoryRow::from_task(task, child_count));
        }
    }
}

/// Canonical dedupe key: drop null object fields (recursively) and
/// serialize compactly. `serde_json::Value`'s default (non-`preserve_order`)
/// object representation is a `BTreeMap`, so key order is already sorted.
fn canonical_key(value: &Value) -> String {
    serde_json::to_string(&strip_nulls(value.clone())).unwrap_or_default()
}

fn strip_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                if v.is_null() {
                    continue;
                }
                out.insert(k, strip_nulls(v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(strip_nulls).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use sf_registries::{
        ActionDescriptor, ActionHandler, ContextRule, ResultKind, Selection,
    };
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration as StdDuration;

    struct Echo;
    #[async_trait]
    impl ActionHandler for Echo {
        async fn call(&self, _ctx: Value, params: Value) -> Result<Value> {
            Ok(params)
        }
    }

    struct Slow(StdDuration);
    #[async_trait]
    impl ActionHandler for Slow {
        async fn call(&self, _ctx: Value, _params: Value) -> Result<Value> {
            tokio::time::sleep(self.0).await;
            Ok(json!({"done": true}))
        }
    }

    struct AlwaysFails;
    #[async_trait]
    impl ActionHandler for AlwaysFails {
        async fn call(&self, _ctx: Value, _params: Value) -> Result<Value> {
            Err(Error::Other("boom".into()))
        }
    }

    fn rule_any() -> Vec<ContextRule> {
        vec![ContextRule { pages: vec![], selection: Selection::None, entity_types: vec![] }]
    }

    fn register_action(
        actions: &ActionRegistry,
        id: &str,
        service: &str,
        handler: Arc<dyn ActionHandler>,
    ) {
        actions.register(
            "test-plugin",
            ActionDescriptor {
                id: id.into(),
                label: id.into(),
                service: service.into(),
                result_kind: ResultKind::Void,
                contexts: rule_any(),
                controller: false,
            },
            ActionHandlerKind::Plain(handler),
        );
    }

    fn test_manager(max_concurrency: usize) -> (Arc<TaskManager>, Arc<ActionRegistry>) {
        let actions = Arc::new(ActionRegistry::new());
        let services = Arc::new(ServiceRegistry::default());
        services.register(
            "test-plugin",
            sf_registries::ServiceDef {
                name: "svc".into(),
                max_concurrency,
                server_url: None,
                ready_endpoint: None,
                readiness_cache_seconds: 30.0,
                failure_backoff_seconds: 15.0,
            },
        );
        let mgr = TaskManager::new(actions.clone(), services, TaskConfig { loop_interval_ms: 5, ..Default::default() });
        (mgr, actions)
    }

    #[test]
    fn submit_unknown_action_is_not_found() {
        let (mgr, _actions) = test_manager(1);
        assert!(matches!(
            mgr.submit("nope", json!({}), json!({}), TaskPriority::Normal, None),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn submit_queues_and_find_duplicate_matches_same_fingerprint() {
        let (mgr, actions) = test_manager(1);
        register_action(&actions, "tag_scene", "svc", Arc::new(Echo));
        let ctx = json!({"entityId": "1", "ignored": null});
        let params = json!({"x": 1});
        let t1 = mgr.submit("tag_scene", ctx.clone(), params.clone(), TaskPriority::Normal, None).unwrap();
        assert_eq!(t1.status, TaskStatus::Queued);

        let dup = mgr.find_duplicate("tag_scene", "svc", &ctx, &params);
        assert_eq!(dup.unwrap().id, t1.id);
    }

    #[tokio::test]
    async fn concurrency_limit_of_one_runs_tasks_one_at_a_time() {
        let (mgr, actions) = test_manager(1);
        register_action(&actions, "slow", "svc", Arc::new(Slow(StdDuration::from_millis(40))));

        let completed = Arc::new(AtomicUsize::new(0));
        let max_concurrent_seen = Arc::new(AtomicUsize::new(0));
        let current = Arc::new(AtomicUsize::new(0));
        {
            let completed = completed.clone();
            let current = current.clone();
            let max_seen = max_concurrent_seen.clone();
            mgr.on_event(Arc::new(move |event: &TaskEvent| match event.kind {
                TaskEventKind::Started => {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    let mut prev = max_seen.load(Ordering::SeqCst);
                    while now > prev {
                        match max_seen.compare_exchange(prev, now, Ordering::SeqCst, Ordering::SeqCst) {
                            Ok(_) => break,
                            Err(v) => prev = v,
                        }
                    }
                }
                TaskEventKind::Completed => {
                    current.fetch_sub(1, Ordering::SeqCst);
                    completed.fetch_add(1, Ordering::SeqCst);
                }
                _ => {}
            }));
        }

        for _ in 0..3 {
            mgr.submit("slow", json!({}), json!({}), TaskPriority::Normal, None).unwrap();
        }

        let runner = tokio::spawn(mgr.clone().run_forever());
        tokio::time::timeout(StdDuration::from_secs(2), async {
            while completed.load(Ordering::SeqCst) < 3 {
                tokio::time::sleep(StdDuration::from_millis(5)).await;
            }
        })
        .await
        .expect("tasks did not complete in time");
        runner.abort();

        assert_eq!(max_concurrent_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn priority_queue_dispatches_high_before_normal_before_low() {
        let (mgr, actions) = test_manager(1);
        register_action(&actions, "slow", "svc", Arc::new(Slow(StdDuration::from_millis(20))));

        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        {
            let order = order.clone();
            mgr.on_event(Arc::new(move |event: &TaskEvent| {
                if event.kind == TaskEventKind::Started {
                    order.lock().push(event.task.priority);
                }
            }));
        }

        let low = mgr.submit("slow", json!({"n": 1}), json!({}), TaskPriority::Low, None).unwrap();
        let _ = low;
        let high = mgr.submit("slow", json!({"n": 2}), json!({}), TaskPriority::High, None).unwrap();
        let _ = high;
        let normal = mgr.submit("slow", json!({"n": 3}), json!({}), TaskPriority::Normal, None).unwrap();
        let _ = normal;

        let runner = tokio::spawn(mgr.clone().run_forever());
        tokio::time::timeout(StdDuration::from_secs(2), async {
            while order.lock().len() < 3 {
                tokio::time::sleep(StdDuration::from_millis(5)).await;
            }
        })
        .await
        .expect("tasks did not all start in time");
        runner.abort();

        let seen = order.lock().clone();
        assert_eq!(seen, vec![TaskPriority::High, TaskPriority::Normal, TaskPriority::Low]);
    }

    #[tokio::test]
    async fn failed_handler_sets_failed_status_and_error() {
        let (mgr, actions) = test_manager(1);
        register_action(&actions, "boom", "svc", Arc::new(AlwaysFails));
        let task = mgr.submit("boom", json!({}), json!({}), TaskPriority::Normal, None).unwrap();

        let runner = tokio::spawn(mgr.clone().run_forever());
        tokio::time::timeout(StdDuration::from_secs(2), async {
            loop {
                if let Some(t) = mgr.get(task.id) {
                    if t.status.is_terminal() {
                        break;
                    }
                }
                tokio::time::sleep(StdDuration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        runner.abort();

        let finished = mgr.get(task.id).unwrap();
        assert_eq!(finished.status, TaskStatus::Failed);
        assert!(finished.error.unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn cancel_requested_mid_flight_forces_cancelled_even_on_success() {
        // The scheduler checks the cancel token itself right after the
        // handler's future resolves; a handler that never polls it and
        // "succeeds" is still forced to `cancelled` if cancellation was
        // requested at any point during its run.
        let (mgr, actions) = test_manager(1);
        register_action(&actions, "slow", "svc", Arc::new(Slow(StdDuration::from_millis(60))));
        let task = mgr.submit("slow", json!({}), json!({}), TaskPriority::Normal, None).unwrap();

        let runner = tokio::spawn(mgr.clone().run_forever());
        // Wait until it's running, then request cancellation mid-flight.
        tokio::time::timeout(StdDuration::from_secs(1), async {
            loop {
                if mgr.get(task.id).unwrap().status == TaskStatus::Running {
                    break;
                }
                tokio::time::sleep(StdDuration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        mgr.cancel(task.id);

        tokio::time::timeout(StdDuration::from_secs(2), async {
            loop {
                if mgr.get(task.id).unwrap().status.is_terminal() {
                    break;
                }
                tokio::time::sleep(StdDuration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        runner.abort();

        assert_eq!(mgr.get(task.id).unwrap().status, TaskStatus::Cancelled);
    }

    #[test]
    fn cancel_queued_task_cascades_to_children() {
        let (mgr, actions) = test_manager(1);
        register_action(&actions, "slow", "svc", Arc::new(Slow(StdDuration::from_millis(20))));

        let parent = mgr.submit("slow", json!({}), json!({}), TaskPriority::Normal, None).unwrap();
        let child = mgr
            .submit("slow", json!({}), json!({}), TaskPriority::Normal, Some(parent.id))
            .unwrap();

        assert!(mgr.cancel(parent.id));
        assert_eq!(mgr.get(parent.id).unwrap().status, TaskStatus::Cancelled);
        assert_eq!(mgr.get(child.id).unwrap().status, TaskStatus::Cancelled);
    }

    #[test]
    fn cancel_terminal_task_is_a_noop() {
        let (mgr, actions) = test_manager(1);
        register_action(&actions, "echo", "svc", Arc::new(Echo));
        let task = mgr.submit("echo", json!({}), json!({}), TaskPriority::Normal, None).unwrap();
        mgr.cancel(task.id);
        assert!(!mgr.cancel(task.id));
    }

    #[test]
    fn canonical_key_drops_nulls_and_sorts_keys() {
        let a = canonical_key(&json!({"b": 1, "a": null, "c": 2}));
        let b = canonical_key(&json!({"c": 2, "b": 1}));
        assert_eq!(a, b);
    }
}
