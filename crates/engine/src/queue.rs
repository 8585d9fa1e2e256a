//! Prioritized background task queue.
//!
//! Three FIFO bands (high, medium, low) drained by a single worker. Failed
//! tasks are retried with linear backoff and go back to the front of their
//! band; tasks that exhaust their retries are dropped and logged.
//!
//! A task enqueued with a dedupe key holds a claim on that key from enqueue
//! until it succeeds or is dropped, so it stays unique while it runs and
//! while it backs off.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use uuid::Uuid;
use vendorsync_core::AppConfig;

use crate::error::TaskError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    VendorUpdate,
    CacheRefresh,
    PopularSearchWarm,
}

impl TaskKind {
    /// Kinds that do the same work share one claim per dedupe key: a warm
    /// and a refresh of the same search both rewrite the same entry.
    fn claim_group(self) -> TaskKind {
        match self {
            TaskKind::PopularSearchWarm => TaskKind::CacheRefresh,
            kind => kind,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    fn band(self) -> usize {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }
}

/// A unit of background work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncTask {
    pub id: String,
    pub kind: TaskKind,
    pub priority: Priority,
    pub payload: Value,
    /// Wall-clock creation time, for logs and inspection only.
    pub enqueued_at: DateTime<Utc>,
    pub retry_count: u32,
    /// Identity for [`SyncQueue::enqueue_unique`]; usually a cache key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedupe_key: Option<String>,
}

impl SyncTask {
    pub fn new(kind: TaskKind, priority: Priority, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            priority,
            payload,
            enqueued_at: Utc::now(),
            retry_count: 0,
            dedupe_key: None,
        }
    }

    fn claim(&self) -> Option<Claim> {
        self.dedupe_key.as_ref().map(|key| (self.kind.claim_group(), key.clone()))
    }
}

type Claim = (TaskKind, String);

/// Executes tasks on behalf of the queue worker.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &SyncTask) -> Result<(), TaskError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSettings {
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Pause after each task so background work stays below provider limits.
    pub task_spacing: Duration,
}

impl QueueSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_retries: config.sync_max_retries,
            base_delay: config.sync_base_delay(),
            task_spacing: config.sync_task_spacing(),
        }
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub queued: usize,
    pub backing_off: usize,
    pub processed: u64,
    /// Failed attempts, including ones that were retried.
    pub failed_attempts: u64,
    pub dropped: u64,
}

#[derive(Debug, Default)]
struct Bands {
    bands: [VecDeque<SyncTask>; 3],
    /// Tasks sleeping before re-entry.
    backing_off: usize,
    /// Dedupe claims of every unique task not yet finished: queued, running
    /// or backing off.
    claims: HashSet<Claim>,
}

impl Bands {
    fn pop(&mut self) -> Option<SyncTask> {
        self.bands.iter_mut().find_map(VecDeque::pop_front)
    }

    fn queued(&self) -> usize {
        self.bands.iter().map(VecDeque::len).sum()
    }

    fn release(&mut self, task: &SyncTask) {
        if let Some(claim) = task.claim() {
            self.claims.remove(&claim);
        }
    }

    /// Move a still-queued task holding `claim` up to `priority` if it sits
    /// in a lower band. Running and backing-off tasks keep their priority.
    fn promote(&mut self, claim: &Claim, priority: Priority) -> bool {
        for band in (priority.band() + 1)..self.bands.len() {
            let position = self.bands[band].iter().position(|t| t.claim().as_ref() == Some(claim));
            if let Some(mut task) = position.and_then(|i| self.bands[band].remove(i)) {
                task.priority = priority;
                self.bands[priority.band()].push_back(task);
                return true;
            }
        }
        false
    }
}

#[derive(Debug, Default)]
struct Counters {
    processed: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Debug)]
pub struct SyncQueue {
    state: Mutex<Bands>,
    notify: Notify,
    running: AtomicBool,
    shutting_down: AtomicBool,
    counters: Counters,
    settings: QueueSettings,
}

impl SyncQueue {
    pub fn new(settings: QueueSettings) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(Bands::default()),
            notify: Notify::new(),
            running: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
            counters: Counters::default(),
            settings,
        })
    }

    pub fn settings(&self) -> QueueSettings {
        self.settings
    }

    /// Append a task to the back of its priority band. Returns the task id.
    pub async fn enqueue(&self, kind: TaskKind, priority: Priority, payload: Value) -> String {
        self.push(SyncTask::new(kind, priority, payload)).await
    }

    /// Enqueue unless an unfinished task for the same work holds
    /// `dedupe_key`. Returns the new task id, or `None` when skipped.
    ///
    /// `CacheRefresh` and `PopularSearchWarm` count as the same work. When
    /// skipped, a matching task still waiting in a lower band is moved up
    /// to `priority`.
    pub async fn enqueue_unique(
        &self,
        kind: TaskKind,
        priority: Priority,
        payload: Value,
        dedupe_key: &str,
    ) -> Option<String> {
        let task = SyncTask { dedupe_key: Some(dedupe_key.to_string()), ..SyncTask::new(kind, priority, payload) };
        let claim = (kind.claim_group(), dedupe_key.to_string());

        let mut state = self.state.lock().await;
        if state.claims.contains(&claim) {
            let promoted = state.promote(&claim, priority);
            tracing::debug!(?kind, dedupe_key, promoted, "task already pending; skipping");
            return None;
        }
        state.claims.insert(claim);

        let id = task.id.clone();
        tracing::debug!(task_id = %id, ?kind, ?priority, "task enqueued");
        state.bands[priority.band()].push_back(task);
        drop(state);
        self.notify.notify_one();
        Some(id)
    }

    async fn push(&self, task: SyncTask) -> String {
        let id = task.id.clone();
        tracing::debug!(task_id = %id, kind = ?task.kind, priority = ?task.priority, "task enqueued");
        self.state.lock().await.bands[task.priority.band()].push_back(task);
        self.notify.notify_one();
        id
    }

    /// Pending tasks, including those waiting out a retry delay.
    pub async fn len(&self) -> usize {
        let state = self.state.lock().await;
        state.queued() + state.backing_off
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Snapshot of queued tasks in the order they would run.
    pub async fn pending_tasks(&self) -> Vec<SyncTask> {
        self.state.lock().await.bands.iter().flatten().cloned().collect()
    }

    pub async fn stats(&self) -> QueueStats {
        let state = self.state.lock().await;
        QueueStats {
            queued: state.queued(),
            backing_off: state.backing_off,
            processed: self.counters.processed.load(Ordering::Relaxed),
            failed_attempts: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Spawn the worker. A second call while it runs is a no-op and returns
    /// `None`.
    pub fn start(self: &Arc<Self>, handler: Arc<dyn TaskHandler>) -> Option<JoinHandle<()>> {
        if self.running.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            tracing::debug!("sync queue worker already running");
            return None;
        }
        self.shutting_down.store(false, Ordering::Release);

        let queue = Arc::clone(self);
        Some(tokio::spawn(async move {
            tracing::info!("sync queue worker started");
            queue.run(handler).await;
            queue.running.store(false, Ordering::Release);
            tracing::info!("sync queue worker stopped");
        }))
    }

    /// Ask the worker to stop after its current task. Queued tasks are kept.
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    async fn run(self: &Arc<Self>, handler: Arc<dyn TaskHandler>) {
        loop {
            if self.shutting_down.load(Ordering::Acquire) {
                break;
            }

            let next = self.state.lock().await.pop();
            let Some(task) = next else {
                self.notify.notified().await;
                continue;
            };

            self.process(handler.as_ref(), task).await;

            if !self.settings.task_spacing.is_zero() {
                tokio::time::sleep(self.settings.task_spacing).await;
            }
        }
    }

    async fn process(self: &Arc<Self>, handler: &dyn TaskHandler, task: SyncTask) {
        let result = match AssertUnwindSafe(handler.handle(&task)).catch_unwind().await {
            Ok(result) => result,
            Err(_) => Err(TaskError::Panicked),
        };

        match result {
            Ok(()) => {
                self.state.lock().await.release(&task);
                self.counters.processed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(task_id = %task.id, kind = ?task.kind, "task completed");
            }
            Err(e) => self.fail(task, e).await,
        }
    }

    async fn fail(self: &Arc<Self>, mut task: SyncTask, err: TaskError) {
        self.counters.failed.fetch_add(1, Ordering::Relaxed);

        if !err.is_retryable() || task.retry_count >= self.settings.max_retries {
            self.state.lock().await.release(&task);
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                task_id = %task.id,
                kind = ?task.kind,
                retries = task.retry_count,
                retryable = err.is_retryable(),
                error = %err,
                "task failed permanently; dropping"
            );
            return;
        }

        task.retry_count += 1;
        let delay = self.settings.base_delay * task.retry_count;
        tracing::warn!(
            task_id = %task.id,
            kind = ?task.kind,
            attempt = task.retry_count,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "task failed; retrying"
        );

        self.state.lock().await.backing_off += 1;
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.requeue_front(task).await;
        });
    }

    async fn requeue_front(&self, task: SyncTask) {
        let mut state = self.state.lock().await;
        state.backing_off = state.backing_off.saturating_sub(1);
        state.bands[task.priority.band()].push_front(task);
        drop(state);
        self.notify.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::AtomicU32;
    use vendorsync_client::ProviderError;

    /// Records payload labels in execution order; fails the first
    /// `failures` attempts.
    #[derive(Default)]
    struct RecordingHandler {
        seen: StdMutex<Vec<String>>,
        failures: AtomicU32,
    }

    impl RecordingHandler {
        fn failing(times: u32) -> Self {
            Self { failures: AtomicU32::new(times), ..Default::default() }
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TaskHandler for RecordingHandler {
        async fn handle(&self, task: &SyncTask) -> Result<(), TaskError> {
            let label = task.payload["label"].as_str().unwrap_or_default().to_string();
            self.seen.lock().unwrap().push(label);
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(TaskError::Provider(ProviderError::RateLimited));
            }
            Ok(())
        }
    }

    struct PanickingHandler;

    /// Takes ten seconds per task.
    struct SlowHandler;

    #[async_trait]
    impl TaskHandler for SlowHandler {
        async fn handle(&self, _task: &SyncTask) -> Result<(), TaskError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        }
    }

    struct RejectingHandler {
        calls: AtomicU32,
    }

    #[async_trait]
    impl TaskHandler for RejectingHandler {
        async fn handle(&self, _task: &SyncTask) -> Result<(), TaskError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(TaskError::Provider(ProviderError::AuthError))
        }
    }

    #[async_trait]
    impl TaskHandler for PanickingHandler {
        async fn handle(&self, _task: &SyncTask) -> Result<(), TaskError> {
            panic!("handler bug");
        }
    }

    fn settings(max_retries: u32) -> QueueSettings {
        QueueSettings {
            max_retries,
            base_delay: Duration::from_millis(1000),
            task_spacing: Duration::from_millis(100),
        }
    }

    async fn wait_until_settled(queue: &SyncQueue, expected_done: u64) {
        for _ in 0..10_000 {
            let stats = queue.stats().await;
            if stats.processed + stats.dropped >= expected_done && stats.queued == 0 && stats.backing_off == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("queue did not settle: {:?}", queue.stats().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_priority_order() {
        let queue = SyncQueue::new(settings(3));
        queue.enqueue(TaskKind::CacheRefresh, Priority::Low, json!({"label": "low"})).await;
        queue.enqueue(TaskKind::CacheRefresh, Priority::High, json!({"label": "high"})).await;
        queue.enqueue(TaskKind::CacheRefresh, Priority::Medium, json!({"label": "medium"})).await;

        let handler = Arc::new(RecordingHandler::default());
        queue.start(handler.clone());
        wait_until_settled(&queue, 3).await;

        assert_eq!(handler.seen(), vec!["high", "medium", "low"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fifo_within_band() {
        let queue = SyncQueue::new(settings(3));
        for label in ["a", "b", "c"] {
            queue.enqueue(TaskKind::VendorUpdate, Priority::Medium, json!({"label": label})).await;
        }

        let handler = Arc::new(RecordingHandler::default());
        queue.start(handler.clone());
        wait_until_settled(&queue, 3).await;

        assert_eq!(handler.seen(), vec!["a", "b", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_then_success() {
        let queue = SyncQueue::new(settings(3));
        queue.enqueue(TaskKind::CacheRefresh, Priority::Medium, json!({"label": "flaky"})).await;

        let handler = Arc::new(RecordingHandler::failing(2));
        queue.start(handler.clone());
        wait_until_settled(&queue, 1).await;

        let stats = queue.stats().await;
        assert_eq!(handler.seen().len(), 3);
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.failed_attempts, 2);
        assert_eq!(stats.dropped, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion_drops_task() {
        let queue = SyncQueue::new(settings(3));
        queue.enqueue(TaskKind::CacheRefresh, Priority::Medium, json!({"label": "doomed"})).await;

        let handler = Arc::new(RecordingHandler::failing(u32::MAX));
        queue.start(handler.clone());
        wait_until_settled(&queue, 1).await;

        let stats = queue.stats().await;
        // First attempt plus three retries.
        assert_eq!(handler.seen().len(), 4);
        assert_eq!(stats.failed_attempts, 4);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.processed, 0);
        assert!(queue.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_is_linear() {
        let queue = SyncQueue::new(QueueSettings { task_spacing: Duration::ZERO, ..settings(2) });
        queue.enqueue(TaskKind::CacheRefresh, Priority::Medium, json!({"label": "x"})).await;

        let start = tokio::time::Instant::now();
        let handler = Arc::new(RecordingHandler::failing(2));
        queue.start(handler.clone());
        wait_until_settled(&queue, 1).await;

        // 1s after the first failure, 2s after the second.
        assert!(start.elapsed() >= Duration::from_millis(3000));
        assert!(start.elapsed() < Duration::from_millis(3500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retried_task_jumps_its_band() {
        let queue = SyncQueue::new(QueueSettings { base_delay: Duration::from_millis(10), ..settings(3) });
        queue.enqueue(TaskKind::CacheRefresh, Priority::Low, json!({"label": "first"})).await;
        for label in ["l1", "l2", "l3", "l4"] {
            queue.enqueue(TaskKind::CacheRefresh, Priority::Low, json!({"label": label})).await;
        }

        let handler = Arc::new(RecordingHandler::failing(1));
        queue.start(handler.clone());
        wait_until_settled(&queue, 5).await;

        // The retry is back after 10ms, before spacing lets the worker pick
        // the next task at 100ms, and it goes ahead of l1.
        assert_eq!(handler.seen(), vec!["first", "first", "l1", "l2", "l3", "l4"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_len_counts_backing_off_tasks() {
        let queue = SyncQueue::new(QueueSettings { base_delay: Duration::from_secs(60), ..settings(3) });
        queue.enqueue(TaskKind::CacheRefresh, Priority::High, json!({"label": "x"})).await;

        let handler = Arc::new(RecordingHandler::failing(1));
        queue.start(handler.clone());
        tokio::time::sleep(Duration::from_secs(1)).await;

        let stats = queue.stats().await;
        assert_eq!(stats.queued, 0);
        assert_eq!(stats.backing_off, 1);
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn test_enqueue_unique_skips_duplicates() {
        let queue = SyncQueue::new(settings(3));
        let first = queue.enqueue_unique(TaskKind::CacheRefresh, Priority::Medium, json!({}), "search:abc").await;
        let second = queue.enqueue_unique(TaskKind::CacheRefresh, Priority::Medium, json!({}), "search:abc").await;
        let other_key = queue.enqueue_unique(TaskKind::CacheRefresh, Priority::Medium, json!({}), "search:xyz").await;
        let update = queue.enqueue_unique(TaskKind::VendorUpdate, Priority::High, json!({}), "search:abc").await;

        assert!(first.is_some());
        assert!(second.is_none());
        assert!(other_key.is_some());
        assert!(update.is_some());
        assert_eq!(queue.len().await, 3);
    }

    #[tokio::test]
    async fn test_refresh_subsumes_queued_warm() {
        let queue = SyncQueue::new(settings(3));
        let warm = queue.enqueue_unique(TaskKind::PopularSearchWarm, Priority::Low, json!({}), "search:abc").await;
        let refresh = queue.enqueue_unique(TaskKind::CacheRefresh, Priority::Medium, json!({}), "search:abc").await;

        assert!(warm.is_some());
        assert!(refresh.is_none());
        let pending = queue.pending_tasks().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind, TaskKind::PopularSearchWarm);
        assert_eq!(pending[0].priority, Priority::Medium);

        // A later warm neither duplicates nor demotes it.
        let again = queue.enqueue_unique(TaskKind::PopularSearchWarm, Priority::Low, json!({}), "search:abc").await;
        assert!(again.is_none());
        assert_eq!(queue.pending_tasks().await[0].priority, Priority::Medium);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unique_while_running() {
        let queue = SyncQueue::new(settings(3));
        queue.enqueue_unique(TaskKind::CacheRefresh, Priority::Medium, json!({}), "search:abc").await;
        queue.start(Arc::new(SlowHandler));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(queue.stats().await.queued, 0);

        let during = queue.enqueue_unique(TaskKind::CacheRefresh, Priority::Medium, json!({}), "search:abc").await;
        assert!(during.is_none());

        wait_until_settled(&queue, 1).await;
        let after = queue.enqueue_unique(TaskKind::CacheRefresh, Priority::Medium, json!({}), "search:abc").await;
        assert!(after.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unique_while_backing_off() {
        let queue = SyncQueue::new(QueueSettings { base_delay: Duration::from_secs(600), ..settings(3) });
        queue.enqueue_unique(TaskKind::CacheRefresh, Priority::Medium, json!({"label": "k"}), "search:abc").await;
        let handler = Arc::new(RecordingHandler::failing(u32::MAX));
        queue.start(handler.clone());

        for _ in 0..5 {
            tokio::time::sleep(Duration::from_secs(1)).await;
            let skipped = queue.enqueue_unique(TaskKind::CacheRefresh, Priority::Medium, json!({}), "search:abc").await;
            assert!(skipped.is_none());
        }

        let stats = queue.stats().await;
        assert_eq!(stats.backing_off, 1);
        assert_eq!(stats.failed_attempts, 1);
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_task_releases_key() {
        let queue = SyncQueue::new(QueueSettings { base_delay: Duration::from_millis(10), ..settings(1) });
        queue.enqueue_unique(TaskKind::CacheRefresh, Priority::Medium, json!({}), "search:abc").await;
        queue.start(Arc::new(RecordingHandler::failing(u32::MAX)));
        wait_until_settled(&queue, 1).await;
        assert_eq!(queue.stats().await.dropped, 1);

        let retry = queue.enqueue_unique(TaskKind::CacheRefresh, Priority::Medium, json!({}), "search:abc").await;
        assert!(retry.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_is_not_retried() {
        let queue = SyncQueue::new(settings(3));
        queue.enqueue(TaskKind::CacheRefresh, Priority::Medium, json!({})).await;

        let handler = Arc::new(RejectingHandler { calls: AtomicU32::new(0) });
        queue.start(handler.clone());
        wait_until_settled(&queue, 1).await;

        let stats = queue.stats().await;
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert_eq!(stats.failed_attempts, 1);
        assert_eq!(stats.dropped, 1);
    }

    #[tokio::test]
    async fn test_task_ids_are_unique() {
        let queue = SyncQueue::new(settings(3));
        let a = queue.enqueue(TaskKind::VendorUpdate, Priority::High, json!({})).await;
        let b = queue.enqueue(TaskKind::VendorUpdate, Priority::High, json!({})).await;
        assert_ne!(a, b);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_is_noop() {
        let queue = SyncQueue::new(settings(3));
        let handler = Arc::new(RecordingHandler::default());
        assert!(queue.start(handler.clone()).is_some());
        assert!(queue.start(handler).is_none());
        assert!(queue.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_picks_up_late_tasks() {
        let queue = SyncQueue::new(settings(3));
        let handler = Arc::new(RecordingHandler::default());
        queue.start(handler.clone());

        tokio::time::sleep(Duration::from_secs(5)).await;
        queue.enqueue(TaskKind::VendorUpdate, Priority::Low, json!({"label": "late"})).await;
        wait_until_settled(&queue, 1).await;

        assert_eq!(handler.seen(), vec!["late"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_handler_does_not_kill_worker() {
        let queue = SyncQueue::new(settings(0));
        queue.enqueue(TaskKind::VendorUpdate, Priority::High, json!({})).await;
        queue.enqueue(TaskKind::VendorUpdate, Priority::High, json!({})).await;

        queue.start(Arc::new(PanickingHandler));
        wait_until_settled(&queue, 2).await;

        assert_eq!(queue.stats().await.dropped, 2);
        assert!(queue.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_worker() {
        let queue = SyncQueue::new(settings(3));
        let handle = queue.start(Arc::new(RecordingHandler::default())).unwrap();

        queue.shutdown();
        handle.await.unwrap();
        assert!(!queue.is_running());

        queue.enqueue(TaskKind::VendorUpdate, Priority::High, json!({})).await;
        assert_eq!(queue.len().await, 1);
    }
}
