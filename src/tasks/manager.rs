//! Async task management.
//!
//! Decouples plan submission from execution: the orchestrator returns a
//! task handle immediately, a bounded worker pool runs plans one at a
//! time, and the client polls `status`. Cancellation is cooperative and
//! idempotent; terminal tasks are swept after a grace window.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Config;
use crate::executor::ExecResult;
use crate::metrics;

use super::id_pool::IdPool;
use super::model::{TaskRecord, TaskState, TaskStatus};

pub struct TaskManager {
    table: DashMap<String, TaskRecord>,
    pool: Arc<IdPool>,
    workers: Arc<Semaphore>,
    queued: AtomicUsize,
    worker_count: usize,
    grace: Duration,
}

impl TaskManager {
    pub fn new(config: &Config) -> Arc<Self> {
        Arc::new(Self {
            table: DashMap::new(),
            pool: IdPool::new(16, 64),
            workers: Arc::new(Semaphore::new(config.worker_pool.max(1))),
            queued: AtomicUsize::new(0),
            worker_count: config.worker_pool.max(1),
            grace: config.task_grace(),
        })
    }

    /// Draw a pre-generated id and register a pending record for it.
    pub fn create(self: &Arc<Self>) -> String {
        let task_id = self.pool.take();
        self.table.insert(task_id.clone(), TaskRecord::new());
        task_id
    }

    /// Enqueue work for a previously created task. Returns false for an
    /// unknown id. The closure receives the task's cancellation token and
    /// runs on a pooled worker.
    pub fn submit<F, Fut>(self: &Arc<Self>, task_id: &str, run: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ExecResult> + Send + 'static,
    {
        let cancel = match self.table.get(task_id) {
            Some(record) => record.cancel.clone(),
            None => return false,
        };

        let manager = self.clone();
        let task_id = task_id.to_string();
        let workers = self.workers.clone();
        tokio::spawn(async move {
            manager.queued.fetch_add(1, Ordering::SeqCst);
            metrics::QUEUE_DEPTH.set(manager.queue_depth() as i64);
            let permit = workers.acquire_owned().await;
            manager.queued.fetch_sub(1, Ordering::SeqCst);
            metrics::QUEUE_DEPTH.set(manager.queue_depth() as i64);
            let _permit = match permit {
                Ok(permit) => permit,
                Err(_) => return,
            };

            if let Some(mut record) = manager.table.get_mut(&task_id) {
                record.state = TaskState::Running;
            }
            let result = run(cancel).await;
            manager.finish(&task_id, result);
        });
        true
    }

    fn finish(&self, task_id: &str, result: ExecResult) {
        let Some(mut record) = self.table.get_mut(task_id) else {
            return;
        };
        let state = if result.was_cancelled() {
            TaskState::Cancelled
        } else if result.success {
            TaskState::Completed
        } else {
            TaskState::Failed
        };
        record.state = state;
        record.error = result.error.as_ref().map(|e| e.message.clone());
        record.result = Some(result);
        record.finished_at = Some(std::time::Instant::now());
        metrics::TASKS_TOTAL.with_label_values(&[state.as_str()]).inc();
        debug!(%task_id, state = state.as_str(), "task finished");
    }

    pub fn status(&self, task_id: &str) -> Option<TaskStatus> {
        self.table.get(task_id).map(|record| TaskStatus {
            task_id: task_id.to_string(),
            state: record.state,
            result: record.result.clone(),
            error: record.error.clone(),
            elapsed_ms: record.elapsed_ms(),
        })
    }

    /// Request cooperative cancellation. Idempotent; returns whether the
    /// task is known.
    pub fn cancel(&self, task_id: &str) -> bool {
        match self.table.get(task_id) {
            Some(record) => {
                record.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Plans waiting for a worker slot.
    pub fn queue_depth(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// Workers currently executing a plan.
    pub fn busy_workers(&self) -> usize {
        self.worker_count - self.workers.available_permits()
    }

    /// Drop terminal tasks older than the grace window.
    pub fn sweep(&self) {
        let grace = self.grace;
        let before = self.table.len();
        self.table.retain(|_, record| {
            if !record.state.is_terminal() {
                return true;
            }
            match record.finished_at {
                Some(finished) => finished.elapsed() < grace,
                None => true,
            }
        });
        let removed = before - self.table.len();
        if removed > 0 {
            info!(removed, "swept terminal tasks");
        }
    }

    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            loop {
                tick.tick().await;
                manager.sweep();
            }
        })
    }
}
