//! Task records and wire snapshots.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::executor::ExecResult;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
        }
    }
}

/// Internal record owned by the task manager.
#[derive(Debug)]
pub struct TaskRecord {
    pub state: TaskState,
    pub result: Option<ExecResult>,
    pub error: Option<String>,
    pub created_at: Instant,
    pub finished_at: Option<Instant>,
    pub cancel: CancellationToken,
}

impl TaskRecord {
    pub fn new() -> Self {
        Self {
            state: TaskState::Pending,
            result: None,
            error: None,
            created_at: Instant::now(),
            finished_at: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        let end = self.finished_at.unwrap_or_else(Instant::now);
        end.saturating_duration_since(self.created_at).as_millis() as u64
    }
}

impl Default for TaskRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot returned by `status`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task_id: String,
    pub state: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ExecResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}
