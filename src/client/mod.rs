//! Multi-turn client loop.
//!
//! Shows the planner's explanation immediately, polls the task handle
//! with adaptive backoff, and falls back to a synchronous page read when
//! the polling window closes. A safety valve stops the loop when the
//! planner emits the same plan twice in a row.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::errors::AgentResult;
use crate::poll::{AdaptiveBackoff, PollSettings};
use crate::tasks::{TaskState, TaskStatus};
use crate::warnings::{format_warning, Severity};

/// One `/execute` response, from the client's point of view.
#[derive(Clone, Debug, serde::Deserialize)]
pub struct TurnResponse {
    pub explanation: String,
    #[serde(default)]
    pub actions: Value,
    #[serde(default)]
    pub complete: bool,
    #[serde(default)]
    pub task_id: Option<String>,
}

/// Transport seam over the web tier. Deployments back this with HTTP;
/// tests script it.
#[async_trait]
pub trait AgentTransport: Send + Sync {
    async fn execute(&self, command: &str) -> AgentResult<TurnResponse>;
    async fn status(&self, task_id: &str) -> AgentResult<TaskStatus>;
    async fn source(&self) -> AgentResult<String>;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TurnOutcome {
    Completed,
    CompletedViaFallback,
    Failed,
    Cancelled,
    NoTask,
}

#[derive(Clone, Debug)]
pub struct TurnReport {
    pub explanation: String,
    pub outcome: TurnOutcome,
    pub warnings: Vec<String>,
}

pub struct ClientLoop<T> {
    transport: T,
    poll: PollSettings,
    max_turns: usize,
}

impl<T: AgentTransport> ClientLoop<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            poll: PollSettings::client_status(),
            max_turns: 20,
        }
    }

    pub fn with_poll(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// Drive the turn loop for one goal until the planner reports
    /// completion, the duplicate valve trips, or the turn budget runs out.
    pub async fn run(&self, goal: &str) -> AgentResult<Vec<TurnReport>> {
        let mut reports = Vec::new();
        let mut last_identity: Option<Vec<String>> = None;

        for turn in 0..self.max_turns {
            let response = self.transport.execute(goal).await?;
            info!(turn, explanation = %response.explanation, "planner turn");

            let identity = plan_identity(&response.actions);
            if !identity.is_empty() && last_identity.as_ref() == Some(&identity) {
                warn!("planner repeated the same plan; stopping the loop");
                reports.push(TurnReport {
                    explanation: response.explanation,
                    outcome: TurnOutcome::NoTask,
                    warnings: vec![format_warning(
                        Severity::Warning,
                        "client",
                        "identical plan emitted twice in a row; loop stopped",
                    )],
                });
                break;
            }
            last_identity = Some(identity);

            let (outcome, warnings) = match &response.task_id {
                Some(task_id) => self.poll_task(task_id).await,
                None => (TurnOutcome::NoTask, Vec::new()),
            };
            let complete = response.complete;
            reports.push(TurnReport {
                explanation: response.explanation,
                outcome,
                warnings,
            });

            if complete {
                break;
            }
        }
        Ok(reports)
    }

    /// Poll a task until terminal state, growing the interval under error
    /// and giving up into a synchronous source read once the window ends.
    pub async fn poll_task(&self, task_id: &str) -> (TurnOutcome, Vec<String>) {
        let mut backoff = AdaptiveBackoff::new(self.poll);
        loop {
            let had_error = match self.transport.status(task_id).await {
                Ok(status) if status.state.is_terminal() => {
                    return (outcome_of(&status), warnings_of(&status));
                }
                Ok(status) => {
                    debug!(%task_id, state = status.state.as_str(), "task still running");
                    false
                }
                Err(err) => {
                    debug!(%task_id, %err, "status poll failed");
                    true
                }
            };

            match backoff.next_delay(had_error) {
                Some(delay) => tokio::time::sleep(delay).await,
                None => {
                    // Window closed: read the page synchronously and treat
                    // the task as completed via fallback.
                    let _ = self.transport.source().await;
                    return (
                        TurnOutcome::CompletedViaFallback,
                        vec![format_warning(
                            Severity::Warning,
                            "client",
                            &format!("polling window expired for {task_id}; fell back to synchronous read"),
                        )],
                    );
                }
            }
        }
    }
}

fn outcome_of(status: &TaskStatus) -> TurnOutcome {
    match status.state {
        TaskState::Completed => TurnOutcome::Completed,
        TaskState::Cancelled => TurnOutcome::Cancelled,
        _ => TurnOutcome::Failed,
    }
}

fn warnings_of(status: &TaskStatus) -> Vec<String> {
    status
        .result
        .as_ref()
        .map(|result| result.warnings.clone())
        .unwrap_or_default()
}

/// `(kind, target, value)` triples used by the duplicate valve.
fn plan_identity(actions: &Value) -> Vec<String> {
    actions
        .as_array()
        .map(|items| {
            items
                .iter()
                .map(|item| {
                    let kind = item
                        .get("kind")
                        .or_else(|| item.get("action"))
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    let target = item.get("target").map(Value::to_string).unwrap_or_default();
                    let value = item.get("value").map(Value::to_string).unwrap_or_default();
                    format!("{kind}\u{1f}{target}\u{1f}{value}")
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{ExecResult, Observation};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::time::Duration;

    struct ScriptedTransport {
        turns: Mutex<VecDeque<TurnResponse>>,
        statuses: Mutex<VecDeque<TaskStatus>>,
        source_reads: Mutex<usize>,
    }

    impl ScriptedTransport {
        fn new(
            turns: impl IntoIterator<Item = TurnResponse>,
            statuses: impl IntoIterator<Item = TaskStatus>,
        ) -> Self {
            Self {
                turns: Mutex::new(turns.into_iter().collect()),
                statuses: Mutex::new(statuses.into_iter().collect()),
                source_reads: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl AgentTransport for ScriptedTransport {
        async fn execute(&self, _command: &str) -> AgentResult<TurnResponse> {
            self.turns
                .lock()
                .pop_front()
                .ok_or_else(|| crate::errors::AgentError::unknown("no more turns"))
        }

        async fn status(&self, _task_id: &str) -> AgentResult<TaskStatus> {
            self.statuses
                .lock()
                .pop_front()
                .ok_or_else(|| crate::errors::AgentError::unknown("status exhausted"))
        }

        async fn source(&self) -> AgentResult<String> {
            *self.source_reads.lock() += 1;
            Ok("<html></html>".to_string())
        }
    }

    fn status(state: TaskState, warnings: Vec<String>) -> TaskStatus {
        TaskStatus {
            task_id: "task-1".into(),
            state,
            result: Some(ExecResult {
                success: state == TaskState::Completed,
                warnings,
                observation: Observation::default(),
                is_done: false,
                html: String::new(),
                screenshot: None,
                extracted: None,
                error: None,
            }),
            error: None,
            elapsed_ms: 10,
        }
    }

    fn quick_poll() -> PollSettings {
        PollSettings {
            initial: Duration::from_millis(1),
            factor: 2.0,
            cap: Duration::from_millis(4),
            deadline: Duration::from_secs(2),
        }
    }

    #[tokio::test]
    async fn polls_until_terminal_and_surfaces_warnings() {
        let transport = ScriptedTransport::new(
            [TurnResponse {
                explanation: "clicking".into(),
                actions: json!([{ "kind": "click", "target": "#go" }]),
                complete: true,
                task_id: Some("task-1".into()),
            }],
            [
                status(TaskState::Running, vec![]),
                status(TaskState::Completed, vec!["INFO:auto:succeeded on attempt 2".into()]),
            ],
        );
        let reports = ClientLoop::new(transport)
            .with_poll(quick_poll())
            .run("do the thing")
            .await
            .unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].outcome, TurnOutcome::Completed);
        assert_eq!(reports[0].warnings.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_plans_trip_the_valve() {
        let plan = json!([{ "kind": "click", "target": "#go" }]);
        let turn = |complete: bool| TurnResponse {
            explanation: "again".into(),
            actions: plan.clone(),
            complete,
            task_id: None,
        };
        let transport = ScriptedTransport::new([turn(false), turn(false), turn(false)], []);
        let reports = ClientLoop::new(transport)
            .with_poll(quick_poll())
            .run("loop forever")
            .await
            .unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports[1].warnings[0].contains("identical plan"));
    }

    #[tokio::test]
    async fn expired_window_falls_back_to_source_read() {
        let transport = ScriptedTransport::new(
            [],
            // Never terminal.
            (0..64).map(|_| status(TaskState::Running, vec![])).collect::<Vec<_>>(),
        );
        let poll = PollSettings {
            initial: Duration::from_millis(1),
            factor: 2.0,
            cap: Duration::from_millis(2),
            deadline: Duration::from_millis(20),
        };
        let client = ClientLoop::new(transport).with_poll(poll);
        let (outcome, warnings) = client.poll_task("task-1").await;
        assert_eq!(outcome, TurnOutcome::CompletedViaFallback);
        assert!(warnings[0].contains("polling window expired"));
        assert_eq!(*client.transport.source_reads.lock(), 1);
    }
}
