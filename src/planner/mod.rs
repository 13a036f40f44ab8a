//! Planner port.
//!
//! The LLM client is an external collaborator: an opaque function from
//! planning context to a structured plan. The orchestrator only depends
//! on this trait; deployments plug in their backend, tests use the
//! scripted implementation.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::catalog::Catalog;
use crate::errors::{AgentError, AgentResult};

/// One prior turn, kept for planner context.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct TurnRecord {
    pub command: String,
    pub explanation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

/// Everything the planner may consume for one turn.
#[derive(Clone, Debug, Default)]
pub struct PlanningContext {
    pub command: String,
    pub history: Vec<TurnRecord>,
    pub html: Option<String>,
    pub screenshot_b64: Option<String>,
    pub model: Option<String>,
    pub catalog: Option<Arc<Catalog>>,
}

/// Structured plan returned by the planner. `actions` stays in wire form;
/// the executor normalizes and validates it.
#[derive(Clone, Debug)]
pub struct PlannerOutput {
    pub explanation: String,
    pub actions: Value,
    pub complete: bool,
}

#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, context: PlanningContext) -> AgentResult<PlannerOutput>;
}

/// Scripted planner: pops pre-seeded outputs in order. Used by tests and
/// wiring checks.
#[derive(Default)]
pub struct ScriptedPlanner {
    steps: Mutex<VecDeque<PlannerOutput>>,
}

impl ScriptedPlanner {
    pub fn new(steps: impl IntoIterator<Item = PlannerOutput>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
        }
    }
}

#[async_trait]
impl Planner for ScriptedPlanner {
    async fn plan(&self, _context: PlanningContext) -> AgentResult<PlannerOutput> {
        self.steps
            .lock()
            .pop_front()
            .ok_or_else(|| AgentError::unknown("scripted planner has no more steps"))
    }
}

/// Placeholder used when no planning backend is configured: explains the
/// situation and emits no actions, so the web tier still answers.
pub struct UnconfiguredPlanner;

#[async_trait]
impl Planner for UnconfiguredPlanner {
    async fn plan(&self, _context: PlanningContext) -> AgentResult<PlannerOutput> {
        Ok(PlannerOutput {
            explanation: "No planning backend is configured; submit plans via /execute-dsl."
                .to_string(),
            actions: Value::Array(vec![]),
            complete: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn scripted_planner_pops_in_order() {
        let planner = ScriptedPlanner::new([
            PlannerOutput {
                explanation: "first".into(),
                actions: json!([{ "kind": "screenshot" }]),
                complete: false,
            },
            PlannerOutput {
                explanation: "second".into(),
                actions: json!([]),
                complete: true,
            },
        ]);
        let first = planner.plan(PlanningContext::default()).await.unwrap();
        assert_eq!(first.explanation, "first");
        let second = planner.plan(PlanningContext::default()).await.unwrap();
        assert!(second.complete);
        assert!(planner.plan(PlanningContext::default()).await.is_err());
    }
}
