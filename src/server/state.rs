//! Shared server state.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::browser::BrowserSupervisor;
use crate::catalog::CatalogService;
use crate::config::Config;
use crate::executor::DslExecutor;
use crate::planner::{Planner, TurnRecord};
use crate::tasks::TaskManager;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub supervisor: Arc<BrowserSupervisor>,
    pub executor: Arc<DslExecutor>,
    pub tasks: Arc<TaskManager>,
    pub planner: Arc<dyn Planner>,
    pub catalog: Arc<CatalogService>,
    history: Arc<Mutex<Vec<TurnRecord>>>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        supervisor: Arc<BrowserSupervisor>,
        executor: Arc<DslExecutor>,
        tasks: Arc<TaskManager>,
        planner: Arc<dyn Planner>,
        catalog: Arc<CatalogService>,
    ) -> Self {
        Self {
            config,
            supervisor,
            executor,
            tasks,
            planner,
            catalog,
            history: Arc::new(Mutex::new(Vec::new())),
            started_at: Instant::now(),
        }
    }

    pub fn history(&self) -> Vec<TurnRecord> {
        self.history.lock().clone()
    }

    pub fn push_turn(&self, turn: TurnRecord) {
        self.history.lock().push(turn);
    }

    /// Clears conversation state only. In-flight tasks keep running until
    /// they observe cancellation themselves.
    pub fn reset_conversation(&self) {
        self.history.lock().clear();
    }
}
