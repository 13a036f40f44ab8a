//! Browser lifecycle supervision.
//!
//! Owns the browser lock that serializes mutating traffic, the periodic
//! context refresh, and recreate-with-URL-preservation. The supervisor is
//! the only component allowed to recreate the context.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

use crate::config::Config;
use crate::errors::{AgentError, AgentResult};
use crate::metrics;

use super::health;
use super::ports::{BrowserPort, NavWait};

pub struct BrowserSupervisor {
    port: Arc<dyn BrowserPort>,
    gate: Mutex<()>,
    actions_completed: AtomicU64,
    config: Arc<Config>,
}

impl BrowserSupervisor {
    pub fn new(port: Arc<dyn BrowserPort>, config: Arc<Config>) -> Self {
        Self {
            port,
            gate: Mutex::new(()),
            actions_completed: AtomicU64::new(0),
            config,
        }
    }

    pub fn port(&self) -> Arc<dyn BrowserPort> {
        self.port.clone()
    }

    /// Acquire the browser lock. Held for the duration of a plan; reads
    /// and planning proceed without it.
    pub async fn lock(&self) -> MutexGuard<'_, ()> {
        self.gate.lock().await
    }

    /// Probe health; on failure, recreate the context preserving the URL.
    pub async fn ensure_healthy(&self) -> AgentResult<()> {
        let report = health::probe(self.port.as_ref()).await;
        if report.healthy() {
            return Ok(());
        }
        warn!(?report, "browser unhealthy; recreating context");
        self.recreate_preserving_url("unhealthy").await
    }

    /// Count one completed action; every `browser_refresh_interval`
    /// actions the context is recreated to shed accumulated page state.
    /// Returns whether a refresh happened.
    pub async fn note_action_completed(&self) -> AgentResult<bool> {
        let n = self.actions_completed.fetch_add(1, Ordering::SeqCst) + 1;
        let interval = self.config.browser_refresh_interval;
        if interval == 0 || n % interval != 0 {
            return Ok(false);
        }
        info!(actions = n, "refresh interval reached; recreating context");
        self.recreate_preserving_url("interval").await?;
        Ok(true)
    }

    pub async fn recreate_preserving_url(&self, trigger: &str) -> AgentResult<()> {
        metrics::BROWSER_RECREATES_TOTAL
            .with_label_values(&[trigger])
            .inc();
        let previous_url = self.port.current_url().await.unwrap_or_default();
        self.port.recreate().await?;

        if !should_preserve(&previous_url, self.config.start_url.as_deref()) {
            return Ok(());
        }

        // Three tries, each with a weaker load barrier.
        let ladder = [NavWait::Load, NavWait::DomContentLoaded, NavWait::NetworkIdle];
        let timeout = Duration::from_millis(self.config.navigate_timeout_ms);
        let mut last_err: Option<AgentError> = None;
        for wait in ladder {
            match self.port.navigate(&previous_url, wait, timeout).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    warn!(%previous_url, ?wait, %err, "post-recreate navigation failed");
                    last_err = Some(err);
                }
            }
        }
        // Staying on blank is acceptable; the caller gets a warning.
        Err(last_err.unwrap_or_else(|| AgentError::navigation("post-recreate navigation failed")))
    }
}

/// URLs never worth restoring after a context recreate.
pub fn should_preserve(url: &str, start_url: Option<&str>) -> bool {
    if url.is_empty() {
        return false;
    }
    for prefix in ["about:", "chrome:", "data:"] {
        if url.starts_with(prefix) {
            return false;
        }
    }
    start_url != Some(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::stub::StubBrowser;

    fn supervisor_with(stub: Arc<StubBrowser>, config: Config) -> BrowserSupervisor {
        BrowserSupervisor::new(stub, Arc::new(config))
    }

    #[test]
    fn preserve_filters_internal_urls() {
        assert!(should_preserve("https://example.com/a", None));
        assert!(!should_preserve("about:blank", None));
        assert!(!should_preserve("chrome://settings", None));
        assert!(!should_preserve("data:text/html,hi", None));
        assert!(!should_preserve("", None));
        assert!(!should_preserve(
            "https://start.example.com",
            Some("https://start.example.com")
        ));
    }

    #[tokio::test]
    async fn refresh_interval_triggers_recreate_and_renavigate() {
        let stub = Arc::new(StubBrowser::new());
        stub.set_url("https://example.com/page");
        let config = Config {
            browser_refresh_interval: 2,
            ..Config::default()
        };
        let supervisor = supervisor_with(stub.clone(), config);

        assert!(!supervisor.note_action_completed().await.unwrap());
        assert!(supervisor.note_action_completed().await.unwrap());
        assert_eq!(stub.recreates(), 1);
        // Navigated back to the preserved URL.
        assert_eq!(stub.nav_log().last().unwrap(), "https://example.com/page");
    }

    #[tokio::test]
    async fn unhealthy_probe_recreates() {
        let stub = Arc::new(StubBrowser::new());
        stub.queue_eval(
            "health",
            serde_json::json!({"ready_state": "loading", "navigating": true}),
        );
        let supervisor = supervisor_with(stub.clone(), Config::default());
        supervisor.ensure_healthy().await.unwrap();
        assert_eq!(stub.recreates(), 1);
    }

    #[tokio::test]
    async fn healthy_probe_is_a_no_op() {
        let stub = Arc::new(StubBrowser::new());
        let supervisor = supervisor_with(stub.clone(), Config::default());
        supervisor.ensure_healthy().await.unwrap();
        assert_eq!(stub.recreates(), 0);
    }
}
