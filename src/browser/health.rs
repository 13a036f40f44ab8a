//! Browser health probing.
//!
//! Three-tier check: the document readyState is readable, a trivial
//! expression evaluates, and the page is not stuck mid-navigation.

use serde_json::Value;
use tracing::debug;

use super::ports::BrowserPort;

#[derive(Clone, Debug, Default)]
pub struct HealthReport {
    pub ready_state: Option<String>,
    pub eval_ok: bool,
    pub navigating: bool,
}

impl HealthReport {
    pub fn healthy(&self) -> bool {
        self.ready_state.is_some() && self.eval_ok && !self.navigating
    }
}

pub async fn probe(port: &dyn BrowserPort) -> HealthReport {
    let mut report = HealthReport::default();

    match port
        .eval(
            r#"/*pp:health*/ ({
                ready_state: document.readyState,
                navigating: document.readyState === 'loading',
            })"#,
        )
        .await
    {
        Ok(Value::Object(map)) => {
            report.ready_state = map
                .get("ready_state")
                .and_then(Value::as_str)
                .map(str::to_string);
            report.navigating = map
                .get("navigating")
                .and_then(Value::as_bool)
                .unwrap_or(false);
        }
        Ok(other) => debug!(?other, "health probe returned unexpected shape"),
        Err(err) => debug!(?err, "health probe readyState tier failed"),
    }

    report.eval_ok = port.eval("/*pp:ping*/ 1 + 1").await.is_ok();

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::stub::StubBrowser;

    #[tokio::test]
    async fn stub_browser_reports_healthy() {
        let stub = StubBrowser::new();
        let report = probe(&stub).await;
        assert!(report.healthy());
        assert_eq!(report.ready_state.as_deref(), Some("complete"));
    }

    #[tokio::test]
    async fn loading_page_reports_navigating() {
        let stub = StubBrowser::new();
        stub.queue_eval(
            "health",
            serde_json::json!({"ready_state": "loading", "navigating": true}),
        );
        let report = probe(&stub).await;
        assert!(!report.healthy());
        assert!(report.navigating);
    }
}
