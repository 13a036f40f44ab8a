//! The narrow browser capability port.
//!
//! Everything the core needs from a real browser. Implementations must be
//! safe to call concurrently; serialization of mutating traffic is the
//! supervisor's job, not the port's.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::AgentResult;

/// Load barrier applied by `navigate`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NavWait {
    Load,
    DomContentLoaded,
    NetworkIdle,
}

#[async_trait]
pub trait BrowserPort: Send + Sync {
    async fn navigate(&self, url: &str, wait: NavWait, timeout: Duration) -> AgentResult<()>;
    async fn back(&self) -> AgentResult<()>;
    async fn forward(&self) -> AgentResult<()>;
    async fn current_url(&self) -> AgentResult<String>;
    async fn title(&self) -> AgentResult<String>;
    async fn html(&self) -> AgentResult<String>;
    async fn screenshot_png(&self) -> AgentResult<Vec<u8>>;

    /// Evaluate a JavaScript expression in the page and return its JSON
    /// value. Scripts are the workhorse behind the catalog, the resolver,
    /// and stabilization; each carries a `/*pp:<op>*/` marker.
    async fn eval(&self, script: &str) -> AgentResult<Value>;

    async fn click_css(&self, css: &str) -> AgentResult<()>;
    async fn focus_css(&self, css: &str) -> AgentResult<()>;
    /// Type `text` into the element, one key event per character with the
    /// given inter-key delay.
    async fn type_chars(&self, css: &str, text: &str, per_key_delay: Duration) -> AgentResult<()>;
    /// Press a named key, either on a focused element or at page level.
    async fn press_key(&self, css: Option<&str>, key: &str) -> AgentResult<()>;
    async fn hover_css(&self, css: &str) -> AgentResult<()>;

    async fn tab_count(&self) -> AgentResult<usize>;
    async fn switch_tab(&self, index: usize) -> AgentResult<()>;

    /// Tear down the current context and open a fresh one at about:blank.
    async fn recreate(&self) -> AgentResult<()>;
}
