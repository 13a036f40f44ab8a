//! Post-action stabilization primitives.
//!
//! Event-driven waits for DOM quiescence and network idle, plus the
//! mutation-burst probe that drives catalog invalidation.

use serde_json::{json, Value};

use crate::browser::BrowserPort;
use crate::errors::AgentResult;

/// Mutations within a 200 ms window beyond which the page is considered
/// structurally changed.
pub const MUTATION_BURST_THRESHOLD: u64 = 30;

/// Wait until no DOM mutation has been observed for `quiet_ms`, bounded by
/// `timeout_ms`. Returns whether quiescence was reached.
pub async fn dom_quiescent(
    port: &dyn BrowserPort,
    quiet_ms: u64,
    timeout_ms: u64,
) -> AgentResult<bool> {
    let args = json!({ "quiet": quiet_ms, "timeout": timeout_ms });
    let script = format!(
        r#"/*pp:quiet*/ /*args:{args}*/ new Promise(resolve => {{
  let timer = null;
  let limit = null;
  const done = (ok) => {{ observer.disconnect(); clearTimeout(timer); clearTimeout(limit); resolve(ok); }};
  const observer = new MutationObserver(() => {{
    clearTimeout(timer);
    timer = setTimeout(() => done(true), {quiet_ms});
  }});
  observer.observe(document.documentElement, {{
    childList: true, subtree: true, attributes: true, characterData: true,
  }});
  timer = setTimeout(() => done(true), {quiet_ms});
  limit = setTimeout(() => done(false), {timeout_ms});
}})"#
    );
    Ok(port.eval(&script).await?.as_bool().unwrap_or(true))
}

/// Wait until no new network resource entries appear for `idle_ms`,
/// bounded by `timeout_ms`.
pub async fn network_idle(
    port: &dyn BrowserPort,
    idle_ms: u64,
    timeout_ms: u64,
) -> AgentResult<bool> {
    let args = json!({ "idle": idle_ms, "timeout": timeout_ms });
    let script = format!(
        r#"/*pp:netidle*/ /*args:{args}*/ new Promise(resolve => {{
  let last = performance.getEntriesByType('resource').length;
  let quietFor = 0;
  const step = 100;
  const tick = setInterval(() => {{
    const now = performance.getEntriesByType('resource').length;
    quietFor = now === last ? quietFor + step : 0;
    last = now;
    if (quietFor >= {idle_ms}) {{ clearInterval(tick); resolve(true); }}
  }}, step);
  setTimeout(() => {{ clearInterval(tick); resolve(false); }}, {timeout_ms});
}})"#
    );
    Ok(port.eval(&script).await?.as_bool().unwrap_or(true))
}

/// Count of DOM mutations in the trailing 200 ms window. The first call
/// installs a persistent observer and reports zero.
pub async fn mutation_burst(port: &dyn BrowserPort) -> AgentResult<u64> {
    let script = r#"/*pp:mutations*/ (() => {
  if (!window.__ppMutations) {
    window.__ppMutations = { times: [] };
    new MutationObserver((records) => {
      const now = performance.now();
      for (let i = 0; i < records.length; i++) window.__ppMutations.times.push(now);
      const extra = window.__ppMutations.times.length - 500;
      if (extra > 0) window.__ppMutations.times.splice(0, extra);
    }).observe(document.documentElement, {
      childList: true, subtree: true, attributes: true,
    });
    return 0;
  }
  const now = performance.now();
  window.__ppMutations.times = window.__ppMutations.times.filter(t => now - t <= 200);
  return window.__ppMutations.times.length;
})()"#;
    match port.eval(script).await? {
        Value::Number(n) => Ok(n.as_u64().unwrap_or(0)),
        _ => Ok(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::StubBrowser;

    #[tokio::test]
    async fn quiescence_reports_true_on_quiet_page() {
        let stub = StubBrowser::new();
        assert!(dom_quiescent(&stub, 200, 1_000).await.unwrap());
    }

    #[tokio::test]
    async fn burst_count_defaults_to_zero() {
        let stub = StubBrowser::new();
        assert_eq!(mutation_burst(&stub).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn burst_count_reads_queued_value() {
        let stub = StubBrowser::new();
        stub.queue_eval("mutations", serde_json::json!(42));
        assert_eq!(mutation_burst(&stub).await.unwrap(), 42);
    }
}
