//! Plan execution.
//!
//! Runs a validated plan action by action under the browser lock: health
//! check at entry, per-action adaptive policy, retry loop with
//! exponential backoff, warning accumulation per attempt, post-action
//! stabilization, navigation detection, and catalog rebuilds. A failed
//! action never aborts the plan; the planner sees the warnings and
//! replans.

use std::sync::Arc;

use base64::Engine;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::artifacts::{RunRecorder, StepEvent};
use crate::browser::{BrowserPort, BrowserSupervisor, NavWait};
use crate::catalog::{self, CatalogService};
use crate::config::Config;
use crate::dsl::{
    check_navigate_url, normalize_plan, validate_plan, Action, ActionKind, MouseButton,
    UntilCondition,
};
use crate::errors::{AgentError, AgentResult, ErrorKind};
use crate::metrics;
use crate::poll::{self, PollSettings};
use crate::resolver::SelectorResolver;
use crate::warnings::WarningSink;

use super::ladders;
use super::observation::{ExecError, ExecResult, Observation};
use super::policy::{policy_for, ActionPolicy, Backoff, StabilizeKind};
use super::stabilize::{self, MUTATION_BURST_THRESHOLD};

/// Outcome of one successfully executed action.
#[derive(Default)]
struct ActionOutcome {
    is_done: bool,
    nav_hint: bool,
    extracted: Option<String>,
    png: Option<Vec<u8>>,
    resolved: Option<String>,
}

pub struct DslExecutor {
    supervisor: Arc<BrowserSupervisor>,
    resolver: SelectorResolver,
    catalog: Arc<CatalogService>,
    config: Arc<Config>,
}

impl DslExecutor {
    pub fn new(
        supervisor: Arc<BrowserSupervisor>,
        catalog: Arc<CatalogService>,
        config: Arc<Config>,
    ) -> Self {
        let resolver = SelectorResolver::new(supervisor.port(), catalog.clone(), config.clone());
        Self {
            supervisor,
            resolver,
            catalog,
            config,
        }
    }

    pub fn catalog(&self) -> Arc<CatalogService> {
        self.catalog.clone()
    }

    /// Normalize, validate, and execute a wire plan. Validation failures
    /// come back as a failed result, never as an error.
    pub async fn execute_wire(
        &self,
        plan: &Value,
        expected_catalog_version: Option<String>,
        cancel: CancellationToken,
    ) -> ExecResult {
        let mut warnings = WarningSink::new();
        let normalized = match normalize_plan(plan) {
            Ok(normalized) => normalized,
            Err(err) => {
                warnings.error("auto", &err.detail);
                return ExecResult::failure(err.kind, err.detail, warnings.into_vec());
            }
        };
        warnings.extend(normalized.warnings);
        let validated = match validate_plan(normalized.actions, &self.config) {
            Ok(validated) => validated,
            Err(err) => {
                warnings.error("auto", &err.detail);
                return ExecResult::failure(err.kind, err.detail, warnings.into_vec());
            }
        };
        warnings.extend(validated.warnings);
        self.run(validated.actions, warnings, expected_catalog_version, cancel)
            .await
    }

    /// Execute an already-validated plan.
    pub async fn execute(
        &self,
        actions: Vec<Action>,
        expected_catalog_version: Option<String>,
        cancel: CancellationToken,
    ) -> ExecResult {
        self.run(actions, WarningSink::new(), expected_catalog_version, cancel)
            .await
    }

    #[instrument(skip_all, fields(actions = actions.len()))]
    async fn run(
        &self,
        actions: Vec<Action>,
        mut warnings: WarningSink,
        expected_catalog_version: Option<String>,
        cancel: CancellationToken,
    ) -> ExecResult {
        let port = self.supervisor.port();
        let total = actions.len();

        if let Some(expected) = &expected_catalog_version {
            match catalog::current_version(port.as_ref()).await {
                Ok(live) if &live != expected => {
                    let message = format!(
                        "catalog version {expected} no longer matches the page ({live})"
                    );
                    warnings.error("auto", &message);
                    let mut result =
                        ExecResult::failure(ErrorKind::CatalogOutdated, message, warnings.into_vec());
                    result.observation = self.observe(port.as_ref()).await;
                    return result;
                }
                Ok(_) => {}
                Err(err) => {
                    warnings.warn("auto", &format!("catalog version unverifiable: {}", err.detail));
                }
            }
        }

        if actions.is_empty() {
            return ExecResult {
                success: true,
                warnings: warnings.into_vec(),
                observation: self.observe(port.as_ref()).await,
                is_done: false,
                html: port.html().await.unwrap_or_default(),
                screenshot: None,
                extracted: None,
                error: None,
            };
        }

        let _browser_guard = self.supervisor.lock().await;
        if self.config.use_fresh_context {
            if let Err(err) = self.supervisor.recreate_preserving_url("fresh-context").await {
                warnings.warn("auto", &format!("fresh context unavailable: {}", err.detail));
            }
        }
        if let Err(err) = self.supervisor.ensure_healthy().await {
            warnings.error("auto", &format!("browser unhealthy: {}", err.detail));
            let mut result =
                ExecResult::failure(ErrorKind::BrowserUnhealthy, err.detail, warnings.into_vec());
            result.observation = self.observe(port.as_ref()).await;
            return result;
        }

        // Index targets resolve against the current catalog; build one on
        // demand at entry if none exists yet.
        if self.config.index_mode
            && self.catalog.snapshot().is_none()
            && actions.iter().any(|a| {
                a.target
                    .as_ref()
                    .map_or(false, crate::dsl::Selector::is_index)
            })
        {
            if let Err(err) = self.catalog.rebuild(port.as_ref()).await {
                warnings.debug("auto", &format!("entry catalog build failed: {}", err.detail));
            }
        }

        let recorder = self.open_recorder(&mut warnings);
        let backoff = Backoff::default();
        let mut nav_detected = false;
        let mut is_done = false;
        let mut cancelled = false;
        let mut screenshot_out = None;
        let mut extracted_out = None;

        for (step, action) in actions.iter().enumerate() {
            if cancel.is_cancelled() {
                warnings.warn("auto", &format!("plan cancelled after action {step}/{total}"));
                cancelled = true;
                break;
            }

            let policy = policy_for(action.kind, &action.options, &self.config);
            let url_before = port.current_url().await.unwrap_or_default();
            let fingerprint_before = catalog::structural_fingerprint(port.as_ref()).await.ok();
            let warnings_before = warnings.len();
            let max_attempts = policy.retries.max(1);
            let mut errors = 0u32;
            let mut outcome = None;

            // Small grace over the action timeout: the bound inside each
            // browser call is the real limit, this wrapper is the backstop.
            let attempt_timeout = policy.timeout + std::time::Duration::from_millis(250);
            for attempt in 1..=max_attempts {
                let attempt_result = match tokio::time::timeout(
                    attempt_timeout,
                    self.perform(port.as_ref(), action, &policy, &mut warnings),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(AgentError::timeout(
                        action.kind.as_str(),
                        policy.timeout.as_millis() as u64,
                    )),
                };

                match attempt_result {
                    Ok(out) => {
                        if attempt > 1 {
                            warnings.info("auto", &format!("succeeded on attempt {attempt}"));
                        }
                        outcome = Some(out);
                        break;
                    }
                    Err(err) => {
                        errors += 1;
                        warnings.attempt_failure(attempt, max_attempts, &err);
                        if attempt > 1 {
                            metrics::ACTION_RETRIES_TOTAL
                                .with_label_values(&[action.kind.as_str()])
                                .inc();
                        }
                        let retryable = err.is_retryable();
                        if !retryable || attempt == max_attempts {
                            break;
                        }
                        let delay = backoff.delay(attempt);
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                }
            }

            match outcome {
                Some(out) => {
                    metrics::ACTIONS_TOTAL
                        .with_label_values(&[action.kind.as_str(), "ok"])
                        .inc();
                    self.stabilize_after(port.as_ref(), &policy).await;

                    let url_after = port.current_url().await.unwrap_or_default();
                    let fingerprint_after =
                        catalog::structural_fingerprint(port.as_ref()).await.ok();
                    let mut action_nav = out.nav_hint || url_before != url_after;
                    if let (Some(before), Some(after)) = (&fingerprint_before, &fingerprint_after) {
                        if before != after {
                            action_nav = true;
                        }
                    }
                    if !action_nav {
                        if let Ok(burst) = stabilize::mutation_burst(port.as_ref()).await {
                            if burst > MUTATION_BURST_THRESHOLD {
                                debug!(burst, "mutation burst; treating as structural change");
                                action_nav = true;
                            }
                        }
                    }
                    if action_nav {
                        nav_detected = true;
                        self.catalog.invalidate();
                        if let Err(err) = self.catalog.rebuild(port.as_ref()).await {
                            warnings
                                .debug("auto", &format!("catalog rebuild failed: {}", err.detail));
                        }
                    }

                    let shot_path = out.png.as_ref().and_then(|png| {
                        recorder
                            .as_ref()
                            .and_then(|rec| rec.save_screenshot(step, png).ok())
                    });
                    if let Some(png) = &out.png {
                        screenshot_out =
                            Some(base64::engine::general_purpose::STANDARD.encode(png));
                    }
                    if out.extracted.is_some() {
                        extracted_out = out.extracted.clone();
                    }
                    self.record_step(
                        &recorder,
                        step,
                        action,
                        out.resolved.clone(),
                        shot_path.map(|p| p.display().to_string()),
                        &warnings.as_slice()[warnings_before..],
                        None,
                    );

                    if out.is_done {
                        is_done = true;
                        break;
                    }
                    if let Err(err) = self.supervisor.note_action_completed().await {
                        warnings.warn("auto", &format!("context refresh failed: {}", err.detail));
                    }
                }
                None => {
                    if cancel.is_cancelled() && errors < max_attempts {
                        warnings.warn(
                            "auto",
                            &format!("plan cancelled after action {step}/{total}"),
                        );
                        cancelled = true;
                        self.record_step(
                            &recorder,
                            step,
                            action,
                            None,
                            None,
                            &warnings.as_slice()[warnings_before..],
                            Some("CANCELLED".to_string()),
                        );
                        break;
                    }
                    metrics::ACTIONS_TOTAL
                        .with_label_values(&[action.kind.as_str(), "failed"])
                        .inc();
                    warnings.all_attempts_failed(max_attempts, errors);
                    self.record_step(
                        &recorder,
                        step,
                        action,
                        None,
                        None,
                        &warnings.as_slice()[warnings_before..],
                        Some(format!("{errors} failed attempts")),
                    );
                }
            }
        }

        let observation = Observation {
            nav_detected,
            ..self.observe(port.as_ref()).await
        };
        let html = port.html().await.unwrap_or_default();
        let error = cancelled.then(|| ExecError {
            code: ErrorKind::Cancelled,
            message: "plan cancelled".to_string(),
        });

        ExecResult {
            success: !cancelled,
            warnings: warnings.into_vec(),
            observation,
            is_done,
            html,
            screenshot: screenshot_out,
            extracted: extracted_out,
            error,
        }
    }

    async fn observe(&self, port: &dyn BrowserPort) -> Observation {
        Observation {
            url: port.current_url().await.unwrap_or_default(),
            title: port.title().await.unwrap_or_default(),
            catalog_version: self.catalog.snapshot().map(|c| c.version.clone()),
            nav_detected: false,
        }
    }

    fn open_recorder(&self, warnings: &mut WarningSink) -> Option<Arc<RunRecorder>> {
        if !self.config.save_debug_artifacts {
            return None;
        }
        match RunRecorder::create(&self.config.debug_dir) {
            Ok(recorder) => Some(Arc::new(recorder)),
            Err(err) => {
                warnings.debug("auto", &format!("run artifacts disabled: {err}"));
                None
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn record_step(
        &self,
        recorder: &Option<Arc<RunRecorder>>,
        step: usize,
        action: &Action,
        resolved: Option<String>,
        screenshot: Option<String>,
        warnings: &[String],
        error: Option<String>,
    ) {
        if let Some(recorder) = recorder {
            let event = StepEvent {
                step,
                timestamp: chrono::Utc::now(),
                kind: action.kind.as_str().to_string(),
                resolved_selector: resolved,
                screenshot,
                warnings: warnings.to_vec(),
                error,
            };
            if let Err(err) = recorder.record_event(&event) {
                warn!(%err, "failed to append run event");
            }
        }
    }

    async fn stabilize_after(&self, port: &dyn BrowserPort, policy: &ActionPolicy) {
        let spa = self.config.spa_stabilize_ms;
        let result = match policy.stabilize {
            StabilizeKind::None => Ok(true),
            StabilizeKind::DomQuiescent(quiet) => {
                stabilize::dom_quiescent(port, quiet, spa.max(quiet * 4)).await
            }
            StabilizeKind::Click => stabilize::dom_quiescent(port, 200, spa).await,
            StabilizeKind::Navigation => {
                let _ = stabilize::network_idle(port, 500, 5_000).await;
                stabilize::dom_quiescent(port, 500, spa.max(2_000)).await
            }
        };
        if let Err(err) = result {
            debug!(%err, "stabilization probe failed");
        }
    }

    async fn perform(
        &self,
        port: &dyn BrowserPort,
        action: &Action,
        policy: &ActionPolicy,
        warnings: &mut WarningSink,
    ) -> AgentResult<ActionOutcome> {
        let locator_timeout = self.config.locator_timeout().min(policy.timeout);
        match action.kind {
            ActionKind::Navigate => {
                let url = check_navigate_url(action.value.as_deref())?;
                if let Some(host) = url.host_str() {
                    if !self.config.domain_allowed(host) {
                        return Err(AgentError::blocked(format!(
                            "domain {host} is outside the allowed set"
                        )));
                    }
                }
                let wait = match action.options.until {
                    Some(UntilCondition::Domcontentloaded) => NavWait::DomContentLoaded,
                    Some(UntilCondition::Networkidle) => NavWait::NetworkIdle,
                    _ => NavWait::Load,
                };
                port.navigate(url.as_str(), wait, policy.timeout).await?;
                let redirects = port
                    .eval(
                        r#"/*pp:redirects*/ (() => {
  const nav = performance.getEntriesByType('navigation');
  return nav.length > 0 ? nav[0].redirectCount : 0;
})()"#,
                    )
                    .await
                    .ok()
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0);
                if redirects > u64::from(self.config.max_redirects) {
                    return Err(AgentError::blocked(format!(
                        "navigation followed {redirects} redirects (limit {})",
                        self.config.max_redirects
                    )));
                }
                Ok(ActionOutcome {
                    nav_hint: true,
                    ..ActionOutcome::default()
                })
            }
            ActionKind::Click => {
                let target = require_target(action)?;
                let resolved = self.resolver.resolve(target, locator_timeout).await?;
                let count = action.options.count.unwrap_or(1).max(1);
                let mut method = "click";
                for _ in 0..count {
                    method = match action.options.button {
                        MouseButton::Left => {
                            ladders::click_with_fallbacks(
                                port,
                                &resolved.css,
                                action.options.force,
                            )
                            .await?
                        }
                        other => {
                            self.dispatch_button_click(port, &resolved.css, other).await?;
                            "dispatch-button"
                        }
                    };
                }
                Ok(ActionOutcome {
                    resolved: Some(format!("{} via {method}", resolved.strategy)),
                    ..ActionOutcome::default()
                })
            }
            ActionKind::Type => {
                let target = require_target(action)?;
                let text = require_value(action)?;
                let resolved = self.resolver.resolve(target, locator_timeout).await?;
                let typed = ladders::type_with_verification(
                    port,
                    &resolved.css,
                    text,
                    action.options.clear,
                )
                .await?;
                if typed.reentered {
                    warnings.info("auto", "suggestion captured the input; field value restored");
                }
                Ok(ActionOutcome {
                    resolved: Some(resolved.strategy),
                    ..ActionOutcome::default()
                })
            }
            ActionKind::Select => {
                let target = require_target(action)?;
                let option = require_value(action)?;
                let resolved = self.resolver.resolve(target, locator_timeout).await?;
                let method = ladders::select_with_fallbacks(port, &resolved.css, option).await?;
                Ok(ActionOutcome {
                    resolved: Some(format!("{} via {method}", resolved.strategy)),
                    ..ActionOutcome::default()
                })
            }
            ActionKind::PressKey => {
                let key = action
                    .options
                    .key
                    .as_deref()
                    .or(action.value.as_deref())
                    .ok_or_else(|| AgentError::validation("press_key requires a key"))?;
                let css = match &action.target {
                    Some(target) => {
                        Some(self.resolver.resolve(target, locator_timeout).await?.css)
                    }
                    None => None,
                };
                ladders::press_key_with_fallbacks(port, css.as_deref(), key).await?;
                Ok(ActionOutcome::default())
            }
            ActionKind::Hover => {
                let target = require_target(action)?;
                let resolved = self.resolver.resolve(target, locator_timeout).await?;
                ladders::hover_with_fallbacks(port, &resolved.css).await?;
                Ok(ActionOutcome {
                    resolved: Some(resolved.strategy),
                    ..ActionOutcome::default()
                })
            }
            ActionKind::Wait => self.perform_wait(port, action, policy).await,
            ActionKind::Scroll => {
                let delta = scroll_script(action.value.as_deref());
                port.eval(&delta).await?;
                Ok(ActionOutcome::default())
            }
            ActionKind::ScrollToText => {
                let needle = require_value(action)?;
                let args = json!({ "text": needle }).to_string();
                let needle_js = serde_json::to_string(needle).unwrap_or_default();
                let script = format!(
                    r#"/*pp:scrolltext*/ /*args:{args}*/ (() => {{
  const needle = {needle_js};
  for (const el of document.querySelectorAll('*')) {{
    if (el.children.length > 0) continue;
    if (((el.innerText || '') + '').includes(needle)) {{
      el.scrollIntoView({{ block: 'center' }});
      return true;
    }}
  }}
  return false;
}})()"#
                );
                if port.eval(&script).await?.as_bool() != Some(true) {
                    return Err(AgentError::element_not_found(format!(
                        "no node containing {needle:?}"
                    )));
                }
                // Scrolling changes what is visible; the catalog follows.
                self.catalog.invalidate();
                let _ = self.catalog.rebuild(port).await;
                Ok(ActionOutcome::default())
            }
            ActionKind::SwitchTab => {
                let index = action
                    .value
                    .as_deref()
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .ok_or_else(|| {
                        AgentError::validation("switch_tab requires a numeric value")
                    })?;
                port.switch_tab(index).await?;
                Ok(ActionOutcome {
                    nav_hint: true,
                    ..ActionOutcome::default()
                })
            }
            ActionKind::FocusIframe => {
                let target = require_target(action)?;
                let resolved = self.resolver.resolve(target, locator_timeout).await?;
                let (args, css_js) = frame_args(&resolved.css);
                let script = format!(
                    r#"/*pp:frame*/ /*args:{args}*/ (() => {{
  const el = document.querySelector({css_js});
  if (!el) return false;
  el.scrollIntoView({{ block: 'center' }});
  el.focus();
  return true;
}})()"#
                );
                if port.eval(&script).await?.as_bool() != Some(true) {
                    return Err(AgentError::element_not_found("iframe vanished"));
                }
                warnings.info(
                    "auto",
                    "iframe focused; same-origin content stays addressable from the parent document",
                );
                Ok(ActionOutcome::default())
            }
            ActionKind::Screenshot => {
                let png = port.screenshot_png().await?;
                Ok(ActionOutcome {
                    png: Some(png),
                    ..ActionOutcome::default()
                })
            }
            ActionKind::Extract => {
                let css = match &action.target {
                    Some(target) => self.resolver.resolve(target, locator_timeout).await?.css,
                    None => "body".to_string(),
                };
                let (args, css_js) = frame_args(&css);
                let script = format!(
                    r#"/*pp:extract*/ /*args:{args}*/ (() => {{
  const el = document.querySelector({css_js});
  return el ? ((el.innerText || el.textContent || '') + '').trim() : '';
}})()"#
                );
                let text = port
                    .eval(&script)
                    .await?
                    .as_str()
                    .unwrap_or_default()
                    .to_string();
                let is_done = action
                    .value
                    .as_deref()
                    .map_or(false, |needle| !needle.is_empty() && text.contains(needle));
                Ok(ActionOutcome {
                    is_done,
                    extracted: Some(text),
                    ..ActionOutcome::default()
                })
            }
            ActionKind::Assert => {
                let target = require_target(action)?;
                let resolved = self.resolver.resolve(target, locator_timeout).await?;
                if let Some(expected) = action.value.as_deref().filter(|v| !v.is_empty()) {
                    let (args, css_js) = frame_args(&resolved.css);
                    let script = format!(
                        r#"/*pp:extract*/ /*args:{args}*/ (() => {{
  const el = document.querySelector({css_js});
  return el ? ((el.innerText || el.value || '') + '').trim() : '';
}})()"#
                    );
                    let text = port
                        .eval(&script)
                        .await?
                        .as_str()
                        .unwrap_or_default()
                        .to_string();
                    if !text.contains(expected) {
                        return Err(AgentError::unknown(format!(
                            "assertion failed: {expected:?} not in element text"
                        )));
                    }
                }
                Ok(ActionOutcome::default())
            }
            ActionKind::RefreshCatalog => {
                let rebuilt = self.catalog.rebuild(port).await?;
                debug!(version = %rebuilt.version, entries = rebuilt.len(), "catalog refreshed");
                Ok(ActionOutcome::default())
            }
            ActionKind::EvalJs => {
                let script = require_value(action)?;
                let value = port
                    .eval(script)
                    .await
                    .map_err(|e| AgentError::eval(e.detail))?;
                Ok(ActionOutcome {
                    extracted: Some(value.to_string()),
                    ..ActionOutcome::default()
                })
            }
            ActionKind::GoBack => {
                port.back().await?;
                Ok(ActionOutcome {
                    nav_hint: true,
                    ..ActionOutcome::default()
                })
            }
            ActionKind::GoForward => {
                port.forward().await?;
                Ok(ActionOutcome {
                    nav_hint: true,
                    ..ActionOutcome::default()
                })
            }
            ActionKind::ClosePopup => {
                let script = r#"/*pp:popup*/ (() => {
  const candidates = document.querySelectorAll(
    '[aria-label=Close], [aria-label=close], .modal-close, .close, [data-dismiss]');
  for (const el of candidates) {
    const r = el.getBoundingClientRect();
    if (r.width > 0 && r.height > 0) { el.click(); return true; }
  }
  return false;
})()"#;
                let closed = port.eval(script).await?.as_bool() == Some(true);
                if !closed {
                    let _ = ladders::press_key_with_fallbacks(port, None, "Escape").await;
                }
                Ok(ActionOutcome::default())
            }
            ActionKind::ClickBlankArea => {
                let script = r#"/*pp:blank*/ (() => {
  const el = document.elementFromPoint(5, 5) || document.body;
  el.click();
  return true;
})()"#;
                port.eval(script).await?;
                Ok(ActionOutcome::default())
            }
        }
    }

    async fn perform_wait(
        &self,
        port: &dyn BrowserPort,
        action: &Action,
        policy: &ActionPolicy,
    ) -> AgentResult<ActionOutcome> {
        let timeout_ms = policy.timeout.as_millis() as u64;
        match action.options.until {
            None | Some(UntilCondition::Timeout) => {
                tokio::time::sleep(policy.timeout).await;
            }
            Some(UntilCondition::Load) | Some(UntilCondition::Domcontentloaded) => {
                stabilize::dom_quiescent(port, 200, timeout_ms).await?;
            }
            Some(UntilCondition::Networkidle) => {
                stabilize::network_idle(port, 500, timeout_ms).await?;
            }
            Some(UntilCondition::Selector) => {
                let target = require_target(action)?;
                let wait_ms = action
                    .options
                    .ms
                    .ok_or_else(|| AgentError::validation("wait until=selector requires ms"))?;
                let settings = PollSettings::readiness(std::time::Duration::from_millis(wait_ms));
                let found = poll::poll_until(settings, || async {
                    match self
                        .resolver
                        .exists(target, std::time::Duration::from_millis(500))
                        .await
                    {
                        Ok(true) => Some(()),
                        _ => None,
                    }
                })
                .await;
                if found.is_none() {
                    return Err(AgentError::timeout("wait_for_selector", wait_ms));
                }
            }
        }
        Ok(ActionOutcome::default())
    }

    async fn dispatch_button_click(
        &self,
        port: &dyn BrowserPort,
        css: &str,
        button: MouseButton,
    ) -> AgentResult<()> {
        let button_code = match button {
            MouseButton::Left => 0,
            MouseButton::Middle => 1,
            MouseButton::Right => 2,
        };
        let args = json!({ "css": css, "button": button_code }).to_string();
        let css_js = serde_json::to_string(css).unwrap_or_default();
        let script = format!(
            r#"/*pp:dispatchclick*/ /*args:{args}*/ (() => {{
  const el = document.querySelector({css_js});
  if (!el) return false;
  const r = el.getBoundingClientRect();
  const opts = {{
    bubbles: true, cancelable: true, view: window, button: {button_code},
    clientX: r.left + r.width / 2, clientY: r.top + r.height / 2,
  }};
  el.dispatchEvent(new MouseEvent('mousedown', opts));
  el.dispatchEvent(new MouseEvent('mouseup', opts));
  el.dispatchEvent(new MouseEvent({button_code} === 2 ? 'contextmenu' : 'click', opts));
  return true;
}})()"#
        );
        match port.eval(&script).await? {
            v if v.as_bool() == Some(true) => Ok(()),
            _ => Err(AgentError::element_not_found("element vanished before click")),
        }
    }
}

fn require_target(action: &Action) -> AgentResult<&crate::dsl::Selector> {
    action.target.as_ref().ok_or_else(|| {
        AgentError::validation(format!("{} requires a target", action.kind.as_str()))
    })
}

fn require_value(action: &Action) -> AgentResult<&str> {
    action.value.as_deref().ok_or_else(|| {
        AgentError::validation(format!("{} requires a value", action.kind.as_str()))
    })
}

fn frame_args(css: &str) -> (String, String) {
    let args = json!({ "css": css }).to_string();
    let css_js = serde_json::to_string(css).unwrap_or_default();
    (args, css_js)
}

fn scroll_script(value: Option<&str>) -> String {
    let body = match value.map(str::trim) {
        Some("up") => "window.scrollBy(0, -window.innerHeight * 0.8)".to_string(),
        Some("top") => "window.scrollTo(0, 0)".to_string(),
        Some("bottom") => "window.scrollTo(0, document.body.scrollHeight)".to_string(),
        Some(raw) => match raw.parse::<i64>() {
            Ok(pixels) => format!("window.scrollBy(0, {pixels})"),
            Err(_) => "window.scrollBy(0, window.innerHeight * 0.8)".to_string(),
        },
        None => "window.scrollBy(0, window.innerHeight * 0.8)".to_string(),
    };
    format!("/*pp:scroll*/ {body}")
}
