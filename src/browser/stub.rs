//! In-memory stub implementation of [`BrowserPort`].
//!
//! Used by unit and contract tests, and by `serve --stub` for wiring
//! checks without a Chromium install. Scripts are recognized by their
//! `/*pp:<op>*/` marker and optional `/*args:<json>*/` payload; tests can
//! queue canned responses per marker and inject failures per port method.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::errors::{AgentError, AgentResult};

use super::ports::{BrowserPort, NavWait};

#[derive(Default)]
struct StubState {
    url: String,
    title: String,
    html: String,
    tabs: usize,
    input_values: HashMap<String, String>,
    failures: HashMap<String, VecDeque<AgentError>>,
    eval_queues: HashMap<String, VecDeque<Value>>,
    catalog_payload: Option<Value>,
    digest_payload: Option<Value>,
    autocomplete: Option<(String, String)>,
    pub nav_log: Vec<String>,
    pub clicks: Vec<String>,
    pub typed: Vec<(String, String)>,
    pub keys: Vec<String>,
    pub eval_ops: Vec<String>,
    pub recreates: usize,
}

pub struct StubBrowser {
    state: Mutex<StubState>,
}

impl Default for StubBrowser {
    fn default() -> Self {
        Self::new()
    }
}

impl StubBrowser {
    pub fn new() -> Self {
        let state = StubState {
            url: "about:blank".to_string(),
            title: "blank".to_string(),
            html: "<html><body></body></html>".to_string(),
            tabs: 1,
            ..StubState::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    /// Queue a failure for the next call of a port method
    /// (`navigate`, `click`, `type`, `press`, `hover`, `html`, `screenshot`).
    pub fn fail_next(&self, op: &str, err: AgentError) {
        self.state
            .lock()
            .failures
            .entry(op.to_string())
            .or_default()
            .push_back(err);
    }

    /// Queue a canned eval response for a `/*pp:<op>*/` marker.
    pub fn queue_eval(&self, op: &str, value: Value) {
        self.state
            .lock()
            .eval_queues
            .entry(op.to_string())
            .or_default()
            .push_back(value);
    }

    /// Replace the payload returned for catalog collection.
    pub fn set_catalog_payload(&self, payload: Value) {
        self.state.lock().catalog_payload = Some(payload);
    }

    /// Replace the payload returned for the structural digest probe.
    pub fn set_digest_payload(&self, payload: Value) {
        self.state.lock().digest_payload = Some(payload);
    }

    pub fn set_html(&self, html: impl Into<String>) {
        self.state.lock().html = html.into();
    }

    pub fn set_url(&self, url: impl Into<String>) {
        self.state.lock().url = url.into();
    }

    /// Arm a one-shot suggestion capture: after the next `type_chars` into
    /// `css`, the field value is replaced with `wrong`.
    pub fn arm_autocomplete(&self, css: &str, wrong: &str) {
        self.state.lock().autocomplete = Some((css.to_string(), wrong.to_string()));
    }

    pub fn clicks(&self) -> Vec<String> {
        self.state.lock().clicks.clone()
    }

    pub fn typed(&self) -> Vec<(String, String)> {
        self.state.lock().typed.clone()
    }

    pub fn nav_log(&self) -> Vec<String> {
        self.state.lock().nav_log.clone()
    }

    pub fn recreates(&self) -> usize {
        self.state.lock().recreates
    }

    pub fn field_value(&self, css: &str) -> String {
        self.state
            .lock()
            .input_values
            .get(css)
            .cloned()
            .unwrap_or_default()
    }

    fn take_failure(&self, op: &str) -> Option<AgentError> {
        self.state
            .lock()
            .failures
            .get_mut(op)
            .and_then(VecDeque::pop_front)
    }

    fn default_eval(&self, op: &str, args: &Value) -> Value {
        let mut state = self.state.lock();
        match op {
            "catalog" => state
                .catalog_payload
                .clone()
                .unwrap_or_else(default_catalog_payload),
            "digest" => state.digest_payload.clone().unwrap_or_else(|| {
                // Derive from the catalog payload so build and digest agree,
                // the way the real collection script guarantees.
                let catalog = state
                    .catalog_payload
                    .clone()
                    .unwrap_or_else(default_catalog_payload);
                let tokens: Vec<Value> = catalog["nodes"]
                    .as_array()
                    .map(|nodes| nodes.iter().map(|n| n["token"].clone()).collect())
                    .unwrap_or_default();
                json!({
                    "url": catalog["url"],
                    "tokens": tokens,
                    "viewport": catalog["viewport"],
                })
            }),
            "resolve" => json!({"found": true, "token": "stub-0", "count": 1}),
            "ready" => json!({
                "found": true,
                "visible": true,
                "enabled": true,
                "readonly": false,
                "bbox": [10.0, 10.0, 100.0, 20.0],
            }),
            "value" => {
                let css = args["css"].as_str().unwrap_or_default();
                Value::String(state.input_values.get(css).cloned().unwrap_or_default())
            }
            "clear" => {
                if let Some(css) = args["css"].as_str() {
                    state.input_values.insert(css.to_string(), String::new());
                }
                Value::Bool(true)
            }
            "fill" => {
                if let (Some(css), Some(text)) = (args["css"].as_str(), args["text"].as_str()) {
                    state.input_values.insert(css.to_string(), text.to_string());
                }
                Value::Bool(true)
            }
            "health" => json!({"ready_state": "complete", "navigating": false}),
            "mutations" => json!(0),
            "quiet" | "domready" | "netidle" | "jsclick" | "forceclick" | "dispatchclick"
            | "dispatchhover" | "dispatchkey" | "select" | "selectopen" | "frame" | "scroll"
            | "popup" | "blank" | "history" | "stop" => Value::Bool(true),
            "scrolltext" => Value::Bool(true),
            "extract" => Value::String(
                state
                    .html
                    .replace(|c| c == '<' || c == '>', " ")
                    .trim()
                    .to_string(),
            ),
            _ => Value::Null,
        }
    }
}

/// Parse `/*pp:<op>*/` and the optional `/*args:<json>*/` payload.
pub fn parse_script_marker(script: &str) -> (String, Value) {
    let op = script
        .split("/*pp:")
        .nth(1)
        .and_then(|rest| rest.split("*/").next())
        .unwrap_or("")
        .trim()
        .to_string();
    let args = script
        .split("/*args:")
        .nth(1)
        .and_then(|rest| rest.split("*/").next())
        .and_then(|raw| serde_json::from_str(raw.trim()).ok())
        .unwrap_or(Value::Null);
    (op, args)
}

#[async_trait]
impl BrowserPort for StubBrowser {
    async fn navigate(&self, url: &str, _wait: NavWait, _timeout: Duration) -> AgentResult<()> {
        if let Some(err) = self.take_failure("navigate") {
            return Err(err);
        }
        let mut state = self.state.lock();
        state.url = url.to_string();
        state.nav_log.push(url.to_string());
        Ok(())
    }

    async fn back(&self) -> AgentResult<()> {
        self.state.lock().nav_log.push("<back>".to_string());
        Ok(())
    }

    async fn forward(&self) -> AgentResult<()> {
        self.state.lock().nav_log.push("<forward>".to_string());
        Ok(())
    }

    async fn current_url(&self) -> AgentResult<String> {
        Ok(self.state.lock().url.clone())
    }

    async fn title(&self) -> AgentResult<String> {
        Ok(self.state.lock().title.clone())
    }

    async fn html(&self) -> AgentResult<String> {
        if let Some(err) = self.take_failure("html") {
            return Err(err);
        }
        Ok(self.state.lock().html.clone())
    }

    async fn screenshot_png(&self) -> AgentResult<Vec<u8>> {
        if let Some(err) = self.take_failure("screenshot") {
            return Err(err);
        }
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    async fn eval(&self, script: &str) -> AgentResult<Value> {
        let (op, args) = parse_script_marker(script);
        if let Some(err) = self.take_failure(&format!("eval:{op}")) {
            return Err(err);
        }
        self.state.lock().eval_ops.push(op.clone());
        let queued = self
            .state
            .lock()
            .eval_queues
            .get_mut(&op)
            .and_then(VecDeque::pop_front);
        Ok(queued.unwrap_or_else(|| self.default_eval(&op, &args)))
    }

    async fn click_css(&self, css: &str) -> AgentResult<()> {
        if let Some(err) = self.take_failure("click") {
            return Err(err);
        }
        self.state.lock().clicks.push(css.to_string());
        Ok(())
    }

    async fn focus_css(&self, _css: &str) -> AgentResult<()> {
        if let Some(err) = self.take_failure("focus") {
            return Err(err);
        }
        Ok(())
    }

    async fn type_chars(&self, css: &str, text: &str, _delay: Duration) -> AgentResult<()> {
        if let Some(err) = self.take_failure("type") {
            return Err(err);
        }
        let mut state = self.state.lock();
        let entry = state.input_values.entry(css.to_string()).or_default();
        entry.push_str(text);
        state.typed.push((css.to_string(), text.to_string()));
        if let Some((armed_css, wrong)) = state.autocomplete.clone() {
            if armed_css == css {
                state.input_values.insert(css.to_string(), wrong);
                state.autocomplete = None;
            }
        }
        Ok(())
    }

    async fn press_key(&self, _css: Option<&str>, key: &str) -> AgentResult<()> {
        if let Some(err) = self.take_failure("press") {
            return Err(err);
        }
        self.state.lock().keys.push(key.to_string());
        Ok(())
    }

    async fn hover_css(&self, css: &str) -> AgentResult<()> {
        if let Some(err) = self.take_failure("hover") {
            return Err(err);
        }
        self.state.lock().clicks.push(format!("hover:{css}"));
        Ok(())
    }

    async fn tab_count(&self) -> AgentResult<usize> {
        Ok(self.state.lock().tabs)
    }

    async fn switch_tab(&self, index: usize) -> AgentResult<()> {
        let tabs = self.state.lock().tabs;
        if index >= tabs {
            return Err(AgentError::element_not_found(format!(
                "no tab at index {index}"
            )));
        }
        Ok(())
    }

    async fn recreate(&self) -> AgentResult<()> {
        let mut state = self.state.lock();
        state.recreates += 1;
        state.url = "about:blank".to_string();
        Ok(())
    }
}

fn default_catalog_payload() -> Value {
    json!({
        "url": "about:blank",
        "viewport": [1280, 900],
        "nodes": [
            {
                "tag": "a",
                "role": "link",
                "label": "Home",
                "text": "Home",
                "bbox": [10.0, 10.0, 60.0, 18.0],
                "container": "nav",
                "attrs": {"href": "/", "id": "home-link"},
                "state": {"disabled": false, "selected": false, "expanded": false, "visible": true},
                "near": "Home",
                "css": "a#home-link",
                "xpath": "/html/body/nav/a[1]",
                "token": "a|link|home-link|0"
            },
            {
                "tag": "button",
                "role": "button",
                "label": "Search",
                "text": "Search",
                "bbox": [10.0, 40.0, 80.0, 24.0],
                "container": "form",
                "attrs": {"type": "submit"},
                "state": {"disabled": false, "selected": false, "expanded": false, "visible": true},
                "near": "Search the site",
                "css": "form > button",
                "xpath": "/html/body/form/button[1]",
                "token": "button|button||1"
            }
        ]
    })
}
