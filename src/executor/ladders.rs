//! Interaction fallback ladders.
//!
//! When the element is located but the primary interaction fails, each
//! action kind walks its own ladder of progressively blunter techniques.
//! Every rung failure is recorded by the caller; the ladder itself only
//! reports the final outcome and which rung landed.

use std::time::Duration;

use serde_json::json;
use tracing::debug;

use crate::browser::BrowserPort;
use crate::errors::{AgentError, AgentResult};

use super::stabilize;

const TYPE_KEY_INTERVAL: Duration = Duration::from_millis(20);

fn css_args(css: &str) -> (String, String) {
    let args = json!({ "css": css }).to_string();
    let css_js = serde_json::to_string(css).unwrap_or_default();
    (args, css_js)
}

/// Click ladder: trusted click → force (scroll into view + click) →
/// JavaScript `click()` → synthetic mousedown/mouseup at the centre.
pub async fn click_with_fallbacks(
    port: &dyn BrowserPort,
    css: &str,
    force: bool,
) -> AgentResult<&'static str> {
    let mut last_err = None;

    if !force {
        match port.click_css(css).await {
            Ok(()) => return Ok("click"),
            Err(err) => {
                debug!(%err, "trusted click failed; escalating");
                last_err = Some(err);
            }
        }
    }

    let (args, css_js) = css_args(css);
    let force_script = format!(
        r#"/*pp:forceclick*/ /*args:{args}*/ (() => {{
  const el = document.querySelector({css_js});
  if (!el) return false;
  el.scrollIntoView({{ block: 'center', inline: 'center' }});
  el.click();
  return true;
}})()"#
    );
    match port.eval(&force_script).await {
        Ok(v) if v.as_bool() == Some(true) => return Ok("force-click"),
        Ok(_) => {}
        Err(err) => last_err = Some(err),
    }

    let js_script = format!(
        r#"/*pp:jsclick*/ /*args:{args}*/ (() => {{
  const el = document.querySelector({css_js});
  if (!el) return false;
  el.click();
  return true;
}})()"#
    );
    match port.eval(&js_script).await {
        Ok(v) if v.as_bool() == Some(true) => return Ok("js-click"),
        Ok(_) => {}
        Err(err) => last_err = Some(err),
    }

    let dispatch_script = format!(
        r#"/*pp:dispatchclick*/ /*args:{args}*/ (() => {{
  const el = document.querySelector({css_js});
  if (!el) return false;
  const r = el.getBoundingClientRect();
  const opts = {{
    bubbles: true, cancelable: true, view: window,
    clientX: r.left + r.width / 2, clientY: r.top + r.height / 2,
  }};
  el.dispatchEvent(new MouseEvent('mousedown', opts));
  el.dispatchEvent(new MouseEvent('mouseup', opts));
  el.dispatchEvent(new MouseEvent('click', opts));
  return true;
}})()"#
    );
    match port.eval(&dispatch_script).await {
        Ok(v) if v.as_bool() == Some(true) => Ok("dispatch-click"),
        Ok(_) => Err(last_err
            .unwrap_or_else(|| AgentError::element_not_found("element vanished mid-ladder"))),
        Err(err) => Err(last_err.unwrap_or(err)),
    }
}

/// Outcome of a verified type.
#[derive(Clone, Debug, Default)]
pub struct TypedOutcome {
    pub final_value: String,
    /// A suggestion menu captured the input and the field was restored.
    pub reentered: bool,
}

/// Autocomplete-safe typing: focus → clear → let suggestions settle →
/// key-by-key → verify → restore-and-retype once → JS fill as last rung.
pub async fn type_with_verification(
    port: &dyn BrowserPort,
    css: &str,
    text: &str,
    clear: bool,
) -> AgentResult<TypedOutcome> {
    port.focus_css(css).await?;

    if clear {
        clear_field(port, css).await?;
        // Let any async suggestion menu settle before typing.
        stabilize::dom_quiescent(port, 100, 1_000).await?;
    }

    port.type_chars(css, text, TYPE_KEY_INTERVAL).await?;
    let mut value = read_value(port, css).await?;
    if value == text {
        return Ok(TypedOutcome {
            final_value: value,
            reentered: false,
        });
    }

    // A suggestion auto-replaced the value; restore and retype once.
    debug!(intended = text, got = %value, "typed value mismatch; re-entering");
    clear_field(port, css).await?;
    stabilize::dom_quiescent(port, 100, 1_000).await?;
    port.type_chars(css, text, TYPE_KEY_INTERVAL).await?;
    value = read_value(port, css).await?;
    if value == text {
        return Ok(TypedOutcome {
            final_value: value,
            reentered: true,
        });
    }

    // Last rung: set the value directly and fire the input events.
    fill_field(port, css, text).await?;
    value = read_value(port, css).await?;
    if value == text {
        return Ok(TypedOutcome {
            final_value: value,
            reentered: true,
        });
    }
    Err(AgentError::not_interactable(format!(
        "field value is {value:?} after typing {text:?}"
    )))
}

async fn clear_field(port: &dyn BrowserPort, css: &str) -> AgentResult<()> {
    let (args, css_js) = css_args(css);
    let script = format!(
        r#"/*pp:clear*/ /*args:{args}*/ (() => {{
  const el = document.querySelector({css_js});
  if (!el) return false;
  el.value = '';
  el.dispatchEvent(new Event('input', {{ bubbles: true }}));
  return true;
}})()"#
    );
    port.eval(&script).await?;
    Ok(())
}

async fn read_value(port: &dyn BrowserPort, css: &str) -> AgentResult<String> {
    let (args, css_js) = css_args(css);
    let script = format!(
        r#"/*pp:value*/ /*args:{args}*/ (() => {{
  const el = document.querySelector({css_js});
  return el ? String(el.value ?? '') : '';
}})()"#
    );
    Ok(port
        .eval(&script)
        .await?
        .as_str()
        .unwrap_or_default()
        .to_string())
}

async fn fill_field(port: &dyn BrowserPort, css: &str, text: &str) -> AgentResult<()> {
    let args = json!({ "css": css, "text": text }).to_string();
    let css_js = serde_json::to_string(css).unwrap_or_default();
    let text_js = serde_json::to_string(text).unwrap_or_default();
    let script = format!(
        r#"/*pp:fill*/ /*args:{args}*/ (() => {{
  const el = document.querySelector({css_js});
  if (!el) return false;
  el.value = {text_js};
  el.dispatchEvent(new Event('input', {{ bubbles: true }}));
  el.dispatchEvent(new Event('change', {{ bubbles: true }}));
  return true;
}})()"#
    );
    port.eval(&script).await?;
    Ok(())
}

/// Hover ladder: trusted hover → synthetic mouseover/mouseenter/mousemove
/// at the element centre.
pub async fn hover_with_fallbacks(port: &dyn BrowserPort, css: &str) -> AgentResult<&'static str> {
    match port.hover_css(css).await {
        Ok(()) => return Ok("hover"),
        Err(err) => debug!(%err, "trusted hover failed; dispatching events"),
    }
    let (args, css_js) = css_args(css);
    let script = format!(
        r#"/*pp:dispatchhover*/ /*args:{args}*/ (() => {{
  const el = document.querySelector({css_js});
  if (!el) return false;
  const r = el.getBoundingClientRect();
  const opts = {{
    bubbles: true, cancelable: true, view: window,
    clientX: r.left + r.width / 2, clientY: r.top + r.height / 2,
  }};
  el.dispatchEvent(new MouseEvent('mouseover', opts));
  el.dispatchEvent(new MouseEvent('mouseenter', opts));
  el.dispatchEvent(new MouseEvent('mousemove', opts));
  return true;
}})()"#
    );
    match port.eval(&script).await? {
        v if v.as_bool() == Some(true) => Ok("dispatch-hover"),
        _ => Err(AgentError::not_interactable("hover ladder exhausted")),
    }
}

/// Select ladder: by value → by label → option index by text, confirmed by
/// a change event; open-and-click as the final rung.
pub async fn select_with_fallbacks(
    port: &dyn BrowserPort,
    css: &str,
    option: &str,
) -> AgentResult<&'static str> {
    let args = json!({ "css": css, "option": option }).to_string();
    let css_js = serde_json::to_string(css).unwrap_or_default();
    let option_js = serde_json::to_string(option).unwrap_or_default();
    let script = format!(
        r#"/*pp:select*/ /*args:{args}*/ (() => {{
  const el = document.querySelector({css_js});
  if (!el || el.tagName.toLowerCase() !== 'select') return false;
  const wanted = {option_js};
  const options = Array.from(el.options);
  let hit = options.findIndex(o => o.value === wanted);
  if (hit < 0) hit = options.findIndex(o => o.label.trim() === wanted.trim());
  if (hit < 0) hit = options.findIndex(o => o.text.trim().includes(wanted.trim()));
  if (hit < 0) return false;
  el.selectedIndex = hit;
  el.dispatchEvent(new Event('input', {{ bubbles: true }}));
  el.dispatchEvent(new Event('change', {{ bubbles: true }}));
  return true;
}})()"#
    );
    if port.eval(&script).await?.as_bool() == Some(true) {
        return Ok("select");
    }

    // Custom dropdown: open it and click the option by its text.
    port.click_css(css).await?;
    stabilize::dom_quiescent(port, 100, 1_000).await?;
    let open_script = format!(
        r#"/*pp:selectopen*/ /*args:{args}*/ (() => {{
  const wanted = {option_js};
  for (const el of document.querySelectorAll('[role=option], li, [role=menuitem]')) {{
    if (((el.innerText || '') + '').trim().includes(wanted.trim())) {{
      el.click();
      return true;
    }}
  }}
  return false;
}})()"#
    );
    match port.eval(&open_script).await? {
        v if v.as_bool() == Some(true) => Ok("open-click"),
        _ => Err(AgentError::not_interactable(format!(
            "no option matching {option:?}"
        ))),
    }
}

/// Key-press ladder: focused element → page level → synthetic
/// KeyboardEvent with the mapped key.
pub async fn press_key_with_fallbacks(
    port: &dyn BrowserPort,
    css: Option<&str>,
    key: &str,
) -> AgentResult<&'static str> {
    match port.press_key(css, key).await {
        Ok(()) => return Ok("press"),
        Err(err) => debug!(%err, "element key press failed; trying page level"),
    }
    if css.is_some() {
        if port.press_key(None, key).await.is_ok() {
            return Ok("press-page");
        }
    }
    let args = json!({ "key": key }).to_string();
    let key_js = serde_json::to_string(key).unwrap_or_default();
    let script = format!(
        r#"/*pp:dispatchkey*/ /*args:{args}*/ (() => {{
  const target = document.activeElement || document.body;
  const opts = {{ key: {key_js}, bubbles: true, cancelable: true }};
  target.dispatchEvent(new KeyboardEvent('keydown', opts));
  target.dispatchEvent(new KeyboardEvent('keyup', opts));
  return true;
}})()"#
    );
    match port.eval(&script).await? {
        v if v.as_bool() == Some(true) => Ok("dispatch-key"),
        _ => Err(AgentError::not_interactable("key press ladder exhausted")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::StubBrowser;
    use crate::errors::AgentError;

    #[tokio::test]
    async fn click_ladder_escalates_past_primary_failure() {
        let stub = StubBrowser::new();
        stub.fail_next("click", AgentError::timeout("click", 100));
        let method = click_with_fallbacks(&stub, "#go", false).await.unwrap();
        assert_eq!(method, "force-click");
    }

    #[tokio::test]
    async fn force_starts_past_trusted_click() {
        let stub = StubBrowser::new();
        let method = click_with_fallbacks(&stub, "#go", true).await.unwrap();
        assert_eq!(method, "force-click");
        assert!(stub.clicks().is_empty());
    }

    #[tokio::test]
    async fn clean_type_is_not_reentered() {
        let stub = StubBrowser::new();
        let out = type_with_verification(&stub, "#q", "hello", true)
            .await
            .unwrap();
        assert_eq!(out.final_value, "hello");
        assert!(!out.reentered);
    }

    #[tokio::test]
    async fn suggestion_capture_is_restored() {
        let stub = StubBrowser::new();
        stub.arm_autocomplete("#q", "長野");
        let out = type_with_verification(&stub, "#q", "箱根", true)
            .await
            .unwrap();
        assert_eq!(out.final_value, "箱根");
        assert!(out.reentered);
        assert_eq!(stub.field_value("#q"), "箱根");
    }

    #[tokio::test]
    async fn select_falls_back_to_open_click() {
        let stub = StubBrowser::new();
        stub.queue_eval("select", serde_json::json!(false));
        let method = select_with_fallbacks(&stub, "#country", "Japan")
            .await
            .unwrap();
        assert_eq!(method, "open-click");
        assert_eq!(stub.clicks(), vec!["#country".to_string()]);
    }

    #[tokio::test]
    async fn press_key_escalates_to_dispatch() {
        let stub = StubBrowser::new();
        stub.fail_next("press", AgentError::not_interactable("detached"));
        stub.fail_next("press", AgentError::not_interactable("detached"));
        let method = press_key_with_fallbacks(&stub, Some("#q"), "Enter")
            .await
            .unwrap();
        assert_eq!(method, "dispatch-key");
    }
}
