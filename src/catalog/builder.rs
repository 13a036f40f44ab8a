//! Catalog construction.
//!
//! One injected script enumerates the interactable surface; the Rust side
//! generates the selector ladder per entry and computes the version
//! digest. The digest probe is a lighter script over the same filter so
//! build and staleness checks agree.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::debug;

use crate::browser::BrowserPort;
use crate::dsl::Selector;
use crate::errors::{AgentError, AgentResult};

use super::model::{BBox, Catalog, CatalogEntry, EntryState, Section};
use super::version;

/// Full enumeration: candidates by composite criterion, visibility and
/// paint-order filters, decorative-child merging, (y, x) sort.
const COLLECT_JS: &str = r#"/*pp:catalog*/ (() => {
  const vw = window.innerWidth, vh = window.innerHeight;
  const CLICKABLE = 'a[href],button,input:not([type=hidden]),textarea,select,' +
    '[role=button],[role=link],[role=checkbox],[role=radio],[role=tab],' +
    '[role=menuitem],[role=option],[role=textbox],[contenteditable=true],[onclick]';
  const FORM_TAGS = ['input', 'select', 'textarea'];
  const visible = (el) => {
    const st = getComputedStyle(el);
    if (st.visibility === 'hidden' || st.display === 'none') return false;
    if (parseFloat(st.opacity) === 0) return false;
    const r = el.getBoundingClientRect();
    return r.width > 0 && r.height > 0;
  };
  const topMost = (el) => {
    const r = el.getBoundingClientRect();
    const cx = Math.min(Math.max(r.left + r.width / 2, 0), vw - 1);
    const cy = Math.min(Math.max(r.top + r.height / 2, 0), vh - 1);
    if (cy < 0 || cy >= vh) return true; // off-screen: no hit test possible
    const hit = document.elementFromPoint(cx, cy);
    return hit === null || el === hit || el.contains(hit) || hit.contains(el);
  };
  const implicitRole = (el) => {
    const tag = el.tagName.toLowerCase();
    if (tag === 'a' && el.hasAttribute('href')) return 'link';
    if (tag === 'button') return 'button';
    if (tag === 'select') return 'listbox';
    if (tag === 'textarea') return 'textbox';
    if (tag === 'input') {
      const t = (el.getAttribute('type') || 'text').toLowerCase();
      if (t === 'checkbox' || t === 'radio' || t === 'button' || t === 'submit') {
        return t === 'submit' ? 'button' : t;
      }
      return 'textbox';
    }
    return '';
  };
  const labelFor = (el) => {
    const aria = el.getAttribute('aria-label');
    if (aria) return aria.trim();
    if (el.labels && el.labels.length > 0) return el.labels[0].innerText.trim();
    const text = (el.innerText || '').trim();
    if (text) return text.slice(0, 80);
    return (el.getAttribute('placeholder') || el.getAttribute('name') ||
            el.getAttribute('title') || '').trim();
  };
  const cssPath = (el) => {
    const parts = [];
    let node = el;
    while (node && node.nodeType === 1 && node !== document.documentElement) {
      const tag = node.tagName.toLowerCase();
      let nth = 1, sib = node;
      while ((sib = sib.previousElementSibling)) {
        if (sib.tagName === node.tagName) nth += 1;
      }
      parts.unshift(tag + ':nth-of-type(' + nth + ')');
      node = node.parentElement;
    }
    return parts.length ? parts.join(' > ') : el.tagName.toLowerCase();
  };
  const xPath = (el) => {
    const parts = [];
    let node = el;
    while (node && node.nodeType === 1) {
      let nth = 1, sib = node;
      while ((sib = sib.previousElementSibling)) {
        if (sib.tagName === node.tagName) nth += 1;
      }
      parts.unshift(node.tagName.toLowerCase() + '[' + nth + ']');
      node = node.parentElement;
    }
    return '/' + parts.join('/');
  };
  const siblingIndex = (el) => {
    let nth = 0, sib = el;
    while ((sib = sib.previousElementSibling)) nth += 1;
    return nth;
  };
  const nodes = [];
  for (const el of document.querySelectorAll(CLICKABLE)) {
    if (!visible(el) || !topMost(el)) continue;
    const tag = el.tagName.toLowerCase();
    // Merge decorative children into their interactive parent; keep
    // independent form controls.
    const parent = el.parentElement && el.parentElement.closest(CLICKABLE);
    if (parent && !FORM_TAGS.includes(tag)) continue;
    const r = el.getBoundingClientRect();
    const attrs = {};
    for (const name of ['id', 'name', 'type', 'href', 'data-testid',
                        'aria-label', 'placeholder', 'title', 'value']) {
      const v = el.getAttribute(name);
      if (v !== null) attrs[name] = v;
    }
    const near = el.parentElement
      ? (el.parentElement.innerText || '').trim().replace(/\s+/g, ' ').slice(0, 80)
      : '';
    const role = el.getAttribute('role') || implicitRole(el);
    nodes.push({
      tag,
      role,
      label: labelFor(el),
      text: ((el.innerText || el.value || '') + '').trim().slice(0, 120),
      bbox: [r.left, r.top, r.width, r.height],
      container: el.closest('nav,header') ? 'nav'
        : (el.closest('form') ? 'form' : 'other'),
      attrs,
      state: {
        disabled: !!el.disabled || el.getAttribute('aria-disabled') === 'true',
        selected: !!el.checked || !!el.selected ||
          el.getAttribute('aria-selected') === 'true',
        expanded: el.getAttribute('aria-expanded') === 'true',
        visible: true,
      },
      near,
      css: cssPath(el),
      xpath: xPath(el),
      token: tag + '|' + role + '|' + (attrs.id || attrs.name || '') + '|' + siblingIndex(el),
    });
  }
  nodes.sort((a, b) => (a.bbox[1] - b.bbox[1]) || (a.bbox[0] - b.bbox[0]));
  return { url: location.href, viewport: [vw, vh], nodes };
})()"#;

/// Structure-only probe over the same filter, for staleness checks.
const DIGEST_JS: &str = r#"/*pp:digest*/ (() => {
  const CLICKABLE = 'a[href],button,input:not([type=hidden]),textarea,select,' +
    '[role=button],[role=link],[role=checkbox],[role=radio],[role=tab],' +
    '[role=menuitem],[role=option],[role=textbox],[contenteditable=true],[onclick]';
  const FORM_TAGS = ['input', 'select', 'textarea'];
  const tokens = [];
  for (const el of document.querySelectorAll(CLICKABLE)) {
    const st = getComputedStyle(el);
    if (st.visibility === 'hidden' || st.display === 'none') continue;
    if (parseFloat(st.opacity) === 0) continue;
    const r = el.getBoundingClientRect();
    if (r.width === 0 || r.height === 0) continue;
    const tag = el.tagName.toLowerCase();
    const parent = el.parentElement && el.parentElement.closest(CLICKABLE);
    if (parent && !FORM_TAGS.includes(tag)) continue;
    let nth = 0, sib = el;
    while ((sib = sib.previousElementSibling)) nth += 1;
    const role = el.getAttribute('role') || '';
    const key = el.getAttribute('id') || el.getAttribute('name') || '';
    tokens.push(tag + '|' + role + '|' + key + '|' + nth);
  }
  return { url: location.href, tokens, viewport: [window.innerWidth, window.innerHeight] };
})()"#;

#[derive(Debug, Deserialize)]
struct RawPayload {
    url: String,
    viewport: [u32; 2],
    nodes: Vec<RawNode>,
}

#[derive(Debug, Deserialize)]
struct RawNode {
    tag: String,
    #[serde(default)]
    role: String,
    #[serde(default)]
    label: String,
    #[serde(default)]
    text: String,
    bbox: [f64; 4],
    #[serde(default)]
    container: String,
    #[serde(default)]
    attrs: HashMap<String, String>,
    #[serde(default)]
    state: RawState,
    #[serde(default)]
    near: String,
    css: String,
    xpath: String,
    token: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawState {
    #[serde(default)]
    disabled: bool,
    #[serde(default)]
    selected: bool,
    #[serde(default)]
    expanded: bool,
    #[serde(default)]
    visible: bool,
}

#[derive(Debug, Deserialize)]
struct RawDigest {
    url: String,
    tokens: Vec<String>,
    viewport: [u32; 2],
}

/// Build a fresh catalog from the live page.
pub async fn build_catalog(port: &dyn BrowserPort) -> AgentResult<Catalog> {
    let value = port.eval(COLLECT_JS).await?;
    let payload: RawPayload = serde_json::from_value(value)
        .map_err(|e| AgentError::unknown(format!("catalog payload: {e}")))?;

    let tokens: Vec<String> = payload.nodes.iter().map(|n| n.token.clone()).collect();
    let version = version::version_digest(
        &payload.url,
        &tokens,
        (payload.viewport[0], payload.viewport[1]),
    );

    let mut entries = Vec::with_capacity(payload.nodes.len());
    for (index, node) in payload.nodes.into_iter().enumerate() {
        entries.push(entry_from_node(index, node));
    }
    debug!(entries = entries.len(), %version, "catalog built");

    Ok(Catalog {
        version,
        url: payload.url,
        viewport: (payload.viewport[0], payload.viewport[1]),
        entries,
    })
}

/// Version of the page as it stands now, without building entries.
pub async fn current_version(port: &dyn BrowserPort) -> AgentResult<String> {
    let digest = read_digest(port).await?;
    Ok(version::version_digest(
        &digest.url,
        &digest.tokens,
        (digest.viewport[0], digest.viewport[1]),
    ))
}

/// Structure-only fingerprint for `nav_detected` deltas.
pub async fn structural_fingerprint(port: &dyn BrowserPort) -> AgentResult<String> {
    let digest = read_digest(port).await?;
    Ok(version::structural_digest(&digest.tokens))
}

async fn read_digest(port: &dyn BrowserPort) -> AgentResult<RawDigest> {
    let value = port.eval(DIGEST_JS).await?;
    serde_json::from_value(value).map_err(|e| AgentError::unknown(format!("digest payload: {e}")))
}

fn entry_from_node(index: usize, node: RawNode) -> CatalogEntry {
    let selectors = selector_ladder(&node);
    let (primary, fallbacks) = match selectors.split_first() {
        Some((first, rest)) => (first.clone(), rest.iter().take(4).cloned().collect()),
        None => (Selector::css(node.css.clone()), Vec::new()),
    };

    let section = match (node.container.as_str(), node.tag.as_str()) {
        ("nav", _) => Section::Nav,
        ("form", _) | (_, "input") | (_, "select") | (_, "textarea") => Section::Form,
        _ if node.role == "button" || node.role == "link" => Section::Action,
        _ => Section::Content,
    };

    CatalogEntry {
        index,
        role: node.role,
        label: node.label,
        tag: node.tag,
        section,
        primary,
        fallbacks,
        bbox: BBox {
            x: node.bbox[0],
            y: node.bbox[1],
            w: node.bbox[2],
            h: node.bbox[3],
        },
        state: EntryState {
            disabled: node.state.disabled,
            selected: node.state.selected,
            expanded: node.state.expanded,
            visible: node.state.visible,
        },
        near_text: node.near,
    }
}

/// Selector priority: id → testid → role+name → aria-label → text →
/// nth-of-type CSS → absolute XPath.
fn selector_ladder(node: &RawNode) -> Vec<Selector> {
    let mut ladder = Vec::new();
    if let Some(id) = node.attrs.get("id").filter(|v| !v.is_empty()) {
        ladder.push(Selector::css(format!("[id=\"{}\"]", escape_quotes(id))));
    }
    if let Some(testid) = node.attrs.get("data-testid").filter(|v| !v.is_empty()) {
        if let Ok(sel) = Selector::from_parts("testid", testid) {
            ladder.push(sel);
        }
    }
    if !node.role.is_empty() && !node.label.is_empty() {
        let raw = format!("role={}[name={}]", node.role, node.label);
        if let Ok(sel) = Selector::parse(&raw) {
            ladder.push(sel);
        }
    }
    if let Some(aria) = node.attrs.get("aria-label").filter(|v| !v.is_empty()) {
        if let Ok(sel) = Selector::from_parts("aria-label", aria) {
            ladder.push(sel);
        }
    }
    if !node.text.is_empty() && node.text.chars().count() <= 60 {
        if let Ok(sel) = Selector::from_parts("text", &node.text) {
            ladder.push(sel);
        }
    }
    if !node.css.is_empty() {
        ladder.push(Selector::css(node.css.clone()));
    }
    if !node.xpath.is_empty() {
        if let Ok(sel) = Selector::from_parts("xpath", &node.xpath) {
            ladder.push(sel);
        }
    }
    ladder
}

fn escape_quotes(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::StubBrowser;
    use crate::dsl::Strategy;

    #[tokio::test]
    async fn builds_entries_with_selector_ladders() {
        let stub = StubBrowser::new();
        let catalog = build_catalog(&stub).await.unwrap();
        assert_eq!(catalog.len(), 2);

        let link = catalog.entry(0).unwrap();
        assert_eq!(link.tag, "a");
        assert_eq!(link.section, Section::Nav);
        // id wins the ladder.
        assert!(matches!(link.primary.strategy(), Strategy::Css(css) if css.contains("home-link")));
        assert!(!link.fallbacks.is_empty());

        let button = catalog.entry(1).unwrap();
        assert_eq!(button.section, Section::Form);
        // No id or testid: role+name leads.
        assert!(matches!(
            button.primary.strategy(),
            Strategy::Role { role, name: Some(name) } if role == "button" && name == "Search"
        ));
    }

    #[tokio::test]
    async fn build_and_digest_versions_agree() {
        let stub = StubBrowser::new();
        let catalog = build_catalog(&stub).await.unwrap();
        let probed = current_version(&stub).await.unwrap();
        assert_eq!(catalog.version, probed);
    }

    #[tokio::test]
    async fn rebuilding_without_changes_is_stable() {
        let stub = StubBrowser::new();
        let a = build_catalog(&stub).await.unwrap();
        let b = build_catalog(&stub).await.unwrap();
        assert_eq!(a.version, b.version);
    }
}
