//! Resolution strategies and the escalation ladder.
//!
//! A [`Selector`] expands into an ordered list of rungs. The primary
//! strategy comes first; escalations follow: loosened CSS variants that
//! drop one class/attribute term at a time, attribute-loose forms for
//! form controls, and accessible-text matching for aria/role selectors.

use serde_json::json;

use crate::dsl::{Selector, Strategy};

/// One concrete attempt at locating an element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rung {
    Css(String),
    XPath(String),
    Text(String),
    Role { role: String, name: Option<String> },
    AriaLabel(String),
    TestId(String),
}

impl Rung {
    pub fn describe(&self) -> String {
        match self {
            Rung::Css(css) => format!("css={css}"),
            Rung::XPath(xpath) => format!("xpath={xpath}"),
            Rung::Text(text) => format!("text={text}"),
            Rung::Role { role, name: Some(name) } => format!("role={role}[name={name}]"),
            Rung::Role { role, name: None } => format!("role={role}"),
            Rung::AriaLabel(label) => format!("aria-label={label}"),
            Rung::TestId(id) => format!("testid={id}"),
        }
    }
}

/// Expand a non-index selector into its ladder.
pub fn ladder_for(selector: &Selector) -> Vec<Rung> {
    let mut rungs = Vec::new();
    match selector.strategy() {
        Strategy::Css(css) => {
            rungs.push(Rung::Css(css.clone()));
            for variant in loosen_css(css) {
                rungs.push(Rung::Css(variant));
            }
            if let Some(loose) = loose_input_form(css) {
                rungs.push(Rung::Css(loose));
            }
        }
        Strategy::XPath(xpath) => {
            rungs.push(Rung::XPath(xpath.clone()));
        }
        Strategy::Text(text) => {
            rungs.push(Rung::Text(text.clone()));
        }
        Strategy::Role { role, name } => {
            rungs.push(Rung::Role {
                role: role.clone(),
                name: name.clone(),
            });
            if let Some(name) = name {
                rungs.push(Rung::Text(name.clone()));
            }
        }
        Strategy::AriaLabel(label) => {
            rungs.push(Rung::AriaLabel(label.clone()));
            rungs.push(Rung::Text(label.clone()));
        }
        Strategy::TestId(id) => {
            rungs.push(Rung::TestId(id.clone()));
        }
        Strategy::Index(_) => {
            // Index selectors are resolved through the catalog, which
            // supplies concrete rungs; nothing to expand here.
        }
    }
    rungs.dedup();
    rungs
}

/// Generate looser variants of an overly specific compound CSS selector by
/// dropping one class or attribute term at a time. Only the final compound
/// is loosened; ancestor combinators are preserved.
pub fn loosen_css(css: &str) -> Vec<String> {
    let trimmed = css.trim();
    let split_at = trimmed
        .rfind(|c: char| c == ' ' || c == '>')
        .map(|i| i + 1)
        .unwrap_or(0);
    let (prefix, compound) = trimmed.split_at(split_at);

    let terms = split_compound(compound);
    let droppable: Vec<usize> = terms
        .iter()
        .enumerate()
        .filter(|(_, t)| t.starts_with('.') || t.starts_with('['))
        .map(|(i, _)| i)
        .collect();
    if droppable.len() < 2 {
        return Vec::new();
    }

    let mut variants = Vec::new();
    for drop in &droppable {
        let rebuilt: String = terms
            .iter()
            .enumerate()
            .filter(|(i, _)| i != drop)
            .map(|(_, t)| t.as_str())
            .collect();
        if !rebuilt.is_empty() {
            variants.push(format!("{prefix}{rebuilt}"));
        }
    }
    variants
}

fn split_compound(compound: &str) -> Vec<String> {
    let mut terms = Vec::new();
    let mut current = String::new();
    let mut in_brackets = false;
    for c in compound.chars() {
        match c {
            '[' => {
                if !current.is_empty() {
                    terms.push(std::mem::take(&mut current));
                }
                in_brackets = true;
                current.push(c);
            }
            ']' => {
                current.push(c);
                terms.push(std::mem::take(&mut current));
                in_brackets = false;
            }
            '.' | '#' | ':' if !in_brackets => {
                if !current.is_empty() {
                    terms.push(std::mem::take(&mut current));
                }
                current.push(c);
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        terms.push(current);
    }
    terms
}

/// Attribute-loose fallback for checkboxes, radios, and text inputs.
pub fn loose_input_form(css: &str) -> Option<String> {
    let lower = css.to_ascii_lowercase();
    if lower.contains("checkbox") {
        Some("input[type=checkbox]".to_string())
    } else if lower.contains("radio") {
        Some("input[type=radio]".to_string())
    } else if lower.contains("input") || lower.contains("textarea") {
        Some("input:not([type=hidden]), textarea".to_string())
    } else {
        None
    }
}

const CLICKABLE: &str = "a[href],button,input,select,textarea,[role],[onclick],[contenteditable=true]";

/// Script that locates candidates for a rung, applies the visibility
/// filter and tie-break (first in paint order with centre in viewport,
/// else first in document order), and tags the winner with `token`.
pub fn mark_script(rung: &Rung, token: &str) -> String {
    let args = json!({"rung": rung.describe(), "token": token});
    let candidates = candidate_js(rung);
    let token_js = serde_json::to_string(token).unwrap_or_default();
    format!(
        r#"/*pp:resolve*/ /*args:{args}*/ (() => {{
  const vw = window.innerWidth, vh = window.innerHeight;
  const visible = (el) => {{
    const st = getComputedStyle(el);
    if (st.visibility === 'hidden' || st.display === 'none') return false;
    if (parseFloat(st.opacity) === 0) return false;
    const r = el.getBoundingClientRect();
    return r.width > 0 && r.height > 0;
  }};
  let candidates;
  try {{
    candidates = ({candidates}).filter(el => el && el.nodeType === 1 && visible(el));
  }} catch (e) {{
    return {{ found: false, count: 0, error: String(e) }};
  }}
  if (candidates.length === 0) return {{ found: false, count: 0 }};
  const inViewport = candidates.filter(el => {{
    const r = el.getBoundingClientRect();
    const cx = r.left + r.width / 2, cy = r.top + r.height / 2;
    return cx >= 0 && cx < vw && cy >= 0 && cy < vh;
  }});
  const winner = inViewport.length > 0 ? inViewport[0] : candidates[0];
  for (const el of document.querySelectorAll('[data-pp-el]')) {{
    el.removeAttribute('data-pp-el');
  }}
  winner.setAttribute('data-pp-el', {token_js});
  return {{ found: true, count: candidates.length }};
}})()"#
    )
}

fn candidate_js(rung: &Rung) -> String {
    match rung {
        Rung::Css(css) => {
            let css = serde_json::to_string(css).unwrap_or_default();
            format!("Array.from(document.querySelectorAll({css}))")
        }
        Rung::XPath(xpath) => {
            let xpath = serde_json::to_string(xpath).unwrap_or_default();
            format!(
                r#"(() => {{
      const snap = document.evaluate({xpath}, document, null,
        XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
      const out = [];
      for (let i = 0; i < snap.snapshotLength; i++) out.push(snap.snapshotItem(i));
      return out;
    }})()"#
            )
        }
        Rung::Text(text) => {
            let text = serde_json::to_string(text).unwrap_or_default();
            format!(
                r#"(() => {{
      const needle = {text};
      const out = [];
      for (const el of document.querySelectorAll('*')) {{
        if (el.children.length > 0) continue;
        if (((el.innerText || el.value || '') + '').includes(needle)) {{
          out.push(el.closest('{CLICKABLE}') || el);
        }}
      }}
      return out;
    }})()"#
            )
        }
        Rung::Role { role, name } => {
            let implicit = match role.as_str() {
                "button" => ",button,input[type=button],input[type=submit]",
                "link" => ",a[href]",
                "checkbox" => ",input[type=checkbox]",
                "radio" => ",input[type=radio]",
                "textbox" => ",input:not([type=hidden]),textarea",
                _ => "",
            };
            let selector =
                serde_json::to_string(&format!("[role={role}]{implicit}")).unwrap_or_default();
            let name = serde_json::to_string(&name.clone().unwrap_or_default()).unwrap_or_default();
            format!(
                r#"(() => {{
      const name = {name};
      const accessible = (el) => (el.getAttribute('aria-label') || el.innerText ||
        el.value || '').trim();
      return Array.from(document.querySelectorAll({selector}))
        .filter(el => name === '' || accessible(el).includes(name));
    }})()"#
            )
        }
        Rung::AriaLabel(label) => {
            let selector = serde_json::to_string(&format!("[aria-label=\"{}\"]", label.replace('"', "\\\"")))
                .unwrap_or_default();
            format!("Array.from(document.querySelectorAll({selector}))")
        }
        Rung::TestId(id) => {
            let selector = serde_json::to_string(&format!("[data-testid=\"{}\"]", id.replace('"', "\\\"")))
                .unwrap_or_default();
            format!("Array.from(document.querySelectorAll({selector}))")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn css_ladder_includes_loosened_variants() {
        let sel = Selector::css("input.search.compact[data-kind=main]");
        let rungs = ladder_for(&sel);
        assert!(rungs.len() >= 4);
        assert_eq!(
            rungs[0],
            Rung::Css("input.search.compact[data-kind=main]".into())
        );
        assert!(rungs.contains(&Rung::Css("input.compact[data-kind=main]".into())));
        assert!(rungs.contains(&Rung::Css("input.search[data-kind=main]".into())));
        assert!(rungs.contains(&Rung::Css("input.search.compact".into())));
    }

    #[test]
    fn single_term_css_is_not_loosened() {
        assert!(loosen_css("#submit").is_empty());
        assert!(loosen_css("button.primary").is_empty());
    }

    #[test]
    fn ancestor_prefix_is_preserved() {
        let variants = loosen_css("form > input.a.b");
        assert!(variants.contains(&"form > input.b".to_string()));
        assert!(variants.contains(&"form > input.a".to_string()));
    }

    #[test]
    fn checkbox_gets_loose_form() {
        assert_eq!(
            loose_input_form("input.consent[type=checkbox]"),
            Some("input[type=checkbox]".to_string())
        );
        assert_eq!(loose_input_form("button.go"), None);
    }

    #[test]
    fn aria_label_falls_back_to_text() {
        let sel = Selector::parse("aria-label=Close dialog").unwrap();
        let rungs = ladder_for(&sel);
        assert_eq!(rungs[0], Rung::AriaLabel("Close dialog".into()));
        assert_eq!(rungs[1], Rung::Text("Close dialog".into()));
    }

    #[test]
    fn role_name_falls_back_to_text() {
        let sel = Selector::parse("role=button[name=Submit]").unwrap();
        let rungs = ladder_for(&sel);
        assert_eq!(rungs.len(), 2);
        assert_eq!(rungs[1], Rung::Text("Submit".into()));
    }

    #[test]
    fn mark_script_carries_marker_and_args() {
        let script = mark_script(&Rung::Css("#go".into()), "pp-1");
        assert!(script.starts_with("/*pp:resolve*/"));
        assert!(script.contains("\"rung\":\"css=#go\""));
        assert!(script.contains("data-pp-el"));
    }
}
