//! Wire normalization.
//!
//! The DSL accepts both a structured form (`{kind, target: {strategy,
//! value}}`) and a legacy flat form (`{action, target: "css=…", ms: …}`).
//! Normalization folds both into [`Action`] values, stripping unknown
//! fields with a DEBUG warning. Normalizing already-normalized input is
//! the identity.

use serde_json::Value;

use crate::errors::{AgentError, AgentResult};
use crate::warnings::{format_warning, Severity};

use super::action::{Action, ActionKind, ActionOptions, MouseButton, UntilCondition};
use super::selector::Selector;

/// Result of normalizing a wire plan.
#[derive(Clone, Debug, Default)]
pub struct NormalizedPlan {
    pub actions: Vec<Action>,
    pub warnings: Vec<String>,
}

const KNOWN_FIELDS: &[&str] = &[
    "kind", "action", "target", "value", "options", "ms", "clear", "button", "count", "force",
    "until", "key",
];

const OPTION_FIELDS: &[&str] = &["ms", "clear", "button", "count", "force", "until", "key"];

/// Normalize a wire plan (a JSON array of action objects).
pub fn normalize_plan(plan: &Value) -> AgentResult<NormalizedPlan> {
    let items = plan
        .as_array()
        .ok_or_else(|| AgentError::validation("plan must be a JSON array of actions"))?;

    let mut out = NormalizedPlan::default();
    for (position, item) in items.iter().enumerate() {
        let action = normalize_action(item, position, &mut out.warnings)?;
        out.actions.push(action);
    }
    Ok(out)
}

fn normalize_action(
    item: &Value,
    position: usize,
    warnings: &mut Vec<String>,
) -> AgentResult<Action> {
    let obj = item
        .as_object()
        .ok_or_else(|| AgentError::validation(format!("action #{position} is not an object")))?;

    let kind_str = obj
        .get("kind")
        .or_else(|| obj.get("action"))
        .and_then(Value::as_str)
        .ok_or_else(|| {
            AgentError::validation(format!("action #{position} is missing `kind`"))
        })?;
    let kind = parse_kind(kind_str)
        .ok_or_else(|| AgentError::validation(format!("unknown action kind: {kind_str}")))?;

    for field in obj.keys() {
        if !KNOWN_FIELDS.contains(&field.as_str()) {
            warnings.push(format_warning(
                Severity::Debug,
                "dsl",
                &format!("unknown field `{field}` ignored on action #{position}"),
            ));
        }
    }

    // `navigate` carries a URL in `target` on the wire, not a selector.
    if kind == ActionKind::Navigate {
        let url = match obj.get("target") {
            Some(Value::String(raw)) => Some(raw.clone()),
            _ => None,
        };
        let value = match obj.get("value") {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            _ => url,
        };
        let mut options = match obj.get("options") {
            Some(Value::Object(map)) => parse_options(map, position)?,
            _ => ActionOptions::default(),
        };
        merge_flat_options(obj, &mut options, position)?;
        return Ok(Action {
            kind,
            target: None,
            value,
            options,
        });
    }

    let target = match obj.get("target") {
        None | Some(Value::Null) => None,
        Some(Value::String(raw)) if raw.trim().is_empty() => None,
        Some(Value::String(raw)) => Some(Selector::parse(raw)?),
        Some(Value::Object(map)) => {
            let strategy = map
                .get("strategy")
                .and_then(Value::as_str)
                .ok_or_else(|| AgentError::validation("structured target missing `strategy`"))?;
            let value = match map.get("value") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => return Err(AgentError::validation("structured target missing `value`")),
            };
            Some(Selector::from_parts(strategy, &value)?)
        }
        Some(other) => {
            return Err(AgentError::validation(format!(
                "action #{position} has unsupported target: {other}"
            )))
        }
    };

    let value = match obj.get("value") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        Some(other) => {
            return Err(AgentError::validation(format!(
                "action #{position} has unsupported value: {other}"
            )))
        }
    };

    let mut options = match obj.get("options") {
        None | Some(Value::Null) => ActionOptions::default(),
        Some(Value::Object(map)) => {
            for field in map.keys() {
                if !OPTION_FIELDS.contains(&field.as_str()) {
                    warnings.push(format_warning(
                        Severity::Debug,
                        "dsl",
                        &format!("unknown option `{field}` ignored on action #{position}"),
                    ));
                }
            }
            parse_options(map, position)?
        }
        Some(other) => {
            return Err(AgentError::validation(format!(
                "action #{position} has non-object options: {other}"
            )))
        }
    };

    // Legacy flat form carries option fields at the top level.
    merge_flat_options(obj, &mut options, position)?;

    Ok(Action {
        kind,
        target,
        value,
        options,
    })
}

fn parse_kind(raw: &str) -> Option<ActionKind> {
    serde_json::from_value(Value::String(raw.to_string())).ok()
}

fn parse_options(
    map: &serde_json::Map<String, Value>,
    position: usize,
) -> AgentResult<ActionOptions> {
    let mut filtered = serde_json::Map::new();
    for (key, val) in map {
        if OPTION_FIELDS.contains(&key.as_str()) {
            filtered.insert(key.clone(), val.clone());
        }
    }
    serde_json::from_value(Value::Object(filtered))
        .map_err(|e| AgentError::validation(format!("action #{position} options: {e}")))
}

fn merge_flat_options(
    obj: &serde_json::Map<String, Value>,
    options: &mut ActionOptions,
    position: usize,
) -> AgentResult<()> {
    if let Some(ms) = obj.get("ms") {
        options.ms = Some(ms.as_u64().ok_or_else(|| {
            AgentError::validation(format!("action #{position}: `ms` must be an integer"))
        })?);
    }
    if let Some(clear) = obj.get("clear").and_then(Value::as_bool) {
        options.clear = clear;
    }
    if let Some(force) = obj.get("force").and_then(Value::as_bool) {
        options.force = force;
    }
    if let Some(count) = obj.get("count").and_then(Value::as_u64) {
        options.count = Some(count as u32);
    }
    if let Some(button) = obj.get("button").and_then(Value::as_str) {
        options.button = match button {
            "left" => MouseButton::Left,
            "right" => MouseButton::Right,
            "middle" => MouseButton::Middle,
            other => {
                return Err(AgentError::validation(format!(
                    "action #{position}: unknown button `{other}`"
                )))
            }
        };
    }
    if let Some(until) = obj.get("until").and_then(Value::as_str) {
        options.until = Some(parse_until(until, position)?);
    }
    if let Some(key) = obj.get("key").and_then(Value::as_str) {
        options.key = Some(key.to_string());
    }
    Ok(())
}

fn parse_until(raw: &str, position: usize) -> AgentResult<UntilCondition> {
    serde_json::from_value(Value::String(raw.to_string()))
        .map_err(|_| AgentError::validation(format!("action #{position}: unknown until `{raw}`")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn structured_and_flat_forms_agree() {
        let structured = json!([{
            "kind": "click",
            "target": {"strategy": "css", "value": "#submit"},
            "options": {"force": true}
        }]);
        let flat = json!([{
            "action": "click",
            "target": "css=#submit",
            "force": true
        }]);
        let a = normalize_plan(&structured).unwrap();
        let b = normalize_plan(&flat).unwrap();
        assert_eq!(a.actions, b.actions);
        assert!(a.actions[0].options.force);
    }

    #[test]
    fn normalization_is_idempotent() {
        let wire = json!([
            {"action": "navigate", "target": "https://example.com"},
            {"kind": "type", "target": "css=input.search", "value": "箱根", "clear": true},
            {"kind": "wait", "ms": 500, "until": "timeout"}
        ]);
        let once = normalize_plan(&wire).unwrap();
        let rewired = serde_json::to_value(&once.actions).unwrap();
        let twice = normalize_plan(&rewired).unwrap();
        assert_eq!(once.actions, twice.actions);
        assert!(twice.warnings.is_empty());
    }

    #[test]
    fn unknown_fields_warn_debug_and_are_dropped() {
        let wire = json!([{
            "kind": "click",
            "target": "#a",
            "wobble": 1,
            "options": {"ms": 100, "sparkle": true}
        }]);
        let plan = normalize_plan(&wire).unwrap();
        assert_eq!(plan.actions.len(), 1);
        assert_eq!(plan.warnings.len(), 2);
        assert!(plan.warnings[0].starts_with("DEBUG:dsl:unknown field `wobble`"));
        assert!(plan.warnings[1].starts_with("DEBUG:dsl:unknown option `sparkle`"));
        assert_eq!(plan.actions[0].options.ms, Some(100));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let wire = json!([{"kind": "teleport", "target": "#x"}]);
        let err = normalize_plan(&wire).unwrap_err();
        assert_eq!(err.kind, crate::errors::ErrorKind::ValidationError);
    }

    #[test]
    fn index_target_round_trips() {
        let wire = json!([{"kind": "click", "target": {"strategy": "index", "value": 4}}]);
        let plan = normalize_plan(&wire).unwrap();
        assert!(plan.actions[0].target.as_ref().unwrap().is_index());
    }
}
