//! Plan validation.
//!
//! Checks run before any browser traffic: well-formedness of each action,
//! plan-size bounds, and chunk truncation. Violations are
//! `VALIDATION_ERROR`; oversized-but-valid plans are truncated to the
//! first chunk with a DEBUG warning so the planner can replan.

use url::Url;

use crate::config::Config;
use crate::errors::{AgentError, AgentResult};
use crate::warnings::{format_warning, Severity};

use super::action::{Action, ActionKind, UntilCondition};

/// A plan that passed validation, possibly truncated to `max_chunk`.
#[derive(Clone, Debug)]
pub struct ValidatedPlan {
    pub actions: Vec<Action>,
    pub warnings: Vec<String>,
}

pub fn validate_plan(actions: Vec<Action>, config: &Config) -> AgentResult<ValidatedPlan> {
    if actions.len() > config.max_plan {
        return Err(AgentError::validation(format!(
            "plan has {} actions; maximum is {}",
            actions.len(),
            config.max_plan
        )));
    }

    for (position, action) in actions.iter().enumerate() {
        validate_action(action, position)?;
    }

    let mut warnings = Vec::new();
    let actions = if actions.len() > config.max_chunk {
        warnings.push(format_warning(
            Severity::Debug,
            "auto",
            &format!(
                "plan truncated to first {} of {} actions; replan for the remainder",
                config.max_chunk,
                actions.len()
            ),
        ));
        actions.into_iter().take(config.max_chunk).collect()
    } else {
        actions
    };

    Ok(ValidatedPlan { actions, warnings })
}

fn validate_action(action: &Action, position: usize) -> AgentResult<()> {
    if action.kind.requires_target() && action.target.is_none() {
        return Err(AgentError::validation(format!(
            "action #{position} ({}) requires a target",
            action.kind.as_str()
        )));
    }

    match action.kind {
        ActionKind::Type | ActionKind::Select => {
            if action.value.is_none() {
                return Err(AgentError::validation(format!(
                    "action #{position} ({}) requires a value",
                    action.kind.as_str()
                )));
            }
        }
        ActionKind::Wait => {
            if action.options.until == Some(UntilCondition::Selector)
                && (action.target.is_none() || action.options.ms.is_none())
            {
                return Err(AgentError::validation(format!(
                    "action #{position}: wait until=selector requires both target and ms"
                )));
            }
        }
        ActionKind::ScrollToText => {
            if action.value.as_deref().map_or(true, str::is_empty) {
                return Err(AgentError::validation(format!(
                    "action #{position}: scroll_to_text requires a non-empty value"
                )));
            }
        }
        ActionKind::EvalJs => {
            if action.value.as_deref().map_or(true, str::is_empty) {
                return Err(AgentError::validation(format!(
                    "action #{position}: eval_js requires a script in value"
                )));
            }
        }
        _ => {}
    }
    Ok(())
}

/// Syntactic URL check for `navigate`. Runs inside the attempt loop so a
/// bad URL yields the per-attempt `invalid or empty URL` warnings rather
/// than a validation abort.
pub fn check_navigate_url(raw: Option<&str>) -> AgentResult<Url> {
    let raw = raw.map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Err(AgentError::navigation("invalid or empty URL"));
    }
    let url = Url::parse(raw).map_err(|_| AgentError::navigation("invalid or empty URL"))?;
    if !matches!(url.scheme(), "http" | "https" | "about") {
        return Err(AgentError::navigation("invalid or empty URL"));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::selector::Selector;

    fn cfg() -> Config {
        Config::default()
    }

    #[test]
    fn element_actions_need_targets() {
        let plan = vec![Action::new(ActionKind::Click)];
        let err = validate_plan(plan, &cfg()).unwrap_err();
        assert!(err.detail.contains("requires a target"));
    }

    #[test]
    fn wait_for_selector_needs_target_and_ms() {
        let mut wait = Action::new(ActionKind::Wait);
        wait.options.until = Some(UntilCondition::Selector);
        assert!(validate_plan(vec![wait.clone()], &cfg()).is_err());

        wait.target = Some(Selector::css("#spinner"));
        wait.options.ms = Some(2_000);
        assert!(validate_plan(vec![wait], &cfg()).is_ok());
    }

    #[test]
    fn oversized_plan_is_rejected() {
        let plan: Vec<Action> = (0..51).map(|_| Action::new(ActionKind::Screenshot)).collect();
        assert!(validate_plan(plan, &cfg()).is_err());
    }

    #[test]
    fn long_plan_is_truncated_with_debug_warning() {
        let plan: Vec<Action> = (0..14).map(|_| Action::new(ActionKind::Screenshot)).collect();
        let validated = validate_plan(plan, &cfg()).unwrap();
        assert_eq!(validated.actions.len(), 10);
        assert_eq!(validated.warnings.len(), 1);
        assert!(validated.warnings[0].starts_with("DEBUG:auto:plan truncated"));
    }

    #[test]
    fn navigate_url_syntax() {
        assert!(check_navigate_url(Some("https://example.com/a?b=1")).is_ok());
        assert!(check_navigate_url(Some("")).is_err());
        assert!(check_navigate_url(None).is_err());
        assert!(check_navigate_url(Some("notaurl")).is_err());
        assert!(check_navigate_url(Some("ftp://example.com")).is_err());
        let err = check_navigate_url(Some("")).unwrap_err();
        assert_eq!(err.detail, "invalid or empty URL");
        assert_eq!(err.kind, crate::errors::ErrorKind::NavigationFailed);
    }
}
