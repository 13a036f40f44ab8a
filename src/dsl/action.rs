//! The action DSL.
//!
//! A plan is an ordered list of [`Action`]s. Actions are tagged records
//! with no hidden state across calls; unknown kinds are rejected at
//! validation, unknown option fields are dropped with a DEBUG warning
//! during normalization.

use serde::{Deserialize, Serialize};

use super::selector::Selector;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Navigate,
    Click,
    Type,
    Select,
    PressKey,
    Hover,
    Wait,
    Scroll,
    SwitchTab,
    FocusIframe,
    Screenshot,
    Extract,
    Assert,
    RefreshCatalog,
    ScrollToText,
    EvalJs,
    GoBack,
    GoForward,
    ClosePopup,
    ClickBlankArea,
}

impl ActionKind {
    /// Kinds with element semantics must carry a target.
    pub fn requires_target(self) -> bool {
        matches!(
            self,
            ActionKind::Click
                | ActionKind::Type
                | ActionKind::Select
                | ActionKind::Hover
                | ActionKind::FocusIframe
                | ActionKind::Assert
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Navigate => "navigate",
            ActionKind::Click => "click",
            ActionKind::Type => "type",
            ActionKind::Select => "select",
            ActionKind::PressKey => "press_key",
            ActionKind::Hover => "hover",
            ActionKind::Wait => "wait",
            ActionKind::Scroll => "scroll",
            ActionKind::SwitchTab => "switch_tab",
            ActionKind::FocusIframe => "focus_iframe",
            ActionKind::Screenshot => "screenshot",
            ActionKind::Extract => "extract",
            ActionKind::Assert => "assert",
            ActionKind::RefreshCatalog => "refresh_catalog",
            ActionKind::ScrollToText => "scroll_to_text",
            ActionKind::EvalJs => "eval_js",
            ActionKind::GoBack => "go_back",
            ActionKind::GoForward => "go_forward",
            ActionKind::ClosePopup => "close_popup",
            ActionKind::ClickBlankArea => "click_blank_area",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
}

/// Post-condition selector for `wait` and navigation stabilization.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UntilCondition {
    Load,
    Domcontentloaded,
    Networkidle,
    Selector,
    Timeout,
}

/// Bounded per-action configuration. Recognized fields only; everything
/// else is stripped during normalization.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionOptions {
    /// Timeout override in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ms: Option<u64>,
    pub clear: bool,
    pub button: MouseButton,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    pub force: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<UntilCondition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl ActionOptions {
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// One browser-directed instruction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub kind: ActionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<Selector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "ActionOptions::is_default")]
    #[serde(default)]
    pub options: ActionOptions,
}

impl Action {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            target: None,
            value: None,
            options: ActionOptions::default(),
        }
    }

    pub fn with_target(mut self, target: Selector) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_options(mut self, options: ActionOptions) -> Self {
        self.options = options;
        self
    }

    /// Identity triple used by the client-loop duplicate valve.
    pub fn identity(&self) -> (ActionKind, Option<String>, Option<String>) {
        (
            self.kind,
            self.target.as_ref().map(|t| t.raw().to_string()),
            self.value.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ActionKind::PressKey).unwrap(),
            "\"press_key\""
        );
        assert_eq!(
            serde_json::to_string(&ActionKind::RefreshCatalog).unwrap(),
            "\"refresh_catalog\""
        );
    }

    #[test]
    fn target_requirements() {
        assert!(ActionKind::Click.requires_target());
        assert!(ActionKind::Type.requires_target());
        assert!(!ActionKind::Navigate.requires_target());
        assert!(!ActionKind::Screenshot.requires_target());
        assert!(!ActionKind::PressKey.requires_target());
    }

    #[test]
    fn default_options_are_skipped_in_json() {
        let action = Action::new(ActionKind::Click).with_target(Selector::css("#go"));
        let json = serde_json::to_value(&action).unwrap();
        assert!(json.get("options").is_none());
        assert_eq!(json["kind"], "click");
        assert_eq!(json["target"], "#go");
    }
}
