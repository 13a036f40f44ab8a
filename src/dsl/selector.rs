//! Multi-strategy selectors.
//!
//! A selector is a pure value naming a DOM element by one of several
//! strategies. Parsing is prefix-based; an unprefixed string is CSS.

use std::fmt;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::{AgentError, AgentResult};

/// One resolution strategy with its payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// Stable index into the current element catalog.
    Index(usize),
    Css(String),
    XPath(String),
    Text(String),
    Role { role: String, name: Option<String> },
    AriaLabel(String),
    TestId(String),
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Index(_) => "index",
            Strategy::Css(_) => "css",
            Strategy::XPath(_) => "xpath",
            Strategy::Text(_) => "text",
            Strategy::Role { .. } => "role",
            Strategy::AriaLabel(_) => "aria-label",
            Strategy::TestId(_) => "testid",
        }
    }
}

/// A parsed selector. Keeps the raw form for serialization and display.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selector {
    raw: String,
    strategy: Strategy,
}

impl Selector {
    /// Parse a wire selector string. `role=button[name=Submit]` carries an
    /// optional accessible name; everything unprefixed is CSS.
    pub fn parse(raw: &str) -> AgentResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AgentError::validation("empty selector"));
        }
        let strategy = if let Some(rest) = trimmed.strip_prefix("index=") {
            let index = rest
                .trim()
                .parse::<usize>()
                .map_err(|_| AgentError::validation(format!("invalid index selector: {raw}")))?;
            Strategy::Index(index)
        } else if let Some(rest) = trimmed.strip_prefix("css=") {
            Strategy::Css(require_payload(rest, raw)?)
        } else if let Some(rest) = trimmed.strip_prefix("xpath=") {
            Strategy::XPath(require_payload(rest, raw)?)
        } else if let Some(rest) = trimmed.strip_prefix("text=") {
            Strategy::Text(require_payload(rest, raw)?)
        } else if let Some(rest) = trimmed.strip_prefix("role=") {
            parse_role(&require_payload(rest, raw)?)
        } else if let Some(rest) = trimmed.strip_prefix("aria-label=") {
            Strategy::AriaLabel(require_payload(rest, raw)?)
        } else if let Some(rest) = trimmed.strip_prefix("testid=") {
            Strategy::TestId(require_payload(rest, raw)?)
        } else {
            Strategy::Css(trimmed.to_string())
        };
        Ok(Self {
            raw: trimmed.to_string(),
            strategy,
        })
    }

    /// Build from a structured wire pair (`{strategy, value}`).
    pub fn from_parts(strategy: &str, value: &str) -> AgentResult<Self> {
        let raw = match strategy {
            "css" | "xpath" | "text" | "index" | "role" | "testid" => {
                format!("{strategy}={value}")
            }
            "aria-label" | "aria_label" => format!("aria-label={value}"),
            other => {
                return Err(AgentError::validation(format!(
                    "unknown selector strategy: {other}"
                )))
            }
        };
        Self::parse(&raw)
    }

    pub fn index(n: usize) -> Self {
        Self {
            raw: format!("index={n}"),
            strategy: Strategy::Index(n),
        }
    }

    pub fn css(css: impl Into<String>) -> Self {
        let css = css.into();
        Self {
            raw: css.clone(),
            strategy: Strategy::Css(css),
        }
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn is_index(&self) -> bool {
        matches!(self.strategy, Strategy::Index(_))
    }
}

fn require_payload(rest: &str, raw: &str) -> AgentResult<String> {
    let rest = rest.trim();
    if rest.is_empty() {
        return Err(AgentError::validation(format!(
            "selector has empty payload: {raw}"
        )));
    }
    Ok(rest.to_string())
}

fn parse_role(payload: &str) -> Strategy {
    if let Some(open) = payload.find("[name=") {
        let role = payload[..open].trim().to_string();
        let rest = &payload[open + "[name=".len()..];
        let name = rest.strip_suffix(']').unwrap_or(rest);
        let name = name.trim_matches(|c| c == '"' || c == '\'').to_string();
        return Strategy::Role {
            role,
            name: if name.is_empty() { None } else { Some(name) },
        };
    }
    Strategy::Role {
        role: payload.trim().to_string(),
        name: None,
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for Selector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for Selector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Selector::parse(&raw).map_err(|e| D::Error::custom(e.detail))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unprefixed_is_css() {
        let sel = Selector::parse("input.search").unwrap();
        assert_eq!(sel.strategy(), &Strategy::Css("input.search".into()));
    }

    #[test]
    fn prefixes_parse_to_their_strategy() {
        assert_eq!(
            Selector::parse("index=3").unwrap().strategy(),
            &Strategy::Index(3)
        );
        assert_eq!(
            Selector::parse("xpath=//a[1]").unwrap().strategy(),
            &Strategy::XPath("//a[1]".into())
        );
        assert_eq!(
            Selector::parse("text=Sign in").unwrap().strategy(),
            &Strategy::Text("Sign in".into())
        );
        assert_eq!(
            Selector::parse("aria-label=Close").unwrap().strategy(),
            &Strategy::AriaLabel("Close".into())
        );
        assert_eq!(
            Selector::parse("testid=submit-btn").unwrap().strategy(),
            &Strategy::TestId("submit-btn".into())
        );
    }

    #[test]
    fn role_with_name() {
        let sel = Selector::parse("role=button[name=Submit]").unwrap();
        assert_eq!(
            sel.strategy(),
            &Strategy::Role {
                role: "button".into(),
                name: Some("Submit".into()),
            }
        );
        let bare = Selector::parse("role=link").unwrap();
        assert_eq!(
            bare.strategy(),
            &Strategy::Role {
                role: "link".into(),
                name: None,
            }
        );
    }

    #[test]
    fn empty_and_malformed_are_rejected() {
        assert!(Selector::parse("").is_err());
        assert!(Selector::parse("   ").is_err());
        assert!(Selector::parse("index=abc").is_err());
        assert!(Selector::parse("css=").is_err());
    }

    #[test]
    fn serde_round_trips_raw_form() {
        let sel = Selector::parse("role=button[name=Go]").unwrap();
        let json = serde_json::to_string(&sel).unwrap();
        let back: Selector = serde_json::from_str(&json).unwrap();
        assert_eq!(sel, back);
    }
}
