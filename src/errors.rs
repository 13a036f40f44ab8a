//! Error taxonomy for the execution core.
//!
//! Every failure the core can surface belongs to the closed [`ErrorKind`]
//! set. Kinds carry their retry classification and a short user-facing
//! message; the wire representation is the SCREAMING_SNAKE_CASE code.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed set of failure kinds.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    ValidationError,
    ElementNotFound,
    ElementNotInteractable,
    CatalogOutdated,
    NavigationFailed,
    Timeout,
    BrowserUnhealthy,
    ExternalBlocked,
    EvalFailed,
    Cancelled,
    Unknown,
}

impl ErrorKind {
    /// Internal kinds are retryable; policy violations and user code are not.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::ElementNotFound
                | ErrorKind::ElementNotInteractable
                | ErrorKind::CatalogOutdated
                | ErrorKind::NavigationFailed
                | ErrorKind::Timeout
                | ErrorKind::BrowserUnhealthy
        )
    }

    /// Wire code, stable across releases.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::ValidationError => "VALIDATION_ERROR",
            ErrorKind::ElementNotFound => "ELEMENT_NOT_FOUND",
            ErrorKind::ElementNotInteractable => "ELEMENT_NOT_INTERACTABLE",
            ErrorKind::CatalogOutdated => "CATALOG_OUTDATED",
            ErrorKind::NavigationFailed => "NAVIGATION_FAILED",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::BrowserUnhealthy => "BROWSER_UNHEALTHY",
            ErrorKind::ExternalBlocked => "EXTERNAL_BLOCKED",
            ErrorKind::EvalFailed => "EVAL_FAILED",
            ErrorKind::Cancelled => "CANCELLED",
            ErrorKind::Unknown => "UNKNOWN",
        }
    }

    /// Short natural-language variant shown to end users.
    pub fn user_message(self) -> &'static str {
        match self {
            ErrorKind::ValidationError => "the requested action was malformed",
            ErrorKind::ElementNotFound => "element not found",
            ErrorKind::ElementNotInteractable => "element cannot be interacted with",
            ErrorKind::CatalogOutdated => "the page changed; element list is stale",
            ErrorKind::NavigationFailed => "navigation failed",
            ErrorKind::Timeout => "timeout",
            ErrorKind::BrowserUnhealthy => "the browser is not responding",
            ErrorKind::ExternalBlocked => "the site refused the request",
            ErrorKind::EvalFailed => "page script failed",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Unknown => "something went wrong",
        }
    }
}

/// Core error: a kind plus operator-facing detail.
#[derive(Clone, Debug, Error)]
#[error("{detail}")]
pub struct AgentError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl AgentError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn validation(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationError, detail)
    }

    pub fn element_not_found(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::ElementNotFound, detail)
    }

    pub fn not_interactable(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::ElementNotInteractable, detail)
    }

    pub fn catalog_outdated(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::CatalogOutdated, detail)
    }

    pub fn navigation(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::NavigationFailed, detail)
    }

    pub fn timeout(operation: &str, timeout_ms: u64) -> Self {
        Self::new(
            ErrorKind::Timeout,
            format!("{operation} exceeded {timeout_ms}ms"),
        )
    }

    pub fn unhealthy(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::BrowserUnhealthy, detail)
    }

    pub fn blocked(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::ExternalBlocked, detail)
    }

    pub fn eval(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::EvalFailed, detail)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "cancelled")
    }

    pub fn unknown(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, detail)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

pub type AgentResult<T> = Result<T, AgentError>;
