//! Warning protocol.
//!
//! Every layer that catches a fault wraps it as a `"<SEVERITY>:<source>:<message>"`
//! string and reports success-with-warnings instead of propagating. Warnings are
//! additive across retries and individually truncated to [`MAX_WARNING_CHARS`]
//! code points.

use crate::errors::AgentError;

/// Hard per-warning length bound, counted in Unicode code points.
pub const MAX_WARNING_CHARS: usize = 1_000;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Severity {
    Error,
    Warning,
    Info,
    Debug,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
            Severity::Info => "INFO",
            Severity::Debug => "DEBUG",
        }
    }
}

/// Build a warning string, applying the truncation rule.
pub fn format_warning(severity: Severity, source: &str, message: &str) -> String {
    truncate(format!("{}:{}:{}", severity.as_str(), source, message))
}

/// Truncate to [`MAX_WARNING_CHARS`] code points, preserving the prefix and
/// appending an ellipsis when anything was cut.
pub fn truncate(warning: String) -> String {
    if warning.chars().count() <= MAX_WARNING_CHARS {
        return warning;
    }
    let mut out: String = warning.chars().take(MAX_WARNING_CHARS - 1).collect();
    out.push('…');
    out
}

/// Cumulative warning list carried through an execution.
#[derive(Clone, Debug, Default)]
pub struct WarningSink {
    items: Vec<String>,
}

impl WarningSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, severity: Severity, source: &str, message: &str) {
        self.items.push(format_warning(severity, source, message));
    }

    pub fn error(&mut self, source: &str, message: &str) {
        self.push(Severity::Error, source, message);
    }

    pub fn warn(&mut self, source: &str, message: &str) {
        self.push(Severity::Warning, source, message);
    }

    pub fn info(&mut self, source: &str, message: &str) {
        self.push(Severity::Info, source, message);
    }

    pub fn debug(&mut self, source: &str, message: &str) {
        self.push(Severity::Debug, source, message);
    }

    /// Record one failed attempt of a retried action.
    pub fn attempt_failure(&mut self, attempt: u32, max_attempts: u32, err: &AgentError) {
        self.error(
            "auto",
            &format!("Attempt {attempt}/{max_attempts} - {}", err.detail),
        );
    }

    /// Summary appended when every attempt of an action failed.
    pub fn all_attempts_failed(&mut self, attempts: u32, errors: u32) {
        self.error(
            "auto",
            &format!("All {attempts} execution attempts failed. Total errors: {errors}"),
        );
    }

    pub fn extend(&mut self, other: impl IntoIterator<Item = String>) {
        for raw in other {
            self.items.push(truncate(raw));
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.items
    }

    pub fn into_vec(self) -> Vec<String> {
        self.items
    }
}
