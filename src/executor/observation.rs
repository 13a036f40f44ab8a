//! Execution result model.

use serde::{Deserialize, Serialize};

use crate::errors::ErrorKind;

/// What the page looked like when the plan finished.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Observation {
    pub url: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog_version: Option<String>,
    pub nav_detected: bool,
}

/// Plan-level error, only set when the plan as a whole could not run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecError {
    pub code: ErrorKind,
    pub message: String,
}

/// The one result type every execution path funnels into.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecResult {
    pub success: bool,
    pub warnings: Vec<String>,
    pub observation: Observation,
    pub is_done: bool,
    pub html: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecError>,
}

impl ExecResult {
    pub fn failure(kind: ErrorKind, message: impl Into<String>, warnings: Vec<String>) -> Self {
        let message = message.into();
        Self {
            success: false,
            warnings,
            observation: Observation::default(),
            is_done: false,
            html: String::new(),
            screenshot: None,
            extracted: None,
            error: Some(ExecError {
                code: kind,
                message,
            }),
        }
    }

    pub fn was_cancelled(&self) -> bool {
        self.error
            .as_ref()
            .map_or(false, |e| e.code == ErrorKind::Cancelled)
    }
}
