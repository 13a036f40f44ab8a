//! Per-run debug artifacts.
//!
//! Each run gets `runs/<run_id>/` with an append-only `events.jsonl`, a
//! `shots/` directory of per-step screenshots, and `error_report.json`
//! when the run terminates with an unrecoverable failure.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize)]
pub struct StepEvent {
    pub step: usize,
    pub timestamp: DateTime<Utc>,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_selector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ErrorReport {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub error_code: String,
    pub message: String,
    pub warnings: Vec<String>,
}

pub struct RunRecorder {
    run_id: String,
    dir: PathBuf,
    shots_dir: PathBuf,
    events: Mutex<File>,
}

impl RunRecorder {
    pub fn create(base: &Path) -> std::io::Result<Self> {
        let run_id = format!(
            "{}-{}",
            Utc::now().format("%Y%m%dT%H%M%S"),
            &Uuid::new_v4().simple().to_string()[..8]
        );
        let dir = base.join(&run_id);
        let shots_dir = dir.join("shots");
        fs::create_dir_all(&shots_dir)?;
        let events = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("events.jsonl"))?;
        Ok(Self {
            run_id,
            dir,
            shots_dir,
            events: Mutex::new(events),
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record_event(&self, event: &StepEvent) -> std::io::Result<()> {
        let line = serde_json::to_string(event)?;
        let mut file = self.events.lock();
        writeln!(file, "{line}")
    }

    pub fn save_screenshot(&self, step: usize, png: &[u8]) -> std::io::Result<PathBuf> {
        let path = self.shots_dir.join(format!("step_{step:04}.png"));
        fs::write(&path, png)?;
        Ok(path)
    }

    pub fn write_error_report(&self, report: &ErrorReport) -> std::io::Result<()> {
        let body = serde_json::to_vec_pretty(report)?;
        fs::write(self.dir.join("error_report.json"), body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_events_and_artifacts() {
        let tmp = tempfile::tempdir().unwrap();
        let recorder = RunRecorder::create(tmp.path()).unwrap();

        recorder
            .record_event(&StepEvent {
                step: 0,
                timestamp: Utc::now(),
                kind: "navigate".into(),
                resolved_selector: None,
                screenshot: None,
                warnings: vec!["INFO:auto:ok".into()],
                error: None,
            })
            .unwrap();
        recorder
            .record_event(&StepEvent {
                step: 1,
                timestamp: Utc::now(),
                kind: "click".into(),
                resolved_selector: Some("css=#go".into()),
                screenshot: None,
                warnings: vec![],
                error: Some("TIMEOUT".into()),
            })
            .unwrap();
        let shot = recorder.save_screenshot(1, b"png-bytes").unwrap();
        recorder
            .write_error_report(&ErrorReport {
                run_id: recorder.run_id().to_string(),
                timestamp: Utc::now(),
                error_code: "TIMEOUT".into(),
                message: "click timed out".into(),
                warnings: vec![],
            })
            .unwrap();

        let events = fs::read_to_string(recorder.dir().join("events.jsonl")).unwrap();
        assert_eq!(events.lines().count(), 2);
        let first: serde_json::Value = serde_json::from_str(events.lines().next().unwrap()).unwrap();
        assert_eq!(first["kind"], "navigate");
        assert!(shot.ends_with("shots/step_0001.png"));
        assert!(recorder.dir().join("error_report.json").exists());
    }
}
