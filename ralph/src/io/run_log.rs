//! Append-only JSONL event log (`run.jsonl`) for one run.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::Value;
use tracing::debug;

use crate::core::event::LogRecord;

pub const RUN_LOG_FILE: &str = "run.jsonl";

/// Durable audit trail of a run.
///
/// Every append opens the file in append mode, so a process that exits and a
/// later process that resumes the run can both extend the same log.
#[derive(Debug, Clone)]
pub struct RunLog {
    path: PathBuf,
}

impl RunLog {
    /// Attach to the log inside `run_dir`, creating an empty file if missing.
    pub fn open(run_dir: &Path) -> Result<Self> {
        let path = run_dir.join(RUN_LOG_FILE);
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open run log {}", path.display()))?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record stamped with the current time.
    pub fn append(&self, event: &str, data: Value) -> Result<()> {
        self.append_record(&LogRecord::new(now_secs(), event, data))
    }

    pub fn append_record(&self, record: &LogRecord) -> Result<()> {
        let mut line = serde_json::to_string(record).context("serialize log record")?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open run log {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("append run log {}", self.path.display()))?;
        file.flush()
            .with_context(|| format!("flush run log {}", self.path.display()))?;
        debug!(event = %record.event, path = %self.path.display(), "run log appended");
        Ok(())
    }

    /// Replay every record in file order. Read-only.
    pub fn read_events(&self) -> Result<Vec<LogRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("read run log {}", self.path.display()))?;
        parse_records(&contents)
            .with_context(|| format!("parse run log {}", self.path.display()))
    }
}

fn parse_records(contents: &str) -> Result<Vec<LogRecord>> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line).with_context(|| format!("malformed record on line {}", idx + 1))
        })
        .collect()
}

/// Seconds since the Unix epoch, with microsecond precision.
pub fn now_secs() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event::{ITERATION_STARTED, RUN_STARTED};
    use serde_json::json;

    #[test]
    fn open_creates_empty_log() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = RunLog::open(temp.path()).expect("open");
        assert!(log.path().is_file());
        assert!(log.read_events().expect("read").is_empty());
    }

    #[test]
    fn appends_one_json_object_per_line() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = RunLog::open(temp.path()).expect("open");
        log.append(RUN_STARTED, json!({"prompt": "p", "run_id": "r"}))
            .expect("append");
        log.append(ITERATION_STARTED, json!({"iteration": 1}))
            .expect("append");

        let raw = fs::read_to_string(log.path()).expect("read raw");
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).expect("json");
        assert_eq!(first["event"], "run_started");
        assert!(first["timestamp"].as_f64().expect("timestamp") > 0.0);
        assert_eq!(first["data"]["prompt"], "p");
    }

    #[test]
    fn reopened_log_keeps_appending() {
        let temp = tempfile::tempdir().expect("tempdir");
        RunLog::open(temp.path())
            .expect("open")
            .append(RUN_STARTED, json!({}))
            .expect("append");
        let resumed = RunLog::open(temp.path()).expect("reopen");
        resumed
            .append(ITERATION_STARTED, json!({"iteration": 1}))
            .expect("append");
        let events = resumed.read_events().expect("read");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event, RUN_STARTED);
        assert_eq!(events[1].event, ITERATION_STARTED);
    }

    #[test]
    fn replay_is_idempotent() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = RunLog::open(temp.path()).expect("open");
        for i in 1..=3 {
            log.append(ITERATION_STARTED, json!({"iteration": i}))
                .expect("append");
        }
        let first = log.read_events().expect("read");
        let second = log.read_events().expect("read");
        assert_eq!(first, second);
        let iterations: Vec<i64> = first
            .iter()
            .filter_map(|r| r.i64_field("iteration"))
            .collect();
        assert_eq!(iterations, vec![1, 2, 3]);
    }

    #[test]
    fn malformed_line_reports_line_number() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = RunLog::open(temp.path()).expect("open");
        log.append(RUN_STARTED, json!({})).expect("append");
        let mut file = OpenOptions::new()
            .append(true)
            .open(log.path())
            .expect("open raw");
        file.write_all(b"\nnot json\n").expect("write");

        let err = log.read_events().unwrap_err();
        assert!(format!("{err:#}").contains("line 3"));
    }
}
