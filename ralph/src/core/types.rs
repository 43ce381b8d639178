//! Shared deterministic types for the exploration engine.
//!
//! These types define stable contracts between the engine, adapters, and the
//! scoring policy. They do not depend on external state or I/O.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::schedule::future_id;

/// Score carried by an attempt until it is scored, and by attempts without a result.
pub const UNSCORED: f64 = -1.0;

/// Exit code recorded when an invocation exceeds its timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Exit code recorded when a process could not be spawned or awaited.
pub const SPAWN_FAILURE_EXIT_CODE: i32 = 1;

/// Lifecycle state of an attempt.
///
/// The engine only ever drives `Pending → Running → Completed`; agent crashes
/// and failing tests are folded into `Completed` with a low score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

/// Captured outcome of one agent invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttemptResult {
    pub stdout: String,
    pub stderr: String,
    /// Process exit code. The engine overwrites this with the test command's code.
    pub exit_code: i32,
    pub duration_secs: f64,
    pub diff: Option<String>,
    /// Free-form cost/usage metadata reported by the adapter.
    #[serde(default)]
    pub cost_info: Map<String, Value>,
}

impl AttemptResult {
    /// Result for an invocation that was killed after exceeding `timeout`.
    pub fn timed_out(timeout: Duration, elapsed: Duration, stdout: String) -> Self {
        Self {
            stdout,
            stderr: format!("Timeout expired after {}s", timeout.as_secs()),
            exit_code: TIMEOUT_EXIT_CODE,
            duration_secs: elapsed.as_secs_f64(),
            diff: None,
            cost_info: Map::new(),
        }
    }

    /// Result for an invocation that never produced an exit status.
    pub fn spawn_failure(message: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            stdout: String::new(),
            stderr: message.into(),
            exit_code: SPAWN_FAILURE_EXIT_CODE,
            duration_secs: elapsed.as_secs_f64(),
            diff: None,
            cost_info: Map::new(),
        }
    }

    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }
}

/// One exploration step ("future").
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attempt {
    pub id: String,
    /// 1-based position in the run.
    pub iteration: u32,
    pub tool_name: String,
    pub status: AttemptStatus,
    /// Present iff `status` is `Completed` or `Failed`.
    pub result: Option<AttemptResult>,
    /// Meaningful only when `status` is `Completed`.
    pub score: f64,
    /// Never chosen by `select_best`, whatever its score.
    pub exclude_from_selection: bool,
}

impl Attempt {
    /// Create a pending attempt for `iteration` produced by `tool_name`.
    pub fn new(iteration: u32, tool_name: impl Into<String>) -> Self {
        Self {
            id: future_id(iteration),
            iteration,
            tool_name: tool_name.into(),
            status: AttemptStatus::Pending,
            result: None,
            score: UNSCORED,
            exclude_from_selection: false,
        }
    }

    pub fn start(&mut self) {
        self.status = AttemptStatus::Running;
    }

    /// Attach the captured result and mark the attempt completed.
    pub fn complete(&mut self, result: AttemptResult) {
        self.result = Some(result);
        self.status = AttemptStatus::Completed;
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.result.as_ref().map(|result| result.exit_code)
    }

    /// True when the attempt completed and its validation exited zero.
    pub fn passed(&self) -> bool {
        self.status == AttemptStatus::Completed && self.exit_code() == Some(0)
    }
}

/// Immutable per-run execution parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub max_iters: u32,
    /// Bound on each agent invocation.
    pub timeout_per_iter: Duration,
    /// Shell command whose exit code decides success.
    pub test_cmd: String,
    /// Bound on each test command invocation.
    pub test_timeout: Duration,
    pub stop_on_success: bool,
    pub auto_apply: bool,
    /// Truncate captured agent/test output beyond this many bytes.
    pub output_limit_bytes: usize,
    /// Tool name → model, for adapters that support model selection.
    pub models: BTreeMap<String, String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_iters: 5,
            timeout_per_iter: Duration::from_secs(300),
            test_cmd: "pytest".to_string(),
            test_timeout: Duration::from_secs(30 * 60),
            stop_on_success: true,
            auto_apply: false,
            output_limit_bytes: 1_000_000,
            models: BTreeMap::new(),
        }
    }
}

/// Max-iterations override carried across the detach boundary.
///
/// Renders as `default` (use the configured value) or a positive number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaxIters {
    #[default]
    Default,
    Explicit(u32),
}

impl MaxIters {
    pub fn resolve(self, configured: u32) -> u32 {
        match self {
            MaxIters::Default => configured,
            MaxIters::Explicit(n) => n,
        }
    }
}

impl From<Option<u32>> for MaxIters {
    fn from(value: Option<u32>) -> Self {
        value.map_or(MaxIters::Default, MaxIters::Explicit)
    }
}

impl fmt::Display for MaxIters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaxIters::Default => f.write_str("default"),
            MaxIters::Explicit(n) => write!(f, "{n}"),
        }
    }
}

impl FromStr for MaxIters {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        if s == "default" {
            return Ok(MaxIters::Default);
        }
        let n: u32 = s
            .parse()
            .map_err(|_| anyhow!("max iterations must be a positive number or 'default' (got '{s}')"))?;
        if n == 0 {
            return Err(anyhow!("max iterations must be > 0"));
        }
        Ok(MaxIters::Explicit(n))
    }
}
