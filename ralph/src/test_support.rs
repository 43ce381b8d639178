//! Test doubles for agents, test commands, plugins and the detached launcher.
//!
//! Doubles share state through `Rc<RefCell<_>>` so a test can keep a clone
//! after handing the double to an [`Orchestrator`](crate::orchestrator::Orchestrator).

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Result, bail};
use serde_json::Value;
use tempfile::TempDir;

use crate::adapters::{AgentAdapter, AgentRequest, Capabilities, CostConfidence, Detection};
use crate::core::types::{AttemptResult, MaxIters};
use crate::io::run_store::{Run, RunStore};
use crate::io::test_runner::{TestOutcome, TestRequest, TestRunner};
use crate::orchestrator::{BackgroundLauncher, DetachedHandle};
use crate::plugin::{PluginSink, RunNotice};

/// A fresh run store in a temporary directory. Keep the `TempDir` alive.
pub fn temp_store() -> (TempDir, RunStore) {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = RunStore::new(temp.path().join("runs")).expect("store");
    (temp, store)
}

#[derive(Debug, Default)]
struct AdapterScript {
    exit_codes: VecDeque<i32>,
    diffs: VecDeque<String>,
    requests: Vec<AgentRequest>,
    detections: usize,
}

/// Agent that replays scripted exit codes and diffs instead of spawning a CLI.
#[derive(Debug, Clone)]
pub struct ScriptedAdapter {
    name: String,
    found: bool,
    script: Rc<RefCell<AdapterScript>>,
}

impl ScriptedAdapter {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            found: true,
            script: Rc::default(),
        }
    }

    /// Adapter whose binary is not installed.
    pub fn missing(name: &str) -> Self {
        Self {
            found: false,
            ..Self::new(name)
        }
    }

    /// Agent exit codes, consumed one per call. Defaults to 0 once exhausted.
    pub fn with_exit_codes(self, codes: &[i32]) -> Self {
        self.script.borrow_mut().exit_codes.extend(codes);
        self
    }

    /// Diffs reported per call, consumed in order.
    pub fn with_diffs(self, diffs: &[&str]) -> Self {
        self.script
            .borrow_mut()
            .diffs
            .extend(diffs.iter().map(|d| d.to_string()));
        self
    }

    pub fn requests(&self) -> Vec<AgentRequest> {
        self.script.borrow().requests.clone()
    }

    pub fn calls(&self) -> usize {
        self.script.borrow().requests.len()
    }

    pub fn detections(&self) -> usize {
        self.script.borrow().detections
    }
}

impl AgentAdapter for ScriptedAdapter {
    fn detect(&self) -> Detection {
        self.script.borrow_mut().detections += 1;
        Detection {
            found: self.found,
            version: self.found.then(|| "scripted 1.0".to_string()),
            ..Detection::default()
        }
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            name: self.name.clone(),
            supports_model_selection: true,
            supports_non_interactive: true,
            cost_confidence: CostConfidence::Opaque,
            supported_env_keys: Vec::new(),
        }
    }

    fn run(&self, request: &AgentRequest) -> AttemptResult {
        let mut script = self.script.borrow_mut();
        script.requests.push(request.clone());
        AttemptResult {
            stdout: format!("{} handled: {}", self.name, request.prompt),
            exit_code: script.exit_codes.pop_front().unwrap_or(0),
            duration_secs: 0.01,
            diff: script.diffs.pop_front(),
            ..AttemptResult::default()
        }
    }
}

#[derive(Debug, Default)]
struct TestScript {
    codes: VecDeque<i32>,
    fallback: i32,
    fail_to_spawn: bool,
    requests: Vec<TestRequest>,
}

/// Test runner that replays scripted exit codes.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTestRunner {
    script: Rc<RefCell<TestScript>>,
}

impl ScriptedTestRunner {
    /// Every call exits with `code`.
    pub fn always(code: i32) -> Self {
        let runner = Self::default();
        runner.script.borrow_mut().fallback = code;
        runner
    }

    /// Calls exit with `codes` in order, then 1.
    pub fn sequence(codes: &[i32]) -> Self {
        let runner = Self::always(1);
        runner.script.borrow_mut().codes.extend(codes);
        runner
    }

    /// Every call fails before producing an exit code.
    pub fn broken() -> Self {
        let runner = Self::default();
        runner.script.borrow_mut().fail_to_spawn = true;
        runner
    }

    pub fn requests(&self) -> Vec<TestRequest> {
        self.script.borrow().requests.clone()
    }
}

impl TestRunner for ScriptedTestRunner {
    fn run(&self, request: &TestRequest) -> Result<TestOutcome> {
        let mut script = self.script.borrow_mut();
        script.requests.push(request.clone());
        if script.fail_to_spawn {
            bail!("test command could not be started");
        }
        let exit_code = match script.codes.pop_front() {
            Some(code) => code,
            None => script.fallback,
        };
        Ok(TestOutcome {
            exit_code,
            timed_out: false,
            duration: Duration::from_millis(5),
        })
    }
}

/// Plugin that records every notification as a short string.
#[derive(Debug, Clone, Default)]
pub struct RecordingPlugin {
    events: Rc<RefCell<Vec<String>>>,
}

impl RecordingPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    /// `iteration:<future_id>` and `run:<status>:<best or ->` entries, in order.
    pub fn events(&self) -> Vec<String> {
        self.events.borrow().clone()
    }
}

impl PluginSink for RecordingPlugin {
    fn name(&self) -> &str {
        "recording"
    }

    fn post_run(&self, notice: &RunNotice) -> Result<()> {
        self.events.borrow_mut().push(format!(
            "run:{}:{}",
            notice.status.as_str(),
            notice.best_future_id.as_deref().unwrap_or("-")
        ));
        Ok(())
    }

    fn post_iteration(&self, _run_id: &str, _iteration: u32, future: &Value) -> Result<()> {
        let future_id = future["id"].as_str().unwrap_or("?");
        self.events
            .borrow_mut()
            .push(format!("iteration:{future_id}"));
        Ok(())
    }
}

/// Plugin that fails every notification.
#[derive(Debug, Clone, Default)]
pub struct FailingPlugin;

impl PluginSink for FailingPlugin {
    fn name(&self) -> &str {
        "failing"
    }

    fn post_run(&self, _notice: &RunNotice) -> Result<()> {
        bail!("post_run exploded")
    }

    fn post_iteration(&self, _run_id: &str, _iteration: u32, _future: &Value) -> Result<()> {
        bail!("post_iteration exploded")
    }
}

/// One recorded detached launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launch {
    pub run_id: String,
    pub prompt: String,
    pub max_iters: MaxIters,
}

/// Launcher that records requests instead of spawning a worker.
#[derive(Debug, Clone, Default)]
pub struct RecordingLauncher {
    launches: Rc<RefCell<Vec<Launch>>>,
}

impl RecordingLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn launches(&self) -> Vec<Launch> {
        self.launches.borrow().clone()
    }
}

impl BackgroundLauncher for RecordingLauncher {
    fn launch(&self, run: &Run, prompt: &str, max_iters: MaxIters) -> Result<DetachedHandle> {
        self.launches.borrow_mut().push(Launch {
            run_id: run.id.clone(),
            prompt: prompt.to_string(),
            max_iters,
        });
        Ok(DetachedHandle { pid: None })
    }
}
