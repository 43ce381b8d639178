//! Run orchestration: agent discovery, foreground/detached execution and
//! plugin notification.
//!
//! [`Orchestrator`] is the explicit context for a process. Every dependency
//! (settings, store, adapters, scoring, test runner, plugins, launcher) is
//! held here and can be swapped through the `with_*` builders.

use std::ffi::OsString;
use std::fs::File;
use std::process::{Command, Stdio};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::adapters::{AgentAdapter, Capabilities, Detection, builtin_adapters};
use crate::core::event::LogRecord;
use crate::core::scoring::{DefaultScoringPolicy, ScoringPolicy};
use crate::core::summary::{RunSummary, summarize};
use crate::core::types::{Attempt, MaxIters};
use crate::engine::{IterationEngine, StopReason};
use crate::io::config::Settings;
use crate::io::run_store::{Run, RunStore};
use crate::io::test_runner::{ShellTestRunner, TestRunner};
use crate::plugin::{PluginFailure, PluginSet, PluginSink, RunNotice, RunStatus};

/// Detached worker stderr, kept next to the run log.
pub const WORKER_LOG_FILE: &str = "worker.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    Foreground,
    Detached,
}

/// A detached worker that was started for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachedHandle {
    pub pid: Option<u32>,
}

/// Starts the iteration loop for an existing run outside this process.
pub trait BackgroundLauncher {
    fn launch(&self, run: &Run, prompt: &str, max_iters: MaxIters) -> Result<DetachedHandle>;
}

/// Re-executes the current binary with the hidden `resume` subcommand.
#[derive(Debug, Clone, Default)]
pub struct SelfRespawn {
    forward_args: Vec<OsString>,
}

impl SelfRespawn {
    pub fn new() -> Self {
        Self::default()
    }

    /// Global arguments (e.g. `--config <path>`) the worker must see.
    pub fn forward_arg(mut self, arg: impl Into<OsString>) -> Self {
        self.forward_args.push(arg.into());
        self
    }
}

impl BackgroundLauncher for SelfRespawn {
    #[instrument(skip_all, fields(run_id = %run.id))]
    fn launch(&self, run: &Run, prompt: &str, max_iters: MaxIters) -> Result<DetachedHandle> {
        let exe = std::env::current_exe().context("locate current executable")?;
        let log_path = run.dir.join(WORKER_LOG_FILE);
        let log = File::create(&log_path)
            .with_context(|| format!("create {}", log_path.display()))?;

        let mut cmd = Command::new(exe);
        cmd.args(&self.forward_args)
            .arg("resume")
            .arg("--")
            .arg(&run.id)
            .arg(prompt)
            .arg(max_iters.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(log));
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Own process group so the worker survives the terminal's SIGINT.
            cmd.process_group(0);
        }

        let child = cmd.spawn().context("spawn detached worker")?;
        info!(pid = child.id(), "detached worker started");
        Ok(DetachedHandle {
            pid: Some(child.id()),
        })
    }
}

/// Detection result for one known adapter.
#[derive(Debug, Clone)]
pub struct AgentStatus {
    pub capabilities: Capabilities,
    pub detection: Detection,
    /// Passes the `active_tools` allow-list.
    pub allowed: bool,
}

impl AgentStatus {
    pub fn usable(&self) -> bool {
        self.detection.found && self.allowed
    }
}

/// Final report of a foreground (or resumed) run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: String,
    pub prompt: String,
    pub status: RunStatus,
    pub best: Option<Attempt>,
    pub attempts: Vec<Attempt>,
    pub stop: StopReason,
    pub plugin_failures: Vec<PluginFailure>,
}

#[derive(Debug, Clone)]
pub enum LaunchResult {
    /// No usable agent; nothing beyond `run_started` was logged.
    NoAgents,
    Completed(RunReport),
    Detached(DetachedHandle),
}

#[derive(Debug, Clone)]
pub struct LaunchOutcome {
    pub run_id: String,
    /// Names of the agents the run was scheduled across.
    pub agents: Vec<String>,
    pub result: LaunchResult,
}

pub struct Orchestrator {
    settings: Settings,
    store: RunStore,
    adapters: Vec<Box<dyn AgentAdapter>>,
    plugins: PluginSet,
    policy: Box<dyn ScoringPolicy>,
    tests: Box<dyn TestRunner>,
    launcher: Box<dyn BackgroundLauncher>,
}

impl Orchestrator {
    /// Production wiring: builtin adapters, configured hooks, default scoring,
    /// shell test runner and self-respawning detached launcher.
    pub fn new(settings: Settings, store: RunStore) -> Self {
        let plugins = PluginSet::from_hooks(&settings.hooks);
        Self {
            settings,
            store,
            adapters: builtin_adapters(),
            plugins,
            policy: Box::new(DefaultScoringPolicy),
            tests: Box::new(ShellTestRunner),
            launcher: Box::new(SelfRespawn::new()),
        }
    }

    pub fn with_adapters(mut self, adapters: Vec<Box<dyn AgentAdapter>>) -> Self {
        self.adapters = adapters;
        self
    }

    pub fn with_plugin(mut self, plugin: Box<dyn PluginSink>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn with_policy(mut self, policy: Box<dyn ScoringPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_test_runner(mut self, tests: Box<dyn TestRunner>) -> Self {
        self.tests = tests;
        self
    }

    pub fn with_launcher(mut self, launcher: Box<dyn BackgroundLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn store(&self) -> &RunStore {
        &self.store
    }

    /// Detect every known adapter, in scheduling order.
    pub fn agent_statuses(&self) -> Vec<AgentStatus> {
        self.adapters
            .iter()
            .map(|adapter| {
                let capabilities = adapter.capabilities();
                let detection = adapter.detect();
                let allowed = self.settings.allows_tool(&capabilities.name);
                debug!(
                    tool = %capabilities.name,
                    found = detection.found,
                    allowed,
                    "agent detection"
                );
                AgentStatus {
                    capabilities,
                    detection,
                    allowed,
                }
            })
            .collect()
    }

    /// Detected adapters that pass the allow-list, in scheduling order.
    pub fn available_adapters(&self) -> Vec<&dyn AgentAdapter> {
        self.usable_adapters(&self.agent_statuses())
    }

    /// Adapters whose entry in `statuses` is usable. Adapters without an entry are left out.
    fn usable_adapters(&self, statuses: &[AgentStatus]) -> Vec<&dyn AgentAdapter> {
        self.adapters
            .iter()
            .filter(|adapter| {
                let name = adapter.capabilities().name;
                statuses
                    .iter()
                    .any(|status| status.usable() && status.capabilities.name == name)
            })
            .map(|adapter| adapter.as_ref())
            .collect()
    }

    pub fn create_run(&self, prompt: &str) -> Result<Run> {
        self.store.create_run(prompt)
    }

    /// Run the loop for `run`, either in this process or in a detached worker.
    pub fn start(
        &self,
        run: &Run,
        prompt: &str,
        mode: LaunchMode,
        max_iters: MaxIters,
    ) -> Result<LaunchOutcome> {
        self.start_with_agents(run, prompt, mode, max_iters, &self.agent_statuses())
    }

    /// [`start`](Self::start) with statuses from an earlier [`agent_statuses`](Self::agent_statuses)
    /// call, so agents are not detected a second time.
    #[instrument(skip_all, fields(run_id = %run.id, ?mode))]
    pub fn start_with_agents(
        &self,
        run: &Run,
        prompt: &str,
        mode: LaunchMode,
        max_iters: MaxIters,
        statuses: &[AgentStatus],
    ) -> Result<LaunchOutcome> {
        self.settings.validate()?;
        let adapters = self.usable_adapters(statuses);
        let agents = adapter_names(&adapters);
        if adapters.is_empty() {
            warn!("no supported agents found");
            return Ok(LaunchOutcome {
                run_id: run.id.clone(),
                agents,
                result: LaunchResult::NoAgents,
            });
        }

        let result = match mode {
            LaunchMode::Detached => {
                LaunchResult::Detached(self.launcher.launch(run, prompt, max_iters)?)
            }
            LaunchMode::Foreground => {
                LaunchResult::Completed(self.execute(run, prompt, &adapters, max_iters)?)
            }
        };
        Ok(LaunchOutcome {
            run_id: run.id.clone(),
            agents,
            result,
        })
    }

    /// Worker entry point: run the loop for a run created by a detached start.
    #[instrument(skip_all, fields(run_id = %run_id))]
    pub fn resume(&self, run_id: &str, prompt: &str, max_iters: MaxIters) -> Result<LaunchOutcome> {
        self.settings.validate()?;
        let run = self
            .store
            .get_run(run_id)?
            .ok_or_else(|| anyhow!("run {run_id} not found"))?;

        let adapters = self.available_adapters();
        let agents = adapter_names(&adapters);
        if adapters.is_empty() {
            warn!("no supported agents found in worker");
            return Ok(LaunchOutcome {
                run_id: run.id,
                agents,
                result: LaunchResult::NoAgents,
            });
        }

        let report = self.execute(&run, prompt, &adapters, max_iters)?;
        Ok(LaunchOutcome {
            run_id: run.id,
            agents,
            result: LaunchResult::Completed(report),
        })
    }

    fn execute(
        &self,
        run: &Run,
        prompt: &str,
        adapters: &[&dyn AgentAdapter],
        max_iters: MaxIters,
    ) -> Result<RunReport> {
        let config = self.settings.run_config(max_iters);
        if config.auto_apply {
            debug!("auto_apply is set; changes stay in the run directory");
        }

        let mut plugin_failures = self.plugins.load_failures().to_vec();
        let mut engine = IterationEngine::new(run, &config, self.policy.as_ref(), self.tests.as_ref());
        let outcome = engine.execute_run(prompt, adapters, |attempt| {
            plugin_failures.extend(self.plugins.notify_iteration(&run.id, attempt));
        })?;

        let status = match &outcome.best {
            Some(best) if best.passed() => RunStatus::Success,
            _ => RunStatus::Failed,
        };
        let notice = RunNotice {
            run_id: run.id.clone(),
            prompt: prompt.to_string(),
            status,
            best_future_id: outcome.best.as_ref().map(|best| best.id.clone()),
        };
        plugin_failures.extend(self.plugins.notify_run(&notice));
        info!(status = status.as_str(), iterations = outcome.iterations, "run finished");

        Ok(RunReport {
            run_id: run.id.clone(),
            prompt: prompt.to_string(),
            status,
            best: outcome.best,
            attempts: engine.into_attempts(),
            stop: outcome.stop,
            plugin_failures,
        })
    }

    /// Summaries of every stored run, newest first. Unreadable logs are
    /// reported per run rather than failing the listing.
    pub fn run_summaries(&self) -> Result<Vec<(String, Result<RunSummary>)>> {
        let ids = self.store.list_runs()?;
        Ok(ids
            .into_iter()
            .map(|id| {
                let summary = self.run_summary(&id);
                (id, summary)
            })
            .collect())
    }

    pub fn run_summary(&self, run_id: &str) -> Result<RunSummary> {
        Ok(summarize(&self.run_events(run_id)?))
    }

    /// Replay a stored run's log.
    pub fn run_events(&self, run_id: &str) -> Result<Vec<LogRecord>> {
        let run = self
            .store
            .get_run(run_id)?
            .ok_or_else(|| anyhow!("run {run_id} not found"))?;
        run.log.read_events()
    }
}

fn adapter_names(adapters: &[&dyn AgentAdapter]) -> Vec<String> {
    adapters
        .iter()
        .map(|adapter| adapter.capabilities().name)
        .collect()
}
