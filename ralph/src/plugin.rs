//! Post-run and post-iteration notification sinks.
//!
//! Plugins observe a run; they never influence it. A failing plugin is
//! logged and reported alongside the run result, and the run continues.

use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::core::types::Attempt;
use crate::io::config::{HookConfig, HookTrigger};
use crate::io::process::run_command_with_timeout;

const HOOK_TIMEOUT: Duration = Duration::from_secs(60);
const HOOK_OUTPUT_LIMIT_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        }
    }
}

/// Summary handed to plugins once a run finishes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunNotice {
    pub run_id: String,
    pub prompt: String,
    pub status: RunStatus,
    pub best_future_id: Option<String>,
}

pub trait PluginSink {
    fn name(&self) -> &str;

    fn post_run(&self, notice: &RunNotice) -> Result<()>;

    /// `future` is the serialized attempt (id, tool, status, result, score).
    fn post_iteration(&self, _run_id: &str, _iteration: u32, _future: &Value) -> Result<()> {
        Ok(())
    }
}

/// A plugin that failed to load or raised during a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginFailure {
    pub plugin: String,
    pub error: String,
}

#[derive(Default)]
pub struct PluginSet {
    plugins: Vec<Box<dyn PluginSink>>,
    load_failures: Vec<PluginFailure>,
}

impl PluginSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build hook plugins from config. Invalid entries are skipped and
    /// remembered as load failures.
    pub fn from_hooks(hooks: &[HookConfig]) -> Self {
        let mut set = Self::new();
        for hook in hooks {
            match HookPlugin::new(hook.clone()) {
                Ok(plugin) => set.push(Box::new(plugin)),
                Err(err) => {
                    warn!(plugin = %hook.name, error = %err, "skipping invalid hook");
                    set.load_failures.push(PluginFailure {
                        plugin: hook.name.clone(),
                        error: format!("{err:#}"),
                    });
                }
            }
        }
        set
    }

    pub fn push(&mut self, plugin: Box<dyn PluginSink>) {
        self.plugins.push(plugin);
    }

    pub fn load_failures(&self) -> &[PluginFailure] {
        &self.load_failures
    }

    /// Notify every plugin of a finished run; returns the ones that failed.
    pub fn notify_run(&self, notice: &RunNotice) -> Vec<PluginFailure> {
        self.each(|plugin| plugin.post_run(notice))
    }

    pub fn notify_iteration(&self, run_id: &str, attempt: &Attempt) -> Vec<PluginFailure> {
        if self.plugins.is_empty() {
            return Vec::new();
        }
        let future = match serde_json::to_value(attempt) {
            Ok(future) => future,
            Err(err) => {
                warn!(future_id = %attempt.id, error = %err, "cannot serialize attempt for plugins");
                return self
                    .plugins
                    .iter()
                    .map(|plugin| PluginFailure {
                        plugin: plugin.name().to_string(),
                        error: format!("serialize {}: {err}", attempt.id),
                    })
                    .collect();
            }
        };
        self.each(|plugin| plugin.post_iteration(run_id, attempt.iteration, &future))
    }

    fn each<F>(&self, mut notify: F) -> Vec<PluginFailure>
    where
        F: FnMut(&dyn PluginSink) -> Result<()>,
    {
        let mut failures = Vec::new();
        for plugin in &self.plugins {
            if let Err(err) = notify(plugin.as_ref()) {
                warn!(plugin = plugin.name(), error = %err, "plugin failed");
                failures.push(PluginFailure {
                    plugin: plugin.name().to_string(),
                    error: format!("{err:#}"),
                });
            }
        }
        failures
    }
}

/// Runs a shell command with the event exposed through environment variables:
/// `RALPH_EVENT`, `RALPH_RUN_ID` and `RALPH_EVENT_JSON`.
#[derive(Debug, Clone)]
pub struct HookPlugin {
    config: HookConfig,
}

impl HookPlugin {
    pub fn new(config: HookConfig) -> Result<Self> {
        if config.name.trim().is_empty() {
            bail!("hook name must be non-empty");
        }
        if config.command.trim().is_empty() {
            bail!("hook {} has an empty command", config.name);
        }
        Ok(Self { config })
    }

    fn fire(&self, event: &str, run_id: &str, payload: &Value) -> Result<()> {
        let json = serde_json::to_string(payload).context("serialize hook payload")?;
        let mut cmd = Command::new("sh");
        cmd.args(["-c", &self.config.command])
            .env("RALPH_EVENT", event)
            .env("RALPH_RUN_ID", run_id)
            .env("RALPH_EVENT_JSON", json);

        debug!(hook = %self.config.name, event, "running hook");
        let output = run_command_with_timeout(cmd, None, Some(HOOK_TIMEOUT), HOOK_OUTPUT_LIMIT_BYTES)
            .with_context(|| format!("run hook {}", self.config.name))?;
        if output.timed_out {
            bail!("hook timed out after {}s", HOOK_TIMEOUT.as_secs());
        }
        if !output.status.success() {
            bail!(
                "hook exited with {}: {}",
                output.exit_code(),
                output.stderr_lossy().trim()
            );
        }
        Ok(())
    }
}

impl PluginSink for HookPlugin {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn post_run(&self, notice: &RunNotice) -> Result<()> {
        if self.config.on == HookTrigger::Iteration {
            return Ok(());
        }
        let payload = serde_json::to_value(notice).context("serialize run notice")?;
        self.fire("post_run", &notice.run_id, &payload)
    }

    fn post_iteration(&self, run_id: &str, iteration: u32, future: &Value) -> Result<()> {
        if self.config.on == HookTrigger::Run {
            return Ok(());
        }
        let payload = json!({
            "run_id": run_id,
            "iteration": iteration,
            "future": future,
        });
        self.fire("post_iteration", run_id, &payload)
    }
}
