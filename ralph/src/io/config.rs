//! User settings stored as TOML (default `<config dir>/future-ralph/config.toml`).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::types::{MaxIters, RunConfig};

/// Persisted defaults for every run.
///
/// This file is intended to be edited by humans. Missing fields fall back to
/// defaults and unknown fields are ignored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Maximum number of futures explored per run.
    pub max_iters: u32,

    /// Per-iteration agent timeout in seconds.
    pub timeout_per_iter: u64,

    /// Shell command that validates an agent's changes.
    pub test_cmd: String,

    /// Timeout for the test command in seconds.
    pub test_timeout_secs: u64,

    pub stop_on_success: bool,

    pub auto_apply: bool,

    /// Allow-list of tool names. Empty allows every detected tool.
    pub active_tools: Vec<String>,

    /// Directory holding one subdirectory per run.
    pub runs_dir: PathBuf,

    /// Truncate captured agent/test output beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Tool name → model for adapters that support model selection.
    pub models: BTreeMap<String, String>,

    pub hooks: Vec<HookConfig>,
}

/// When a hook fires.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum HookTrigger {
    #[default]
    Run,
    Iteration,
    Both,
}

/// Shell command notified after runs and/or iterations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HookConfig {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub on: HookTrigger,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_iters: 5,
            timeout_per_iter: 300,
            test_cmd: "pytest".to_string(),
            test_timeout_secs: 30 * 60,
            stop_on_success: true,
            auto_apply: false,
            active_tools: Vec::new(),
            runs_dir: PathBuf::from("runs"),
            output_limit_bytes: 1_000_000,
            models: BTreeMap::new(),
            hooks: Vec::new(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.max_iters == 0 {
            return Err(anyhow!("max_iters must be > 0"));
        }
        if self.timeout_per_iter == 0 {
            return Err(anyhow!("timeout_per_iter must be > 0"));
        }
        if self.test_timeout_secs == 0 {
            return Err(anyhow!("test_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.test_cmd.trim().is_empty() {
            return Err(anyhow!("test_cmd must be a non-empty command"));
        }
        Ok(())
    }

    /// Build the immutable per-run config, applying an explicit iteration override.
    pub fn run_config(&self, max_iters: MaxIters) -> RunConfig {
        RunConfig {
            max_iters: max_iters.resolve(self.max_iters),
            timeout_per_iter: Duration::from_secs(self.timeout_per_iter),
            test_cmd: self.test_cmd.clone(),
            test_timeout: Duration::from_secs(self.test_timeout_secs),
            stop_on_success: self.stop_on_success,
            auto_apply: self.auto_apply,
            output_limit_bytes: self.output_limit_bytes,
            models: self.models.clone(),
        }
    }

    /// True when `tool` passes the allow-list.
    pub fn allows_tool(&self, tool: &str) -> bool {
        self.active_tools.is_empty() || self.active_tools.iter().any(|t| t == tool)
    }
}

/// Default settings location, if the platform has a config directory.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("future-ralph").join("config.toml"))
}

/// Load settings from a TOML file.
///
/// If the file is missing, returns `Settings::default()`.
pub fn load_config(path: &Path) -> Result<Settings> {
    if !path.exists() {
        debug!(path = %path.display(), "config missing, using defaults");
        let cfg = Settings::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: Settings =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    debug!(path = %path.display(), "config loaded");
    Ok(cfg)
}

/// Atomically write settings to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &Settings) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
