//! Agent adapters: a uniform capability surface over external coding-agent CLIs.
//!
//! The set of integrations is closed and registered explicitly in
//! [`builtin_adapters`]. The engine only sees the [`AgentAdapter`] trait, so
//! tests substitute scripted adapters without spawning processes.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::core::types::AttemptResult;

pub mod claude;
pub mod cli;
pub mod codex;
pub mod gemini;
pub mod opencode;

pub use claude::ClaudeAdapter;
pub use codex::CodexAdapter;
pub use gemini::GeminiAdapter;
pub use opencode::OpenCodeAdapter;

/// How much to trust the cost figures an adapter reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CostConfidence {
    Exact,
    Estimated,
    Opaque,
}

impl CostConfidence {
    pub fn as_str(self) -> &'static str {
        match self {
            CostConfidence::Exact => "exact",
            CostConfidence::Estimated => "estimated",
            CostConfidence::Opaque => "opaque",
        }
    }
}

/// Static facts about an adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub name: String,
    pub supports_model_selection: bool,
    pub supports_non_interactive: bool,
    pub cost_confidence: CostConfidence,
    pub supported_env_keys: Vec<String>,
}

/// Result of probing for an adapter's binary.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Detection {
    pub found: bool,
    pub binary_path: Option<PathBuf>,
    pub version: Option<String>,
    pub notes: Vec<String>,
}

/// Parameters for one agent invocation.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub prompt: String,
    pub cwd: PathBuf,
    pub model: Option<String>,
    pub timeout: Option<Duration>,
    pub output_limit_bytes: usize,
}

pub trait AgentAdapter {
    fn detect(&self) -> Detection;

    fn capabilities(&self) -> Capabilities;

    /// Run the agent to completion. Never fails: spawn errors and timeouts
    /// are reported through the returned result.
    fn run(&self, request: &AgentRequest) -> AttemptResult;
}

/// Every known adapter, in scheduling order.
pub fn builtin_adapters() -> Vec<Box<dyn AgentAdapter>> {
    vec![
        Box::new(GeminiAdapter),
        Box::new(OpenCodeAdapter),
        Box::new(ClaudeAdapter),
        Box::new(CodexAdapter),
    ]
}
