//! Claude Code CLI adapter (print mode).

use std::process::Command;

use crate::adapters::cli::{detect_binary, invoke};
use crate::adapters::{AgentAdapter, AgentRequest, Capabilities, CostConfidence, Detection};
use crate::core::types::AttemptResult;

const BINARY: &str = "claude";

pub struct ClaudeAdapter;

impl ClaudeAdapter {
    fn command(&self, request: &AgentRequest) -> Command {
        let mut cmd = Command::new(BINARY);
        cmd.arg("-p").arg(&request.prompt);
        if let Some(model) = &request.model {
            cmd.arg("--model").arg(model);
        }
        cmd
    }
}

impl AgentAdapter for ClaudeAdapter {
    fn detect(&self) -> Detection {
        detect_binary(BINARY)
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            name: "claude".to_string(),
            supports_model_selection: true,
            supports_non_interactive: true,
            cost_confidence: CostConfidence::Estimated,
            supported_env_keys: vec!["ANTHROPIC_API_KEY".to_string()],
        }
    }

    fn run(&self, request: &AgentRequest) -> AttemptResult {
        invoke(BINARY, self.command(request), None, request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;
    use std::path::PathBuf;

    #[test]
    fn uses_print_mode() {
        let request = AgentRequest {
            prompt: "rename foo".to_string(),
            cwd: PathBuf::from("."),
            model: Some("sonnet".to_string()),
            timeout: None,
            output_limit_bytes: 100,
        };
        let cmd = ClaudeAdapter.command(&request);
        let args: Vec<&OsStr> = cmd.get_args().collect();
        assert_eq!(args, ["-p", "rename foo", "--model", "sonnet"]);
    }
}
