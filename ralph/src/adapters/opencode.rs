//! OpenCode CLI adapter.

use std::process::Command;

use crate::adapters::cli::{detect_binary, invoke};
use crate::adapters::{AgentAdapter, AgentRequest, Capabilities, CostConfidence, Detection};
use crate::core::types::AttemptResult;

const BINARY: &str = "opencode";

pub struct OpenCodeAdapter;

impl OpenCodeAdapter {
    fn command(&self, request: &AgentRequest) -> Command {
        let mut cmd = Command::new(BINARY);
        cmd.arg("run").arg(&request.prompt);
        if let Some(model) = &request.model {
            cmd.arg("--model").arg(model);
        }
        cmd
    }
}

impl AgentAdapter for OpenCodeAdapter {
    fn detect(&self) -> Detection {
        detect_binary(BINARY)
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            name: "opencode".to_string(),
            supports_model_selection: true,
            supports_non_interactive: true,
            cost_confidence: CostConfidence::Estimated,
            supported_env_keys: vec!["OPENCODE_API_KEY".to_string()],
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
    fn omits_model_flag_without_model() {
        let request = AgentRequest {
            prompt: "add logging".to_string(),
            cwd: PathBuf::from("."),
            model: None,
            timeout: None,
            output_limit_bytes: 100,
        };
        let cmd = OpenCodeAdapter.command(&request);
        let args: Vec<&OsStr> = cmd.get_args().collect();
        assert_eq!(args, ["run", "add logging"]);
    }
}
