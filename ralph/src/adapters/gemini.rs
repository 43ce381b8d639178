//! Gemini CLI adapter.

use std::process::Command;

use crate::adapters::cli::{detect_binary, invoke};
use crate::adapters::{AgentAdapter, AgentRequest, Capabilities, CostConfidence, Detection};
use crate::core::types::AttemptResult;

const BINARY: &str = "gemini";

pub struct GeminiAdapter;

impl GeminiAdapter {
    fn command(&self, request: &AgentRequest) -> Command {
        let mut cmd = Command::new(BINARY);
        cmd.arg("prompt").arg(&request.prompt);
        if let Some(model) = &request.model {
            cmd.arg("--model").arg(model);
        }
        cmd
    }
}

impl AgentAdapter for GeminiAdapter {
    fn detect(&self) -> Detection {
        detect_binary(BINARY)
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            name: "gemini".to_string(),
            supports_model_selection: true,
            supports_non_interactive: true,
            cost_confidence: CostConfidence::Estimated,
            supported_env_keys: vec!["GEMINI_API_KEY".to_string()],
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
    fn passes_prompt_and_model_as_arguments() {
        let request = AgentRequest {
            prompt: "fix the parser".to_string(),
            cwd: PathBuf::from("."),
            model: Some("gemini-2.5-pro".to_string()),
            timeout: None,
            output_limit_bytes: 100,
        };
        let cmd = GeminiAdapter.command(&request);
        let args: Vec<&OsStr> = cmd.get_args().collect();
        assert_eq!(cmd.get_program(), "gemini");
        assert_eq!(args, ["prompt", "fix the parser", "--model", "gemini-2.5-pro"]);
    }
}
