//! Codex CLI adapter (`codex exec`, prompt on stdin).

use std::process::Command;

use crate::adapters::cli::{detect_binary, invoke};
use crate::adapters::{AgentAdapter, AgentRequest, Capabilities, CostConfidence, Detection};
use crate::core::types::AttemptResult;

const BINARY: &str = "codex";

pub struct CodexAdapter;

impl CodexAdapter {
    fn command(&self, request: &AgentRequest) -> Command {
        let mut cmd = Command::new(BINARY);
        // Run directories are not git repositories.
        cmd.arg("exec").arg("--skip-git-repo-check");
        if let Some(model) = &request.model {
            cmd.arg("-m").arg(model);
        }
        cmd.arg("-");
        cmd
    }
}

impl AgentAdapter for CodexAdapter {
    fn detect(&self) -> Detection {
        detect_binary(BINARY)
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            name: "codex".to_string(),
            supports_model_selection: true,
            supports_non_interactive: true,
            cost_confidence: CostConfidence::Exact,
            supported_env_keys: vec!["OPENAI_API_KEY".to_string()],
        }
    }

    fn run(&self, request: &AgentRequest) -> AttemptResult {
        invoke(
            BINARY,
            self.command(request),
            Some(request.prompt.as_bytes()),
            request,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;
    use std::path::PathBuf;

    #[test]
    fn reads_prompt_from_stdin() {
        let request = AgentRequest {
            prompt: "write docs".to_string(),
            cwd: PathBuf::from("."),
            model: Some("o4-mini".to_string()),
            timeout: None,
            output_limit_bytes: 100,
        };
        let cmd = CodexAdapter.command(&request);
        let args: Vec<&OsStr> = cmd.get_args().collect();
        assert_eq!(args, ["exec", "--skip-git-repo-check", "-m", "o4-mini", "-"]);
        assert!(!args.iter().any(|arg| *arg == "write docs"));
    }
}
