//! Shared detection and invocation plumbing for CLI-backed adapters.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use crate::adapters::{AgentRequest, Detection};
use crate::core::types::AttemptResult;
use crate::io::process::run_command_with_timeout;

const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const VERSION_PROBE_LIMIT_BYTES: usize = 4096;

/// Locate `binary` on `PATH` and probe its version.
pub fn detect_binary(binary: &str) -> Detection {
    let Some(path) = which(binary) else {
        debug!(binary, "binary not found");
        return Detection {
            found: false,
            binary_path: None,
            version: None,
            notes: vec![format!("{binary} CLI not found in PATH")],
        };
    };

    let mut notes = Vec::new();
    let version = match probe_version(&path) {
        Some(version) => Some(version),
        None => {
            notes.push(format!("{binary} --version did not report a version"));
            None
        }
    };
    debug!(binary, path = %path.display(), ?version, "binary detected");
    Detection {
        found: true,
        binary_path: Some(path),
        version,
        notes,
    }
}

fn which(binary: &str) -> Option<PathBuf> {
    let output = Command::new("which").arg(binary).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if path.is_empty() {
        None
    } else {
        Some(PathBuf::from(path))
    }
}

fn probe_version(path: &Path) -> Option<String> {
    let mut cmd = Command::new(path);
    cmd.arg("--version");
    let output = run_command_with_timeout(
        cmd,
        None,
        Some(VERSION_PROBE_TIMEOUT),
        VERSION_PROBE_LIMIT_BYTES,
    )
    .ok()?;
    if output.timed_out || !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

/// Naive usage estimate: four prompt bytes per token.
pub fn estimated_cost(prompt: &str) -> Map<String, Value> {
    let mut cost = Map::new();
    cost.insert(
        "estimated_tokens".to_string(),
        json!(prompt.len() as f64 / 4.0),
    );
    cost
}

/// Run a prepared agent command and capture the outcome as an [`AttemptResult`].
///
/// Spawn failures map to exit code 1 and timeouts to 124, each with an
/// explanatory stderr.
pub fn invoke(tool: &str, mut cmd: Command, stdin: Option<&[u8]>, request: &AgentRequest) -> AttemptResult {
    cmd.current_dir(&request.cwd);
    info!(tool, cwd = %request.cwd.display(), model = ?request.model, "invoking agent");
    let started = Instant::now();

    let output = match run_command_with_timeout(cmd, stdin, request.timeout, request.output_limit_bytes) {
        Ok(output) => output,
        Err(err) => {
            warn!(tool, err = %format!("{err:#}"), "agent invocation failed");
            return AttemptResult::spawn_failure(format!("{tool}: {err:#}"), started.elapsed());
        }
    };

    if output.timed_out {
        let timeout = request.timeout.unwrap_or_default();
        warn!(tool, timeout_secs = timeout.as_secs(), "agent timed out");
        let mut result = AttemptResult::timed_out(timeout, output.elapsed, output.stdout_lossy());
        let captured = output.stderr_lossy();
        if !captured.trim().is_empty() {
            result.stderr.push('\n');
            result.stderr.push_str(&captured);
        }
        return result;
    }

    info!(tool, exit_code = output.exit_code(), "agent finished");
    AttemptResult {
        stdout: output.stdout_lossy(),
        stderr: output.stderr_lossy(),
        exit_code: output.exit_code(),
        duration_secs: output.elapsed.as_secs_f64(),
        diff: None,
        cost_info: estimated_cost(&request.prompt),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{SPAWN_FAILURE_EXIT_CODE, TIMEOUT_EXIT_CODE};

    fn request(dir: &std::path::Path, timeout: Option<Duration>) -> AgentRequest {
        AgentRequest {
            prompt: "abcdefgh".to_string(),
            cwd: dir.to_path_buf(),
            model: None,
            timeout,
            output_limit_bytes: 10_000,
        }
    }

    #[test]
    fn missing_binary_is_not_found_with_note() {
        let detection = detect_binary("ralph-no-such-agent-binary");
        assert!(!detection.found);
        assert!(detection.binary_path.is_none());
        assert_eq!(detection.notes.len(), 1);
    }

    #[test]
    fn spawn_failure_becomes_result() {
        let temp = tempfile::tempdir().expect("tempdir");
        let result = invoke(
            "ghost",
            Command::new("ralph-no-such-agent-binary"),
            None,
            &request(temp.path(), Some(Duration::from_secs(1))),
        );
        assert_eq!(result.exit_code, SPAWN_FAILURE_EXIT_CODE);
        assert!(result.stderr.contains("ghost"));
    }

    #[cfg(unix)]
    #[test]
    fn timeout_becomes_result_with_124() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("exec sleep 5");
        let result = invoke(
            "sleepy",
            cmd,
            None,
            &request(temp.path(), Some(Duration::from_millis(200))),
        );
        assert_eq!(result.exit_code, TIMEOUT_EXIT_CODE);
        assert!(result.stderr.contains("Timeout"));
    }

    #[cfg(unix)]
    #[test]
    fn timeout_returns_promptly_when_the_agent_forks() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("sleep 6; echo done");
        let started = std::time::Instant::now();
        let result = invoke(
            "forking",
            cmd,
            None,
            &request(temp.path(), Some(Duration::from_millis(300))),
        );
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(result.exit_code, TIMEOUT_EXIT_CODE);
        assert!(!result.stdout.contains("done"));
    }

    #[cfg(unix)]
    #[test]
    fn large_prompt_on_stdin_reaches_a_chatty_agent() {
        let temp = tempfile::tempdir().expect("tempdir");
        let prompt = "p".repeat(300_000);
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg("head -c 300000 /dev/zero; wc -c | tr -d ' ' >&2");
        let started = std::time::Instant::now();
        let result = invoke(
            "chatty",
            cmd,
            Some(prompt.as_bytes()),
            &request(temp.path(), Some(Duration::from_secs(5))),
        );
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stderr.trim(), "300000");
    }

    #[cfg(unix)]
    #[test]
    fn completed_run_captures_output_and_cost() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("pwd; exit 2");
        let result = invoke("shell", cmd, None, &request(temp.path(), None));
        assert_eq!(result.exit_code, 2);
        let cwd = std::fs::canonicalize(temp.path()).expect("canonicalize");
        assert_eq!(
            std::fs::canonicalize(result.stdout.trim()).expect("canonicalize stdout"),
            cwd
        );
        assert_eq!(result.cost_info["estimated_tokens"], json!(2.0));
    }
}
