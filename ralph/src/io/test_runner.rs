//! Test-command runner: validates an agent's changes by exit code.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::core::types::{SPAWN_FAILURE_EXIT_CODE, TIMEOUT_EXIT_CODE};
use crate::io::process::run_command_with_timeout;

#[derive(Debug, Clone)]
pub struct TestRequest {
    /// Shell command string, run via `sh -c`.
    pub command: String,
    pub workdir: PathBuf,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

/// Outcome of a test command. Only `exit_code` feeds scoring.
#[derive(Debug, Clone, PartialEq)]
pub struct TestOutcome {
    pub exit_code: i32,
    pub timed_out: bool,
    pub duration: Duration,
}

pub trait TestRunner {
    fn run(&self, request: &TestRequest) -> Result<TestOutcome>;
}

/// Runs the test command through `sh -c` in the request's working directory.
pub struct ShellTestRunner;

impl TestRunner for ShellTestRunner {
    #[instrument(skip_all, fields(command = %request.command, workdir = %request.workdir.display()))]
    fn run(&self, request: &TestRequest) -> Result<TestOutcome> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&request.command)
            .current_dir(&request.workdir);

        let output = run_command_with_timeout(
            cmd,
            None,
            Some(request.timeout),
            request.output_limit_bytes,
        )
        .context("run test command")?;

        let exit_code = if output.timed_out {
            warn!(timeout_secs = request.timeout.as_secs(), "test command timed out");
            TIMEOUT_EXIT_CODE
        } else {
            output.exit_code()
        };
        info!(exit_code, "test command finished");
        Ok(TestOutcome {
            exit_code,
            timed_out: output.timed_out,
            duration: output.elapsed,
        })
    }
}

/// Run the tests, folding runner errors into a failing outcome.
///
/// A test command that cannot be spawned is indistinguishable from a failing test.
pub fn run_tests(runner: &dyn TestRunner, request: &TestRequest) -> TestOutcome {
    match runner.run(request) {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!(err = %format!("{err:#}"), "test command could not run");
            TestOutcome {
                exit_code: SPAWN_FAILURE_EXIT_CODE,
                timed_out: false,
                duration: Duration::ZERO,
            }
        }
    }
}
