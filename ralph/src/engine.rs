//! Bounded attempt loop for one run.
//!
//! Each iteration picks an adapter round-robin, invokes it in the run
//! directory, validates with the test command, scores, and records events.
//! Iterations run strictly one after another.

use anyhow::{Result, bail};
use serde_json::json;
use tracing::{debug, info, instrument};

use crate::adapters::{AgentAdapter, AgentRequest};
use crate::core::event::{
    BEST_FUTURE_SELECTED, ITERATION_COMPLETED, ITERATION_STARTED, RUN_SUCCESS_STOP,
};
use crate::core::schedule::round_robin;
use crate::core::scoring::ScoringPolicy;
use crate::core::types::{Attempt, RunConfig};
use crate::io::run_store::Run;
use crate::io::test_runner::{TestRequest, TestRunner, run_tests};

/// Where the engine is in its per-run state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    NotStarted,
    Iterating,
    StoppedEarly,
    ExhaustedIterations,
    Selected,
}

/// Why the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// An attempt passed with `stop_on_success` set.
    StoppedEarly { iteration: u32 },
    ExhaustedIterations,
}

#[derive(Debug, Clone)]
pub struct EngineOutcome {
    pub best: Option<Attempt>,
    pub stop: StopReason,
    pub iterations: u32,
}

pub struct IterationEngine<'a> {
    run: &'a Run,
    config: &'a RunConfig,
    policy: &'a dyn ScoringPolicy,
    tests: &'a dyn TestRunner,
    attempts: Vec<Attempt>,
    phase: EnginePhase,
}

impl<'a> IterationEngine<'a> {
    pub fn new(
        run: &'a Run,
        config: &'a RunConfig,
        policy: &'a dyn ScoringPolicy,
        tests: &'a dyn TestRunner,
    ) -> Self {
        Self {
            run,
            config,
            policy,
            tests,
            attempts: Vec::new(),
            phase: EnginePhase::NotStarted,
        }
    }

    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    /// Attempts recorded so far, in iteration order.
    pub fn attempts(&self) -> &[Attempt] {
        &self.attempts
    }

    pub fn into_attempts(self) -> Vec<Attempt> {
        self.attempts
    }

    /// Execute one iteration with `adapter` and record the completed attempt.
    #[instrument(skip_all, fields(run_id = %self.run.id, iteration = iteration))]
    pub fn run_iteration(
        &mut self,
        iteration: u32,
        adapter: &dyn AgentAdapter,
        prompt: &str,
    ) -> Result<&Attempt> {
        let caps = adapter.capabilities();
        let mut attempt = Attempt::new(iteration, caps.name.clone());
        self.run.log.append(
            ITERATION_STARTED,
            json!({
                "iteration": iteration,
                "future_id": attempt.id,
                "tool": attempt.tool_name,
            }),
        )?;

        let model = if caps.supports_model_selection {
            self.config.models.get(&caps.name).cloned()
        } else {
            None
        };
        let request = AgentRequest {
            prompt: prompt.to_string(),
            cwd: self.run.dir.clone(),
            model,
            timeout: Some(self.config.timeout_per_iter),
            output_limit_bytes: self.config.output_limit_bytes,
        };

        attempt.start();
        debug!(future_id = %attempt.id, tool = %attempt.tool_name, "attempt running");
        let mut result = adapter.run(&request);
        let agent_exit_code = result.exit_code;

        // Success means "tests pass after the agent's changes", not "the agent exited zero".
        let tests = run_tests(
            self.tests,
            &TestRequest {
                command: self.config.test_cmd.clone(),
                workdir: self.run.dir.clone(),
                timeout: self.config.test_timeout,
                output_limit_bytes: self.config.output_limit_bytes,
            },
        );
        result.exit_code = tests.exit_code;

        attempt.complete(result);
        attempt.score = self.policy.score(&attempt);
        info!(
            future_id = %attempt.id,
            tool = %attempt.tool_name,
            agent_exit_code,
            test_exit_code = tests.exit_code,
            score = attempt.score,
            "attempt completed"
        );
        self.run.log.append(
            ITERATION_COMPLETED,
            json!({
                "future_id": attempt.id,
                "score": attempt.score,
                "exit_code": tests.exit_code,
            }),
        )?;

        self.attempts.push(attempt);
        Ok(&self.attempts[self.attempts.len() - 1])
    }

    /// Run up to `max_iters` iterations, then select the best attempt.
    ///
    /// `on_iteration` fires after every completed attempt.
    #[instrument(skip_all, fields(run_id = %self.run.id, max_iters = self.config.max_iters))]
    pub fn execute_run<F: FnMut(&Attempt)>(
        &mut self,
        prompt: &str,
        adapters: &[&dyn AgentAdapter],
        mut on_iteration: F,
    ) -> Result<EngineOutcome> {
        if adapters.is_empty() {
            bail!("no adapters available for run {}", self.run.id);
        }
        if self.phase != EnginePhase::NotStarted {
            bail!("run {} already executed by this engine", self.run.id);
        }

        self.phase = EnginePhase::Iterating;
        let stop_on_success = self.config.stop_on_success;
        let mut stop = StopReason::ExhaustedIterations;
        let mut iterations = 0u32;
        for iteration in 1..=self.config.max_iters {
            let Some(adapter) = round_robin(adapters, iteration) else {
                break;
            };
            let attempt = self.run_iteration(iteration, *adapter, prompt)?;
            iterations = iteration;
            on_iteration(attempt);
            let passed = attempt.passed();
            let future_id = attempt.id.clone();

            if passed && stop_on_success {
                self.run
                    .log
                    .append(RUN_SUCCESS_STOP, json!({"future_id": future_id}))?;
                info!(future_id = %future_id, "stopping on success");
                stop = StopReason::StoppedEarly { iteration };
                break;
            }
        }
        self.phase = match stop {
            StopReason::StoppedEarly { .. } => EnginePhase::StoppedEarly,
            StopReason::ExhaustedIterations => EnginePhase::ExhaustedIterations,
        };

        let best = self.policy.select_best(&self.attempts).cloned();
        if let Some(best) = &best {
            self.run.log.append(
                BEST_FUTURE_SELECTED,
                json!({"future_id": best.id, "score": best.score}),
            )?;
            info!(future_id = %best.id, score = best.score, "best future selected");
        }
        self.phase = EnginePhase::Selected;

        Ok(EngineOutcome {
            best,
            stop,
            iterations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scoring::DefaultScoringPolicy;
    use crate::test_support::{ScriptedAdapter, ScriptedTestRunner, temp_store};

    #[test]
    fn phases_advance_through_selection() {
        let (_temp, store) = temp_store();
        let run = store.create_run("p").expect("run");
        let config = RunConfig {
            max_iters: 2,
            ..RunConfig::default()
        };
        let tests = ScriptedTestRunner::always(1);
        let adapter = ScriptedAdapter::new("a");
        let mut engine = IterationEngine::new(&run, &config, &DefaultScoringPolicy, &tests);
        assert_eq!(engine.phase(), EnginePhase::NotStarted);

        let outcome = engine
            .execute_run("p", &[&adapter], |_| {})
            .expect("execute");
        assert_eq!(engine.phase(), EnginePhase::Selected);
        assert_eq!(outcome.stop, StopReason::ExhaustedIterations);
        assert_eq!(outcome.iterations, 2);
    }

    #[test]
    fn empty_adapter_list_is_rejected() {
        let (_temp, store) = temp_store();
        let run = store.create_run("p").expect("run");
        let config = RunConfig::default();
        let tests = ScriptedTestRunner::always(0);
        let mut engine = IterationEngine::new(&run, &config, &DefaultScoringPolicy, &tests);
        assert!(engine.execute_run("p", &[], |_| {}).is_err());
        assert_eq!(engine.phase(), EnginePhase::NotStarted);
    }

    #[test]
    fn agent_exit_code_is_overwritten_by_tests() {
        let (_temp, store) = temp_store();
        let run = store.create_run("p").expect("run");
        let config = RunConfig::default();
        let tests = ScriptedTestRunner::always(0);
        let adapter = ScriptedAdapter::new("a").with_exit_codes(&[9]);
        let mut engine = IterationEngine::new(&run, &config, &DefaultScoringPolicy, &tests);

        let attempt = engine.run_iteration(1, &adapter, "p").expect("iteration");
        assert_eq!(attempt.exit_code(), Some(0));
        assert_eq!(attempt.score, 100.0);
    }

    #[test]
    fn configured_model_is_passed_to_adapter() {
        let (_temp, store) = temp_store();
        let run = store.create_run("p").expect("run");
        let mut config = RunConfig::default();
        config.models.insert("a".to_string(), "big-model".to_string());
        let tests = ScriptedTestRunner::always(0);
        let adapter = ScriptedAdapter::new("a");
        let mut engine = IterationEngine::new(&run, &config, &DefaultScoringPolicy, &tests);
        engine.run_iteration(1, &adapter, "p").expect("iteration");

        let requests = adapter.requests();
        assert_eq!(requests[0].model.as_deref(), Some("big-model"));
        assert_eq!(requests[0].cwd, run.dir);
        assert_eq!(requests[0].timeout, Some(config.timeout_per_iter));
    }
}
