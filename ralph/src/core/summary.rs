//! Derive a run summary by replaying its event log.

use serde::Serialize;

use crate::core::event::{
    BEST_FUTURE_SELECTED, ITERATION_COMPLETED, ITERATION_STARTED, LogRecord, RUN_STARTED,
    RUN_SUCCESS_STOP,
};

/// Coarse run state as observed from the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Only `run_started` recorded (not launched yet, or no agents were available).
    Pending,
    /// Iterations recorded but no winner selected yet.
    Running,
    /// A winner was selected and its validation passed.
    Succeeded,
    /// A winner was selected but its validation failed.
    Failed,
}

impl RunState {
    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Pending => "pending",
            RunState::Running => "running",
            RunState::Succeeded => "succeeded",
            RunState::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BestFuture {
    pub future_id: String,
    pub score: f64,
    pub exit_code: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub prompt: Option<String>,
    pub iterations_started: u32,
    pub iterations_completed: u32,
    pub stopped_on_success: bool,
    pub best: Option<BestFuture>,
    pub state: RunState,
}

/// Replay `records` in order. Unknown events are ignored.
pub fn summarize(records: &[LogRecord]) -> RunSummary {
    let mut prompt = None;
    let mut iterations_started = 0u32;
    let mut iterations_completed = 0u32;
    let mut stopped_on_success = false;
    let mut best = None;

    for record in records {
        match record.event.as_str() {
            RUN_STARTED => prompt = record.str_field("prompt").map(str::to_string),
            ITERATION_STARTED => iterations_started += 1,
            ITERATION_COMPLETED => iterations_completed += 1,
            RUN_SUCCESS_STOP => stopped_on_success = true,
            BEST_FUTURE_SELECTED => {
                if let Some(future_id) = record.str_field("future_id") {
                    best = Some(BestFuture {
                        future_id: future_id.to_string(),
                        score: record.f64_field("score").unwrap_or(f64::NAN),
                        exit_code: exit_code_for(records, future_id),
                    });
                }
            }
            _ => {}
        }
    }

    let state = match &best {
        Some(best) if best.exit_code == Some(0) => RunState::Succeeded,
        Some(_) => RunState::Failed,
        None if iterations_started > 0 => RunState::Running,
        None => RunState::Pending,
    };

    RunSummary {
        prompt,
        iterations_started,
        iterations_completed,
        stopped_on_success,
        best,
        state,
    }
}

fn exit_code_for(records: &[LogRecord], future_id: &str) -> Option<i64> {
    records
        .iter()
        .filter(|record| record.is(ITERATION_COMPLETED))
        .find(|record| record.str_field("future_id") == Some(future_id))
        .and_then(|record| record.i64_field("exit_code"))
}
