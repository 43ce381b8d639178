//! Orchestrator wiring: agent filtering, execution modes, resume and plugins.

use ralph::core::event::{ITERATION_STARTED, RUN_STARTED};
use ralph::core::summary::RunState;
use ralph::core::types::MaxIters;
use ralph::io::config::Settings;
use ralph::io::run_store::RunStore;
use ralph::orchestrator::{LaunchMode, LaunchResult, Orchestrator, RunReport};
use ralph::plugin::RunStatus;
use ralph::test_support::{
    FailingPlugin, RecordingLauncher, RecordingPlugin, ScriptedAdapter, ScriptedTestRunner,
    temp_store,
};

fn orchestrator(
    settings: Settings,
    store: RunStore,
    adapters: &[&ScriptedAdapter],
    tests: &ScriptedTestRunner,
) -> Orchestrator {
    Orchestrator::new(settings, store)
        .with_adapters(
            adapters
                .iter()
                .map(|adapter| Box::new((*adapter).clone()) as Box<dyn ralph::adapters::AgentAdapter>)
                .collect(),
        )
        .with_test_runner(Box::new(tests.clone()))
}

fn completed(result: LaunchResult) -> RunReport {
    match result {
        LaunchResult::Completed(report) => report,
        other => panic!("expected completed run, got {other:?}"),
    }
}

#[test]
fn missing_and_disallowed_agents_are_skipped() {
    let (_temp, store) = temp_store();
    let settings = Settings {
        active_tools: vec!["claude".to_string(), "codex".to_string()],
        max_iters: 2,
        ..Settings::default()
    };
    let gemini = ScriptedAdapter::new("gemini");
    let claude = ScriptedAdapter::missing("claude");
    let codex = ScriptedAdapter::new("codex");
    let tests = ScriptedTestRunner::always(1);
    let orchestrator = orchestrator(settings, store, &[&gemini, &claude, &codex], &tests);

    let names: Vec<String> = orchestrator
        .available_adapters()
        .iter()
        .map(|adapter| adapter.capabilities().name)
        .collect();
    assert_eq!(names, vec!["codex"]);

    let run = orchestrator.create_run("p").expect("run");
    let outcome = orchestrator
        .start(&run, "p", LaunchMode::Foreground, MaxIters::Default)
        .expect("start");
    assert_eq!(outcome.agents, vec!["codex"]);
    let report = completed(outcome.result);
    assert!(report.attempts.iter().all(|a| a.tool_name == "codex"));
    assert_eq!(gemini.calls(), 0);
    assert_eq!(codex.calls(), 2);
}

#[test]
fn statuses_detected_up_front_are_reused_for_the_run() {
    let (_temp, store) = temp_store();
    let settings = Settings {
        max_iters: 2,
        ..Settings::default()
    };
    let codex = ScriptedAdapter::new("codex");
    let tests = ScriptedTestRunner::always(0);
    let orchestrator = orchestrator(settings, store, &[&codex], &tests);

    let statuses = orchestrator.agent_statuses();
    assert_eq!(codex.detections(), 1);

    let run = orchestrator.create_run("p").expect("run");
    let outcome = orchestrator
        .start_with_agents(&run, "p", LaunchMode::Foreground, MaxIters::Default, &statuses)
        .expect("start");

    assert_eq!(outcome.agents, vec!["codex"]);
    assert_eq!(codex.detections(), 1);
    assert!(codex.calls() > 0);
}

#[test]
fn start_skips_adapters_missing_from_given_statuses() {
    let (_temp, store) = temp_store();
    let gemini = ScriptedAdapter::new("gemini");
    let codex = ScriptedAdapter::new("codex");
    let tests = ScriptedTestRunner::always(0);
    let orchestrator = orchestrator(Settings::default(), store, &[&gemini, &codex], &tests);

    let statuses: Vec<_> = orchestrator
        .agent_statuses()
        .into_iter()
        .filter(|status| status.capabilities.name == "codex")
        .collect();
    let run = orchestrator.create_run("p").expect("run");
    let outcome = orchestrator
        .start_with_agents(&run, "p", LaunchMode::Foreground, MaxIters::Explicit(1), &statuses)
        .expect("start");

    assert_eq!(outcome.agents, vec!["codex"]);
    assert_eq!(gemini.calls(), 0);
}

#[test]
fn no_agents_records_only_run_started() {
    let (_temp, store) = temp_store();
    let missing = ScriptedAdapter::missing("gemini");
    let tests = ScriptedTestRunner::always(0);
    let orchestrator = orchestrator(Settings::default(), store, &[&missing], &tests);

    let run = orchestrator.create_run("p").expect("run");
    let outcome = orchestrator
        .start(&run, "p", LaunchMode::Foreground, MaxIters::Default)
        .expect("start");

    assert!(matches!(outcome.result, LaunchResult::NoAgents));
    let events: Vec<String> = run
        .log
        .read_events()
        .expect("events")
        .into_iter()
        .map(|record| record.event)
        .collect();
    assert_eq!(events, vec![RUN_STARTED]);
    assert!(tests.requests().is_empty());
    assert_eq!(
        orchestrator.run_summary(&run.id).expect("summary").state,
        RunState::Pending
    );
}

#[test]
fn foreground_success_reports_best_and_notifies_plugins() {
    let (_temp, store) = temp_store();
    let adapter = ScriptedAdapter::new("gemini");
    let tests = ScriptedTestRunner::sequence(&[1, 0]);
    let plugin = RecordingPlugin::new();
    let orchestrator = orchestrator(Settings::default(), store, &[&adapter], &tests)
        .with_plugin(Box::new(plugin.clone()));

    let run = orchestrator.create_run("p").expect("run");
    let report = completed(
        orchestrator
            .start(&run, "p", LaunchMode::Foreground, MaxIters::Explicit(4))
            .expect("start")
            .result,
    );

    assert_eq!(report.status, RunStatus::Success);
    assert_eq!(report.best.as_ref().map(|b| b.id.as_str()), Some("future_2"));
    assert_eq!(report.attempts.len(), 2);
    assert!(report.plugin_failures.is_empty());
    assert_eq!(
        plugin.events(),
        vec!["iteration:future_1", "iteration:future_2", "run:success:future_2"]
    );

    let summary = orchestrator.run_summary(&run.id).expect("summary");
    assert_eq!(summary.state, RunState::Succeeded);
    assert!(summary.stopped_on_success);
}

#[test]
fn explicit_max_iters_overrides_settings() {
    let (_temp, store) = temp_store();
    let settings = Settings {
        max_iters: 5,
        stop_on_success: false,
        ..Settings::default()
    };
    let adapter = ScriptedAdapter::new("gemini");
    let tests = ScriptedTestRunner::always(1);
    let orchestrator = orchestrator(settings, store, &[&adapter], &tests);

    let run = orchestrator.create_run("p").expect("run");
    let report = completed(
        orchestrator
            .start(&run, "p", LaunchMode::Foreground, MaxIters::Explicit(2))
            .expect("start")
            .result,
    );
    assert_eq!(report.attempts.len(), 2);
    assert_eq!(report.status, RunStatus::Failed);
}

#[test]
fn detached_start_hands_off_without_iterating() {
    let (_temp, store) = temp_store();
    let adapter = ScriptedAdapter::new("gemini");
    let tests = ScriptedTestRunner::always(0);
    let launcher = RecordingLauncher::new();
    let orchestrator = orchestrator(Settings::default(), store, &[&adapter], &tests)
        .with_launcher(Box::new(launcher.clone()));

    let run = orchestrator.create_run("p").expect("run");
    let outcome = orchestrator
        .start(&run, "p", LaunchMode::Detached, MaxIters::Explicit(3))
        .expect("start");

    assert!(matches!(outcome.result, LaunchResult::Detached(_)));
    let launches = launcher.launches();
    assert_eq!(launches.len(), 1);
    assert_eq!(launches[0].run_id, run.id);
    assert_eq!(launches[0].prompt, "p");
    assert_eq!(launches[0].max_iters, MaxIters::Explicit(3));
    assert_eq!(adapter.calls(), 0);
    assert!(
        !run.log
            .read_events()
            .expect("events")
            .iter()
            .any(|record| record.is(ITERATION_STARTED))
    );
}

#[test]
fn resume_continues_an_existing_run() {
    let (_temp, store) = temp_store();
    let adapter = ScriptedAdapter::new("gemini");
    let tests = ScriptedTestRunner::always(0);
    let orchestrator = orchestrator(Settings::default(), store, &[&adapter], &tests);

    let run = orchestrator.create_run("p").expect("run");
    let outcome = orchestrator
        .resume(&run.id, "p", MaxIters::Default)
        .expect("resume");

    let report = completed(outcome.result);
    assert_eq!(report.run_id, run.id);
    assert_eq!(report.status, RunStatus::Success);
    assert_eq!(adapter.requests()[0].cwd, run.dir);
}

#[test]
fn resume_rejects_unknown_run() {
    let (_temp, store) = temp_store();
    let adapter = ScriptedAdapter::new("gemini");
    let tests = ScriptedTestRunner::always(0);
    let orchestrator = orchestrator(Settings::default(), store, &[&adapter], &tests);

    assert!(orchestrator.resume("nope", "p", MaxIters::Default).is_err());
    assert!(orchestrator.resume("../escape", "p", MaxIters::Default).is_err());
}

#[test]
fn plugin_failure_does_not_fail_the_run() {
    let (_temp, store) = temp_store();
    let adapter = ScriptedAdapter::new("gemini");
    let tests = ScriptedTestRunner::always(0);
    let recorder = RecordingPlugin::new();
    let orchestrator = orchestrator(Settings::default(), store, &[&adapter], &tests)
        .with_plugin(Box::new(FailingPlugin))
        .with_plugin(Box::new(recorder.clone()));

    let run = orchestrator.create_run("p").expect("run");
    let report = completed(
        orchestrator
            .start(&run, "p", LaunchMode::Foreground, MaxIters::Default)
            .expect("start")
            .result,
    );

    assert_eq!(report.status, RunStatus::Success);
    let failed: Vec<&str> = report
        .plugin_failures
        .iter()
        .map(|failure| failure.plugin.as_str())
        .collect();
    assert_eq!(failed, vec!["failing", "failing"]);
    assert_eq!(recorder.events(), vec!["iteration:future_1", "run:success:future_1"]);
}

#[test]
fn summaries_list_newest_first() {
    let (_temp, store) = temp_store();
    let adapter = ScriptedAdapter::new("gemini");
    let tests = ScriptedTestRunner::always(0);
    let orchestrator = orchestrator(Settings::default(), store, &[&adapter], &tests);

    let first = orchestrator.create_run("one").expect("run");
    let second = orchestrator.create_run("two").expect("run");
    let summaries = orchestrator.run_summaries().expect("summaries");

    let mut expected = vec![first.id, second.id];
    expected.sort();
    expected.reverse();
    let ids: Vec<String> = summaries.iter().map(|(id, _)| id.clone()).collect();
    assert_eq!(ids, expected);
    assert!(summaries.iter().all(|(_, summary)| summary.is_ok()));
}
