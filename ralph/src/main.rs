//! `ralph`: explore candidate futures for a prompt with coding-agent CLIs.
//!
//! Each run lives in `<runs_dir>/<run_id>/` with an append-only `run.jsonl`
//! event log. Runs execute in the foreground or in a detached worker that
//! re-enters this binary through the hidden `resume` command.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::DateTime;
use clap::{Parser, Subcommand};
use serde_json::Value;

use ralph::core::summary::summarize;
use ralph::core::types::MaxIters;
use ralph::exit_codes;
use ralph::io::config::{Settings, default_config_path, load_config, write_config};
use ralph::io::run_store::RunStore;
use ralph::logging;
use ralph::orchestrator::{
    LaunchMode, LaunchOutcome, LaunchResult, Orchestrator, RunReport, SelfRespawn,
};
use ralph::plugin::{PluginSink, RunNotice, RunStatus};

#[derive(Parser)]
#[command(
    name = "ralph",
    version,
    about = "Explore candidate futures with coding agents and keep the best"
)]
struct Cli {
    /// Settings file (defaults to `<config dir>/future-ralph/config.toml`).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override `runs_dir` from the settings file.
    #[arg(long, global = true, value_name = "DIR")]
    runs_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Explore futures for PROMPT.
    Run {
        prompt: String,
        /// Return immediately and continue in a background worker.
        #[arg(short, long)]
        detach: bool,
        /// Override `max_iters` for this run.
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        max_iters: Option<u32>,
    },
    /// Continue a detached run (internal).
    #[command(hide = true)]
    Resume {
        run_id: String,
        prompt: String,
        /// Positive number or `default`.
        max_iters: MaxIters,
    },
    /// List runs, newest first.
    Status,
    /// Show the outcome of one run.
    Results { run_id: String },
    /// Show which agent CLIs are installed and allowed.
    Agents,
    /// Inspect or create the settings file.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the effective settings.
    Show,
    /// Write default settings to the settings file.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config_path = match cli.config.clone() {
        Some(path) => Some(path),
        None => default_config_path(),
    };
    let settings = match &config_path {
        Some(path) => load_config(path)?,
        None => Settings::default(),
    };

    match cli.command {
        Command::Config { command } => cmd_config(command, config_path, &settings),
        Command::Run {
            ref prompt,
            detach,
            max_iters,
        } => {
            let orchestrator = build_orchestrator(&cli, settings)?;
            cmd_run(&orchestrator, prompt, detach, MaxIters::from(max_iters))
        }
        Command::Resume {
            ref run_id,
            ref prompt,
            max_iters,
        } => {
            let orchestrator = build_orchestrator(&cli, settings)?;
            cmd_resume(&orchestrator, run_id, prompt, max_iters)
        }
        Command::Status => cmd_status(&build_orchestrator(&cli, settings)?),
        Command::Results { ref run_id } => {
            cmd_results(&build_orchestrator(&cli, settings)?, run_id)
        }
        Command::Agents => cmd_agents(&build_orchestrator(&cli, settings)?),
    }
}

fn build_orchestrator(cli: &Cli, settings: Settings) -> Result<Orchestrator> {
    let runs_dir = cli
        .runs_dir
        .clone()
        .unwrap_or_else(|| settings.runs_dir.clone());
    let store = RunStore::new(runs_dir)?;

    // The worker must resolve the same settings and runs directory.
    let mut launcher = SelfRespawn::new();
    if let Some(path) = &cli.config {
        launcher = launcher.forward_arg("--config").forward_arg(path);
    }
    if let Some(dir) = &cli.runs_dir {
        launcher = launcher.forward_arg("--runs-dir").forward_arg(dir);
    }

    Ok(Orchestrator::new(settings, store)
        .with_launcher(Box::new(launcher))
        .with_plugin(Box::new(ProgressPrinter)))
}

fn cmd_run(
    orchestrator: &Orchestrator,
    prompt: &str,
    detach: bool,
    max_iters: MaxIters,
) -> Result<i32> {
    println!("Exploring futures for: {prompt}");
    let run = orchestrator.create_run(prompt)?;
    println!("Run ID: {}", run.id);

    let statuses = orchestrator.agent_statuses();
    for status in statuses.iter().filter(|status| status.usable()) {
        println!("Found agent: {}", status.capabilities.name);
    }

    let mode = if detach {
        LaunchMode::Detached
    } else {
        LaunchMode::Foreground
    };
    let outcome = orchestrator.start_with_agents(&run, prompt, mode, max_iters, &statuses)?;
    Ok(report_outcome(&outcome))
}

fn cmd_resume(
    orchestrator: &Orchestrator,
    run_id: &str,
    prompt: &str,
    max_iters: MaxIters,
) -> Result<i32> {
    let outcome = orchestrator.resume(run_id, prompt, max_iters)?;
    Ok(report_outcome(&outcome))
}

fn report_outcome(outcome: &LaunchOutcome) -> i32 {
    match &outcome.result {
        LaunchResult::NoAgents => {
            eprintln!(
                "Error: No supported agents found. Install one of: gemini, opencode, claude, codex."
            );
            exit_codes::NO_AGENTS
        }
        LaunchResult::Detached(handle) => {
            match handle.pid {
                Some(pid) => println!("Running in background (pid {pid})."),
                None => println!("Running in background."),
            }
            println!("Check progress with: ralph status");
            exit_codes::OK
        }
        LaunchResult::Completed(report) => report_completed(report),
    }
}

fn report_completed(report: &RunReport) -> i32 {
    for failure in &report.plugin_failures {
        eprintln!("warning: plugin {} failed: {}", failure.plugin, failure.error);
    }
    match (&report.best, report.status) {
        (Some(best), RunStatus::Success) => {
            println!("Success! Best future: {} (Score: {:.2})", best.id, best.score);
            exit_codes::OK
        }
        _ => {
            println!("Failed to find a successful future.");
            exit_codes::NO_SUCCESS
        }
    }
}

fn cmd_status(orchestrator: &Orchestrator) -> Result<i32> {
    let summaries = orchestrator.run_summaries()?;
    if summaries.is_empty() {
        println!("No runs found in {}", orchestrator.store().base_dir().display());
        return Ok(exit_codes::OK);
    }
    for (run_id, summary) in summaries {
        match summary {
            Ok(summary) => {
                let best = summary
                    .best
                    .as_ref()
                    .map_or_else(|| "-".to_string(), |best| best.future_id.clone());
                println!(
                    "{run_id}  {:<9}  {}/{} iterations  best={best}  {}",
                    summary.state.as_str(),
                    summary.iterations_completed,
                    summary.iterations_started,
                    summary.prompt.as_deref().unwrap_or("")
                );
            }
            Err(err) => println!("{run_id}  unreadable: {err:#}"),
        }
    }
    Ok(exit_codes::OK)
}

fn cmd_results(orchestrator: &Orchestrator, run_id: &str) -> Result<i32> {
    let events = orchestrator.run_events(run_id)?;
    let summary = summarize(&events);
    println!("Run ID: {run_id}");
    println!("Prompt: {}", summary.prompt.as_deref().unwrap_or("(unknown)"));
    println!("State: {}", summary.state.as_str());
    println!(
        "Iterations: {} completed of {} started",
        summary.iterations_completed, summary.iterations_started
    );
    if summary.stopped_on_success {
        println!("Stopped early on success.");
    }
    match &summary.best {
        Some(best) => {
            let exit_code = best
                .exit_code
                .map_or_else(|| "unknown".to_string(), |code| code.to_string());
            println!(
                "Best future: {} (Score: {:.2}, exit code {exit_code})",
                best.future_id, best.score
            );
        }
        None => println!("Best future: none"),
    }

    println!();
    println!("Events:");
    for record in &events {
        let time = DateTime::from_timestamp_micros((record.timestamp * 1_000_000.0) as i64)
            .map_or_else(
                || record.timestamp.to_string(),
                |t| t.format("%Y-%m-%d %H:%M:%S").to_string(),
            );
        println!("  {time}  {:<20}  {}", record.event, record.data);
    }
    Ok(exit_codes::OK)
}

fn cmd_agents(orchestrator: &Orchestrator) -> Result<i32> {
    for status in orchestrator.agent_statuses() {
        let name = &status.capabilities.name;
        if !status.detection.found {
            println!("{name}: not found");
            continue;
        }
        let version = status.detection.version.as_deref().unwrap_or("unknown version");
        let suffix = if status.allowed {
            ""
        } else {
            " (disabled by active_tools)"
        };
        println!("{name}: {version}{suffix}");
        if let Some(path) = &status.detection.binary_path {
            println!("  path: {}", path.display());
        }
        let caps = &status.capabilities;
        println!(
            "  cost: {}, model selection: {}, env: {}",
            caps.cost_confidence.as_str(),
            if caps.supports_model_selection { "yes" } else { "no" },
            caps.supported_env_keys.join(", ")
        );
    }
    Ok(exit_codes::OK)
}

fn cmd_config(command: ConfigCommand, path: Option<PathBuf>, settings: &Settings) -> Result<i32> {
    match command {
        ConfigCommand::Show => {
            if let Some(path) = &path {
                println!("# {}", path.display());
            }
            print!("{}", toml::to_string_pretty(settings).context("serialize config toml")?);
        }
        ConfigCommand::Init { force } => {
            let path = path.context("no config directory on this platform; pass --config")?;
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            write_config(&path, &Settings::default())?;
            println!("Wrote {}", path.display());
        }
    }
    Ok(exit_codes::OK)
}

/// Prints one line per completed attempt.
struct ProgressPrinter;

impl PluginSink for ProgressPrinter {
    fn name(&self) -> &str {
        "progress"
    }

    fn post_run(&self, _notice: &RunNotice) -> Result<()> {
        Ok(())
    }

    fn post_iteration(&self, _run_id: &str, iteration: u32, future: &Value) -> Result<()> {
        let exit_code = future["result"]["exit_code"]
            .as_i64()
            .map_or_else(|| "-".to_string(), |code| code.to_string());
        println!(
            "[{iteration}] {} via {}: exit {exit_code}, score {:.2}",
            future["id"].as_str().unwrap_or("?"),
            future["tool_name"].as_str().unwrap_or("?"),
            future["score"].as_f64().unwrap_or(f64::NAN)
        );
        Ok(())
    }
}
