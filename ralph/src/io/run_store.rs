//! Run directories and identifiers.
//!
//! A run is a directory `<runs_dir>/<run_id>/` holding its event log. The
//! directory and log outlive the process so runs can be inspected or resumed
//! by id.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use rand::{Rng, distributions::Alphanumeric};
use serde_json::json;
use tracing::{debug, info};

use crate::core::event::RUN_STARTED;
use crate::io::run_log::RunLog;

const SUFFIX_LEN: usize = 8;
const CREATE_ATTEMPTS: u32 = 16;

/// Handle to an existing run directory.
#[derive(Debug, Clone)]
pub struct Run {
    pub id: String,
    pub dir: PathBuf,
    pub log: RunLog,
}

#[derive(Debug, Clone)]
pub struct RunStore {
    base_dir: PathBuf,
}

impl RunStore {
    /// Open (and create if needed) the runs directory.
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir)
            .with_context(|| format!("create runs dir {}", base_dir.display()))?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Create a fresh run directory and log, then record `run_started`.
    pub fn create_run(&self, prompt: &str) -> Result<Run> {
        for _ in 0..CREATE_ATTEMPTS {
            let run_id = generate_run_id();
            let dir = self.base_dir.join(&run_id);
            match fs::create_dir(&dir) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    debug!(run_id = %run_id, "run id collision, retrying");
                    continue;
                }
                Err(err) => {
                    return Err(err).with_context(|| format!("create run dir {}", dir.display()));
                }
            }

            let log = RunLog::open(&dir)?;
            log.append(RUN_STARTED, json!({"prompt": prompt, "run_id": run_id}))?;
            info!(run_id = %run_id, dir = %dir.display(), "run created");
            return Ok(Run {
                id: run_id,
                dir,
                log,
            });
        }
        Err(anyhow!(
            "unable to allocate a unique run id in {}",
            self.base_dir.display()
        ))
    }

    /// Rehydrate a handle for an existing run. A missing run is `Ok(None)`.
    pub fn get_run(&self, run_id: &str) -> Result<Option<Run>> {
        validate_run_id(run_id)?;
        let dir = self.base_dir.join(run_id);
        if !dir.is_dir() {
            return Ok(None);
        }
        let log = RunLog::open(&dir)?;
        Ok(Some(Run {
            id: run_id.to_string(),
            dir,
            log,
        }))
    }

    /// All run ids, most recent first.
    pub fn list_runs(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.base_dir)
            .with_context(|| format!("read {}", self.base_dir.display()))?
        {
            let entry = entry.context("read entry")?;
            if entry.path().is_dir() {
                ids.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        ids.sort_unstable_by(|a, b| b.cmp(a));
        Ok(ids)
    }
}

/// Run ids must be plain directory names: `[A-Za-z0-9._-]`, not `.`/`..`.
pub fn validate_run_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(anyhow!("run id must not be empty"));
    }
    if id == "." || id == ".." {
        return Err(anyhow!("run id must not be '{id}'"));
    }
    if id
        .chars()
        .any(|c| !(c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-'))
    {
        return Err(anyhow!("run id must be [A-Za-z0-9._-] only (got '{id}')"));
    }
    Ok(())
}

/// Sortable timestamp prefix plus a short random suffix.
fn generate_run_id() -> String {
    format!(
        "{}-{}",
        Utc::now().format("%Y%m%d-%H%M%S"),
        generate_suffix()
    )
}

fn generate_suffix() -> String {
    let mut rng = rand::thread_rng();
    std::iter::repeat_with(|| rng.sample(Alphanumeric))
        .map(char::from)
        .take(SUFFIX_LEN)
        .collect::<String>()
        .to_lowercase()
}
