//! I/O helpers: processes, settings, run storage, test execution.

pub mod config;
pub mod process;
pub mod run_log;
pub mod run_store;
pub mod test_runner;
