//! Explore several candidate "futures" for one prompt with coding-agent CLIs,
//! validate each with a test command, and keep the best.
//!
//! The crate keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (types, scheduling, scoring, log replay).
//!   No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (config, run directories, the
//!   append-only run log, process execution).
//! - **[`adapters`]**: One adapter per agent CLI behind a common trait.
//!
//! [`engine`] runs the bounded attempt loop for a run; [`orchestrator`] wires
//! detection, execution mode and [`plugin`] notification together for the CLI.

pub mod adapters;
pub mod core;
pub mod engine;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod orchestrator;
pub mod plugin;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
