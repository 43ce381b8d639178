//! Stable exit codes for `ralph` CLI commands.

/// Command succeeded, a successful future was found, or a detached run started.
pub const OK: i32 = 0;
/// Invalid arguments/config/run id, or any other error.
pub const INVALID: i32 = 1;
/// The run finished without a future whose tests passed.
pub const NO_SUCCESS: i32 = 2;
/// No supported agent CLI is installed (or allowed by `active_tools`).
pub const NO_AGENTS: i32 = 3;
