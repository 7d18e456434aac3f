//! Stable exit codes for the panepilot binary.

/// Session ended normally.
pub const OK: i32 = 0;
/// Invalid CLI arguments, config, or a startup failure.
pub const INVALID: i32 = 1;
/// tmux is not installed or a new session could not be started.
pub const NO_TMUX: i32 = 2;
