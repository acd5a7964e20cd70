//! Stable exit codes for forge CLI commands.

/// Command succeeded (`run`: a solution applied cleanly).
pub const OK: i32 = 0;
/// Command failed due to invalid config/inputs/replies or other errors.
pub const INVALID: i32 = 1;
/// `forge run` exhausted the attempt cap without a working solution.
pub const EXHAUSTED: i32 = 2;
