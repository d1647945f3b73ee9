//! Stable exit codes for converge CLI commands.

/// Guards allow the action (and `apply` ran it), or a print command succeeded.
pub const OK: i32 = 0;
/// Invalid config or declaration, or guard evaluation failed.
pub const INVALID: i32 = 1;
/// A guard blocked the action.
pub const SKIPPED: i32 = 2;
