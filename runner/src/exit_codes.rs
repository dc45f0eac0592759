//! Stable exit codes for the harness CLI.

/// Every test passed (or `check` found no defects).
pub const OK: i32 = 0;
/// At least one test failed.
pub const FAILED: i32 = 1;
/// Invalid invocation, config, or suite data (including undefined references).
pub const INVALID: i32 = 2;
