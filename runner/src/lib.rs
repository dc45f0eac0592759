//! Protocol-driven conformance harness for external handler processes.
//!
//! A handler is any executable that speaks the line-delimited JSON protocol on
//! stdin/stdout. The harness feeds it test-suite requests, validates each
//! response, and reconstructs which earlier requests a failing test depends on
//! so the failure can be replayed. The crate enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (wire model, reference tracking,
//!   response validation). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (handler processes, config, suite files).
//!
//! Orchestration modules ([`run`], [`report`]) coordinate core logic with I/O to
//! implement the CLI.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod report;
pub mod run;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
