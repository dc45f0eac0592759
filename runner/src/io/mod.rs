//! I/O helpers: handler processes, configuration, suite files.

pub mod config;
pub mod handler;
pub mod process;
pub mod suite_store;
