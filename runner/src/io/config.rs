//! Runner configuration stored as TOML (`conformance.toml` by default).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::tracker::TrackerConfig;
use crate::io::handler::HandlerConfig;

/// Runner configuration (TOML).
///
/// Meant to be edited by humans. Missing fields default to the values the
/// harness ships with; command-line flags override individual fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunnerConfig {
    /// Maximum time to wait for the handler to answer one request.
    pub handler_timeout_ms: u64,

    /// Wall-clock budget for executing every suite.
    pub total_timeout_secs: u64,

    /// Grace period for the handler to exit after its stdin closes.
    pub close_grace_ms: u64,

    /// Cap on captured handler stderr per failure.
    pub stderr_limit_bytes: usize,

    /// Longest response line accepted from the handler.
    pub max_line_bytes: usize,

    pub handler: HandlerSection,

    pub tracker: TrackerConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HandlerSection {
    /// Handler executable.
    pub path: PathBuf,
    pub args: Vec<String>,
    /// Environment overrides for the handler process.
    pub env: BTreeMap<String, String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            handler_timeout_ms: 10_000,
            total_timeout_secs: 30,
            close_grace_ms: 5_000,
            stderr_limit_bytes: 64 * 1024,
            max_line_bytes: 16 * 1024 * 1024,
            handler: HandlerSection::default(),
            tracker: TrackerConfig::default(),
        }
    }
}

impl RunnerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.handler.path.as_os_str().is_empty() {
            return Err(anyhow!("handler.path must be set"));
        }
        self.validate_limits()
    }

    /// Checks everything except the handler path (which the CLI may supply later).
    pub fn validate_limits(&self) -> Result<()> {
        if self.handler_timeout_ms == 0 {
            return Err(anyhow!("handler_timeout_ms must be > 0"));
        }
        if self.total_timeout_secs == 0 {
            return Err(anyhow!("total_timeout_secs must be > 0"));
        }
        if self.close_grace_ms == 0 {
            return Err(anyhow!("close_grace_ms must be > 0"));
        }
        if self.stderr_limit_bytes == 0 {
            return Err(anyhow!("stderr_limit_bytes must be > 0"));
        }
        if self.max_line_bytes == 0 {
            return Err(anyhow!("max_line_bytes must be > 0"));
        }
        Ok(())
    }

    pub fn total_timeout(&self) -> Duration {
        Duration::from_secs(self.total_timeout_secs)
    }

    pub fn handler_config(&self) -> HandlerConfig {
        HandlerConfig {
            path: self.handler.path.clone(),
            args: self.handler.args.clone(),
            env: self.handler.env.clone(),
            timeout: Duration::from_millis(self.handler_timeout_ms),
            close_grace: Duration::from_millis(self.close_grace_ms),
            stderr_limit_bytes: self.stderr_limit_bytes,
            max_line_bytes: self.max_line_bytes,
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RunnerConfig::default()`. The handler path
/// is not required here; call [`RunnerConfig::validate`] once overrides are in.
pub fn load_config(path: &Path) -> Result<RunnerConfig> {
    if !path.exists() {
        return Ok(RunnerConfig::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RunnerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate_limits()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RunnerConfig) -> Result<()> {
    cfg.validate_limits()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, RunnerConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("conformance.toml");
        let mut cfg = RunnerConfig::default();
        cfg.handler.path = PathBuf::from("/usr/local/bin/handler");
        cfg.handler
            .env
            .insert("RUST_LOG".to_string(), "debug".to_string());
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("conformance.toml");
        fs::write(
            &path,
            "handler_timeout_ms = 250\n\n[handler]\npath = \"./handler\"\nargs = [\"--quiet\"]\n",
        )
        .expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.handler_timeout_ms, 250);
        assert_eq!(cfg.handler.args, vec!["--quiet"]);
        assert_eq!(cfg.total_timeout_secs, 30);
        assert_eq!(cfg.tracker, TrackerConfig::default());

        let handler = cfg.handler_config();
        assert_eq!(handler.timeout, Duration::from_millis(250));
        assert_eq!(handler.close_grace, Duration::from_secs(5));
        assert_eq!(handler.max_line_bytes, 16 * 1024 * 1024);
    }

    #[test]
    fn rejects_zero_timeouts_and_missing_handler() {
        let cfg = RunnerConfig::default();
        assert!(cfg.validate().is_err());

        let cfg = RunnerConfig {
            handler_timeout_ms: 0,
            ..RunnerConfig::default()
        };
        let err = cfg.validate_limits().expect_err("zero timeout");
        assert!(err.to_string().contains("handler_timeout_ms"));
    }
}
