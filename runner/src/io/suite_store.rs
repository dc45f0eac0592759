//! Test-suite loading with schema validation.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde_json::Value;
use tracing::debug;

use crate::core::protocol::TestSuite;
use crate::core::tracker::{DependencyTracker, TrackerConfig, TrackerError};

const SUITE_SCHEMA: &str = include_str!("../../schemas/test_suite.schema.json");

/// Load and validate one suite file.
///
/// An empty `name` defaults to the file name.
pub fn load_suite(path: &Path) -> Result<TestSuite> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read suite {}", path.display()))?;
    let mut suite =
        parse_suite(&contents).with_context(|| format!("load suite {}", path.display()))?;
    if suite.name.is_empty() {
        suite.name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
    }
    debug!(suite = %suite.name, tests = suite.tests.len(), "suite loaded");
    Ok(suite)
}

/// Parse suite JSON: schema conformance, then unique request ids.
pub fn parse_suite(contents: &str) -> Result<TestSuite> {
    let value: Value = serde_json::from_str(contents).context("parse suite json")?;
    validate_schema(&value)?;
    let suite: TestSuite = serde_json::from_value(value).context("deserialize suite")?;
    ensure_unique_ids(&suite)?;
    Ok(suite)
}

/// Expand suite paths: directories contribute their `*.json` files sorted by
/// name, explicit files keep the order given.
pub fn discover_suites(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found = Vec::new();
            for entry in
                fs::read_dir(path).with_context(|| format!("read {}", path.display()))?
            {
                let entry = entry.context("read entry")?;
                let entry_path = entry.path();
                if entry_path.is_file()
                    && entry_path.extension().is_some_and(|ext| ext == "json")
                {
                    found.push(entry_path);
                }
            }
            found.sort();
            files.extend(found);
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            return Err(anyhow!("suite path not found: {}", path.display()));
        }
    }
    if files.is_empty() {
        return Err(anyhow!("no test suites found"));
    }
    Ok(files)
}

/// Load every suite under `paths`, in execution order.
pub fn load_suites(paths: &[PathBuf]) -> Result<Vec<TestSuite>> {
    discover_suites(paths)?
        .iter()
        .map(|path| load_suite(path))
        .collect()
}

/// Statically check that every consumed reference has an earlier creator.
pub fn check_references(suite: &TestSuite, config: &TrackerConfig) -> Result<(), TrackerError> {
    let mut tracker = DependencyTracker::new(config.clone());
    for (index, test) in suite.tests.iter().enumerate() {
        tracker.build_dependencies_for_test(index, test)?;
        tracker.on_test_executed(index, test);
    }
    Ok(())
}

fn validate_schema(suite: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(SUITE_SCHEMA).context("parse suite schema")?;
    let compiled = validator_for(&schema).map_err(|err| anyhow!("invalid schema: {}", err))?;
    if !compiled.is_valid(suite) {
        let messages = compiled
            .iter_errors(suite)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "suite schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}

fn ensure_unique_ids(suite: &TestSuite) -> Result<()> {
    let mut seen = HashSet::new();
    for test in &suite.tests {
        if !seen.insert(test.request.id.as_str()) {
            return Err(anyhow!("duplicate request id '{}'", test.request.id));
        }
    }
    Ok(())
}
