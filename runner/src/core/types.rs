//! Per-test and per-suite result records.
//!
//! These types carry no I/O and are the contract between the runner and the
//! report renderer.

use serde::Serialize;

use crate::core::protocol::Response;

/// Message recorded for tests voided by an earlier failure in a stateful suite.
pub const SKIPPED_MESSAGE: &str = "skipped: a previous test in this stateful suite failed";

/// Message recorded for tests not started before the run deadline.
pub const DEADLINE_MESSAGE: &str = "total execution timeout exceeded";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Failed,
    /// Not executed; counts as a failure.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestOutcome {
    /// Position of the test inside its suite.
    pub index: usize,
    pub test_id: String,
    pub status: TestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Response received from the handler, if one was parsed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<Response>,
    /// Indices of earlier tests needed to replay this one.
    pub request_chain: Vec<usize>,
}

impl TestOutcome {
    pub fn passed(&self) -> bool {
        self.status == TestStatus::Passed
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SuiteResult {
    pub suite_name: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    /// Set once a stateful suite stopped executing after a failure.
    pub short_circuited: bool,
    pub tests: Vec<TestOutcome>,
}

impl SuiteResult {
    pub fn new(suite_name: impl Into<String>) -> Self {
        Self {
            suite_name: suite_name.into(),
            ..Self::default()
        }
    }

    pub fn record(&mut self, outcome: TestOutcome) {
        self.total += 1;
        if outcome.passed() {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
        self.tests.push(outcome);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub suites: Vec<SuiteResult>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn push(&mut self, suite: SuiteResult) {
        self.total += suite.total;
        self.passed += suite.passed;
        self.failed += suite.failed;
        self.suites.push(suite);
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}
