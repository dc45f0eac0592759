//! Human-readable run output.
//!
//! Verbose output prints, per test, the minimal request chain that replays
//! its preconditions: one request per line in chain order, then the test's own
//! request, followed by expected and actual responses.

use std::fmt::Write as _;

use crate::core::protocol::{Response, TestSuite};
use crate::core::types::{RunSummary, SuiteResult, TestOutcome};

/// How much detail to print per test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    #[default]
    Quiet,
    /// Request chains for failed tests.
    Failures,
    /// Request chains for every test.
    All,
}

impl Verbosity {
    pub fn from_count(count: u8) -> Self {
        match count {
            0 => Verbosity::Quiet,
            1 => Verbosity::Failures,
            _ => Verbosity::All,
        }
    }
}

const RULE_WIDTH: usize = 60;

pub fn render_suite(suite: &TestSuite, result: &SuiteResult, verbosity: Verbosity) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\nTest Suite: {}", result.suite_name);
    if let Some(description) = &suite.description {
        let _ = writeln!(out, "Description: {description}");
    }
    let _ = writeln!(
        out,
        "Total: {}, Passed: {}, Failed: {}\n",
        result.total, result.passed, result.failed
    );

    for outcome in &result.tests {
        let mark = if outcome.passed() { "✓" } else { "✗" };
        let description = suite
            .tests
            .get(outcome.index)
            .and_then(|test| test.description.as_deref());
        match description {
            Some(description) => {
                let _ = writeln!(out, "  {mark} {} ({description})", outcome.test_id);
            }
            None => {
                let _ = writeln!(out, "  {mark} {}", outcome.test_id);
            }
        }
        if let Some(message) = &outcome.message {
            let _ = writeln!(out, "      {message}");
        }

        let show_chain = match verbosity {
            Verbosity::Quiet => false,
            Verbosity::Failures => !outcome.passed(),
            Verbosity::All => true,
        };
        if show_chain {
            render_replay(&mut out, suite, outcome);
        }
    }
    out
}

fn render_replay(out: &mut String, suite: &TestSuite, outcome: &TestOutcome) {
    let _ = writeln!(out, "\n      Request chain:");
    let indices = outcome
        .request_chain
        .iter()
        .chain(std::iter::once(&outcome.index));
    for &index in indices {
        if let Some(test) = suite.tests.get(index) {
            let line = serde_json::to_string(&test.request)
                .unwrap_or_else(|err| format!("<unserializable request: {err}>"));
            let _ = writeln!(out, "        {line}");
        }
    }
    if let Some(test) = suite.tests.get(outcome.index) {
        let _ = writeln!(
            out,
            "      Expected: {}",
            render_response(&test.expected_response)
        );
    }
    match &outcome.actual {
        Some(actual) => {
            let _ = writeln!(out, "      Actual:   {}\n", render_response(actual));
        }
        None => {
            let _ = writeln!(out, "      Actual:   (no response)\n");
        }
    }
}

fn render_response(response: &Response) -> String {
    serde_json::to_string(response)
        .unwrap_or_else(|err| format!("<unserializable response: {err}>"))
}

pub fn render_summary(summary: &RunSummary) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let mut out = String::new();
    let _ = writeln!(out, "\n{rule}");
    let _ = writeln!(out, "TOTAL SUMMARY");
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "Total Tests: {}", summary.total);
    let _ = writeln!(out, "Passed:      {}", summary.passed);
    let _ = writeln!(out, "Failed:      {}", summary.failed);
    let _ = writeln!(out, "{rule}");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::TestStatus;
    use crate::test_support::{suite, test_case};
    use serde_json::json;

    fn sample() -> (TestSuite, SuiteResult) {
        let mut tests = vec![
            test_case("create", "create_a", json!({}), Some("$a")),
            test_case("use", "use_a", json!({"a": "$a"}), None),
        ];
        tests[1].description = Some("uses a".to_string());
        let suite = suite("sample", false, tests);

        let mut result = SuiteResult::new("sample");
        result.record(TestOutcome {
            index: 0,
            test_id: "create".to_string(),
            status: TestStatus::Passed,
            message: None,
            actual: None,
            request_chain: Vec::new(),
        });
        result.record(TestOutcome {
            index: 1,
            test_id: "use".to_string(),
            status: TestStatus::Failed,
            message: Some("expected null or omitted result, got: 1".to_string()),
            actual: Some(Response {
                result: Some(json!(1)),
                error: None,
            }),
            request_chain: vec![0],
        });
        (suite, result)
    }

    #[test]
    fn quiet_lists_tests_and_messages() {
        let (suite, result) = sample();
        let out = render_suite(&suite, &result, Verbosity::Quiet);
        assert!(out.contains("Total: 2, Passed: 1, Failed: 1"));
        assert!(out.contains("✓ create"));
        assert!(out.contains("✗ use (uses a)"));
        assert!(out.contains("expected null or omitted result, got: 1"));
        assert!(!out.contains("Request chain"));
    }

    #[test]
    fn failures_verbosity_prints_replay_chain() {
        let (suite, result) = sample();
        let out = render_suite(&suite, &result, Verbosity::Failures);
        assert_eq!(out.matches("Request chain").count(), 1);
        let create = out
            .find(r#"{"id":"create","method":"create_a","ref":"$a"}"#)
            .expect("chain includes creator");
        let own = out
            .find(r#"{"id":"use","method":"use_a","params":{"a":"$a"}}"#)
            .expect("chain includes failing request");
        assert!(create < own);
        assert!(out.contains(r#"Actual:   {"result":1}"#));
    }

    #[test]
    fn all_verbosity_prints_every_test() {
        let (suite, result) = sample();
        let out = render_suite(&suite, &result, Verbosity::All);
        assert_eq!(out.matches("Request chain").count(), 2);
        assert!(out.contains("Actual:   (no response)"));
    }

    #[test]
    fn summary_reports_totals() {
        let (_, result) = sample();
        let mut summary = RunSummary::default();
        summary.push(result);
        let out = render_summary(&summary);
        assert!(out.contains("TOTAL SUMMARY"));
        assert!(out.contains("Failed:      1"));
    }

    #[test]
    fn verbosity_from_count_saturates() {
        assert_eq!(Verbosity::from_count(0), Verbosity::Quiet);
        assert_eq!(Verbosity::from_count(1), Verbosity::Failures);
        assert_eq!(Verbosity::from_count(7), Verbosity::All);
    }
}
