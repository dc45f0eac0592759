//! Lifecycle tests driving `TestRunner` against real handler processes.
//!
//! Covers dependency-chain reconstruction over a live handler, respawn after a
//! crash, and closing the handler between stateful suites.

use std::path::Path;
use std::time::Duration;

use conformance_runner::core::protocol::TestSuite;
use conformance_runner::core::tracker::TrackerConfig;
use conformance_runner::core::types::TestStatus;
use conformance_runner::io::handler::HandlerConfig;
use conformance_runner::run::TestRunner;
use conformance_runner::test_support::{SuiteDir, sh_handler, suite, test_case, with_expected};
use serde_json::json;

fn mock_handler(served: &Path) -> HandlerConfig {
    let mut config = HandlerConfig::new(env!("CARGO_BIN_EXE_mock-handler"));
    config.args = vec!["--suites".to_string(), served.display().to_string()];
    config.timeout = Duration::from_secs(5);
    config.close_grace = Duration::from_secs(2);
    config
}

/// ```text
/// 0 ctx_create       -> $ctx       (stateful creator)
/// 1 chainman_create  ($ctx) -> $chainman (stateful creator)
/// 2 block_1          ($chainman)   state mutator
/// 3 block_2          ($chainman)   state mutator
/// 4 tip_query        ($chainman)   expected to mismatch
/// ```
fn chain_suite(tip_height: i64) -> TestSuite {
    let process = |id: &str| {
        with_expected(
            test_case(
                id,
                "btck_chainstate_manager_process_block",
                json!({"chainstate_manager": "$chainman", "block": id}),
                None,
            ),
            json!({"result": true}),
        )
    };
    suite(
        "chain",
        true,
        vec![
            test_case("ctx_create", "btck_context_create", json!({}), Some("$ctx")),
            test_case(
                "chainman_create",
                "btck_chainstate_manager_create",
                json!({"context": "$ctx"}),
                Some("$chainman"),
            ),
            process("block_1"),
            process("block_2"),
            with_expected(
                test_case(
                    "tip_query",
                    "btck_chain_get_height",
                    json!({"chainstate_manager": {"ref": "$chainman"}}),
                    None,
                ),
                json!({"result": tip_height}),
            ),
        ],
    )
}

#[test]
fn failing_test_replays_full_state_history() {
    let served = SuiteDir::new().expect("served dir");
    served.write("chain.json", &chain_suite(2)).expect("write");

    let mut runner = TestRunner::new(mock_handler(served.path()), TrackerConfig::default());
    let suites = [chain_suite(3)];
    let summary = runner
        .run_suites_within(&suites, Duration::from_secs(30))
        .expect("run");

    assert_eq!(summary.total, 5);
    assert_eq!(summary.passed, 4);
    let tip = &summary.suites[0].tests[4];
    assert_eq!(tip.status, TestStatus::Failed);
    assert_eq!(tip.request_chain, vec![0, 1, 2, 3]);
    assert!(
        tip.message
            .as_deref()
            .is_some_and(|msg| msg.starts_with("result mismatch")),
        "{:?}",
        tip.message
    );
}

#[test]
fn runner_respawns_after_handler_crash() {
    // Answers one request per process, then exits.
    let handler = sh_handler(r#"read -r line; printf '{"result":true}\n'"#);
    let tests = ["a", "b", "c"]
        .into_iter()
        .map(|id| with_expected(test_case(id, "ping", json!({}), None), json!({"result": true})))
        .collect();
    let suites = [suite("pings", false, tests)];

    let mut runner = TestRunner::new(handler, TrackerConfig::default());
    let summary = runner
        .run_suites_within(&suites, Duration::from_secs(30))
        .expect("run");

    // "b" reaches the exhausted process and fails; "c" gets a fresh one.
    let statuses: Vec<_> = summary.suites[0].tests.iter().map(|t| t.status).collect();
    assert_eq!(
        statuses,
        vec![TestStatus::Passed, TestStatus::Failed, TestStatus::Passed]
    );
}

#[test]
fn stateful_suites_each_start_a_fresh_handler() {
    // Numbers each reply with a per-process counter.
    let handler = sh_handler(
        r#"n=0; while read -r line; do n=$((n+1)); printf '{"result":%d}\n' "$n"; done"#,
    );
    let one = |id: &str| {
        with_expected(test_case(id, "count", json!({}), None), json!({"result": 1}))
    };
    let suites = [
        suite("first", true, vec![one("first_a")]),
        suite("second", true, vec![one("second_a")]),
    ];

    let mut runner = TestRunner::new(handler, TrackerConfig::default());
    let summary = runner
        .run_suites_within(&suites, Duration::from_secs(30))
        .expect("run");

    assert_eq!(summary.passed, 2);
    assert!(!summary.has_failures());
}
