//! CLI tests for `conformance-runner run` and `check`.
//!
//! Spawns the runner binary against the bundled mock handler and verifies
//! exit codes and the printed report.

use std::path::Path;
use std::process::{Command, Output};

use conformance_runner::exit_codes;
use conformance_runner::test_support::{SuiteDir, suite, test_case, with_expected};
use serde_json::json;

fn context_suite() -> conformance_runner::core::protocol::TestSuite {
    suite(
        "context",
        true,
        vec![
            test_case(
                "ctx_create",
                "btck_context_create",
                json!({}),
                Some("$ctx"),
            ),
            test_case(
                "chainman_create",
                "btck_chainstate_manager_create",
                json!({"context": "$ctx"}),
                Some("$chainman"),
            ),
            with_expected(
                test_case(
                    "block_process",
                    "btck_chainstate_manager_process_block",
                    json!({"chainstate_manager": "$chainman", "block": "00"}),
                    None,
                ),
                json!({"result": true}),
            ),
        ],
    )
}

fn script_suite(result: bool) -> conformance_runner::core::protocol::TestSuite {
    suite(
        "script",
        false,
        vec![with_expected(
            test_case(
                "verify_ok",
                "btck_script_pubkey_verify",
                json!({"script_pubkey": "76a9", "amount": 0}),
                None,
            ),
            json!({"result": result}),
        )],
    )
}

fn run_against(cwd: &Path, served: &Path, suites: &Path, extra: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_conformance-runner"))
        .current_dir(cwd)
        .arg("run")
        .arg("--handler")
        .arg(env!("CARGO_BIN_EXE_mock-handler"))
        .arg("--handler-arg=--suites")
        .arg(format!("--handler-arg={}", served.display()))
        .args(extra)
        .arg(suites)
        .output()
        .expect("runner run")
}

#[test]
fn run_passes_against_consistent_handler() {
    let dir = SuiteDir::new().expect("suite dir");
    dir.write("01_context.json", &context_suite()).expect("write");
    dir.write("02_script.json", &script_suite(true)).expect("write");

    let output = run_against(dir.path(), dir.path(), dir.path(), &[]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert_eq!(output.status.code(), Some(exit_codes::OK), "{stdout}");
    assert!(stdout.contains("TOTAL SUMMARY"));
    assert!(stdout.contains("Total Tests: 4"));
    assert!(stdout.contains("Failed:      0"));
}

#[test]
fn run_reports_mismatch_with_failed_exit() {
    let served = SuiteDir::new().expect("served dir");
    served.write("script.json", &script_suite(false)).expect("write");
    let expected = SuiteDir::new().expect("suite dir");
    expected.write("script.json", &script_suite(true)).expect("write");

    let output = run_against(expected.path(), served.path(), expected.path(), &["-v"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert_eq!(output.status.code(), Some(exit_codes::FAILED), "{stdout}");
    assert!(stdout.contains("result mismatch"));
    assert!(stdout.contains("Failed:      1"));
}

#[test]
fn run_with_unknown_tests_fails_every_case() {
    let served = SuiteDir::new().expect("served dir");
    served.write("script.json", &script_suite(true)).expect("write");
    let expected = SuiteDir::new().expect("suite dir");
    expected.write("context.json", &context_suite()).expect("write");

    let output = run_against(expected.path(), served.path(), expected.path(), &[]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert_eq!(output.status.code(), Some(exit_codes::FAILED), "{stdout}");
    // Stateful: the first failure skips the two dependents.
    assert!(stdout.contains("Failed:      3"));
    assert!(stdout.contains("skipped"));
}

#[test]
fn run_without_handler_is_invalid() {
    let dir = SuiteDir::new().expect("suite dir");
    dir.write("script.json", &script_suite(true)).expect("write");

    let output = Command::new(env!("CARGO_BIN_EXE_conformance-runner"))
        .current_dir(dir.path())
        .arg("run")
        .arg(dir.path())
        .output()
        .expect("runner run");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
}

#[test]
fn check_rejects_undefined_reference() {
    let dir = SuiteDir::new().expect("suite dir");
    let broken = suite(
        "broken",
        false,
        vec![test_case(
            "use_missing",
            "btck_chainstate_manager_create",
            json!({"context": "$ctx"}),
            None,
        )],
    );
    dir.write("broken.json", &broken).expect("write");

    let output = Command::new(env!("CARGO_BIN_EXE_conformance-runner"))
        .current_dir(dir.path())
        .arg("check")
        .arg(dir.path())
        .output()
        .expect("runner check");
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(stderr.contains("undefined reference $ctx"), "{stderr}");
}

#[test]
fn check_accepts_well_formed_suites() {
    let dir = SuiteDir::new().expect("suite dir");
    dir.write("context.json", &context_suite()).expect("write");

    let output = Command::new(env!("CARGO_BIN_EXE_conformance-runner"))
        .current_dir(dir.path())
        .arg("check")
        .arg(dir.path())
        .output()
        .expect("runner check");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(String::from_utf8_lossy(&output.stdout).contains("ok: context (3 tests)"));
}

#[test]
fn init_writes_loadable_config_once() {
    let temp = tempfile::tempdir().expect("tempdir");
    let init = || {
        Command::new(env!("CARGO_BIN_EXE_conformance-runner"))
            .current_dir(temp.path())
            .arg("init")
            .status()
            .expect("runner init")
    };

    assert_eq!(init().code(), Some(exit_codes::OK));
    let cfg = conformance_runner::io::config::load_config(&temp.path().join("conformance.toml"))
        .expect("load config");
    assert_eq!(cfg.handler_timeout_ms, 10_000);

    assert_eq!(init().code(), Some(exit_codes::INVALID));
}
