//! Reference handler that answers every request with the expected response
//! recorded in a set of suites.
//!
//! Useful for exercising the harness end to end and for checking that a suite
//! is internally consistent. Requests with an unknown id, or whose method does
//! not match the recorded one, get a `Handler` error response, as do lines
//! that are not a request at all.

use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;

use conformance_runner::core::protocol::{
    ErrorCode, Request, Response, ResponseError, TestCase,
};
use conformance_runner::io::suite_store::load_suites;
use conformance_runner::logging;

#[derive(Parser)]
#[command(name = "mock-handler", about = "Replay expected responses from test suites")]
struct Cli {
    /// Suite files or directories whose expected responses are served.
    #[arg(long, required = true, num_args = 1..)]
    suites: Vec<PathBuf>,
}

fn main() {
    logging::init();
    if let Err(err) = run() {
        eprintln!("mock-handler: {:#}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let cases = index_cases(&cli.suites)?;
    debug!(cases = cases.len(), "mock handler ready");

    serve(&cases, io::stdin().lock(), io::stdout().lock())
}

/// Answer every input line with exactly one response line, in order.
fn serve<R: BufRead, W: Write>(
    cases: &HashMap<String, TestCase>,
    input: R,
    mut output: W,
) -> Result<()> {
    for line in input.lines() {
        let line = line.context("read stdin")?;
        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => respond(cases, &request),
            Err(err) => {
                eprintln!("mock-handler: invalid request: {err}");
                handler_error("INVALID_REQUEST")
            }
        };
        serde_json::to_writer(&mut output, &response).context("write response")?;
        output.write_all(b"\n").context("write response")?;
        output.flush().context("flush stdout")?;
    }
    Ok(())
}

fn index_cases(paths: &[PathBuf]) -> Result<HashMap<String, TestCase>> {
    let mut cases = HashMap::new();
    for suite in load_suites(paths)? {
        for test in suite.tests {
            cases.insert(test.request.id.clone(), test);
        }
    }
    Ok(cases)
}

fn respond(cases: &HashMap<String, TestCase>, request: &Request) -> Response {
    match cases.get(&request.id) {
        None => handler_error("UNKNOWN_TEST"),
        Some(case) if case.request.method != request.method => handler_error("METHOD_MISMATCH"),
        Some(case) => case.expected_response.clone(),
    }
}

fn handler_error(member: &str) -> Response {
    Response {
        result: None,
        error: Some(ResponseError {
            code: Some(ErrorCode {
                kind: "Handler".to_string(),
                member: member.to_string(),
            }),
        }),
    }
}
