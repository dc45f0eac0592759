//! Conformance harness CLI.
//!
//! Drives a handler executable through every test suite and reports per-suite
//! and total tallies. Exits non-zero when any test fails.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::debug;

use conformance_runner::exit_codes;
use conformance_runner::io::config::{RunnerConfig, load_config, write_config};
use conformance_runner::io::suite_store::{check_references, load_suites};
use conformance_runner::logging;
use conformance_runner::report::{Verbosity, render_suite, render_summary};
use conformance_runner::run::TestRunner;

#[derive(Parser)]
#[command(
    name = "conformance-runner",
    version,
    about = "Run conformance test suites against a handler process"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute suites against a handler and report results.
    Run(RunArgs),
    /// Validate suite files (schema, unique ids, reference flow) without a handler.
    Check(CheckArgs),
    /// Write a default config file.
    Init(InitArgs),
}

#[derive(Args)]
struct RunArgs {
    /// TOML config file; missing file means defaults.
    #[arg(long, default_value = "conformance.toml")]
    config: PathBuf,

    /// Handler executable (overrides `handler.path`).
    #[arg(long)]
    handler: Option<PathBuf>,

    /// Argument passed to the handler; repeat for several.
    #[arg(long = "handler-arg", allow_hyphen_values = true)]
    handler_args: Vec<String>,

    /// Environment override for the handler, as KEY=VALUE; repeatable.
    #[arg(long = "handler-env", value_parser = parse_env_pair)]
    handler_env: Vec<(String, String)>,

    /// Max time to wait for each handler response.
    #[arg(long)]
    handler_timeout_ms: Option<u64>,

    /// Total time budget for all suites.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Print replay chains for failed tests (-v) or all tests (-vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suite files or directories of `*.json` suites.
    #[arg(required = true)]
    suites: Vec<PathBuf>,
}

impl RunArgs {
    fn apply(&self, cfg: &mut RunnerConfig) {
        if let Some(handler) = &self.handler {
            cfg.handler.path = handler.clone();
        }
        if !self.handler_args.is_empty() {
            cfg.handler.args = self.handler_args.clone();
        }
        for (key, value) in &self.handler_env {
            cfg.handler.env.insert(key.clone(), value.clone());
        }
        if let Some(ms) = self.handler_timeout_ms {
            cfg.handler_timeout_ms = ms;
        }
        if let Some(secs) = self.timeout_secs {
            cfg.total_timeout_secs = secs;
        }
    }
}

#[derive(Args)]
struct CheckArgs {
    /// TOML config file (for tracker method lists).
    #[arg(long, default_value = "conformance.toml")]
    config: PathBuf,

    #[arg(required = true)]
    suites: Vec<PathBuf>,
}

#[derive(Args)]
struct InitArgs {
    #[arg(long, default_value = "conformance.toml")]
    config: PathBuf,

    /// Overwrite an existing file.
    #[arg(long)]
    force: bool,
}

fn parse_env_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {:#}", err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => cmd_run(&args),
        Command::Check(args) => cmd_check(&args),
        Command::Init(args) => cmd_init(&args),
    }
}

fn cmd_run(args: &RunArgs) -> Result<i32> {
    let mut cfg = load_config(&args.config)?;
    args.apply(&mut cfg);
    cfg.validate().context("invalid configuration")?;

    let suites = load_suites(&args.suites)?;
    debug!(suites = suites.len(), "suites loaded");

    let mut runner = TestRunner::from_config(&cfg)?;
    let summary = runner.run_suites_within(&suites, cfg.total_timeout())?;
    runner.close_handler();

    let verbosity = Verbosity::from_count(args.verbose);
    for (suite, result) in suites.iter().zip(&summary.suites) {
        println!("\n=== Running test suite: {} ===", suite.name);
        print!("{}", render_suite(suite, result, verbosity));
    }
    print!("{}", render_summary(&summary));

    Ok(if summary.has_failures() {
        exit_codes::FAILED
    } else {
        exit_codes::OK
    })
}

fn cmd_check(args: &CheckArgs) -> Result<i32> {
    let cfg = load_config(&args.config)?;
    let suites = load_suites(&args.suites)?;
    for suite in &suites {
        check_references(suite, &cfg.tracker).with_context(|| format!("suite {}", suite.name))?;
        println!("ok: {} ({} tests)", suite.name, suite.tests.len());
    }
    Ok(exit_codes::OK)
}

fn cmd_init(args: &InitArgs) -> Result<i32> {
    if args.config.exists() && !args.force {
        bail!(
            "{} already exists (use --force to overwrite)",
            args.config.display()
        );
    }
    write_config(&args.config, &RunnerConfig::default())?;
    println!("wrote {}", args.config.display());
    Ok(exit_codes::OK)
}
