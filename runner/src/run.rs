//! Orchestration of suite execution against a handler.
//!
//! One control thread drives everything. The runner holds at most one live
//! handler; any send/read failure tears it down and the next request spawns a
//! fresh one. A respawned handler starts with an empty object registry, so
//! suites that rely on long-lived handler state must be marked `stateful`.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::protocol::{Request, Response, TestSuite};
use crate::core::tracker::{DependencyTracker, TrackerConfig};
use crate::core::types::{
    DEADLINE_MESSAGE, RunSummary, SKIPPED_MESSAGE, SuiteResult, TestOutcome, TestStatus,
};
use crate::core::validator::validate_response;
use crate::io::config::RunnerConfig;
use crate::io::handler::{HandlerConfig, HandlerError, Spawner, Transport};

/// Executes test suites against handlers produced by `S`.
pub struct TestRunner<S: Spawner = HandlerConfig> {
    spawner: S,
    handler: Option<S::Transport>,
    tracker_config: TrackerConfig,
}

impl TestRunner<HandlerConfig> {
    /// Build a runner for a real handler process from validated config.
    pub fn from_config(config: &RunnerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config.handler_config(), config.tracker.clone()))
    }
}

impl<S: Spawner> TestRunner<S> {
    pub fn new(spawner: S, tracker_config: TrackerConfig) -> Self {
        Self {
            spawner,
            handler: None,
            tracker_config,
        }
    }

    /// Run suites in order under one deadline.
    ///
    /// The handler is closed after every stateful suite so the next suite
    /// starts from a clean registry. Only suite-authoring defects are errors.
    pub fn run_suites(&mut self, suites: &[TestSuite], deadline: Instant) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        for suite in suites {
            let result = self.run_suite(suite, deadline)?;
            summary.push(result);
            if suite.stateful {
                self.close_handler();
            }
        }
        info!(
            total = summary.total,
            passed = summary.passed,
            failed = summary.failed,
            "run finished"
        );
        Ok(summary)
    }

    /// Like [`run_suites`](Self::run_suites) with a deadline `timeout` from now.
    pub fn run_suites_within(
        &mut self,
        suites: &[TestSuite],
        timeout: Duration,
    ) -> Result<RunSummary> {
        self.run_suites(suites, Instant::now() + timeout)
    }

    /// Run one suite.
    ///
    /// Every test is recorded: executed tests as passed/failed, tests after a
    /// failure in a stateful suite as skipped, tests reached after `deadline`
    /// as failed with a timeout message. A test consuming a reference that no
    /// earlier test created aborts the whole run with an error.
    #[instrument(skip_all, fields(suite = %suite.name, stateful = suite.stateful))]
    pub fn run_suite(&mut self, suite: &TestSuite, deadline: Instant) -> Result<SuiteResult> {
        info!(tests = suite.tests.len(), "suite started");
        let mut tracker = DependencyTracker::new(self.tracker_config.clone());
        let mut result = SuiteResult::new(&suite.name);

        for (index, test) in suite.tests.iter().enumerate() {
            tracker
                .build_dependencies_for_test(index, test)
                .with_context(|| format!("suite {}", suite.name))?;

            let (status, message, actual) = if Instant::now() >= deadline {
                warn!(test = %test.request.id, "run deadline exceeded");
                (TestStatus::Failed, Some(DEADLINE_MESSAGE.to_string()), None)
            } else if result.short_circuited {
                (TestStatus::Skipped, Some(SKIPPED_MESSAGE.to_string()), None)
            } else {
                match self.send_request(&test.request) {
                    Ok(actual) => match validate_response(&test.expected_response, &actual) {
                        Ok(()) => (TestStatus::Passed, None, Some(actual)),
                        Err(mismatch) => {
                            (TestStatus::Failed, Some(mismatch.to_string()), Some(actual))
                        }
                    },
                    Err(err) => (TestStatus::Failed, Some(format!("{err:#}")), None),
                }
            };

            // Chain reflects the state as this test ran, before it registers itself.
            let request_chain = tracker.build_request_chain(index, &suite.tests);
            tracker.on_test_executed(index, test);

            debug!(test = %test.request.id, ?status, "test recorded");
            if status != TestStatus::Passed && suite.stateful && !result.short_circuited {
                warn!(test = %test.request.id, "stateful suite failed, skipping the rest");
                result.short_circuited = true;
            }
            result.record(TestOutcome {
                index,
                test_id: test.request.id.clone(),
                status,
                message,
                actual,
                request_chain,
            });
        }

        info!(
            passed = result.passed,
            failed = result.failed,
            "suite finished"
        );
        Ok(result)
    }

    /// Send one request and parse the reply.
    ///
    /// Transport failures and unparsable replies tear the handler down; the
    /// next request spawns a new one.
    pub fn send_request(&mut self, request: &Request) -> Result<Response> {
        let line = serde_json::to_vec(request).context("marshal request")?;

        let exchanged = match self.ensure_handler() {
            Ok(handler) => handler
                .send_line(&line)
                .and_then(|()| handler.read_line()),
            Err(err) => Err(err),
        };
        let raw = match exchanged {
            Ok(raw) => raw,
            Err(err) => {
                self.close_handler();
                return Err(err.into());
            }
        };

        match serde_json::from_slice::<Response>(&raw) {
            Ok(response) => Ok(response),
            Err(err) => {
                // The stream can no longer be trusted to stay in step.
                self.close_handler();
                Err(err).with_context(|| {
                    format!(
                        "failed to parse response: {}",
                        String::from_utf8_lossy(&raw)
                    )
                })
            }
        }
    }

    /// Close the live handler, if any. The next request respawns lazily.
    pub fn close_handler(&mut self) {
        if let Some(mut handler) = self.handler.take() {
            debug!("closing handler");
            handler.close();
        }
    }

    fn ensure_handler(&mut self) -> Result<&mut S::Transport, HandlerError> {
        let handler = match self.handler.take() {
            Some(handler) => handler,
            None => self.spawner.spawn()?,
        };
        Ok(self.handler.insert(handler))
    }
}

impl<S: Spawner> Drop for TestRunner<S> {
    fn drop(&mut self) {
        self.close_handler();
    }
}
