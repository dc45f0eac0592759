//! Test-only helpers: test-case builders, scripted handlers, shell handlers.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde_json::{Value, json};
use tempfile::TempDir;

use crate::core::protocol::{Request, Response, TestCase, TestSuite};
use crate::io::handler::{HandlerConfig, HandlerError, Spawner, Transport};

/// Build a test case. A created reference is also the expected bare result.
pub fn test_case(id: &str, method: &str, params: Value, reference: Option<&str>) -> TestCase {
    let params = match params {
        Value::Object(map) if !map.is_empty() => Some(map),
        _ => None,
    };
    TestCase {
        description: None,
        request: Request {
            id: id.to_string(),
            method: method.to_string(),
            params,
            reference: reference.map(str::to_string),
        },
        expected_response: Response {
            result: reference.map(|name| json!(name)),
            error: None,
        },
    }
}

/// Replace the expected response with `expected` (JSON response object).
pub fn with_expected(mut test: TestCase, expected: Value) -> TestCase {
    test.expected_response =
        serde_json::from_value(expected).expect("expected response json");
    test
}

pub fn suite(name: &str, stateful: bool, tests: Vec<TestCase>) -> TestSuite {
    TestSuite {
        name: name.to_string(),
        description: None,
        tests,
        stateful,
    }
}

/// Handler config running `script` under `sh -c` with short test timeouts.
pub fn sh_handler(script: &str) -> HandlerConfig {
    let mut config = HandlerConfig::new("sh");
    config.args = vec!["-c".to_string(), script.to_string()];
    config.timeout = Duration::from_secs(5);
    config.close_grace = Duration::from_secs(2);
    config
}

/// Scratch directory holding suite files.
pub struct SuiteDir {
    dir: TempDir,
}

impl SuiteDir {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir().context("create tempdir")?,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `suite` as `<file_name>` and return its path.
    pub fn write(&self, file_name: &str, suite: &TestSuite) -> Result<PathBuf> {
        let path = self.dir.path().join(file_name);
        let mut buf = serde_json::to_string_pretty(suite).context("serialize suite")?;
        buf.push('\n');
        fs::write(&path, buf).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }
}

/// One scripted handler reaction to a request.
#[derive(Debug, Clone)]
pub enum Reply {
    Line(String),
    Timeout,
    Closed,
}

impl Reply {
    pub fn line(line: &str) -> Self {
        Reply::Line(line.to_string())
    }
}

#[derive(Debug, Default)]
struct Script {
    replies: VecDeque<Reply>,
    sent: Vec<String>,
    spawns: usize,
    closes: usize,
    fail_spawn: bool,
}

/// Spawner whose transports answer from a shared reply queue.
///
/// Clones share the queue and counters, so a test can keep one clone for
/// assertions while the runner owns another.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSpawner {
    script: Rc<RefCell<Script>>,
}

impl ScriptedSpawner {
    pub fn new(replies: Vec<Reply>) -> Self {
        let script = Script {
            replies: replies.into(),
            ..Script::default()
        };
        Self {
            script: Rc::new(RefCell::new(script)),
        }
    }

    /// Spawner whose every spawn attempt fails.
    pub fn failing_spawn() -> Self {
        let spawner = Self::new(Vec::new());
        spawner.script.borrow_mut().fail_spawn = true;
        spawner
    }

    pub fn spawn_count(&self) -> usize {
        self.script.borrow().spawns
    }

    pub fn close_count(&self) -> usize {
        self.script.borrow().closes
    }

    /// Request ids in the order they reached a transport.
    pub fn sent_ids(&self) -> Vec<String> {
        self.script
            .borrow()
            .sent
            .iter()
            .map(|line| {
                serde_json::from_str::<Request>(line)
                    .map(|request| request.id)
                    .unwrap_or_else(|_| line.clone())
            })
            .collect()
    }

    pub fn assert_drained(&self) -> Result<()> {
        let remaining = self.script.borrow().replies.len();
        if remaining > 0 {
            bail!("scripted handler has {remaining} unused replies");
        }
        Ok(())
    }
}

impl Spawner for ScriptedSpawner {
    type Transport = ScriptedTransport;

    fn spawn(&self) -> Result<ScriptedTransport, HandlerError> {
        let mut script = self.script.borrow_mut();
        if script.fail_spawn {
            return Err(HandlerError::Spawn {
                path: "scripted".to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "scripted spawn failure"),
            });
        }
        script.spawns += 1;
        Ok(ScriptedTransport {
            script: Rc::clone(&self.script),
            closed: false,
        })
    }
}

#[derive(Debug)]
pub struct ScriptedTransport {
    script: Rc<RefCell<Script>>,
    closed: bool,
}

impl Transport for ScriptedTransport {
    fn send_line(&mut self, line: &[u8]) -> Result<(), HandlerError> {
        self.script
            .borrow_mut()
            .sent
            .push(String::from_utf8_lossy(line).into_owned());
        Ok(())
    }

    fn read_line(&mut self) -> Result<Vec<u8>, HandlerError> {
        match self.script.borrow_mut().replies.pop_front() {
            Some(Reply::Line(line)) => Ok(line.into_bytes()),
            Some(Reply::Timeout) => Err(HandlerError::Timeout {
                timeout: Duration::from_secs(10),
                stderr: None,
            }),
            Some(Reply::Closed) | None => Err(HandlerError::Closed { stderr: None }),
        }
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.script.borrow_mut().closes += 1;
        }
    }
}
