//! Handler process controller.
//!
//! Owns one child process and its three pipes for as long as it lives. The
//! exchange primitive never blocks the caller indefinitely: each read waits on
//! a channel fed by a reader thread, bounded by the configured timeout. When a
//! read fails the child is killed immediately, which closes its pipes and lets
//! the reader threads finish on their own.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};
use wait_timeout::ChildExt;

use crate::io::process::{Captured, spawn_line_reader, spawn_stream_drain};

pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_CLOSE_GRACE: Duration = Duration::from_secs(5);
pub const DEFAULT_STDERR_LIMIT_BYTES: usize = 64 * 1024;
pub const DEFAULT_MAX_LINE_BYTES: usize = 16 * 1024 * 1024;

/// How to launch a handler and how long to wait on it.
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    pub path: PathBuf,
    pub args: Vec<String>,
    /// Overrides layered on top of the inherited environment.
    pub env: BTreeMap<String, String>,
    /// Upper bound for each [`Handler::read_line`].
    pub timeout: Duration,
    /// How long [`Handler::close`] waits for a voluntary exit before killing.
    /// Also bounds stderr draining after a kill.
    pub close_grace: Duration,
    pub stderr_limit_bytes: usize,
    /// Longer response lines fail the read instead of growing the buffer.
    pub max_line_bytes: usize,
}

impl HandlerConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            timeout: DEFAULT_HANDLER_TIMEOUT,
            close_grace: DEFAULT_CLOSE_GRACE,
            stderr_limit_bytes: DEFAULT_STDERR_LIMIT_BYTES,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("failed to start handler {path}")]
    Spawn {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to write request to handler")]
    Write(#[source] io::Error),

    #[error("failed to read response from handler")]
    Read(#[source] io::Error),

    #[error("handler timeout: no response within {timeout:?}{}", stderr_suffix(.stderr.as_deref()))]
    Timeout {
        timeout: Duration,
        stderr: Option<String>,
    },

    #[error("handler closed unexpectedly{}", stderr_suffix(.stderr.as_deref()))]
    Closed { stderr: Option<String> },
}

impl HandlerError {
    /// Captured handler stderr, for timeout and close failures.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            HandlerError::Timeout { stderr, .. } | HandlerError::Closed { stderr } => {
                stderr.as_deref()
            }
            _ => None,
        }
    }
}

fn stderr_suffix(stderr: Option<&str>) -> String {
    stderr.map_or_else(String::new, |text| format!(": {text}"))
}

/// Line-oriented request/response channel to a handler.
pub trait Transport {
    /// Write `line` followed by a newline.
    fn send_line(&mut self, line: &[u8]) -> Result<(), HandlerError>;
    /// Wait (bounded) for the next line.
    fn read_line(&mut self) -> Result<Vec<u8>, HandlerError>;
    /// Shut the handler down. Must be safe to call more than once.
    fn close(&mut self);
}

/// Produces fresh transports; the runner calls this lazily after teardown.
pub trait Spawner {
    type Transport: Transport;

    fn spawn(&self) -> Result<Self::Transport, HandlerError>;
}

impl Spawner for HandlerConfig {
    type Transport = Handler;

    fn spawn(&self) -> Result<Handler, HandlerError> {
        Handler::spawn(self)
    }
}

/// A live handler process.
pub struct Handler {
    child: Child,
    stdin: Option<ChildStdin>,
    lines: Receiver<io::Result<Vec<u8>>>,
    stderr: Option<Receiver<Captured>>,
    timeout: Duration,
    close_grace: Duration,
    /// Set once the child has been waited on.
    reaped: bool,
}

impl Handler {
    /// Start the handler with piped stdin/stdout/stderr.
    ///
    /// On any failure after the process started, it is killed and reaped
    /// before returning, so nothing is left behind.
    #[instrument(skip_all, fields(path = %config.path.display()))]
    pub fn spawn(config: &HandlerConfig) -> Result<Self, HandlerError> {
        let spawn_error = |source: io::Error| HandlerError::Spawn {
            path: config.path.display().to_string(),
            source,
        };

        let mut cmd = Command::new(&config.path);
        cmd.args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                error!(err = %err, "failed to spawn handler");
                return Err(spawn_error(err));
            }
        };

        match Self::attach(&mut child, config) {
            Ok((stdin, lines, stderr)) => {
                info!(pid = child.id(), "handler started");
                Ok(Self {
                    child,
                    stdin: Some(stdin),
                    lines,
                    stderr: Some(stderr),
                    timeout: config.timeout,
                    close_grace: config.close_grace,
                    reaped: false,
                })
            }
            Err(err) => {
                error!(err = %err, "failed to attach handler pipes");
                let _ = child.kill();
                let _ = child.wait();
                Err(spawn_error(err))
            }
        }
    }

    #[allow(clippy::type_complexity)]
    fn attach(
        child: &mut Child,
        config: &HandlerConfig,
    ) -> io::Result<(ChildStdin, Receiver<io::Result<Vec<u8>>>, Receiver<Captured>)> {
        let not_piped = |name: &str| io::Error::other(format!("{name} was not piped"));
        let stdin = child.stdin.take().ok_or_else(|| not_piped("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| not_piped("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| not_piped("stderr"))?;
        let lines = spawn_line_reader("handler-stdout", stdout, config.max_line_bytes)?;
        let stderr = spawn_stream_drain("handler-stderr", stderr, config.stderr_limit_bytes)?;
        Ok((stdin, lines, stderr))
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Write `line` plus a trailing newline to the handler's stdin.
    pub fn send_line(&mut self, line: &[u8]) -> Result<(), HandlerError> {
        let stdin = self.stdin.as_mut().ok_or_else(|| {
            HandlerError::Write(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "handler stdin is closed",
            ))
        })?;
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line);
        buf.push(b'\n');
        stdin
            .write_all(&buf)
            .and_then(|()| stdin.flush())
            .map_err(|err| {
                warn!(err = %err, "failed to write to handler");
                HandlerError::Write(err)
            })
    }

    /// Wait up to the configured timeout for one line from the handler.
    ///
    /// Timeout and premature EOF both kill the handler and attach whatever it
    /// printed to stderr to the returned error.
    pub fn read_line(&mut self) -> Result<Vec<u8>, HandlerError> {
        let failure = match self.lines.recv_timeout(self.timeout) {
            Ok(Ok(line)) => return Ok(line),
            Ok(Err(err)) => {
                warn!(err = %err, "handler stdout read failed");
                self.kill_and_drain();
                return Err(HandlerError::Read(err));
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(timeout = ?self.timeout, "handler timed out, killing");
                ReadFailure::Timeout
            }
            Err(RecvTimeoutError::Disconnected) => {
                warn!("handler closed stdout, killing");
                ReadFailure::Closed
            }
        };

        let stderr = self.kill_and_drain();
        Err(match failure {
            ReadFailure::Timeout => HandlerError::Timeout {
                timeout: self.timeout,
                stderr,
            },
            ReadFailure::Closed => HandlerError::Closed { stderr },
        })
    }

    /// Close stdin, wait up to the grace period, then force-kill.
    pub fn close(&mut self) {
        drop(self.stdin.take());
        if self.reaped {
            return;
        }
        match self.child.wait_timeout(self.close_grace) {
            Ok(Some(status)) => {
                if status.success() {
                    debug!("handler exited");
                } else {
                    warn!(exit_code = ?status.code(), "handler exited with error");
                }
            }
            Ok(None) => {
                warn!(grace = ?self.close_grace, "handler did not exit in time, killing");
                self.kill();
            }
            Err(err) => {
                warn!(err = %err, "failed waiting for handler exit, killing");
                self.kill();
            }
        }
        self.reaped = true;
    }

    fn kill(&mut self) {
        if let Err(err) = self.child.kill() {
            debug!(err = %err, "kill handler");
        }
        // Kill was issued, so this wait terminates.
        if let Err(err) = self.child.wait() {
            warn!(err = %err, "wait handler after kill");
        }
        self.reaped = true;
    }

    /// Kill the child so stderr closes, then collect what it wrote.
    fn kill_and_drain(&mut self) -> Option<String> {
        drop(self.stdin.take());
        self.kill();
        let rx = self.stderr.take()?;
        match rx.recv_timeout(self.close_grace) {
            Ok(captured) => captured.text(),
            Err(_) => {
                // A grandchild may still hold the pipe open.
                warn!("handler stderr did not close after kill");
                None
            }
        }
    }
}

enum ReadFailure {
    Timeout,
    Closed,
}

impl Transport for Handler {
    fn send_line(&mut self, line: &[u8]) -> Result<(), HandlerError> {
        Handler::send_line(self, line)
    }

    fn read_line(&mut self) -> Result<Vec<u8>, HandlerError> {
        Handler::read_line(self)
    }

    fn close(&mut self) {
        Handler::close(self);
    }
}

impl Drop for Handler {
    fn drop(&mut self) {
        if !self.reaped {
            self.kill();
        }
    }
}
