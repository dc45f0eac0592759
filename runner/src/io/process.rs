//! Background readers for child process pipes.
//!
//! Each pipe is owned by a dedicated thread so the caller can wait on a channel
//! with a deadline instead of blocking inside `read`. A reader exits on its own
//! once the pipe reaches EOF, which killing the child guarantees.

use std::io::{self, BufRead, BufReader, Read};
use std::sync::mpsc::{self, Receiver};
use std::thread;

use anyhow::{Context, Result};
use tracing::{trace, warn};

/// Output captured from a drained stream.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Captured {
    pub bytes: Vec<u8>,
    /// Bytes discarded past the capture limit.
    pub truncated: usize,
}

impl Captured {
    /// Trimmed lossy text, or `None` when nothing printable was captured.
    pub fn text(&self) -> Option<String> {
        let text = String::from_utf8_lossy(&self.bytes).trim().to_string();
        if text.is_empty() {
            return None;
        }
        if self.truncated > 0 {
            return Some(format!("{text}\n[truncated {} bytes]", self.truncated));
        }
        Some(text)
    }
}

/// Spawn a thread that forwards newline-terminated lines from `reader`.
///
/// Lines are delivered without the trailing `\n` / `\r\n`. A final
/// unterminated fragment is delivered as a line too. A line longer than
/// `max_line_bytes` is forwarded as an `InvalidData` error instead of being
/// buffered further. The channel disconnects when the stream reaches EOF or
/// after the first error is forwarded.
pub fn spawn_line_reader<R>(
    name: &str,
    reader: R,
    max_line_bytes: usize,
) -> io::Result<Receiver<io::Result<Vec<u8>>>>
where
    R: Read + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    // Room for the line plus its newline.
    let cap = u64::try_from(max_line_bytes.saturating_add(1)).unwrap_or(u64::MAX);
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let mut reader = BufReader::new(reader);
            loop {
                let mut line = Vec::new();
                match reader.by_ref().take(cap).read_until(b'\n', &mut line) {
                    Ok(0) => break,
                    Ok(_) if line.last() != Some(&b'\n') && line.len() > max_line_bytes => {
                        warn!(limit = max_line_bytes, "line exceeds limit");
                        let _ = tx.send(Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!("line exceeds {max_line_bytes} bytes"),
                        )));
                        break;
                    }
                    Ok(_) => {
                        strip_line_ending(&mut line);
                        trace!(bytes = line.len(), "line read");
                        if tx.send(Ok(line)).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        let _ = tx.send(Err(err));
                        break;
                    }
                }
            }
        })?;
    Ok(rx)
}

/// Spawn a thread that drains `reader` to EOF and delivers the capture once.
pub fn spawn_stream_drain<R>(name: &str, reader: R, limit: usize) -> io::Result<Receiver<Captured>>
where
    R: Read + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let captured = match read_stream_limited(reader, limit) {
                Ok((bytes, truncated)) => Captured { bytes, truncated },
                Err(err) => {
                    warn!(err = %err, "failed to drain stream");
                    Captured::default()
                }
            };
            let _ = tx.send(captured);
        })?;
    Ok(rx)
}

fn strip_line_ending(line: &mut Vec<u8>) {
    if line.last() == Some(&b'\n') {
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
    }
}

/// Read a stream to EOF, keeping at most `limit` bytes.
///
/// Bytes beyond the limit are discarded while still draining the pipe so the
/// writer never blocks on a full buffer.
pub fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}
