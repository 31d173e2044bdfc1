//! Container engine access
//!
//! Provides an engine-agnostic interface for building, pulling and
//! running images:
//! - Podman (default)
//! - Docker, via the same CLI surface

mod factory;
#[cfg(test)]
pub(crate) mod fake;
mod podman;
mod runtime;

pub use factory::{create_engine, detect_binary};
pub use podman::PodmanEngine;
pub use runtime::{BuildRequest, ContainerEngine, OutputSink, RunSpec};

use crate::error::{DrydockError, DrydockResult};
use std::collections::VecDeque;
use std::process::ExitStatus;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio_util::sync::CancellationToken;

/// Max number of output lines to include in build error messages.
const BUILD_ERROR_TAIL_LINES: usize = 50;

/// Engine output fragments that indicate a failure worth retrying
const TRANSIENT_PATTERNS: &[&str] = &[
    "connection reset",
    "connection refused",
    "i/o timeout",
    "tls handshake timeout",
    "temporary failure in name resolution",
    "no such host",
    "unexpected eof",
    "toomanyrequests",
    "too many requests",
    "502 bad gateway",
    "503 service unavailable",
    "504 gateway timeout",
];

/// Extract the useful tail of engine output for error diagnostics.
///
/// Returns the last `BUILD_ERROR_TAIL_LINES` lines so error messages are
/// actionable without being overwhelming.
pub(crate) fn build_error_output(lines: &[String]) -> String {
    let start = lines.len().saturating_sub(BUILD_ERROR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Whether engine output looks like a network or registry hiccup
pub(crate) fn is_transient_output(lines: &[String]) -> bool {
    lines.iter().any(|line| {
        let line = line.to_ascii_lowercase();
        TRANSIENT_PATTERNS.iter().any(|p| line.contains(p))
    })
}

/// Stream stdout+stderr from a child process, calling `on_output` for each line.
///
/// Lines are decoded lossily so non-UTF-8 output never stops the read
/// loop. Returns the last `BUILD_ERROR_TAIL_LINES` lines for error
/// reporting.
pub(crate) async fn stream_child_output(
    child: &mut tokio::process::Child,
    on_output: OutputSink<'_>,
) -> Vec<String> {
    let mut stderr = OutputStream::new(child.stderr.take());
    let mut stdout = OutputStream::new(child.stdout.take());
    let mut tail = VecDeque::with_capacity(BUILD_ERROR_TAIL_LINES);

    while !stderr.is_done() || !stdout.is_done() {
        let line = tokio::select! {
            line = stderr.next_line(), if !stderr.is_done() => line,
            line = stdout.next_line(), if !stdout.is_done() => line,
        };
        if let Some(line) = line {
            on_output(line.clone());
            if tail.len() == BUILD_ERROR_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }
    }

    tail.into_iter().collect()
}

/// One pipe of a child process, read line by line as raw bytes
struct OutputStream<R> {
    reader: Option<BufReader<R>>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> OutputStream<R> {
    fn new(pipe: Option<R>) -> Self {
        Self {
            reader: pipe.map(BufReader::new),
            buf: Vec::new(),
        }
    }

    fn is_done(&self) -> bool {
        self.reader.is_none()
    }

    /// Next line, or `None` once the pipe hit EOF or a read error
    ///
    /// Bytes from a read interrupted by `select!` stay in `buf` and are
    /// completed by the next call.
    async fn next_line(&mut self) -> Option<String> {
        let reader = self.reader.as_mut()?;
        match reader.read_until(b'\n', &mut self.buf).await {
            Ok(n) if n > 0 && self.buf.ends_with(b"\n") => Some(self.take_line()),
            // EOF without a trailing newline, or a read error
            _ => {
                self.reader = None;
                (!self.buf.is_empty()).then(|| self.take_line())
            }
        }
    }

    fn take_line(&mut self) -> String {
        let mut end = self.buf.len();
        if self.buf[..end].ends_with(b"\n") {
            end -= 1;
        }
        if self.buf[..end].ends_with(b"\r") {
            end -= 1;
        }
        let line = String::from_utf8_lossy(&self.buf[..end]).into_owned();
        self.buf.clear();
        line
    }
}

/// How a supervised child process ended
pub(crate) enum ChildOutcome {
    Exited {
        status: ExitStatus,
        output: Vec<String>,
    },
    Cancelled,
}

/// Stream a child's output until it exits or `cancel` fires
///
/// On cancellation the child is left running; the caller decides how to
/// stop it.
pub(crate) async fn supervise_child(
    child: &mut tokio::process::Child,
    command: &str,
    on_output: OutputSink<'_>,
    cancel: &CancellationToken,
) -> DrydockResult<ChildOutcome> {
    let finished = async {
        let output = stream_child_output(child, on_output).await;
        let status = child.wait().await;
        (status, output)
    };

    tokio::select! {
        (status, output) = finished => {
            let status = status.map_err(|e| DrydockError::command_failed(command, e))?;
            Ok(ChildOutcome::Exited { status, output })
        }
        _ = cancel.cancelled() => Ok(ChildOutcome::Cancelled),
    }
}
