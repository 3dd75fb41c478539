//! Worker Channel
//!
//! Abstracts the worker process for testability. Provides:
//! - WorkerChannel trait: the outbound half the dispatcher writes requests to
//! - ProcessChannel: stdin of a spawned `loot-worker` process
//! - WorkerProcess: owns the child and bounds its shutdown
//! - spawn_reader: the thread that feeds worker stdout into the router

use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use loot_protocol::Request;
use tracing::{debug, error, warn};

use super::router::{Router, RouterError};

/// Outbound half of the worker transport.
pub trait WorkerChannel: Send {
    /// Write one request to the worker.
    fn send(&mut self, request: &Request) -> Result<(), TransportError>;

    /// Stop accepting requests. The worker sees EOF on its input.
    fn close(&mut self) {}
}

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to spawn worker {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("channel closed: {0}")]
    Closed(String),
}

/// Health of the worker channel. `Broken` is permanent for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelState {
    Healthy,
    Broken(String),
}

impl ChannelState {
    pub fn is_broken(&self) -> bool {
        matches!(self, ChannelState::Broken(_))
    }
}

/// How to launch the worker process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

/// Channel writing newline-delimited JSON to the worker's stdin.
pub struct ProcessChannel {
    stdin: Option<ChildStdin>,
}

impl ProcessChannel {
    pub fn new(stdin: ChildStdin) -> Self {
        Self { stdin: Some(stdin) }
    }
}

impl WorkerChannel for ProcessChannel {
    fn send(&mut self, request: &Request) -> Result<(), TransportError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| TransportError::Closed("worker input already closed".to_string()))?;

        let line = request.to_line()?;
        writeln!(stdin, "{}", line)?;
        stdin.flush()?;
        Ok(())
    }

    fn close(&mut self) {
        // Dropping the pipe delivers EOF to the worker loop.
        self.stdin.take();
    }
}

/// A spawned worker process.
pub struct WorkerProcess {
    child: Child,
    shutdown_timeout: Duration,
    reaped: bool,
}

impl WorkerProcess {
    /// Spawn the worker with piped stdin/stdout and inherited stderr.
    pub fn spawn(
        command: &WorkerCommand,
        shutdown_timeout: Duration,
    ) -> Result<(WorkerProcess, ProcessChannel, ChildStdout), TransportError> {
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| TransportError::Spawn {
                program: command.program.display().to_string(),
                source,
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::Closed("worker stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::Closed("worker stdout not captured".to_string()))?;

        debug!(program = %command.program.display(), pid = child.id(), "spawned worker");

        Ok((
            WorkerProcess {
                child,
                shutdown_timeout,
                reaped: false,
            },
            ProcessChannel::new(stdin),
            stdout,
        ))
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Wait for the worker to exit on its own, killing it after the timeout.
    ///
    /// The worker only exits by itself once its stdin is closed.
    pub fn shutdown(&mut self) {
        if self.reaped {
            return;
        }
        self.reaped = true;

        let deadline = Instant::now() + self.shutdown_timeout;
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    debug!(%status, "worker exited");
                    return;
                }
                Ok(None) if Instant::now() < deadline => thread::sleep(Duration::from_millis(10)),
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "failed to poll worker status");
                    break;
                }
            }
        }

        warn!(pid = self.child.id(), "worker did not exit in time, killing it");
        if let Err(e) = self.child.kill() {
            warn!(error = %e, "failed to kill worker");
        }
        let _ = self.child.wait();
    }
}

impl Drop for WorkerProcess {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Start the reader thread pumping worker stdout into `router`.
pub fn spawn_reader(stdout: ChildStdout, router: Router) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("loot-async-reader".to_string())
        .spawn(move || pump(BufReader::new(stdout), &router))
}

/// Feed every inbound line to the router until the stream ends, then
/// report the disconnect.
pub fn pump<R: BufRead>(reader: R, router: &Router) {
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                report(router.on_disconnect(&format!("failed to read from worker: {}", e)));
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        report(router.on_line(&line));
    }
    report(router.on_disconnect("worker closed its output"));
}

fn report(outcome: Result<(), RouterError>) {
    match outcome {
        Ok(()) => {}
        Err(e @ (RouterError::Unsolicited | RouterError::Protocol(_))) => {
            warn!(error = %e, "ignoring worker message");
        }
        Err(e) => error!(error = %e, "fault while routing worker message"),
    }
}
