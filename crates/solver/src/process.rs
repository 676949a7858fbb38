//! A cooperating solver running as a child process.
//!
//! The child speaks SMT-LIB on stdin/stdout. Commands go in through a
//! [`StreamEmitter`] over its stdin; a reader thread turns stdout into
//! ticketed replies on a [`ResponseDispatcher`].

use std::io::{BufRead, BufReader};
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::{ExternalSolverConfig, SolverKind};
use crate::dispatch::{Reply, ResponseDispatcher, ResponseReceiver, response_channel};
use crate::emitter::StreamEmitter;
use crate::error::SolverError;
use crate::parser::{ReplyEvent, ReplyReader};

/// How long a child gets to exit on its own after `(exit)` before it is killed.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Owns the child process and its output threads.
///
/// Dropping the guard waits briefly for the child to exit and kills it
/// if it is still running.
#[derive(Debug)]
pub struct ExternalProcess {
    child: Child,
    kind: SolverKind,
    threads: Vec<JoinHandle<()>>,
}

impl ExternalProcess {
    /// Start the solver and wire its pipes.
    ///
    /// Returns the process guard, an emitter over its stdin and the
    /// receiving end of its replies.
    pub fn spawn(
        config: &ExternalSolverConfig,
    ) -> Result<(Self, StreamEmitter<ChildStdin>, ResponseReceiver), SolverError> {
        config.validate()?;
        let args = config.build_args();
        tracing::info!(
            kind = %config.kind,
            path = %config.solver_path.display(),
            ?args,
            "Starting external solver"
        );

        let mut child = Command::new(&config.solver_path)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                SolverError::ProcessError(format!("Failed to start {}: {e}", config.kind))
            })?;

        let pipes = (child.stdin.take(), child.stdout.take(), child.stderr.take());
        let (Some(stdin), Some(stdout), Some(stderr)) = pipes else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(SolverError::ProcessError(format!(
                "Failed to open {} pipes",
                config.kind
            )));
        };

        let (dispatcher, receiver) = response_channel();
        let kind = config.kind;
        let mut threads = Vec::with_capacity(2);
        for spawned in [
            thread::Builder::new()
                .name(format!("{kind}-stdout"))
                .spawn(move || read_replies(stdout, dispatcher, kind)),
            thread::Builder::new()
                .name(format!("{kind}-stderr"))
                .spawn(move || drain_stderr(stderr, kind)),
        ] {
            match spawned {
                Ok(handle) => threads.push(handle),
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(SolverError::ProcessError(format!(
                        "Failed to start reader thread: {e}"
                    )));
                }
            }
        }

        let process = Self {
            child,
            kind,
            threads,
        };
        Ok((process, StreamEmitter::new(stdin), receiver))
    }

    pub fn kind(&self) -> SolverKind {
        self.kind
    }

    /// OS process id of the child.
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Exit status if the child has already terminated.
    pub fn try_status(&mut self) -> Option<ExitStatus> {
        self.child.try_wait().ok().flatten()
    }

    /// Wait up to `grace` for the child to exit, then kill it.
    fn shutdown(&mut self, grace: Duration) {
        let start = Instant::now();
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    tracing::debug!(kind = %self.kind, %status, "External solver exited");
                    break;
                }
                Ok(None) if start.elapsed() < grace => thread::sleep(Duration::from_millis(10)),
                Ok(None) => {
                    tracing::warn!(kind = %self.kind, "External solver did not exit, killing it");
                    let _ = self.child.kill();
                    let _ = self.child.wait();
                    break;
                }
                Err(e) => {
                    tracing::warn!(kind = %self.kind, "Failed to wait for external solver: {e}");
                    let _ = self.child.kill();
                    break;
                }
            }
        }
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for ExternalProcess {
    fn drop(&mut self) {
        self.shutdown(SHUTDOWN_GRACE);
    }
}

/// Reader thread body: one reply per complete answer on stdout.
fn read_replies(stdout: ChildStdout, mut dispatcher: ResponseDispatcher, kind: SolverKind) {
    let mut reader = ReplyReader::new();
    for line in BufReader::new(stdout).lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(%kind, "Failed to read solver output: {e}");
                break;
            }
        };
        tracing::trace!("<< {line}");
        let delivered = match reader.feed_line(&line) {
            Ok(Some(ReplyEvent::CheckSat(outcome))) => dispatcher.deliver_outcome(outcome),
            Ok(Some(ReplyEvent::Model(model))) => dispatcher.deliver(Reply::Model(model)),
            Ok(Some(ReplyEvent::SolverError(msg))) => {
                tracing::warn!(%kind, "Solver reported an error: {msg}");
                dispatcher.deliver_error(msg)
            }
            Ok(None) => true,
            Err(e) => {
                tracing::warn!(%kind, "Unreadable solver output: {e}");
                dispatcher.deliver_error(e.to_string())
            }
        };
        if !delivered {
            break;
        }
    }
    tracing::debug!(%kind, replies = dispatcher.delivered(), "Solver output closed");
}

fn drain_stderr(stderr: ChildStderr, kind: SolverKind) {
    for line in BufReader::new(stderr).lines().map_while(Result::ok) {
        tracing::debug!(%kind, "stderr: {line}");
    }
}
