//! Where a session's protocol stream goes and where its replies come from.

use std::time::Duration;

use dualsat_smtlib::command::Command;

use crate::config::ExternalSolverConfig;
use crate::dispatch::{CancelHandle, ResponseReceiver, WaitResult, response_channel};
use crate::emitter::{ProtocolEmitter, Transcript, TranscriptEmitter};
use crate::error::SolverError;
use crate::process::ExternalProcess;

/// The owning context of a session: an emitter for outgoing commands, the
/// receiver for replies and, when the responder is a child process, the
/// guard that keeps it alive.
pub struct SolverContext {
    // Field order matters: stdin closes before the process guard waits.
    emitter: Box<dyn ProtocolEmitter>,
    receiver: ResponseReceiver,
    transcript: Option<Transcript>,
    process: Option<ExternalProcess>,
}

impl SolverContext {
    /// Start an external solver and talk to it over its pipes.
    pub fn spawn(config: &ExternalSolverConfig) -> Result<Self, SolverError> {
        let (process, emitter, receiver) = ExternalProcess::spawn(config)?;
        Ok(Self {
            emitter: Box::new(emitter),
            receiver,
            transcript: None,
            process: Some(process),
        })
    }

    /// Use a caller-supplied emitter and reply channel.
    ///
    /// The matching [`crate::ResponseDispatcher`] stays with the caller,
    /// which answers each `(check-sat)` / `(get-model)` in order.
    pub fn channel(emitter: impl ProtocolEmitter + 'static, receiver: ResponseReceiver) -> Self {
        Self {
            emitter: Box::new(emitter),
            receiver,
            transcript: None,
            process: None,
        }
    }

    /// No external responder. Commands are only recorded, and any wait for
    /// an external reply ends immediately as disconnected.
    pub fn detached() -> Self {
        let emitter = TranscriptEmitter::new();
        let transcript = emitter.transcript();
        let (_, receiver) = response_channel();
        Self {
            emitter: Box::new(emitter),
            receiver,
            transcript: Some(transcript),
            process: None,
        }
    }

    /// Recorded commands of a detached context.
    pub fn transcript(&self) -> Option<Transcript> {
        self.transcript.clone()
    }

    /// Guard of the spawned solver, if any.
    pub fn process(&self) -> Option<&ExternalProcess> {
        self.process.as_ref()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.receiver.cancel_handle()
    }

    pub(crate) fn send(&mut self, command: &Command) -> Result<(), SolverError> {
        self.emitter.send(command)
    }

    pub(crate) fn issue_ticket(&mut self) -> u64 {
        self.receiver.issue_ticket()
    }

    pub(crate) fn wait(&mut self, ticket: u64, timeout: Duration, heartbeat: Duration) -> WaitResult {
        self.receiver.wait(ticket, timeout, heartbeat)
    }
}

impl std::fmt::Debug for SolverContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolverContext")
            .field("detached", &self.transcript.is_some())
            .field("process", &self.process.as_ref().map(ExternalProcess::id))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detached_context_records_and_disconnects() {
        let mut context = SolverContext::detached();
        let transcript = context.transcript().unwrap();
        context.send(&Command::CheckSat).unwrap();
        let ticket = context.issue_ticket();
        assert_eq!(
            context.wait(ticket, Duration::from_secs(5), Duration::from_millis(10)),
            WaitResult::Disconnected
        );
        assert_eq!(transcript.commands(), vec![Command::CheckSat]);
        assert!(context.process().is_none());
    }

    #[test]
    fn channel_context_has_no_transcript() {
        let (_dispatcher, receiver) = response_channel();
        let context = SolverContext::channel(TranscriptEmitter::new(), receiver);
        assert!(context.transcript().is_none());
    }
}
