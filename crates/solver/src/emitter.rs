//! Delivery of SMT-LIB commands to the external solver.
//!
//! An emitter frames and delivers one command per session operation, in
//! invocation order. It never reorders, batches or deduplicates, and it does
//! not read replies; those come back through [`crate::dispatch`].

use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use dualsat_smtlib::command::Command;
use dualsat_smtlib::script::Script;

use crate::error::SolverError;

/// Sink for the textual protocol stream.
pub trait ProtocolEmitter {
    /// Deliver one command. Returns once the command has left the process.
    fn send(&mut self, command: &Command) -> Result<(), SolverError>;
}

impl<E: ProtocolEmitter + ?Sized> ProtocolEmitter for Box<E> {
    fn send(&mut self, command: &Command) -> Result<(), SolverError> {
        (**self).send(command)
    }
}

/// Writes newline-terminated commands to any `Write`, flushing after each.
#[derive(Debug)]
pub struct StreamEmitter<W: Write> {
    writer: W,
}

impl<W: Write> StreamEmitter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ProtocolEmitter for StreamEmitter<W> {
    fn send(&mut self, command: &Command) -> Result<(), SolverError> {
        tracing::trace!(">> {command}");
        writeln!(self.writer, "{command}")
            .and_then(|()| self.writer.flush())
            .map_err(|e| SolverError::ProcessError(format!("Failed to write to solver stdin: {e}")))
    }
}

/// Shared, cloneable record of emitted commands.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    commands: Arc<Mutex<Vec<Command>>>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, command: Command) {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(command);
    }

    /// Snapshot of every command recorded so far.
    pub fn commands(&self) -> Vec<Command> {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Recorded commands rendered as SMT-LIB lines.
    pub fn lines(&self) -> Vec<String> {
        self.commands().iter().map(ToString::to_string).collect()
    }

    pub fn len(&self) -> usize {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Recorded commands as a replayable script.
    pub fn to_script(&self) -> Script {
        Script::with_commands(self.commands())
    }
}

/// Records commands into a [`Transcript`] instead of sending them anywhere.
#[derive(Debug, Clone, Default)]
pub struct TranscriptEmitter {
    transcript: Transcript,
}

impl TranscriptEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle onto the recorded commands; stays valid after the emitter moves.
    pub fn transcript(&self) -> Transcript {
        self.transcript.clone()
    }
}

impl ProtocolEmitter for TranscriptEmitter {
    fn send(&mut self, command: &Command) -> Result<(), SolverError> {
        tracing::trace!(">> {command}");
        self.transcript.record(command.clone());
        Ok(())
    }
}
