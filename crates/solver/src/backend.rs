//! The in-process side of a session.
//!
//! Every session owns exactly one `SolverBackend`. In native mode it answers
//! checks and produces models; in external mode it is mutated in lockstep with
//! the protocol stream and only consulted for diagnostics.
//!
//! `create_backend` picks the implementation: the Z3 engine when the
//! `z3-native` feature is enabled, otherwise the solver-less `ShadowBackend`.

use std::fmt::Write as _;

use dualsat_smtlib::command::Command;
use dualsat_smtlib::sort::Sort;
use dualsat_smtlib::term::Term;

use crate::config::{BackendMode, SolverOption};
use crate::error::SolverError;
use crate::model::Model;
use crate::result::Outcome;

/// Primitive operations on one solver instance.
///
/// The session validates preconditions (stack depth, lifecycle) before
/// calling in, so implementations may assume a well-formed call sequence.
/// Dropping the backend releases the instance and everything it owns.
pub trait SolverBackend {
    /// Apply construction-time parameters, in order. Called at most once.
    fn configure(&mut self, options: &[SolverOption]) -> Result<(), SolverError>;

    /// Declare a constant in the current frame.
    fn declare(&mut self, name: &str, sort: &Sort) -> Result<(), SolverError>;

    /// Add an assertion to the current frame.
    fn assert(&mut self, term: &Term) -> Result<(), SolverError>;

    /// Add SMT-LIB text to the current frame. The session has already
    /// checked it with `assertable_declarations`, so it only declares,
    /// defines and asserts.
    fn assert_text(&mut self, text: &str) -> Result<(), SolverError>;

    /// Open a new frame.
    fn push(&mut self) -> Result<(), SolverError>;

    /// Discard the `n` innermost frames.
    fn pop(&mut self, n: u32) -> Result<(), SolverError>;

    /// Decide satisfiability of the current assertions.
    fn check(&mut self) -> Result<Outcome, SolverError>;

    /// Assignments of the declared constants after a satisfiable check.
    fn model(&self) -> Result<Model, SolverError>;

    /// Drop all frames, assertions and declarations.
    fn reset(&mut self) -> Result<(), SolverError>;

    /// Human-readable dump of the current solver state.
    fn display(&self) -> String;
}

/// Create the backend for a session.
///
/// With the `z3-native` feature both modes get the Z3 engine.
#[cfg(feature = "z3-native")]
pub fn create_backend(
    mode: BackendMode,
    incremental: bool,
) -> Result<Box<dyn SolverBackend>, SolverError> {
    use crate::z3_native::Z3Backend;
    tracing::debug!(%mode, incremental, "Using Z3 native API backend");
    Ok(Box::new(Z3Backend::new(incremental)))
}

/// Create the backend for a session.
///
/// Native mode needs the `z3-native` feature; without it construction fails
/// with `BackendUnavailable`. External mode falls back to `ShadowBackend`.
#[cfg(not(feature = "z3-native"))]
pub fn create_backend(
    mode: BackendMode,
    incremental: bool,
) -> Result<Box<dyn SolverBackend>, SolverError> {
    match mode {
        BackendMode::Native => Err(SolverError::BackendUnavailable(
            "native mode requires the `z3-native` feature".to_string(),
        )),
        BackendMode::External => {
            tracing::debug!(incremental, "Using shadow backend");
            Ok(Box::new(ShadowBackend::new()))
        }
    }
}

/// Commands recorded in one frame, in the order they were applied.
type Frame = Vec<Command>;

/// Backend that records session state without solving.
///
/// Keeps the frame-scoped declarations and assertions plus the applied
/// options. `check` is `Sat` when nothing has been asserted and `Unknown`
/// otherwise.
#[derive(Debug, Clone)]
pub struct ShadowBackend {
    options: Vec<SolverOption>,
    frames: Vec<Frame>,
    last_check: Option<Outcome>,
}

impl ShadowBackend {
    pub fn new() -> Self {
        Self {
            options: Vec::new(),
            frames: vec![Frame::new()],
            last_check: None,
        }
    }

    /// Options applied by `configure`, in application order.
    pub fn options(&self) -> &[SolverOption] {
        &self.options
    }

    /// Number of frames opened by `push` and not yet popped.
    pub fn depth(&self) -> u32 {
        (self.frames.len() - 1) as u32
    }

    fn entries(&self) -> impl Iterator<Item = &Command> {
        self.frames.iter().flatten()
    }

    /// All live term assertions, outermost frame first.
    pub fn assertions(&self) -> impl Iterator<Item = &Term> {
        self.entries().filter_map(|cmd| match cmd {
            Command::Assert(term) => Some(term),
            _ => None,
        })
    }

    /// All live declarations, outermost frame first.
    pub fn declarations(&self) -> impl Iterator<Item = (&str, &Sort)> {
        self.entries().filter_map(|cmd| match cmd {
            Command::DeclareConst(name, sort) => Some((name.as_str(), sort)),
            _ => None,
        })
    }

    /// SMT-LIB text added through `assert_text`, outermost frame first.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.entries().filter_map(|cmd| match cmd {
            Command::Verbatim(text) => Some(text.as_str()),
            _ => None,
        })
    }

    fn record(&mut self, command: Command) {
        self.last_check = None;
        if let Some(frame) = self.frames.last_mut() {
            frame.push(command);
        }
    }
}

impl Default for ShadowBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SolverBackend for ShadowBackend {
    fn configure(&mut self, options: &[SolverOption]) -> Result<(), SolverError> {
        self.options.extend(options.iter().cloned());
        Ok(())
    }

    fn declare(&mut self, name: &str, sort: &Sort) -> Result<(), SolverError> {
        self.record(Command::DeclareConst(name.to_string(), sort.clone()));
        Ok(())
    }

    fn assert(&mut self, term: &Term) -> Result<(), SolverError> {
        self.record(Command::Assert(term.clone()));
        Ok(())
    }

    fn assert_text(&mut self, text: &str) -> Result<(), SolverError> {
        self.record(Command::Verbatim(text.to_string()));
        Ok(())
    }

    fn push(&mut self) -> Result<(), SolverError> {
        self.last_check = None;
        self.frames.push(Frame::new());
        Ok(())
    }

    fn pop(&mut self, n: u32) -> Result<(), SolverError> {
        let depth = self.depth();
        if n > depth {
            return Err(SolverError::InvalidStackPop {
                requested: n,
                depth,
            });
        }
        self.last_check = None;
        self.frames.truncate(self.frames.len() - n as usize);
        Ok(())
    }

    fn check(&mut self) -> Result<Outcome, SolverError> {
        let asserted = self
            .entries()
            .any(|cmd| matches!(cmd, Command::Assert(_) | Command::Verbatim(_)));
        let outcome = if asserted {
            Outcome::Unknown("shadow backend does not solve".to_string())
        } else {
            Outcome::Sat
        };
        self.last_check = Some(outcome.clone());
        Ok(outcome)
    }

    fn model(&self) -> Result<Model, SolverError> {
        // With no assertions every assignment satisfies; leave all symbols
        // to sort-default completion.
        match self.last_check {
            Some(Outcome::Sat) => Ok(Model::new()),
            _ => Err(SolverError::NoModel),
        }
    }

    fn reset(&mut self) -> Result<(), SolverError> {
        self.frames = vec![Frame::new()];
        self.last_check = None;
        Ok(())
    }

    fn display(&self) -> String {
        let mut out = String::new();
        for (level, frame) in self.frames.iter().enumerate() {
            if level > 0 {
                let _ = writeln!(out, "{}", Command::Push(1));
            }
            for command in frame {
                let _ = writeln!(out, "{command}");
            }
        }
        out
    }
}
