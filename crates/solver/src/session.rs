//! The session controller.
//!
//! A [`Session`] owns one backend and one protocol stream and keeps them in
//! step: every mutating call is turned into a single [`Operation`], applied
//! to the backend first and then emitted as its SMT-LIB command. Which side
//! answers a `check` is decided by the session's [`BackendMode`].
//!
//! ```text
//!            declare/assert/push/pop/reset
//!               +-------+
//!               v       |
//!   new ----> Idle -----+---- submit_check ----> AwaitingCheckResult
//!              ^ |                                       |
//!              | +---------- await_outcome <-------------+
//!              |
//!   destroy (from any state except Destroyed) ----> Destroyed
//!   failed delivery after backend mutation -------> Faulted
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dualsat_smtlib::command::Command;
use dualsat_smtlib::script::assertable_declarations;
use dualsat_smtlib::sort::Sort;
use dualsat_smtlib::term::Term;

use crate::backend::{SolverBackend, create_backend};
use crate::config::{BackendMode, SessionConfig, SolverOption};
use crate::context::SolverContext;
use crate::dispatch::{CancelHandle, Reply, WaitResult};
use crate::emitter::Transcript;
use crate::error::SolverError;
use crate::model::{Model, ResultModel};
use crate::result::Outcome;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Ready for any operation.
    Idle,
    /// A check was submitted and its outcome not yet collected.
    AwaitingCheckResult,
    /// The backend was mutated but the matching command could not be
    /// delivered. Only `destroy` is accepted.
    Faulted,
    /// Terminal.
    Destroyed,
}

/// A session-mutating operation.
///
/// The same value drives the backend mutation and the emitted command, so
/// the two sides cannot drift apart.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Declare { name: String, sort: Sort },
    Assert(Term),
    /// SMT-LIB declarations, definitions and assertions given as text.
    AssertText(String),
    Push,
    Pop(u32),
    Reset,
}

impl Operation {
    /// The protocol command mirroring this operation.
    pub fn command(&self) -> Command {
        match self {
            Operation::Declare { name, sort } => Command::DeclareConst(name.clone(), sort.clone()),
            Operation::Assert(term) => Command::Assert(term.clone()),
            Operation::AssertText(text) => Command::Verbatim(text.clone()),
            Operation::Push => Command::Push(1),
            Operation::Pop(n) => Command::Pop(*n),
            Operation::Reset => Command::Reset,
        }
    }

    fn apply(&self, backend: &mut dyn SolverBackend) -> Result<(), SolverError> {
        match self {
            Operation::Declare { name, sort } => backend.declare(name, sort),
            Operation::Assert(term) => backend.assert(term),
            Operation::AssertText(text) => backend.assert_text(text),
            Operation::Push => backend.push(),
            Operation::Pop(n) => backend.pop(*n),
            Operation::Reset => backend.reset(),
        }
    }
}

#[derive(Debug)]
struct PendingCheck {
    ticket: u64,
    /// Backend answer, present in native mode.
    native: Option<Outcome>,
}

/// A solving session over one backend and one protocol stream.
pub struct Session {
    config: SessionConfig,
    options: Vec<SolverOption>,
    backend: Option<Box<dyn SolverBackend>>,
    context: SolverContext,
    state: SessionState,
    depth: u32,
    /// Declared symbol sorts, one entry per open frame.
    frames: Vec<Vec<(String, Sort)>>,
    generation: Arc<AtomicU64>,
    pending: Option<PendingCheck>,
    /// Generation and outcome of the most recent completed check.
    last_check: Option<(u64, Outcome)>,
    fault: Option<String>,
}

impl Session {
    /// Create a session with the backend selected by `config.mode`.
    ///
    /// Fails if options are malformed under `OptionPolicy::Reject` or the
    /// backend cannot be created.
    pub fn new(config: SessionConfig, context: SolverContext) -> Result<Self, SolverError> {
        let backend = create_backend(config.mode, config.incremental)?;
        Self::with_backend(config, backend, context)
    }

    /// Create a session without an external responder.
    pub fn detached(config: SessionConfig) -> Result<Self, SolverError> {
        Self::new(config, SolverContext::detached())
    }

    /// Create a session over a caller-supplied backend.
    pub fn with_backend(
        config: SessionConfig,
        mut backend: Box<dyn SolverBackend>,
        context: SolverContext,
    ) -> Result<Self, SolverError> {
        let options = config.resolve_options()?;
        backend.configure(&options)?;
        tracing::info!(
            mode = %config.mode,
            incremental = config.incremental,
            options = options.len(),
            "Session created"
        );
        Ok(Self {
            config,
            options,
            backend: Some(backend),
            context,
            state: SessionState::Idle,
            depth: 0,
            frames: vec![Vec::new()],
            generation: Arc::new(AtomicU64::new(0)),
            pending: None,
            last_check: None,
            fault: None,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn mode(&self) -> BackendMode {
        self.config.mode
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Options that were applied to the backend, in application order.
    pub fn options(&self) -> &[SolverOption] {
        &self.options
    }

    /// Number of open frames.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Current generation. Advances on every mutating operation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Whether a submitted check is waiting to be collected.
    pub fn is_awaiting(&self) -> bool {
        self.state == SessionState::AwaitingCheckResult
    }

    /// Recorded commands when the session runs on a detached context.
    pub fn transcript(&self) -> Option<Transcript> {
        self.context.transcript()
    }

    /// Handle that aborts an outstanding wait for an external reply.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.context.cancel_handle()
    }

    pub fn context(&self) -> &SolverContext {
        &self.context
    }

    /// Backend state dump.
    pub fn display(&self) -> Result<String, SolverError> {
        self.backend
            .as_ref()
            .map(|backend| backend.display())
            .ok_or(SolverError::DestroyedSessionUse)
    }

    pub fn declare(&mut self, name: impl Into<String>, sort: Sort) -> Result<(), SolverError> {
        self.apply(Operation::Declare {
            name: name.into(),
            sort,
        })
    }

    pub fn assert(&mut self, term: Term) -> Result<(), SolverError> {
        self.apply(Operation::Assert(term))
    }

    /// Assert SMT-LIB text, e.g. `(declare-const s String) (assert ...)`.
    ///
    /// The text may only declare, define and assert; stack, query and exit
    /// commands are rejected with `ParseError`. Constants it declares are
    /// scoped to the current frame like [`Session::declare`].
    pub fn assert_smtlib(&mut self, text: impl Into<String>) -> Result<(), SolverError> {
        self.apply(Operation::AssertText(text.into()))
    }

    pub fn push(&mut self) -> Result<(), SolverError> {
        self.apply(Operation::Push)
    }

    /// Close the innermost frame.
    pub fn pop(&mut self) -> Result<(), SolverError> {
        self.pop_n(1)
    }

    /// Close the `n` innermost frames. Requires `1 <= n <= depth`.
    pub fn pop_n(&mut self, n: u32) -> Result<(), SolverError> {
        self.apply(Operation::Pop(n))
    }

    /// Drop all assertions, declarations and frames.
    pub fn reset(&mut self) -> Result<(), SolverError> {
        self.apply(Operation::Reset)
    }

    fn ensure_idle(&self) -> Result<(), SolverError> {
        match self.state {
            SessionState::Idle => Ok(()),
            SessionState::AwaitingCheckResult => Err(SolverError::CheckPending),
            SessionState::Faulted => Err(SolverError::Desynchronized(
                self.fault.clone().unwrap_or_default(),
            )),
            SessionState::Destroyed => Err(SolverError::DestroyedSessionUse),
        }
    }

    /// Apply one mutating operation: backend first, then the stream.
    pub fn apply(&mut self, op: Operation) -> Result<(), SolverError> {
        self.ensure_idle()?;
        if let Operation::Pop(n) = op
            && (n == 0 || n > self.depth)
        {
            return Err(SolverError::InvalidStackPop {
                requested: n,
                depth: self.depth,
            });
        }
        let text_declarations = match &op {
            Operation::AssertText(text) => assertable_declarations(text)
                .map_err(|e| SolverError::ParseError(format!("asserted text: {e}")))?,
            _ => Vec::new(),
        };

        let command = op.command();
        tracing::debug!(%command, depth = self.depth, "Applying operation");
        let backend = self
            .backend
            .as_deref_mut()
            .ok_or(SolverError::DestroyedSessionUse)?;
        op.apply(backend)?;

        match op {
            Operation::Declare { name, sort } => {
                if let Some(frame) = self.frames.last_mut() {
                    frame.push((name, sort));
                }
            }
            Operation::Assert(_) => {}
            Operation::AssertText(_) => {
                if let Some(frame) = self.frames.last_mut() {
                    frame.extend(text_declarations);
                }
            }
            Operation::Push => {
                self.depth += 1;
                self.frames.push(Vec::new());
            }
            Operation::Pop(n) => {
                self.depth -= n;
                self.frames.truncate(self.depth as usize + 1);
            }
            Operation::Reset => {
                self.depth = 0;
                self.frames = vec![Vec::new()];
            }
        }
        self.generation.fetch_add(1, Ordering::AcqRel);

        self.emit(&command)
    }

    /// Deliver a command after the backend already reflects it.
    fn emit(&mut self, command: &Command) -> Result<(), SolverError> {
        if let Err(err) = self.context.send(command) {
            let msg = format!("failed to deliver {command}: {err}");
            tracing::warn!("{msg}");
            self.state = SessionState::Faulted;
            self.fault = Some(msg.clone());
            return Err(SolverError::Desynchronized(msg));
        }
        Ok(())
    }

    /// Emit `(check-sat)` and move to `AwaitingCheckResult`.
    ///
    /// In native mode the backend is checked here, before anything is
    /// emitted; its answer is returned by [`Session::await_outcome`].
    pub fn submit_check(&mut self) -> Result<(), SolverError> {
        self.ensure_idle()?;
        let native = match self.config.mode {
            BackendMode::Native => {
                let backend = self
                    .backend
                    .as_deref_mut()
                    .ok_or(SolverError::DestroyedSessionUse)?;
                Some(backend.check()?)
            }
            BackendMode::External => None,
        };

        let ticket = self.context.issue_ticket();
        self.emit(&Command::CheckSat)?;
        tracing::debug!(ticket, mode = %self.config.mode, "Check submitted");
        self.pending = Some(PendingCheck { ticket, native });
        self.state = SessionState::AwaitingCheckResult;
        Ok(())
    }

    /// Collect the outcome of the submitted check and return to `Idle`.
    ///
    /// In external mode this blocks until the reply arrives, the wait is
    /// cancelled or `check_timeout` elapses; the latter two yield
    /// `Unknown("timeout")` / `Unknown("cancelled")`. A solver error in
    /// place of the answer yields `Unknown` carrying the error message.
    pub fn await_outcome(&mut self) -> Result<Outcome, SolverError> {
        if self.state == SessionState::Destroyed {
            return Err(SolverError::DestroyedSessionUse);
        }
        let pending = self.pending.take().ok_or(SolverError::NoPendingCheck)?;
        self.state = SessionState::Idle;

        let outcome = match pending.native {
            Some(outcome) => outcome,
            None => self.wait_for_outcome(pending.ticket)?,
        };
        tracing::debug!(ticket = pending.ticket, %outcome, "Check finished");
        self.last_check = Some((self.generation(), outcome.clone()));
        Ok(outcome)
    }

    fn wait_for_outcome(&mut self, ticket: u64) -> Result<Outcome, SolverError> {
        let timeout = self.config.check_timeout();
        match self.context.wait(ticket, timeout, self.config.heartbeat()) {
            WaitResult::Reply(Reply::CheckSat(outcome)) => Ok(outcome),
            WaitResult::Reply(Reply::Model(_)) => Err(SolverError::ParseError(
                "expected a check-sat reply, got a model".to_string(),
            )),
            WaitResult::Reply(Reply::Error(msg)) => {
                tracing::warn!(ticket, "Check rejected by the solver: {msg}");
                Ok(Outcome::Unknown(msg))
            }
            WaitResult::TimedOut => {
                tracing::warn!(ticket, "{}", SolverError::UnresponsiveBackend(timeout));
                Ok(Outcome::Unknown(Outcome::TIMEOUT.to_string()))
            }
            WaitResult::Cancelled => {
                tracing::info!(ticket, "Check cancelled");
                Ok(Outcome::Unknown(Outcome::CANCELLED.to_string()))
            }
            WaitResult::Disconnected => {
                tracing::warn!(ticket, "External solver disconnected");
                Ok(Outcome::Unknown(Outcome::DISCONNECTED.to_string()))
            }
        }
    }

    /// Submit a check and wait for its outcome.
    pub fn check(&mut self) -> Result<Outcome, SolverError> {
        self.submit_check()?;
        self.await_outcome()
    }

    /// Model of the most recent check.
    ///
    /// Requires that check to have been `Sat` with no mutation since.
    pub fn model(&mut self) -> Result<ResultModel, SolverError> {
        self.ensure_idle()?;
        let generation = self.generation();
        match &self.last_check {
            Some((at, Outcome::Sat)) if *at == generation => {}
            _ => return Err(SolverError::NoModel),
        }

        let raw = match self.config.mode {
            BackendMode::Native => self
                .backend
                .as_ref()
                .ok_or(SolverError::DestroyedSessionUse)?
                .model()?,
            BackendMode::External => self.fetch_external_model()?,
        };
        Ok(ResultModel::new(
            raw,
            self.visible_sorts(),
            generation,
            Arc::clone(&self.generation),
        ))
    }

    fn fetch_external_model(&mut self) -> Result<Model, SolverError> {
        let ticket = self.context.issue_ticket();
        self.emit(&Command::GetModel)?;
        let timeout = self.config.check_timeout();
        match self.context.wait(ticket, timeout, self.config.heartbeat()) {
            WaitResult::Reply(Reply::Model(model)) => Ok(model),
            WaitResult::Reply(Reply::CheckSat(outcome)) => Err(SolverError::ParseError(format!(
                "expected a model, got {outcome}"
            ))),
            WaitResult::Reply(Reply::Error(msg)) => Err(SolverError::ProcessError(format!(
                "(get-model) rejected by the solver: {msg}"
            ))),
            WaitResult::TimedOut => Err(SolverError::UnresponsiveBackend(timeout)),
            WaitResult::Cancelled => Err(SolverError::ProcessError(
                "model retrieval cancelled".to_string(),
            )),
            WaitResult::Disconnected => Err(SolverError::ProcessError(
                Outcome::DISCONNECTED.to_string(),
            )),
        }
    }

    /// Check and, when satisfiable, materialize the model.
    pub fn get_model(&mut self) -> Result<Option<ResultModel>, SolverError> {
        if self.check()?.is_sat() {
            self.model().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Sorts of the symbols visible at the current frame; inner frames
    /// shadow outer ones.
    fn visible_sorts(&self) -> HashMap<String, Sort> {
        self.frames
            .iter()
            .flatten()
            .map(|(name, sort)| (name.clone(), sort.clone()))
            .collect()
    }

    /// Release the backend and emit `(exit)`. Terminal.
    ///
    /// An outstanding check is abandoned; its reply will be discarded.
    pub fn destroy(&mut self) -> Result<(), SolverError> {
        if self.state == SessionState::Destroyed {
            return Err(SolverError::DestroyedSessionUse);
        }
        drop(self.backend.take());
        self.pending = None;
        self.state = SessionState::Destroyed;
        self.generation.fetch_add(1, Ordering::AcqRel);
        if let Err(err) = self.context.send(&Command::Exit) {
            tracing::warn!("Failed to deliver (exit): {err}");
        }
        tracing::info!("Session destroyed");
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.state != SessionState::Destroyed {
            let _ = self.destroy();
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("mode", &self.config.mode)
            .field("state", &self.state)
            .field("depth", &self.depth)
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ShadowBackend;
    use crate::emitter::TranscriptEmitter;

    fn shadow_session(mode: BackendMode) -> (Session, Transcript) {
        let context = SolverContext::detached();
        let transcript = context.transcript().unwrap();
        let session = Session::with_backend(
            SessionConfig::new(mode),
            Box::new(ShadowBackend::new()),
            context,
        )
        .unwrap();
        (session, transcript)
    }

    #[test]
    fn operation_commands() {
        assert_eq!(Operation::Push.command(), Command::Push(1));
        assert_eq!(Operation::Pop(3).command(), Command::Pop(3));
        assert_eq!(Operation::Reset.command(), Command::Reset);
        assert_eq!(
            Operation::Declare {
                name: "x".into(),
                sort: Sort::Int
            }
            .command(),
            Command::DeclareConst("x".into(), Sort::Int)
        );
        assert_eq!(
            Operation::AssertText("(assert true)".into()).command(),
            Command::Verbatim("(assert true)".into())
        );
    }

    #[test]
    fn empty_native_check_is_sat() {
        let (mut session, transcript) = shadow_session(BackendMode::Native);
        assert_eq!(session.check().unwrap(), Outcome::Sat);
        assert_eq!(transcript.commands(), vec![Command::CheckSat]);
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn pop_at_depth_zero_emits_nothing() {
        let (mut session, transcript) = shadow_session(BackendMode::Native);
        assert_eq!(
            session.pop().unwrap_err(),
            SolverError::InvalidStackPop {
                requested: 1,
                depth: 0
            }
        );
        assert!(transcript.is_empty());
        assert_eq!(session.generation(), 0);
    }

    #[test]
    fn pop_zero_is_rejected() {
        let (mut session, _) = shadow_session(BackendMode::Native);
        session.push().unwrap();
        assert!(matches!(
            session.pop_n(0),
            Err(SolverError::InvalidStackPop { requested: 0, .. })
        ));
        assert_eq!(session.depth(), 1);
    }

    #[test]
    fn submit_check_blocks_mutation() {
        let (mut session, _) = shadow_session(BackendMode::Native);
        session.submit_check().unwrap();
        assert!(session.is_awaiting());
        assert_eq!(session.push().unwrap_err(), SolverError::CheckPending);
        assert_eq!(session.reset().unwrap_err(), SolverError::CheckPending);
        assert_eq!(session.submit_check().unwrap_err(), SolverError::CheckPending);
        assert_eq!(session.await_outcome().unwrap(), Outcome::Sat);
        assert_eq!(session.await_outcome().unwrap_err(), SolverError::NoPendingCheck);
        session.push().unwrap();
    }

    #[test]
    fn detached_external_check_is_disconnected() {
        let (mut session, _) = shadow_session(BackendMode::External);
        let outcome = session.check().unwrap();
        assert_eq!(outcome, Outcome::Unknown(Outcome::DISCONNECTED.to_string()));
        assert_eq!(session.model().unwrap_err(), SolverError::NoModel);
    }

    #[test]
    fn model_requires_fresh_sat_check() {
        let (mut session, _) = shadow_session(BackendMode::Native);
        assert_eq!(session.model().unwrap_err(), SolverError::NoModel);
        session.declare("b", Sort::Bool).unwrap();
        session.check().unwrap();
        let model = session.model().unwrap();
        assert_eq!(model.get("b").unwrap(), Some(crate::model::Value::Bool(false)));

        session.push().unwrap();
        assert!(model.is_stale());
        assert_eq!(session.model().unwrap_err(), SolverError::NoModel);
    }

    #[test]
    fn declarations_follow_frames() {
        let (mut session, _) = shadow_session(BackendMode::Native);
        session.declare("outer", Sort::Int).unwrap();
        session.push().unwrap();
        session.declare("inner", Sort::Bool).unwrap();
        assert_eq!(session.visible_sorts().len(), 2);
        session.pop().unwrap();
        let sorts = session.visible_sorts();
        assert_eq!(sorts.len(), 1);
        assert_eq!(sorts.get("outer"), Some(&Sort::Int));
    }

    #[test]
    fn asserted_text_is_mirrored_verbatim() {
        let (mut session, transcript) = shadow_session(BackendMode::External);
        session.push().unwrap();
        let text = "(declare-const s String)\n(assert (str.prefixof \"ab\" s))";
        session.assert_smtlib(text).unwrap();

        assert_eq!(transcript.lines(), vec!["(push 1)".to_string(), text.to_string()]);
        assert_eq!(session.generation(), 2);
        assert_eq!(session.visible_sorts().get("s"), Some(&Sort::String));
        assert!(session.display().unwrap().ends_with(&format!("{text}\n")));

        session.pop().unwrap();
        assert!(session.visible_sorts().is_empty());
    }

    #[test]
    fn text_with_stack_commands_is_rejected_before_emitting() {
        let (mut session, transcript) = shadow_session(BackendMode::Native);
        for text in ["(push 1)", "(assert p) (check-sat)", "(assert (and p"] {
            assert!(matches!(
                session.assert_smtlib(text),
                Err(SolverError::ParseError(_))
            ));
        }
        assert!(transcript.is_empty());
        assert_eq!(session.generation(), 0);
        assert_eq!(session.depth(), 0);
    }

    #[test]
    fn destroy_is_terminal() {
        let (mut session, transcript) = shadow_session(BackendMode::Native);
        session.destroy().unwrap();
        assert_eq!(session.state(), SessionState::Destroyed);
        assert_eq!(session.destroy().unwrap_err(), SolverError::DestroyedSessionUse);
        assert_eq!(session.push().unwrap_err(), SolverError::DestroyedSessionUse);
        assert_eq!(session.check().unwrap_err(), SolverError::DestroyedSessionUse);
        assert_eq!(session.display().unwrap_err(), SolverError::DestroyedSessionUse);
        assert_eq!(transcript.commands(), vec![Command::Exit]);
    }

    #[test]
    fn drop_emits_exit_once() {
        let (session, transcript) = shadow_session(BackendMode::Native);
        drop(session);
        assert_eq!(transcript.commands(), vec![Command::Exit]);
    }

    struct FailingEmitter;

    impl crate::emitter::ProtocolEmitter for FailingEmitter {
        fn send(&mut self, _: &Command) -> Result<(), SolverError> {
            Err(SolverError::ProcessError("pipe closed".into()))
        }
    }

    #[test]
    fn failed_delivery_faults_the_session() {
        let (_dispatcher, receiver) = crate::dispatch::response_channel();
        let context = SolverContext::channel(FailingEmitter, receiver);
        let mut session = Session::with_backend(
            SessionConfig::new(BackendMode::Native),
            Box::new(ShadowBackend::new()),
            context,
        )
        .unwrap();

        assert!(matches!(session.push(), Err(SolverError::Desynchronized(_))));
        assert_eq!(session.state(), SessionState::Faulted);
        assert_eq!(session.depth(), 1);
        assert!(matches!(session.assert(Term::BoolLit(true)), Err(SolverError::Desynchronized(_))));
        session.destroy().unwrap();
    }

    #[test]
    fn transcript_emitter_in_channel_context() {
        let emitter = TranscriptEmitter::new();
        let transcript = emitter.transcript();
        let (_dispatcher, receiver) = crate::dispatch::response_channel();
        let mut session = Session::with_backend(
            SessionConfig::new(BackendMode::Native),
            Box::new(ShadowBackend::new()),
            SolverContext::channel(emitter, receiver),
        )
        .unwrap();
        session.push().unwrap();
        session.pop().unwrap();
        assert_eq!(transcript.lines(), vec!["(push 1)", "(pop 1)"]);
    }
}
