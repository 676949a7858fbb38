use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::SolverKind;

/// Errors from session operations and solver interaction.
#[derive(Debug)]
pub enum SolverError {
    /// `pop` asked for more frames than the session holds.
    InvalidStackPop { requested: u32, depth: u32 },
    /// A result model was evaluated after the session was mutated.
    StaleModel { produced_at: u64, current: u64 },
    /// Operation on a session that was already destroyed.
    DestroyedSessionUse,
    /// A query reply did not arrive in time.
    UnresponsiveBackend(Duration),
    /// A configuration option value is neither an integer nor a symbol.
    MalformedOption { name: String, value: String },
    /// Mutating operation issued while a check is outstanding.
    CheckPending,
    /// `await_outcome` called with no check submitted.
    NoPendingCheck,
    /// Model requested without a satisfiable check at the current state.
    NoModel,
    /// The requested backend is not compiled in or could not be created.
    BackendUnavailable(String),
    /// Command delivery failed after the backend was mutated.
    Desynchronized(String),
    /// Solver binary not found at the specified path.
    NotFound(SolverKind, PathBuf),
    /// Process failed to start or crashed.
    ProcessError(String),
    /// Failed to parse solver output.
    ParseError(String),
    /// Term cannot be expressed in the native engine.
    Translation(String),
    /// Expression cannot be evaluated against a model.
    Evaluation(String),
}

impl fmt::Display for SolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverError::InvalidStackPop { requested, depth } => {
                write!(f, "Cannot pop {requested} frame(s) at stack depth {depth}")
            }
            SolverError::StaleModel {
                produced_at,
                current,
            } => write!(
                f,
                "Model from generation {produced_at} is stale (session is at generation {current})"
            ),
            SolverError::DestroyedSessionUse => write!(f, "Session has been destroyed"),
            SolverError::UnresponsiveBackend(after) => {
                write!(f, "External solver did not respond within {after:?}")
            }
            SolverError::MalformedOption { name, value } => {
                write!(f, "Malformed value for option {name}: {value:?}")
            }
            SolverError::CheckPending => write!(f, "A satisfiability check is still pending"),
            SolverError::NoPendingCheck => write!(f, "No satisfiability check is pending"),
            SolverError::NoModel => write!(f, "No model available for the current session state"),
            SolverError::BackendUnavailable(msg) => write!(f, "Backend unavailable: {msg}"),
            SolverError::Desynchronized(msg) => {
                write!(f, "Session protocol stream is out of sync: {msg}")
            }
            SolverError::NotFound(kind, path) => {
                write!(f, "{kind} binary not found at: {}", path.display())
            }
            SolverError::ProcessError(msg) => write!(f, "Solver process error: {msg}"),
            SolverError::ParseError(msg) => write!(f, "Failed to parse solver output: {msg}"),
            SolverError::Translation(msg) => write!(f, "Cannot translate term: {msg}"),
            SolverError::Evaluation(msg) => write!(f, "Cannot evaluate term: {msg}"),
        }
    }
}

impl std::error::Error for SolverError {}

impl PartialEq for SolverError {
    fn eq(&self, other: &Self) -> bool {
        use SolverError::*;
        match (self, other) {
            (
                InvalidStackPop {
                    requested: a,
                    depth: b,
                },
                InvalidStackPop {
                    requested: c,
                    depth: d,
                },
            ) => a == c && b == d,
            (
                StaleModel {
                    produced_at: a,
                    current: b,
                },
                StaleModel {
                    produced_at: c,
                    current: d,
                },
            ) => a == c && b == d,
            (DestroyedSessionUse, DestroyedSessionUse) => true,
            (UnresponsiveBackend(a), UnresponsiveBackend(b)) => a == b,
            (
                MalformedOption { name: a, value: b },
                MalformedOption { name: c, value: d },
            ) => a == c && b == d,
            (CheckPending, CheckPending) => true,
            (NoPendingCheck, NoPendingCheck) => true,
            (NoModel, NoModel) => true,
            (BackendUnavailable(a), BackendUnavailable(b)) => a == b,
            (Desynchronized(a), Desynchronized(b)) => a == b,
            (NotFound(k1, p1), NotFound(k2, p2)) => k1 == k2 && p1 == p2,
            (ProcessError(a), ProcessError(b)) => a == b,
            (ParseError(a), ParseError(b)) => a == b,
            (Translation(a), Translation(b)) => a == b,
            (Evaluation(a), Evaluation(b)) => a == b,
            _ => false,
        }
    }
}

impl SolverError {
    /// Errors after which the session is still in a well-defined `Idle` state
    /// and the caller may continue issuing operations.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SolverError::StaleModel { .. }
                | SolverError::UnresponsiveBackend(_)
                | SolverError::MalformedOption { .. }
                | SolverError::NoModel
                | SolverError::Evaluation(_)
                | SolverError::Translation(_)
                | SolverError::CheckPending
                | SolverError::NoPendingCheck
        )
    }
}
