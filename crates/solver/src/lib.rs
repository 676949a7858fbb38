//! # dualsat-solver
//!
//! A satisfiability session that can be answered either by an in-process
//! solver engine or by an external solver process speaking SMT-LIB2.
//!
//! A [`Session`] applies every operation to its backend and mirrors it into
//! the protocol stream, in that order. [`BackendMode`] decides which side
//! answers `check`.
//!
//! ## Usage
//!
//! ```no_run
//! use dualsat_smtlib::{Sort, Term};
//! use dualsat_solver::{BackendMode, ExternalSolverConfig, Session, SessionConfig, SolverContext};
//!
//! let context = SolverContext::spawn(&ExternalSolverConfig::auto_detect()?)?;
//! let mut session = Session::new(SessionConfig::new(BackendMode::External), context)?;
//!
//! session.declare("p", Sort::Bool)?;
//! session.assert(Term::var("p"))?;
//! session.push()?;
//! session.assert(Term::not(Term::var("p")))?;
//! assert!(session.check()?.is_unsat());
//! session.pop()?;
//!
//! if let Some(model) = session.get_model()? {
//!     println!("p = {:?}", model.get("p")?);
//! }
//! session.destroy()?;
//! # Ok::<(), dualsat_solver::SolverError>(())
//! ```

pub mod backend;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod emitter;
pub mod error;
mod eval;
pub mod model;
pub mod parser;
pub mod process;
pub mod result;
pub mod session;
#[cfg(feature = "z3-native")]
pub mod z3_native;

// Re-export primary types for ergonomic use
pub use backend::{ShadowBackend, SolverBackend, create_backend};
pub use config::{
    BackendMode, ExternalSolverConfig, OptionPolicy, OptionValue, SessionConfig, SolverKind,
    SolverOption,
};
pub use context::SolverContext;
pub use dispatch::{CancelHandle, Reply, ResponseDispatcher, ResponseReceiver, response_channel};
pub use emitter::{ProtocolEmitter, StreamEmitter, Transcript, TranscriptEmitter};
pub use error::SolverError;
pub use model::{Model, ResultModel, Value};
pub use result::Outcome;
pub use session::{Operation, Session, SessionState};
#[cfg(feature = "z3-native")]
pub use z3_native::Z3Backend;
