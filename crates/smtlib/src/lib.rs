//! # dualsat-smtlib
//!
//! SMT-LIB2 abstract syntax used on the textual protocol stream between a
//! solver session and an external solver process.
//!
//! Every type formats to the exact SMT-LIB2 text sent on the wire through its
//! `Display` implementation (see [`formatter`]). [`sexp`] reads SMT-LIB text
//! back, for solver replies and for scripts asserted verbatim.

pub mod command;
pub mod formatter;
pub mod script;
pub mod sexp;
pub mod sort;
pub mod term;

pub use command::Command;
pub use script::Script;
pub use sexp::Sexp;
pub use sort::Sort;
pub use term::Term;
