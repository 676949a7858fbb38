use crate::sort::Sort;
use crate::term::Term;

/// SMT-LIB command representation.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `(declare-const name sort)`
    DeclareConst(String, Sort),
    /// `(assert term)`
    Assert(Term),
    /// `(check-sat)`
    CheckSat,
    /// `(get-model)`
    GetModel,
    /// `(push n)`
    Push(u32),
    /// `(pop n)`
    Pop(u32),
    /// `(reset)`
    Reset,
    /// `(exit)`
    Exit,
    /// Caller-supplied SMT-LIB text, written to the stream as is.
    Verbatim(String),
}

impl Command {
    /// Returns `true` if the solver answers this command on its output stream.
    pub fn expects_reply(&self) -> bool {
        matches!(self, Command::CheckSat | Command::GetModel)
    }
}
