use std::fmt;

/// Outcome of a satisfiability query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The asserted formulas have a satisfying assignment.
    Sat,
    /// The asserted formulas are contradictory.
    Unsat,
    /// No answer: solver incompleteness, timeout, cancellation or a lost
    /// external process. The string says which.
    Unknown(String),
}

impl Outcome {
    /// Reason used when the reply wait ran out of time.
    pub const TIMEOUT: &'static str = "timeout";
    /// Reason used when the wait was cancelled by the caller.
    pub const CANCELLED: &'static str = "cancelled";
    /// Reason used when the reply channel closed.
    pub const DISCONNECTED: &'static str = "external solver disconnected";

    /// Returns `true` if the result is `Sat`.
    pub fn is_sat(&self) -> bool {
        matches!(self, Outcome::Sat)
    }

    /// Returns `true` if the result is `Unsat`.
    pub fn is_unsat(&self) -> bool {
        matches!(self, Outcome::Unsat)
    }

    /// Returns `true` if the result is `Unknown`.
    pub fn is_unknown(&self) -> bool {
        matches!(self, Outcome::Unknown(_))
    }

    /// Returns `true` if the result is an `Unknown` caused by the reply timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Outcome::Unknown(reason) if reason == Self::TIMEOUT)
    }

    /// Map a `check-sat` reply token to an outcome.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "sat" => Some(Outcome::Sat),
            "unsat" => Some(Outcome::Unsat),
            "unknown" => Some(Outcome::Unknown("unknown".to_string())),
            "timeout" => Some(Outcome::Unknown(Self::TIMEOUT.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Sat => write!(f, "sat"),
            Outcome::Unsat => write!(f, "unsat"),
            Outcome::Unknown(reason) if reason == "unknown" => write!(f, "unknown"),
            Outcome::Unknown(reason) => write!(f, "unknown ({reason})"),
        }
    }
}
