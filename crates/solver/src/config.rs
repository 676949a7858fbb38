use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SolverError;

// ---------------------------------------------------------------------------
// External solver process
// ---------------------------------------------------------------------------

/// Supported external SMT solver processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolverKind {
    /// Z3 from Microsoft Research.
    Z3,
    /// CVC5 from Stanford/Iowa.
    Cvc5,
    /// Yices2 from SRI International.
    Yices,
}

impl SolverKind {
    /// Binary name used for PATH lookup.
    pub fn binary_name(&self) -> &'static str {
        match self {
            SolverKind::Z3 => "z3",
            SolverKind::Cvc5 => "cvc5",
            SolverKind::Yices => "yices-smt2",
        }
    }

    /// Common installation paths to check when PATH lookup fails.
    fn common_paths(&self) -> &'static [&'static str] {
        match self {
            SolverKind::Z3 => &["/opt/homebrew/bin/z3", "/usr/local/bin/z3", "/usr/bin/z3"],
            SolverKind::Cvc5 => &[
                "/opt/homebrew/bin/cvc5",
                "/usr/local/bin/cvc5",
                "/usr/bin/cvc5",
            ],
            SolverKind::Yices => &[
                "/opt/homebrew/bin/yices-smt2",
                "/usr/local/bin/yices-smt2",
                "/usr/bin/yices-smt2",
            ],
        }
    }

    /// Solver-specific CLI arguments for an interactive stdin session.
    pub fn interactive_args(&self) -> Vec<String> {
        match self {
            SolverKind::Z3 => vec!["-in".to_string(), "-smt2".to_string()],
            SolverKind::Cvc5 => vec![
                "--lang".to_string(),
                "smt2".to_string(),
                "--produce-models".to_string(),
                "--incremental".to_string(),
            ],
            SolverKind::Yices => vec!["--incremental".to_string()],
        }
    }

    /// Solver-specific per-query timeout argument, if supported.
    pub fn timeout_arg(&self, timeout_ms: u64) -> Option<String> {
        if timeout_ms == 0 {
            return None;
        }
        match self {
            SolverKind::Z3 => Some(format!("-t:{timeout_ms}")),
            SolverKind::Cvc5 => Some(format!("--tlimit-per={timeout_ms}")),
            SolverKind::Yices => Some(format!("--timeout={}", timeout_ms.div_ceil(1000))),
        }
    }
}

impl fmt::Display for SolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverKind::Z3 => write!(f, "Z3"),
            SolverKind::Cvc5 => write!(f, "CVC5"),
            SolverKind::Yices => write!(f, "Yices"),
        }
    }
}

impl std::str::FromStr for SolverKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "z3" => Ok(SolverKind::Z3),
            "cvc5" => Ok(SolverKind::Cvc5),
            "yices" | "yices2" | "yices-smt2" => Ok(SolverKind::Yices),
            _ => Err(format!(
                "Unknown solver: {s}. Valid options: z3, cvc5, yices"
            )),
        }
    }
}

/// How to launch the external solver process.
#[derive(Debug, Clone)]
pub struct ExternalSolverConfig {
    /// Which solver to use.
    pub kind: SolverKind,
    /// Path to the solver binary.
    pub solver_path: PathBuf,
    /// Per-query timeout passed to the solver in milliseconds (0 = none).
    pub timeout_ms: u64,
    /// Additional solver arguments.
    pub extra_args: Vec<String>,
}

impl ExternalSolverConfig {
    /// Create a new config with the given solver kind and path.
    pub fn new(kind: SolverKind, solver_path: PathBuf) -> Self {
        Self {
            kind,
            solver_path,
            timeout_ms: 0,
            extra_args: Vec::new(),
        }
    }

    /// Create config with a specific per-query timeout (in milliseconds).
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Add extra arguments for the solver.
    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    /// Auto-detect solver location for the given kind.
    ///
    /// Tries `which <binary>` first, then checks common installation paths.
    pub fn auto_detect_for(kind: SolverKind) -> Result<Self, SolverError> {
        let binary = kind.binary_name();

        if let Ok(output) = std::process::Command::new("which").arg(binary).output()
            && output.status.success()
        {
            let path_str = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !path_str.is_empty() {
                let path = PathBuf::from(&path_str);
                if path.exists() {
                    return Ok(Self::new(kind, path));
                }
            }
        }

        for candidate in kind.common_paths() {
            let path = PathBuf::from(candidate);
            if path.exists() {
                return Ok(Self::new(kind, path));
            }
        }

        Err(SolverError::NotFound(kind, PathBuf::from(binary)))
    }

    /// Auto-detect Z3 location.
    pub fn auto_detect() -> Result<Self, SolverError> {
        Self::auto_detect_for(SolverKind::Z3)
    }

    /// Build the full argument list for this solver invocation.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = self.kind.interactive_args();

        if let Some(timeout_arg) = self.kind.timeout_arg(self.timeout_ms) {
            args.push(timeout_arg);
        }

        args.extend(self.extra_args.iter().cloned());
        args
    }

    /// Validate that the configured solver binary exists.
    pub fn validate(&self) -> Result<(), SolverError> {
        if !self.solver_path.exists() {
            return Err(SolverError::NotFound(self.kind, self.solver_path.clone()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Session options
// ---------------------------------------------------------------------------

/// Which backend answers satisfiability queries for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    /// The in-process engine's check and model are authoritative.
    Native,
    /// The external process answers; the in-process backend is a mirror.
    #[default]
    External,
}

impl fmt::Display for BackendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendMode::Native => write!(f, "native"),
            BackendMode::External => write!(f, "external"),
        }
    }
}

/// What to do with an option whose value is neither an integer nor a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionPolicy {
    /// Drop the option and log a warning.
    #[default]
    Warn,
    /// Fail session construction with `MalformedOption`.
    Reject,
}

/// A validated option value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    /// Non-negative integer, applied as an unsigned parameter.
    Integer(u64),
    /// Symbol token, applied as a symbolic parameter.
    Symbol(String),
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Integer(n) => write!(f, "{n}"),
            OptionValue::Symbol(s) => write!(f, "{s}"),
        }
    }
}

impl From<u64> for OptionValue {
    fn from(n: u64) -> Self {
        OptionValue::Integer(n)
    }
}

impl From<u32> for OptionValue {
    fn from(n: u32) -> Self {
        OptionValue::Integer(n.into())
    }
}

impl From<&str> for OptionValue {
    fn from(s: &str) -> Self {
        OptionValue::Symbol(s.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(s: String) -> Self {
        OptionValue::Symbol(s)
    }
}

/// A (name, value) solver parameter applied once at session construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolverOption {
    pub name: String,
    pub value: OptionValue,
}

impl SolverOption {
    pub fn new(name: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Validate an untyped option value.
    ///
    /// Accepts non-negative integers and SMT-LIB simple symbols. Anything
    /// else (floats, negatives, booleans, null, arrays, strings with
    /// whitespace or parentheses) is `MalformedOption`.
    pub fn from_raw(raw: &RawOption) -> Result<Self, SolverError> {
        let malformed = || SolverError::MalformedOption {
            name: raw.name.clone(),
            value: raw.value.to_string(),
        };
        if raw.name.is_empty() || !is_symbol(&raw.name) {
            return Err(malformed());
        }
        let value = match &raw.value {
            Value::Number(n) => OptionValue::Integer(n.as_u64().ok_or_else(malformed)?),
            Value::String(s) if is_symbol(s) => OptionValue::Symbol(s.clone()),
            _ => return Err(malformed()),
        };
        Ok(Self {
            name: raw.name.clone(),
            value,
        })
    }
}

/// An option as supplied by the caller, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawOption {
    pub name: String,
    pub value: Value,
}

impl From<SolverOption> for RawOption {
    fn from(option: SolverOption) -> Self {
        let value = match option.value {
            OptionValue::Integer(n) => Value::from(n),
            OptionValue::Symbol(s) => Value::String(s),
        };
        Self {
            name: option.name,
            value,
        }
    }
}

/// SMT-LIB simple symbol: non-empty, no leading digit, drawn from letters,
/// digits and `~!@$%^&*_-+=<>.?/`.
fn is_symbol(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        None => false,
        Some(first) if first.is_ascii_digit() => false,
        Some(first) => std::iter::once(first)
            .chain(chars)
            .all(|c| c.is_ascii_alphanumeric() || "~!@$%^&*_-+=<>.?/".contains(c)),
    }
}

/// Session configuration snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Which backend answers checks. Fixed for the session's lifetime.
    pub mode: BackendMode,
    /// Incremental (push/pop heavy) or one-shot solving strategy.
    pub incremental: bool,
    /// Backend parameters, applied once in order at construction.
    pub options: Vec<RawOption>,
    /// Handling of malformed option values.
    pub option_policy: OptionPolicy,
    /// Maximum wait for an external reply in milliseconds.
    pub check_timeout_ms: u64,
    /// Interval between "still waiting" log lines in milliseconds.
    pub heartbeat_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: BackendMode::External,
            incremental: true,
            options: Vec::new(),
            option_policy: OptionPolicy::Warn,
            check_timeout_ms: 30_000,
            heartbeat_ms: 1_000,
        }
    }
}

impl SessionConfig {
    pub fn new(mode: BackendMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self, SolverError> {
        serde_json::from_str(text)
            .map_err(|e| SolverError::ParseError(format!("invalid session config: {e}")))
    }

    pub fn with_incremental(mut self, incremental: bool) -> Self {
        self.incremental = incremental;
        self
    }

    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.options.push(SolverOption::new(name, value).into());
        self
    }

    /// Add an option whose value has not been validated yet.
    pub fn with_raw_option(mut self, name: impl Into<String>, value: Value) -> Self {
        self.options.push(RawOption {
            name: name.into(),
            value,
        });
        self
    }

    pub fn with_option_policy(mut self, policy: OptionPolicy) -> Self {
        self.option_policy = policy;
        self
    }

    pub fn with_check_timeout(mut self, timeout: Duration) -> Self {
        self.check_timeout_ms = saturating_millis(timeout);
        self
    }

    pub fn with_heartbeat(mut self, interval: Duration) -> Self {
        self.heartbeat_ms = saturating_millis(interval);
        self
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_millis(self.check_timeout_ms)
    }

    /// Heartbeat interval, never zero.
    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms.max(1))
    }

    /// Validate options in order under the configured policy.
    pub fn resolve_options(&self) -> Result<Vec<SolverOption>, SolverError> {
        let mut resolved = Vec::with_capacity(self.options.len());
        for raw in &self.options {
            match SolverOption::from_raw(raw) {
                Ok(option) => resolved.push(option),
                Err(err) if self.option_policy == OptionPolicy::Warn => {
                    tracing::warn!("Dropping solver option: {err}");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(resolved)
    }
}

fn saturating_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
