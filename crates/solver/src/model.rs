use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dualsat_smtlib::sort::Sort;
use dualsat_smtlib::term::Term;

use crate::error::SolverError;
use crate::eval;

/// Raw symbol assignments reported by a solver.
///
/// Values are kept as the SMT-LIB text the solver printed.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    /// Variable assignments: `(name, value_string)` pairs.
    pub assignments: Vec<(String, String)>,
}

impl Model {
    /// Create a new empty model.
    pub fn new() -> Self {
        Self {
            assignments: Vec::new(),
        }
    }

    /// Create a model from assignment pairs.
    pub fn with_assignments(assignments: Vec<(String, String)>) -> Self {
        Self { assignments }
    }

    /// Look up a variable's value by name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.assignments
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Return the number of assignments.
    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    /// Return whether the model is empty.
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

/// A typed model value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bool(bool),
    Int(i128),
    /// Bitvector value, always masked to `width` bits.
    BitVec { value: u128, width: u32 },
    Str(String),
    /// A value whose sort the evaluator does not interpret.
    Opaque(String),
}

impl Value {
    /// Value that model completion assigns to an unconstrained symbol.
    pub fn default_for(sort: &Sort) -> Option<Value> {
        match sort {
            Sort::Bool => Some(Value::Bool(false)),
            Sort::Int => Some(Value::Int(0)),
            Sort::BitVec(width) => Some(Value::BitVec {
                value: 0,
                width: *width,
            }),
            Sort::String => Some(Value::Str(String::new())),
            Sort::Uninterpreted(_) => None,
        }
    }

    /// Parse a solver-printed value of a known sort.
    ///
    /// Accepts `true`/`false`, `5`, `(- 5)`, `#x0a`, `#b1010`, `(_ bv10 8)`
    /// and SMT-LIB string literals. Anything else becomes `Opaque`.
    pub fn parse(text: &str, sort: &Sort) -> Value {
        let text = text.trim();
        let parsed = match sort {
            Sort::Bool => match text {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            Sort::Int => parse_int(text).map(Value::Int),
            Sort::BitVec(width) => parse_bitvec(text, *width),
            Sort::String => parse_string_lit(text).map(Value::Str),
            Sort::Uninterpreted(_) => None,
        };
        parsed.unwrap_or_else(|| Value::Opaque(text.to_string()))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i128> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{}", Term::IntLit(*n)),
            Value::BitVec { value, width } => write!(f, "(_ bv{value} {width})"),
            Value::Str(s) => write!(f, "{}", Term::StringLit(s.clone())),
            Value::Opaque(text) => write!(f, "{text}"),
        }
    }
}

fn parse_int(text: &str) -> Option<i128> {
    if let Some(inner) = text.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
        let digits = inner.trim().strip_prefix('-')?.trim();
        return digits.parse::<i128>().ok().map(|n| -n);
    }
    text.parse::<i128>().ok()
}

pub(crate) fn mask(width: u32) -> u128 {
    if width >= 128 {
        u128::MAX
    } else {
        (1u128 << width) - 1
    }
}

fn parse_bitvec(text: &str, width: u32) -> Option<Value> {
    let value = if let Some(hex) = text.strip_prefix("#x") {
        u128::from_str_radix(hex, 16).ok()?
    } else if let Some(bin) = text.strip_prefix("#b") {
        u128::from_str_radix(bin, 2).ok()?
    } else {
        let inner = text.strip_prefix("(_")?.strip_suffix(')')?;
        let mut parts = inner.split_whitespace();
        let value = parts.next()?.strip_prefix("bv")?.parse::<u128>().ok()?;
        let declared: u32 = parts.next()?.parse().ok()?;
        if declared != width {
            return None;
        }
        value
    };
    Some(Value::BitVec {
        value: value & mask(width),
        width,
    })
}

/// Decode an SMT-LIB 2.6 string literal (`""` escapes and `\u{..}` / `\ud..`).
fn parse_string_lit(text: &str) -> Option<String> {
    let inner = text.strip_prefix('"')?.strip_suffix('"')?;
    let inner = inner.replace("\"\"", "\"");
    let mut out = String::with_capacity(inner.len());
    let mut rest = inner.as_str();
    while let Some(pos) = rest.find("\\u") {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 2..];
        let (hex, consumed) = if let Some(braced) = after.strip_prefix('{') {
            let end = braced.find('}')?;
            (&braced[..end], end + 2)
        } else {
            (after.get(..4)?, 4)
        };
        out.push(char::from_u32(u32::from_str_radix(hex, 16).ok()?)?);
        rest = &after[consumed..];
    }
    out.push_str(rest);
    Some(out)
}

/// A satisfying assignment produced by a successful check.
///
/// The model is tied to the session generation at which it was produced.
/// Any later declare/assert/push/pop/reset on the session makes it stale
/// and every query fails with [`SolverError::StaleModel`].
#[derive(Debug, Clone)]
pub struct ResultModel {
    produced_at: u64,
    generation: Arc<AtomicU64>,
    values: HashMap<String, Value>,
    sorts: HashMap<String, Sort>,
    raw: Model,
}

impl ResultModel {
    pub(crate) fn new(
        raw: Model,
        sorts: HashMap<String, Sort>,
        produced_at: u64,
        generation: Arc<AtomicU64>,
    ) -> Self {
        let values = raw
            .assignments
            .iter()
            .map(|(name, text)| {
                let value = match sorts.get(name) {
                    Some(sort) => Value::parse(text, sort),
                    None => Value::Opaque(text.clone()),
                };
                (name.clone(), value)
            })
            .collect();
        Self {
            produced_at,
            generation,
            values,
            sorts,
            raw,
        }
    }

    /// Session generation this model belongs to.
    pub fn produced_at(&self) -> u64 {
        self.produced_at
    }

    /// Returns `true` once the session has been mutated since the check.
    pub fn is_stale(&self) -> bool {
        self.generation.load(Ordering::Acquire) != self.produced_at
    }

    fn ensure_fresh(&self) -> Result<(), SolverError> {
        let current = self.generation.load(Ordering::Acquire);
        if current != self.produced_at {
            return Err(SolverError::StaleModel {
                produced_at: self.produced_at,
                current,
            });
        }
        Ok(())
    }

    /// Value assigned to a declared symbol, completed with the sort default
    /// when the solver left it unconstrained.
    pub fn get(&self, name: &str) -> Result<Option<Value>, SolverError> {
        self.ensure_fresh()?;
        Ok(self
            .values
            .get(name)
            .cloned()
            .or_else(|| self.sorts.get(name).and_then(Value::default_for)))
    }

    /// Evaluate an expression under this model.
    pub fn evaluate(&self, term: &Term) -> Result<Value, SolverError> {
        self.ensure_fresh()?;
        eval::evaluate(term, &self.values, &self.sorts)
    }

    /// Assignments exactly as the solver reported them.
    pub fn raw(&self) -> &Model {
        &self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_model() {
        let model = Model::new();
        assert!(model.is_empty());
        assert_eq!(model.len(), 0);
        assert_eq!(model.get("x"), None);
    }

    #[test]
    fn model_with_assignments() {
        let model = Model::with_assignments(vec![
            ("x".to_string(), "42".to_string()),
            ("y".to_string(), "true".to_string()),
        ]);
        assert_eq!(model.len(), 2);
        assert_eq!(model.get("x"), Some("42"));
        assert_eq!(model.get("z"), None);
    }

    #[test]
    fn parse_values_by_sort() {
        assert_eq!(Value::parse("true", &Sort::Bool), Value::Bool(true));
        assert_eq!(Value::parse("17", &Sort::Int), Value::Int(17));
        assert_eq!(Value::parse("(- 3)", &Sort::Int), Value::Int(-3));
        assert_eq!(
            Value::parse("#x0a", &Sort::BitVec(8)),
            Value::BitVec { value: 10, width: 8 }
        );
        assert_eq!(
            Value::parse("#b101", &Sort::BitVec(3)),
            Value::BitVec { value: 5, width: 3 }
        );
        assert_eq!(
            Value::parse("(_ bv300 8)", &Sort::BitVec(8)),
            Value::BitVec { value: 44, width: 8 }
        );
        // Width mismatch with the declared sort is not trusted.
        assert_eq!(
            Value::parse("(_ bv1 16)", &Sort::BitVec(8)),
            Value::Opaque("(_ bv1 16)".into())
        );
    }

    #[test]
    fn parse_string_values() {
        assert_eq!(
            Value::parse("\"ab\"", &Sort::String),
            Value::Str("ab".into())
        );
        assert_eq!(
            Value::parse("\"say \"\"hi\"\"\"", &Sort::String),
            Value::Str("say \"hi\"".into())
        );
        assert_eq!(
            Value::parse("\"a\\u{a}b\"", &Sort::String),
            Value::Str("a\nb".into())
        );
    }

    #[test]
    fn printed_string_literals_read_back_unchanged() {
        for text in ["\\u{41}", "back\\slash", "quote\"d", "tab\there", "caf\u{e9}", ""] {
            let printed = Term::StringLit(text.to_string()).to_string();
            assert_eq!(
                Value::parse(&printed, &Sort::String),
                Value::Str(text.to_string()),
                "{printed}"
            );
        }
    }

    #[test]
    fn unparseable_value_is_opaque() {
        assert_eq!(
            Value::parse("(lambda ((x Int)) x)", &Sort::Int),
            Value::Opaque("(lambda ((x Int)) x)".into())
        );
    }

    #[test]
    fn value_display_round_trips_smtlib() {
        assert_eq!(Value::Int(-4).to_string(), "(- 4)");
        assert_eq!(Value::Str("q\"".into()).to_string(), "\"q\"\"\"");
    }

    #[test]
    fn stale_model_rejects_queries() {
        let generation = Arc::new(AtomicU64::new(4));
        let sorts = HashMap::from([("x".to_string(), Sort::Int)]);
        let model = ResultModel::new(
            Model::with_assignments(vec![("x".into(), "2".into())]),
            sorts,
            4,
            Arc::clone(&generation),
        );
        assert_eq!(model.get("x").unwrap(), Some(Value::Int(2)));
        assert!(!model.is_stale());

        generation.store(5, Ordering::Release);
        assert!(model.is_stale());
        assert_eq!(
            model.get("x").unwrap_err(),
            SolverError::StaleModel {
                produced_at: 4,
                current: 5
            }
        );
        assert!(model.evaluate(&Term::var("x")).is_err());
    }

    #[test]
    fn unassigned_symbol_gets_sort_default() {
        let sorts = HashMap::from([("b".to_string(), Sort::Bool)]);
        let model = ResultModel::new(Model::new(), sorts, 0, Arc::new(AtomicU64::new(0)));
        assert_eq!(model.get("b").unwrap(), Some(Value::Bool(false)));
        assert_eq!(model.get("undeclared").unwrap(), None);
    }
}
