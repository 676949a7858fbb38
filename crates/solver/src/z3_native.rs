//! Native Z3 API backend using the z3 crate.
//!
//! `Z3Backend` drives one in-process Z3 solver. Incremental sessions use the
//! plain interactive solver; one-shot sessions use a solver built from the
//! `default` tactic. The choice is fixed when the backend is created.
//!
//! ## Requirements
//!
//! The z3 crate links against the system Z3 library:
//! - macOS: `brew install z3`
//! - Ubuntu/Debian: `apt-get install libz3-dev`
//!
//! z3 0.19 uses a global context, so no `Context` is threaded through.

use std::collections::HashMap;

use dualsat_smtlib::sort::Sort;
use dualsat_smtlib::term::Term;
use dualsat_smtlib::formatter::escape_unicode;
use dualsat_smtlib::script::assertable_declarations;
use z3::ast::{BV, Bool, Int, String as Z3String};
use z3::{Params, SatResult, Solver, Tactic};

use crate::backend::SolverBackend;
use crate::config::{OptionValue, SolverOption};
use crate::error::SolverError;
use crate::model::Model;
use crate::result::Outcome;

/// Declarations made in one frame, with the binding each one shadowed.
type FrameDecls = Vec<(String, Option<Z3Value>)>;

/// In-process Z3 solver.
pub struct Z3Backend {
    solver: Solver,
    /// Kept alive for as long as the solver references it.
    params: Option<Params>,
    symbols: HashMap<String, Z3Value>,
    frames: Vec<FrameDecls>,
}

impl Z3Backend {
    pub fn new(incremental: bool) -> Self {
        Self {
            solver: Self::make_solver(incremental),
            params: None,
            symbols: HashMap::new(),
            frames: vec![Vec::new()],
        }
    }

    fn make_solver(incremental: bool) -> Solver {
        if incremental {
            Solver::new()
        } else {
            Tactic::new("default").solver()
        }
    }

    /// Bind `name` in the current frame, remembering what it shadows.
    fn bind(&mut self, name: String, value: Z3Value) {
        let shadowed = self.symbols.insert(name.clone(), value);
        if let Some(frame) = self.frames.last_mut() {
            frame.push((name, shadowed));
        }
    }

    /// Names visible at the current frame, in declaration order.
    fn visible_symbols(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for (name, _) in self.frames.iter().flatten() {
            if !seen.contains(&name.as_str()) {
                seen.push(name.as_str());
            }
        }
        seen
    }
}

impl SolverBackend for Z3Backend {
    fn configure(&mut self, options: &[SolverOption]) -> Result<(), SolverError> {
        if options.is_empty() {
            return Ok(());
        }
        let mut params = Params::new();
        for option in options {
            tracing::debug!(name = %option.name, value = %option.value, "Z3 native: set param");
            match &option.value {
                OptionValue::Integer(n) => {
                    let n = u32::try_from(*n).map_err(|_| SolverError::MalformedOption {
                        name: option.name.clone(),
                        value: n.to_string(),
                    })?;
                    params.set_u32(option.name.as_str(), n);
                }
                OptionValue::Symbol(s) => params.set_symbol(option.name.as_str(), s.as_str()),
            }
        }
        self.solver.set_params(&params);
        self.params = Some(params);
        Ok(())
    }

    fn declare(&mut self, name: &str, sort: &Sort) -> Result<(), SolverError> {
        let value = create_const(name, sort)?;
        self.bind(name.to_string(), value);
        Ok(())
    }

    fn assert(&mut self, term: &Term) -> Result<(), SolverError> {
        match translate_term(&self.symbols, term)? {
            Z3Value::Bool(b) => {
                self.solver.assert(&b);
                Ok(())
            }
            _ => Err(SolverError::Translation(
                "Assert requires Bool term".to_string(),
            )),
        }
    }

    fn assert_text(&mut self, text: &str) -> Result<(), SolverError> {
        let declared = assertable_declarations(text)
            .map_err(|e| SolverError::ParseError(e.to_string()))?;

        // The parser starts from an empty signature; redeclaring the visible
        // constants binds the text to the same Z3 constants.
        let mut source = String::new();
        for name in self.visible_symbols() {
            if declared.iter().any(|(n, _)| n == name) {
                continue;
            }
            if let Some(value) = self.symbols.get(name) {
                source.push_str(&format!("(declare-const {name} {})\n", value.sort()));
            }
        }
        source.push_str(text);
        tracing::trace!(%source, "Z3 native: parsing text");
        self.solver.from_string(source);

        for (name, sort) in declared {
            match create_const(&name, &sort) {
                Ok(value) => self.bind(name, value),
                Err(e) => tracing::debug!(%name, "Text declaration not tracked: {e}"),
            }
        }
        Ok(())
    }

    fn push(&mut self) -> Result<(), SolverError> {
        self.solver.push();
        self.frames.push(Vec::new());
        Ok(())
    }

    fn pop(&mut self, n: u32) -> Result<(), SolverError> {
        let depth = (self.frames.len() - 1) as u32;
        if n > depth {
            return Err(SolverError::InvalidStackPop {
                requested: n,
                depth,
            });
        }
        self.solver.pop(n);
        for _ in 0..n {
            let Some(frame) = self.frames.pop() else {
                break;
            };
            for (name, shadowed) in frame.into_iter().rev() {
                match shadowed {
                    Some(previous) => self.symbols.insert(name, previous),
                    None => self.symbols.remove(&name),
                };
            }
        }
        Ok(())
    }

    fn check(&mut self) -> Result<Outcome, SolverError> {
        let start = std::time::Instant::now();
        let outcome = match self.solver.check() {
            SatResult::Sat => Outcome::Sat,
            SatResult::Unsat => Outcome::Unsat,
            SatResult::Unknown => Outcome::Unknown(
                self.solver
                    .get_reason_unknown()
                    .unwrap_or_else(|| "unknown".to_string()),
            ),
        };
        tracing::debug!("Z3 native: {outcome} in {:?}", start.elapsed());
        Ok(outcome)
    }

    fn model(&self) -> Result<Model, SolverError> {
        let model = self.solver.get_model().ok_or(SolverError::NoModel)?;
        let assignments = self
            .visible_symbols()
            .into_iter()
            .filter_map(|name| {
                let text = match self.symbols.get(name)? {
                    Z3Value::Bool(b) => model.eval(b, true).map(|v: Bool| v.to_string()),
                    Z3Value::Int(i) => model.eval(i, true).map(|v: Int| v.to_string()),
                    Z3Value::BV(bv) => model.eval(bv, true).map(|v: BV| v.to_string()),
                    Z3Value::String(s) => model.eval(s, true).map(|v: Z3String| v.to_string()),
                }?;
                Some((name.to_string(), text))
            })
            .collect();
        Ok(Model::with_assignments(assignments))
    }

    fn reset(&mut self) -> Result<(), SolverError> {
        self.solver.reset();
        if let Some(params) = &self.params {
            self.solver.set_params(params);
        }
        self.symbols.clear();
        self.frames = vec![Vec::new()];
        Ok(())
    }

    fn display(&self) -> String {
        self.solver.to_string()
    }
}

/// Z3 value wrapper supporting different AST types.
#[derive(Clone, Debug)]
enum Z3Value {
    Bool(Bool),
    Int(Int),
    BV(BV),
    String(Z3String),
}

impl Z3Value {
    fn sort(&self) -> Sort {
        match self {
            Z3Value::Bool(_) => Sort::Bool,
            Z3Value::Int(_) => Sort::Int,
            Z3Value::BV(bv) => Sort::BitVec(bv.get_size()),
            Z3Value::String(_) => Sort::String,
        }
    }
}

/// Create a Z3 constant of the given sort.
fn create_const(name: &str, sort: &Sort) -> Result<Z3Value, SolverError> {
    match sort {
        Sort::Bool => Ok(Z3Value::Bool(Bool::new_const(name))),
        Sort::Int => Ok(Z3Value::Int(Int::new_const(name))),
        Sort::BitVec(width) => Ok(Z3Value::BV(BV::new_const(name, *width))),
        Sort::String => Ok(Z3Value::String(Z3String::new_const(name))),
        Sort::Uninterpreted(_) => Err(SolverError::Translation(format!(
            "Unsupported sort in native backend: {sort}"
        ))),
    }
}

fn expect_bool(value: Z3Value, op: &str) -> Result<Bool, SolverError> {
    match value {
        Z3Value::Bool(b) => Ok(b),
        _ => Err(SolverError::Translation(format!("{op} requires Bool"))),
    }
}

fn translate_bools(
    symbols: &HashMap<String, Z3Value>,
    terms: &[Term],
    op: &str,
) -> Result<Vec<Bool>, SolverError> {
    terms
        .iter()
        .map(|t| expect_bool(translate_term(symbols, t)?, op))
        .collect()
}

/// Translate an SMT-LIB Term into a Z3 AST.
fn translate_term(symbols: &HashMap<String, Z3Value>, term: &Term) -> Result<Z3Value, SolverError> {
    match term {
        Term::BoolLit(b) => Ok(Z3Value::Bool(Bool::from_bool(*b))),
        Term::IntLit(n) => {
            let n = i64::try_from(*n).map_err(|_| {
                SolverError::Translation(format!("Integer literal {n} exceeds 64 bits"))
            })?;
            Ok(Z3Value::Int(Int::from_i64(n)))
        }
        Term::BitVecLit(val, width) => {
            if *width > 64 {
                return Err(SolverError::Translation(format!(
                    "Bitvector literal wider than 64 bits: {width}"
                )));
            }
            let unsigned = ((*val as u128) & crate::model::mask(*width)) as u64;
            Ok(Z3Value::BV(BV::from_u64(unsigned, *width)))
        }

        Term::Const(name) => symbols
            .get(name)
            .cloned()
            .ok_or_else(|| SolverError::Translation(format!("Undefined symbol: {name}"))),

        Term::Not(a) => Ok(Z3Value::Bool(
            expect_bool(translate_term(symbols, a)?, "Not")?.not(),
        )),
        Term::And(terms) => {
            let bools = translate_bools(symbols, terms, "And")?;
            let refs: Vec<&Bool> = bools.iter().collect();
            Ok(Z3Value::Bool(Bool::and(&refs)))
        }
        Term::Or(terms) => {
            let bools = translate_bools(symbols, terms, "Or")?;
            let refs: Vec<&Bool> = bools.iter().collect();
            Ok(Z3Value::Bool(Bool::or(&refs)))
        }
        Term::Implies(a, b) => {
            let a = expect_bool(translate_term(symbols, a)?, "Implies")?;
            let b = expect_bool(translate_term(symbols, b)?, "Implies")?;
            Ok(Z3Value::Bool(a.implies(&b)))
        }
        Term::Iff(a, b) => {
            let a = expect_bool(translate_term(symbols, a)?, "Iff")?;
            let b = expect_bool(translate_term(symbols, b)?, "Iff")?;
            Ok(Z3Value::Bool(a.iff(&b)))
        }

        Term::Eq(a, b) => translate_eq(symbols, a, b),
        Term::Distinct(terms) => {
            let mut pairs = Vec::new();
            for (i, a) in terms.iter().enumerate() {
                for b in &terms[i + 1..] {
                    pairs.push(expect_bool(translate_eq(symbols, a, b)?, "Distinct")?.not());
                }
            }
            let refs: Vec<&Bool> = pairs.iter().collect();
            Ok(Z3Value::Bool(Bool::and(&refs)))
        }
        Term::Ite(cond, then_val, else_val) => {
            let c = expect_bool(translate_term(symbols, cond)?, "ITE condition")?;
            match (
                translate_term(symbols, then_val)?,
                translate_term(symbols, else_val)?,
            ) {
                (Z3Value::Bool(t), Z3Value::Bool(e)) => Ok(Z3Value::Bool(c.ite(&t, &e))),
                (Z3Value::Int(t), Z3Value::Int(e)) => Ok(Z3Value::Int(c.ite(&t, &e))),
                (Z3Value::BV(t), Z3Value::BV(e)) => Ok(Z3Value::BV(c.ite(&t, &e))),
                (Z3Value::String(t), Z3Value::String(e)) => Ok(Z3Value::String(c.ite(&t, &e))),
                _ => Err(SolverError::Translation(
                    "ITE requires matching branches".to_string(),
                )),
            }
        }

        // Bitvector arithmetic
        Term::BvAdd(a, b) => translate_bv_binary(symbols, a, b, |x, y| x.bvadd(&y)),
        Term::BvSub(a, b) => translate_bv_binary(symbols, a, b, |x, y| x.bvsub(&y)),
        Term::BvMul(a, b) => translate_bv_binary(symbols, a, b, |x, y| x.bvmul(&y)),
        Term::BvUDiv(a, b) => translate_bv_binary(symbols, a, b, |x, y| x.bvudiv(&y)),
        Term::BvURem(a, b) => translate_bv_binary(symbols, a, b, |x, y| x.bvurem(&y)),
        Term::BvNeg(a) => translate_bv_unary(symbols, a, |x| x.bvneg()),
        Term::BvAnd(a, b) => translate_bv_binary(symbols, a, b, |x, y| x.bvand(&y)),
        Term::BvOr(a, b) => translate_bv_binary(symbols, a, b, |x, y| x.bvor(&y)),
        Term::BvXor(a, b) => translate_bv_binary(symbols, a, b, |x, y| x.bvxor(&y)),
        Term::BvNot(a) => translate_bv_unary(symbols, a, |x| x.bvnot()),

        // Bitvector comparisons
        Term::BvULt(a, b) => translate_bv_cmp(symbols, a, b, |x, y| x.bvult(&y)),
        Term::BvULe(a, b) => translate_bv_cmp(symbols, a, b, |x, y| x.bvule(&y)),
        Term::BvUGt(a, b) => translate_bv_cmp(symbols, a, b, |x, y| x.bvugt(&y)),
        Term::BvUGe(a, b) => translate_bv_cmp(symbols, a, b, |x, y| x.bvuge(&y)),
        Term::BvSLt(a, b) => translate_bv_cmp(symbols, a, b, |x, y| x.bvslt(&y)),
        Term::BvSLe(a, b) => translate_bv_cmp(symbols, a, b, |x, y| x.bvsle(&y)),

        // Integer arithmetic
        Term::IntAdd(a, b) => translate_int_binary(symbols, a, b, |x, y| Int::add(&[&x, &y])),
        Term::IntSub(a, b) => translate_int_binary(symbols, a, b, |x, y| Int::sub(&[&x, &y])),
        Term::IntMul(a, b) => translate_int_binary(symbols, a, b, |x, y| Int::mul(&[&x, &y])),
        Term::IntDiv(a, b) => translate_int_binary(symbols, a, b, |x, y| x.div(&y)),
        Term::IntMod(a, b) => translate_int_binary(symbols, a, b, |x, y| x.modulo(&y)),
        Term::IntNeg(a) => match translate_term(symbols, a)? {
            Z3Value::Int(x) => Ok(Z3Value::Int(x.unary_minus())),
            _ => Err(SolverError::Translation("Int negation requires Int".to_string())),
        },
        Term::IntLt(a, b) => translate_int_cmp(symbols, a, b, |x, y| x.lt(&y)),
        Term::IntLe(a, b) => translate_int_cmp(symbols, a, b, |x, y| x.le(&y)),
        Term::IntGt(a, b) => translate_int_cmp(symbols, a, b, |x, y| x.gt(&y)),
        Term::IntGe(a, b) => translate_int_cmp(symbols, a, b, |x, y| x.ge(&y)),

        // Strings
        Term::StringLit(text) => Z3String::from_str(&escape_unicode(text))
            .map(Z3Value::String)
            .map_err(|e| SolverError::Translation(format!("String literal: {e}"))),
        Term::StrConcat(terms) => {
            let parts = terms
                .iter()
                .map(|t| expect_string(translate_term(symbols, t)?, "str.++"))
                .collect::<Result<Vec<_>, _>>()?;
            if parts.is_empty() {
                return translate_term(symbols, &Term::StringLit(String::new()));
            }
            let refs: Vec<&Z3String> = parts.iter().collect();
            Ok(Z3Value::String(Z3String::concat(&refs)))
        }
        Term::StrLen(a) => Ok(Z3Value::Int(
            expect_string(translate_term(symbols, a)?, "str.len")?.length(),
        )),
        Term::StrPrefixOf(a, b) => {
            let a = expect_string(translate_term(symbols, a)?, "str.prefixof")?;
            let b = expect_string(translate_term(symbols, b)?, "str.prefixof")?;
            Ok(Z3Value::Bool(a.prefix(&b)))
        }
        Term::StrContains(a, b) => {
            let a = expect_string(translate_term(symbols, a)?, "str.contains")?;
            let b = expect_string(translate_term(symbols, b)?, "str.contains")?;
            Ok(Z3Value::Bool(a.contains(&b)))
        }

        Term::App(..) => Err(SolverError::Translation(format!(
            "Unsupported term in native backend: {term}"
        ))),
    }
}

fn expect_string(value: Z3Value, op: &str) -> Result<Z3String, SolverError> {
    match value {
        Z3Value::String(s) => Ok(s),
        _ => Err(SolverError::Translation(format!("{op} requires String"))),
    }
}

fn translate_eq(
    symbols: &HashMap<String, Z3Value>,
    a: &Term,
    b: &Term,
) -> Result<Z3Value, SolverError> {
    match (translate_term(symbols, a)?, translate_term(symbols, b)?) {
        (Z3Value::Bool(x), Z3Value::Bool(y)) => Ok(Z3Value::Bool(x.eq(&y))),
        (Z3Value::Int(x), Z3Value::Int(y)) => Ok(Z3Value::Bool(x.eq(&y))),
        (Z3Value::BV(x), Z3Value::BV(y)) => Ok(Z3Value::Bool(x.eq(&y))),
        (Z3Value::String(x), Z3Value::String(y)) => Ok(Z3Value::Bool(x.eq(&y))),
        _ => Err(SolverError::Translation(
            "Eq requires matching sorts".to_string(),
        )),
    }
}

/// Helper for bitvector binary operations.
fn translate_bv_binary<F>(
    symbols: &HashMap<String, Z3Value>,
    a: &Term,
    b: &Term,
    op: F,
) -> Result<Z3Value, SolverError>
where
    F: FnOnce(BV, BV) -> BV,
{
    match (translate_term(symbols, a)?, translate_term(symbols, b)?) {
        (Z3Value::BV(x), Z3Value::BV(y)) => Ok(Z3Value::BV(op(x, y))),
        _ => Err(SolverError::Translation(
            "BV operation requires BV arguments".to_string(),
        )),
    }
}

/// Helper for bitvector unary operations.
fn translate_bv_unary<F>(
    symbols: &HashMap<String, Z3Value>,
    a: &Term,
    op: F,
) -> Result<Z3Value, SolverError>
where
    F: FnOnce(BV) -> BV,
{
    match translate_term(symbols, a)? {
        Z3Value::BV(x) => Ok(Z3Value::BV(op(x))),
        _ => Err(SolverError::Translation(
            "BV operation requires BV argument".to_string(),
        )),
    }
}

/// Helper for bitvector comparison operations.
fn translate_bv_cmp<F>(
    symbols: &HashMap<String, Z3Value>,
    a: &Term,
    b: &Term,
    op: F,
) -> Result<Z3Value, SolverError>
where
    F: FnOnce(BV, BV) -> Bool,
{
    match (translate_term(symbols, a)?, translate_term(symbols, b)?) {
        (Z3Value::BV(x), Z3Value::BV(y)) => Ok(Z3Value::Bool(op(x, y))),
        _ => Err(SolverError::Translation(
            "BV comparison requires BV arguments".to_string(),
        )),
    }
}

fn translate_int_binary<F>(
    symbols: &HashMap<String, Z3Value>,
    a: &Term,
    b: &Term,
    op: F,
) -> Result<Z3Value, SolverError>
where
    F: FnOnce(Int, Int) -> Int,
{
    match (translate_term(symbols, a)?, translate_term(symbols, b)?) {
        (Z3Value::Int(x), Z3Value::Int(y)) => Ok(Z3Value::Int(op(x, y))),
        _ => Err(SolverError::Translation(
            "Int operation requires Int arguments".to_string(),
        )),
    }
}

fn translate_int_cmp<F>(
    symbols: &HashMap<String, Z3Value>,
    a: &Term,
    b: &Term,
    op: F,
) -> Result<Z3Value, SolverError>
where
    F: FnOnce(Int, Int) -> Bool,
{
    match (translate_term(symbols, a)?, translate_term(symbols, b)?) {
        (Z3Value::Int(x), Z3Value::Int(y)) => Ok(Z3Value::Bool(op(x, y))),
        _ => Err(SolverError::Translation(
            "Int comparison requires Int arguments".to_string(),
        )),
    }
}
