//! Evaluation of terms under a model snapshot.
//!
//! Symbols missing from the assignments are completed with their sort's
//! default value, matching what a solver does with model completion on.

use std::collections::HashMap;

use dualsat_smtlib::sort::Sort;
use dualsat_smtlib::term::Term;

use crate::error::SolverError;
use crate::model::{Value, mask};

type Env = HashMap<String, Value>;

pub(crate) fn evaluate(
    term: &Term,
    values: &Env,
    sorts: &HashMap<String, Sort>,
) -> Result<Value, SolverError> {
    Evaluator { values, sorts }.eval(term)
}

struct Evaluator<'a> {
    values: &'a Env,
    sorts: &'a HashMap<String, Sort>,
}

fn err(msg: impl Into<String>) -> SolverError {
    SolverError::Evaluation(msg.into())
}

/// Two's-complement reading of a masked bitvector value.
fn signed(value: u128, width: u32) -> i128 {
    if width == 0 || width >= 128 {
        return value as i128;
    }
    if value >> (width - 1) & 1 == 1 {
        value as i128 - (1i128 << width)
    } else {
        value as i128
    }
}

impl Evaluator<'_> {
    fn eval(&self, term: &Term) -> Result<Value, SolverError> {
        match term {
            Term::BoolLit(b) => Ok(Value::Bool(*b)),
            Term::IntLit(n) => Ok(Value::Int(*n)),
            Term::BitVecLit(value, width) => Ok(Value::BitVec {
                value: (*value as u128) & mask(*width),
                width: *width,
            }),
            Term::StringLit(s) => Ok(Value::Str(s.clone())),
            Term::Const(name) => self.lookup(name),

            Term::Not(a) => Ok(Value::Bool(!self.bool(a)?)),
            Term::And(terms) => {
                for t in terms {
                    if !self.bool(t)? {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            Term::Or(terms) => {
                for t in terms {
                    if self.bool(t)? {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            Term::Implies(a, b) => Ok(Value::Bool(!self.bool(a)? || self.bool(b)?)),
            Term::Iff(a, b) => Ok(Value::Bool(self.bool(a)? == self.bool(b)?)),

            Term::Eq(a, b) => {
                let (a, b) = (self.eval(a)?, self.eval(b)?);
                Ok(Value::Bool(self.same(&a, &b)?))
            }
            Term::Distinct(terms) => {
                let values = terms
                    .iter()
                    .map(|t| self.eval(t))
                    .collect::<Result<Vec<_>, _>>()?;
                for (i, a) in values.iter().enumerate() {
                    for b in &values[i + 1..] {
                        if self.same(a, b)? {
                            return Ok(Value::Bool(false));
                        }
                    }
                }
                Ok(Value::Bool(true))
            }
            Term::Ite(cond, then_branch, else_branch) => {
                if self.bool(cond)? {
                    self.eval(then_branch)
                } else {
                    self.eval(else_branch)
                }
            }

            Term::BvAdd(a, b) => self.bv_arith(a, b, |x, y| x.wrapping_add(y)),
            Term::BvSub(a, b) => self.bv_arith(a, b, |x, y| x.wrapping_sub(y)),
            Term::BvMul(a, b) => self.bv_arith(a, b, |x, y| x.wrapping_mul(y)),
            // Division by zero yields all ones, remainder by zero yields the dividend.
            Term::BvUDiv(a, b) => self.bv_arith(a, b, |x, y| x.checked_div(y).unwrap_or(u128::MAX)),
            Term::BvURem(a, b) => self.bv_arith(a, b, |x, y| x.checked_rem(y).unwrap_or(x)),
            Term::BvAnd(a, b) => self.bv_arith(a, b, |x, y| x & y),
            Term::BvOr(a, b) => self.bv_arith(a, b, |x, y| x | y),
            Term::BvXor(a, b) => self.bv_arith(a, b, |x, y| x ^ y),
            Term::BvNeg(a) => {
                let (x, w) = self.bv(a)?;
                Ok(Value::BitVec {
                    value: x.wrapping_neg() & mask(w),
                    width: w,
                })
            }
            Term::BvNot(a) => {
                let (x, w) = self.bv(a)?;
                Ok(Value::BitVec {
                    value: !x & mask(w),
                    width: w,
                })
            }
            Term::BvULt(a, b) => self.bv_cmp(a, b, |x, y, _| x < y),
            Term::BvULe(a, b) => self.bv_cmp(a, b, |x, y, _| x <= y),
            Term::BvUGt(a, b) => self.bv_cmp(a, b, |x, y, _| x > y),
            Term::BvUGe(a, b) => self.bv_cmp(a, b, |x, y, _| x >= y),
            Term::BvSLt(a, b) => self.bv_cmp(a, b, |x, y, w| signed(x, w) < signed(y, w)),
            Term::BvSLe(a, b) => self.bv_cmp(a, b, |x, y, w| signed(x, w) <= signed(y, w)),

            Term::IntAdd(a, b) => self.int_arith(a, b, i128::checked_add),
            Term::IntSub(a, b) => self.int_arith(a, b, i128::checked_sub),
            Term::IntMul(a, b) => self.int_arith(a, b, i128::checked_mul),
            Term::IntDiv(a, b) => self.int_arith(a, b, i128::checked_div_euclid),
            Term::IntMod(a, b) => self.int_arith(a, b, i128::checked_rem_euclid),
            Term::IntNeg(a) => self
                .int(a)?
                .checked_neg()
                .map(Value::Int)
                .ok_or_else(|| err("integer overflow")),
            Term::IntLt(a, b) => Ok(Value::Bool(self.int(a)? < self.int(b)?)),
            Term::IntLe(a, b) => Ok(Value::Bool(self.int(a)? <= self.int(b)?)),
            Term::IntGt(a, b) => Ok(Value::Bool(self.int(a)? > self.int(b)?)),
            Term::IntGe(a, b) => Ok(Value::Bool(self.int(a)? >= self.int(b)?)),

            Term::StrConcat(terms) => {
                let mut out = String::new();
                for t in terms {
                    out.push_str(&self.string(t)?);
                }
                Ok(Value::Str(out))
            }
            Term::StrLen(a) => Ok(Value::Int(self.string(a)?.chars().count() as i128)),
            Term::StrPrefixOf(a, b) => {
                let (a, b) = (self.string(a)?, self.string(b)?);
                Ok(Value::Bool(b.starts_with(&a)))
            }
            Term::StrContains(a, b) => {
                let (a, b) = (self.string(a)?, self.string(b)?);
                Ok(Value::Bool(a.contains(&b)))
            }

            Term::App(name, _) => Err(err(format!("uninterpreted application `{name}`"))),
        }
    }

    fn lookup(&self, name: &str) -> Result<Value, SolverError> {
        if let Some(value) = self.values.get(name) {
            return Ok(value.clone());
        }
        match self.sorts.get(name) {
            Some(sort) => Value::default_for(sort)
                .ok_or_else(|| err(format!("`{name}` has uninterpreted sort {sort}"))),
            None => Err(err(format!("undeclared symbol `{name}`"))),
        }
    }

    fn same(&self, a: &Value, b: &Value) -> Result<bool, SolverError> {
        match (a, b) {
            (Value::Opaque(x), _) | (_, Value::Opaque(x)) => {
                Err(err(format!("cannot compare uninterpreted value {x}")))
            }
            (Value::BitVec { width: w1, .. }, Value::BitVec { width: w2, .. }) if w1 != w2 => {
                Err(err(format!("bitvector width mismatch: {w1} vs {w2}")))
            }
            _ if std::mem::discriminant(a) != std::mem::discriminant(b) => {
                Err(err(format!("sort mismatch comparing {a} and {b}")))
            }
            _ => Ok(a == b),
        }
    }

    fn bool(&self, term: &Term) -> Result<bool, SolverError> {
        self.eval(term)?
            .as_bool()
            .ok_or_else(|| err(format!("expected Bool: {term}")))
    }

    fn int(&self, term: &Term) -> Result<i128, SolverError> {
        self.eval(term)?
            .as_int()
            .ok_or_else(|| err(format!("expected Int: {term}")))
    }

    fn string(&self, term: &Term) -> Result<String, SolverError> {
        match self.eval(term)? {
            Value::Str(s) => Ok(s),
            _ => Err(err(format!("expected String: {term}"))),
        }
    }

    fn bv(&self, term: &Term) -> Result<(u128, u32), SolverError> {
        match self.eval(term)? {
            Value::BitVec { value, width } => Ok((value, width)),
            _ => Err(err(format!("expected bitvector: {term}"))),
        }
    }

    fn bv_pair(&self, a: &Term, b: &Term) -> Result<(u128, u128, u32), SolverError> {
        let (x, w1) = self.bv(a)?;
        let (y, w2) = self.bv(b)?;
        if w1 != w2 {
            return Err(err(format!("bitvector width mismatch: {w1} vs {w2}")));
        }
        Ok((x, y, w1))
    }

    fn bv_arith<F>(&self, a: &Term, b: &Term, op: F) -> Result<Value, SolverError>
    where
        F: FnOnce(u128, u128) -> u128,
    {
        let (x, y, w) = self.bv_pair(a, b)?;
        Ok(Value::BitVec {
            value: op(x, y) & mask(w),
            width: w,
        })
    }

    fn bv_cmp<F>(&self, a: &Term, b: &Term, op: F) -> Result<Value, SolverError>
    where
        F: FnOnce(u128, u128, u32) -> bool,
    {
        let (x, y, w) = self.bv_pair(a, b)?;
        Ok(Value::Bool(op(x, y, w)))
    }

    fn int_arith<F>(&self, a: &Term, b: &Term, op: F) -> Result<Value, SolverError>
    where
        F: FnOnce(i128, i128) -> Option<i128>,
    {
        let (x, y) = (self.int(a)?, self.int(b)?);
        op(x, y)
            .map(Value::Int)
            .ok_or_else(|| err(format!("integer overflow or division by zero in {a} and {b}")))
    }
}
