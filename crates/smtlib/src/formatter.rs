//! SMT-LIB2 text formatting for AST types.
//!
//! Implements `Display` for [`Sort`], [`Term`], [`Command`], and [`Script`],
//! producing the exact text written to an external solver's input stream.

use std::fmt;

use crate::command::Command;
use crate::script::Script;
use crate::sort::Sort;
use crate::term::Term;

// ---------------------------------------------------------------------------
// Sort
// ---------------------------------------------------------------------------

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sort::Bool => write!(f, "Bool"),
            Sort::Int => write!(f, "Int"),
            Sort::BitVec(width) => write!(f, "(_ BitVec {width})"),
            Sort::String => write!(f, "String"),
            Sort::Uninterpreted(name) => write!(f, "{name}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Term
// ---------------------------------------------------------------------------

/// Format a bitvector literal; negative values wrap to two's complement.
fn fmt_bv_lit(value: i128, width: u32, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let bits = value as u128;
    let unsigned = if width >= 128 {
        bits
    } else {
        bits & ((1u128 << width) - 1)
    };
    write!(f, "(_ bv{unsigned} {width})")
}

/// Escape string contents for SMT-LIB 2.6: `\` and anything outside
/// printable ASCII become `\u{..}`. Quotes are left alone.
pub fn escape_unicode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\u{5c}"),
            ' '..='~' => out.push(ch),
            _ => out.push_str(&format!("\\u{{{:x}}}", ch as u32)),
        }
    }
    out
}

/// Format a string literal: escaped contents with `"` doubled.
fn fmt_string_lit(value: &str, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "\"{}\"", escape_unicode(value).replace('"', "\"\""))
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::BoolLit(b) => write!(f, "{b}"),
            // SMT-LIB has no negative numerals.
            Term::IntLit(n) if *n < 0 => write!(f, "(- {})", n.unsigned_abs()),
            Term::IntLit(n) => write!(f, "{n}"),
            Term::BitVecLit(value, width) => fmt_bv_lit(*value, *width, f),
            Term::StringLit(value) => fmt_string_lit(value, f),
            Term::Const(name) => write!(f, "{name}"),

            // Empty n-ary applications print as their identity element.
            Term::And(terms) if terms.is_empty() => write!(f, "true"),
            Term::Or(terms) if terms.is_empty() => write!(f, "false"),
            Term::StrConcat(terms) if terms.is_empty() => write!(f, "\"\""),
            Term::App(name, args) if args.is_empty() => write!(f, "{name}"),

            _ => {
                write!(f, "({}", self.operator().unwrap_or_default())?;
                for arg in self.args() {
                    write!(f, " {arg}")?;
                }
                write!(f, ")")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::DeclareConst(name, sort) => {
                write!(f, "(declare-const {name} {sort})")
            }
            Command::Assert(term) => write!(f, "(assert {term})"),
            Command::CheckSat => write!(f, "(check-sat)"),
            Command::GetModel => write!(f, "(get-model)"),
            Command::Push(n) => write!(f, "(push {n})"),
            Command::Pop(n) => write!(f, "(pop {n})"),
            Command::Reset => write!(f, "(reset)"),
            Command::Exit => write!(f, "(exit)"),
            Command::Verbatim(text) => write!(f, "{}", text.trim()),
        }
    }
}

// ---------------------------------------------------------------------------
// Script
// ---------------------------------------------------------------------------

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, cmd) in self.commands().iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{cmd}")?;
        }
        Ok(())
    }
}

// ===========================================================================
// Tests
// ===========================================================================
