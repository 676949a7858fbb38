//! Parsing of an external solver's output stream.
//!
//! The solver answers `(check-sat)` with a single token line and
//! `(get-model)` with one (possibly multi-line) S-expression. Errors arrive
//! as `(error "...")`. [`ReplyReader`] consumes stdout line by line and
//! yields one [`ReplyEvent`] per complete answer.

use dualsat_smtlib::sexp::Sexp;

use crate::error::SolverError;
use crate::model::Model;
use crate::result::Outcome;

/// One complete answer read from the solver.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyEvent {
    CheckSat(Outcome),
    Model(Model),
    /// `(error "...")` printed by the solver. Not an answer to a query.
    SolverError(String),
}

/// Incremental line reader that reassembles multi-line S-expressions.
#[derive(Debug, Default)]
pub struct ReplyReader {
    pending: String,
    scan: ScanState,
}

#[derive(Debug, Default, Clone, Copy)]
struct ScanState {
    depth: i64,
    in_string: bool,
    in_symbol: bool,
}

impl ScanState {
    /// Advance over `line`, tracking paren depth outside literals.
    fn scan(&mut self, line: &str) {
        for ch in line.chars() {
            match ch {
                '"' if !self.in_symbol => self.in_string = !self.in_string,
                '|' if !self.in_string => self.in_symbol = !self.in_symbol,
                ';' if !self.in_string && !self.in_symbol => break,
                '(' if !self.in_string && !self.in_symbol => self.depth += 1,
                ')' if !self.in_string && !self.in_symbol => self.depth -= 1,
                _ => {}
            }
        }
    }
}

impl ReplyReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line of solver output.
    ///
    /// Returns `Ok(None)` while an S-expression is incomplete or for lines
    /// that carry no answer (`success`, blank lines, comments).
    pub fn feed_line(&mut self, line: &str) -> Result<Option<ReplyEvent>, SolverError> {
        if self.pending.is_empty() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed == "success" || trimmed.starts_with(';') {
                return Ok(None);
            }
            if !trimmed.starts_with('(') {
                return Outcome::from_token(trimmed)
                    .map(|outcome| Some(ReplyEvent::CheckSat(outcome)))
                    .ok_or_else(|| {
                        SolverError::ParseError(format!("Unexpected solver output: {trimmed}"))
                    });
            }
        }

        self.pending.push_str(line);
        self.pending.push('\n');
        self.scan.scan(line);
        if self.scan.depth > 0 || self.scan.in_string || self.scan.in_symbol {
            return Ok(None);
        }

        let text = std::mem::take(&mut self.pending);
        self.scan = ScanState::default();
        parse_sexp_reply(&text).map(Some)
    }
}

/// Classify a complete S-expression reply.
fn parse_sexp_reply(text: &str) -> Result<ReplyEvent, SolverError> {
    let sexp = Sexp::parse(text).map_err(|e| SolverError::ParseError(e.to_string()))?;
    if sexp.head() == Some("error") {
        let msg = sexp
            .as_list()
            .and_then(|items| items.get(1))
            .map(|m| m.to_string().trim_matches('"').to_string())
            .unwrap_or_default();
        return Ok(ReplyEvent::SolverError(msg));
    }
    parse_model(&sexp).map(ReplyEvent::Model)
}

/// Parse a model S-expression.
///
/// Solvers print models in two known shapes:
///
/// ```text
/// (
///   (define-fun x () Int
///     5)
/// )
/// ```
///
/// and the older `(model (define-fun x () Int 5))`. Only nullary
/// `define-fun` entries (constants) are kept.
fn parse_model(sexp: &Sexp) -> Result<Model, SolverError> {
    let Sexp::List(items) = sexp else {
        return Err(SolverError::ParseError(format!("Expected model, got: {sexp}")));
    };
    let entries = match items.first() {
        Some(Sexp::Atom(head)) if head == "model" => &items[1..],
        _ => &items[..],
    };

    let mut assignments = Vec::new();
    for entry in entries {
        if let Some((name, value)) = parse_define_fun(entry) {
            assignments.push((name, value));
        }
    }
    Ok(Model::with_assignments(assignments))
}

/// `(define-fun name () Sort value)` -> `(name, value)`. Functions with
/// parameters are skipped.
fn parse_define_fun(entry: &Sexp) -> Option<(String, String)> {
    let Sexp::List(parts) = entry else {
        return None;
    };
    match parts.as_slice() {
        [Sexp::Atom(kw), Sexp::Atom(name), Sexp::List(params), _sort, value]
            if kw == "define-fun" && params.is_empty() =>
        {
            Some((name.clone(), value.to_string()))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(text: &str) -> Vec<ReplyEvent> {
        let mut reader = ReplyReader::new();
        text.lines()
            .filter_map(|line| reader.feed_line(line).expect("parse failed"))
            .collect()
    }

    #[test]
    fn parse_check_sat_tokens() {
        let events = feed_all("sat\nunsat\nunknown\n");
        assert_eq!(
            events,
            vec![
                ReplyEvent::CheckSat(Outcome::Sat),
                ReplyEvent::CheckSat(Outcome::Unsat),
                ReplyEvent::CheckSat(Outcome::Unknown("unknown".into())),
            ]
        );
    }

    #[test]
    fn success_and_blank_lines_are_skipped() {
        assert_eq!(
            feed_all("success\n\n; comment\nsat\n"),
            vec![ReplyEvent::CheckSat(Outcome::Sat)]
        );
    }

    #[test]
    fn parse_unexpected_output_error() {
        let mut reader = ReplyReader::new();
        assert!(reader.feed_line("garbage output").is_err());
    }

    #[test]
    fn parse_model_new_format() {
        let output = "sat\n(\n  (define-fun x () Int\n    5)\n  (define-fun y () Bool\n    true)\n)\n";
        let events = feed_all(output);
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1],
            ReplyEvent::Model(Model::with_assignments(vec![
                ("x".into(), "5".into()),
                ("y".into(), "true".into()),
            ]))
        );
    }

    #[test]
    fn parse_model_old_format() {
        let events = feed_all("(model\n  (define-fun x () Int 42)\n)\n");
        assert_eq!(
            events,
            vec![ReplyEvent::Model(Model::with_assignments(vec![(
                "x".into(),
                "42".into()
            )]))]
        );
    }

    #[test]
    fn parse_model_negative_and_bitvec_values() {
        let events = feed_all(
            "(\n  (define-fun n () Int\n    (- 3))\n  (define-fun b () (_ BitVec 32)\n    #x00000005)\n)",
        );
        let ReplyEvent::Model(model) = &events[0] else {
            panic!("expected model, got {events:?}");
        };
        assert_eq!(model.get("n"), Some("(- 3)"));
        assert_eq!(model.get("b"), Some("#x00000005"));
    }

    #[test]
    fn parse_model_string_with_parens_and_spaces() {
        let events = feed_all("(\n  (define-fun s () String\n    \"a ) (  b\"\"\")\n)");
        let ReplyEvent::Model(model) = &events[0] else {
            panic!("expected model, got {events:?}");
        };
        assert_eq!(model.get("s"), Some("\"a ) (  b\"\"\""));
    }

    #[test]
    fn parse_model_skips_functions_with_params() {
        let events = feed_all("((define-fun f ((x Int)) Int (+ x 1)) (define-fun c () Int 2))");
        assert_eq!(
            events,
            vec![ReplyEvent::Model(Model::with_assignments(vec![(
                "c".into(),
                "2".into()
            )]))]
        );
    }

    #[test]
    fn empty_model() {
        assert_eq!(feed_all("()"), vec![ReplyEvent::Model(Model::new())]);
    }

    #[test]
    fn parse_error_reply() {
        let events = feed_all("(error \"line 3 column 10: unknown constant x\")");
        assert_eq!(
            events,
            vec![ReplyEvent::SolverError(
                "line 3 column 10: unknown constant x".into()
            )]
        );
    }

    #[test]
    fn unparseable_reply_fails_and_reader_recovers() {
        let mut reader = ReplyReader::new();
        assert!(reader.feed_line("(a) b").is_err());
        assert_eq!(
            reader.feed_line("sat").unwrap(),
            Some(ReplyEvent::CheckSat(Outcome::Sat))
        );
    }
}
