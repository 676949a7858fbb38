//! Minimal S-expression reader for SMT-LIB text.
//!
//! String literals and quoted symbols stay verbatim (delimiters included)
//! inside atoms, so printing a parsed tree gives back equivalent SMT-LIB.

use std::fmt;

/// A parsed S-expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Sexp {
    Atom(String),
    List(Vec<Sexp>),
}

/// Malformed S-expression text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SexpError(pub String);

impl fmt::Display for SexpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for SexpError {}

impl Sexp {
    /// Parse exactly one S-expression.
    pub fn parse(text: &str) -> Result<Sexp, SexpError> {
        let mut all = Self::parse_all(text)?;
        match all.len() {
            1 => Ok(all.remove(0)),
            0 => Err(SexpError("Empty S-expression".to_string())),
            _ => Err(SexpError(format!("Trailing input after S-expression: {text}"))),
        }
    }

    /// Parse a sequence of top-level S-expressions, e.g. a script.
    pub fn parse_all(text: &str) -> Result<Vec<Sexp>, SexpError> {
        let tokens = tokenize(text)?;
        let mut pos = 0;
        let mut items = Vec::new();
        while pos < tokens.len() {
            items.push(parse_tokens(&tokens, &mut pos)?);
        }
        Ok(items)
    }

    pub fn as_atom(&self) -> Option<&str> {
        match self {
            Sexp::Atom(atom) => Some(atom.as_str()),
            Sexp::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Sexp]> {
        match self {
            Sexp::List(items) => Some(items.as_slice()),
            Sexp::Atom(_) => None,
        }
    }

    /// Leading atom of a list, e.g. `assert` in `(assert p)`.
    pub fn head(&self) -> Option<&str> {
        self.as_list()?.first()?.as_atom()
    }
}

impl fmt::Display for Sexp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sexp::Atom(atom) => write!(f, "{atom}"),
            Sexp::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
        }
    }
}

#[derive(Debug, PartialEq)]
enum Token {
    Open,
    Close,
    Atom(String),
}

/// Read a delimited token (`"..."` or `|...|`) whose opening delimiter was
/// already consumed. Inside strings `""` is an escaped quote.
fn read_delimited(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    delim: char,
) -> Result<String, SexpError> {
    let mut out = String::from(delim);
    loop {
        match chars.next() {
            Some(c) if c == delim && delim == '"' && chars.peek() == Some(&'"') => {
                chars.next();
                out.push_str("\"\"");
            }
            Some(c) if c == delim => break,
            Some(c) => out.push(c),
            None if delim == '"' => {
                return Err(SexpError("Unterminated string literal".to_string()));
            }
            None => return Err(SexpError("Unterminated quoted symbol".to_string())),
        }
    }
    out.push(delim);
    Ok(out)
}

fn tokenize(text: &str) -> Result<Vec<Token>, SexpError> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '(' => tokens.push(Token::Open),
            ')' => tokens.push(Token::Close),
            ';' => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            c if c.is_whitespace() => {}
            '"' | '|' => tokens.push(Token::Atom(read_delimited(&mut chars, ch)?)),
            c => {
                let mut atom = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next.is_whitespace() || matches!(next, '(' | ')' | '"' | ';') {
                        break;
                    }
                    atom.push(next);
                    chars.next();
                }
                tokens.push(Token::Atom(atom));
            }
        }
    }
    Ok(tokens)
}

fn parse_tokens(tokens: &[Token], pos: &mut usize) -> Result<Sexp, SexpError> {
    match tokens.get(*pos) {
        Some(Token::Atom(atom)) => {
            *pos += 1;
            Ok(Sexp::Atom(atom.clone()))
        }
        Some(Token::Open) => {
            *pos += 1;
            let mut items = Vec::new();
            loop {
                match tokens.get(*pos) {
                    Some(Token::Close) => {
                        *pos += 1;
                        return Ok(Sexp::List(items));
                    }
                    Some(_) => items.push(parse_tokens(tokens, pos)?),
                    None => return Err(SexpError("Unbalanced parentheses".to_string())),
                }
            }
        }
        Some(Token::Close) => Err(SexpError("Unexpected `)`".to_string())),
        None => Err(SexpError("Empty S-expression".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbalanced_input_is_an_error() {
        assert!(Sexp::parse(")").is_err());
        assert!(Sexp::parse("(a b").is_err());
        assert!(Sexp::parse("(a) b").is_err());
        assert!(Sexp::parse("   ; only a comment").is_err());
    }

    #[test]
    fn quoted_symbols_and_strings_are_atoms() {
        let sexp = Sexp::parse("(define-fun |x y| () String \"a ) b\"\"\")").unwrap();
        assert_eq!(sexp.to_string(), "(define-fun |x y| () String \"a ) b\"\"\")");
        assert_eq!(sexp.head(), Some("define-fun"));
    }

    #[test]
    fn parse_all_reads_a_script() {
        let items = Sexp::parse_all("(declare-const a Bool) ; note\n(assert a)\n").unwrap();
        let heads: Vec<_> = items.iter().filter_map(Sexp::head).collect();
        assert_eq!(heads, vec!["declare-const", "assert"]);
        assert_eq!(Sexp::parse_all("").unwrap(), vec![]);
    }

    #[test]
    fn unterminated_literals_fail() {
        assert_eq!(
            Sexp::parse("(a \"bc").unwrap_err(),
            SexpError("Unterminated string literal".to_string())
        );
        assert!(Sexp::parse("|abc").is_err());
    }
}
