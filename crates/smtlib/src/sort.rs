use crate::sexp::Sexp;

/// SMT-LIB sort (type) representation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Sort {
    /// Boolean sort
    Bool,
    /// Mathematical integer sort
    Int,
    /// Fixed-width bitvector: `(_ BitVec n)`
    BitVec(u32),
    /// Unicode string sort from the SMT-LIB strings theory
    String,
    /// Uninterpreted sort
    Uninterpreted(String),
}

impl Sort {
    /// Returns `true` for sorts that carry a concrete value domain
    /// (everything except uninterpreted sorts).
    pub fn is_interpreted(&self) -> bool {
        !matches!(self, Sort::Uninterpreted(_))
    }

    /// Read a sort written in SMT-LIB syntax. Parametric sorts other than
    /// `(_ BitVec n)` are not recognized.
    pub fn from_sexp(sexp: &Sexp) -> Option<Sort> {
        match sexp {
            Sexp::Atom(name) => Some(match name.as_str() {
                "Bool" => Sort::Bool,
                "Int" => Sort::Int,
                "String" => Sort::String,
                _ => Sort::Uninterpreted(name.clone()),
            }),
            Sexp::List(items) => match items.as_slice() {
                [Sexp::Atom(underscore), Sexp::Atom(bv), Sexp::Atom(width)]
                    if underscore == "_" && bv == "BitVec" =>
                {
                    width.parse().ok().map(Sort::BitVec)
                }
                _ => None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(text: &str) -> Option<Sort> {
        Sort::from_sexp(&Sexp::parse(text).unwrap())
    }

    #[test]
    fn reads_printed_sorts_back() {
        for sort in [
            Sort::Bool,
            Sort::Int,
            Sort::String,
            Sort::BitVec(16),
            Sort::Uninterpreted("Color".into()),
        ] {
            assert_eq!(read(&sort.to_string()), Some(sort));
        }
    }

    #[test]
    fn unknown_parametric_sort_is_rejected() {
        assert_eq!(read("(Array Int Int)"), None);
        assert_eq!(read("(_ BitVec wide)"), None);
    }
}
