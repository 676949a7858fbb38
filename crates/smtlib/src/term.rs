/// SMT-LIB term (expression) representation.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    // === Literals ===
    /// Boolean literal
    BoolLit(bool),
    /// Integer literal (unbounded)
    IntLit(i128),
    /// Bitvector literal with value and width
    BitVecLit(i128, u32),
    /// String literal (unescaped contents)
    StringLit(String),

    // === Variables ===
    /// Named constant/variable reference
    Const(String),

    // === Boolean operations ===
    /// Logical NOT
    Not(Box<Term>),
    /// Logical AND (n-ary)
    And(Vec<Term>),
    /// Logical OR (n-ary)
    Or(Vec<Term>),
    /// Logical implication: `(=> a b)`
    Implies(Box<Term>, Box<Term>),
    /// Logical if-and-only-if: `(= a b)` for Bool
    Iff(Box<Term>, Box<Term>),

    // === Core ===
    /// Equality: `(= a b)`
    Eq(Box<Term>, Box<Term>),
    /// Distinct: `(distinct a b ...)`
    Distinct(Vec<Term>),
    /// If-then-else: `(ite cond then else)`
    Ite(Box<Term>, Box<Term>, Box<Term>),

    // === Bitvector arithmetic ===
    /// `(bvadd a b)`
    BvAdd(Box<Term>, Box<Term>),
    /// `(bvsub a b)`
    BvSub(Box<Term>, Box<Term>),
    /// `(bvmul a b)`
    BvMul(Box<Term>, Box<Term>),
    /// `(bvudiv a b)`
    BvUDiv(Box<Term>, Box<Term>),
    /// `(bvurem a b)`
    BvURem(Box<Term>, Box<Term>),
    /// `(bvneg a)`
    BvNeg(Box<Term>),

    // === Bitvector comparison ===
    /// `(bvult a b)`
    BvULt(Box<Term>, Box<Term>),
    /// `(bvule a b)`
    BvULe(Box<Term>, Box<Term>),
    /// `(bvugt a b)`
    BvUGt(Box<Term>, Box<Term>),
    /// `(bvuge a b)`
    BvUGe(Box<Term>, Box<Term>),
    /// `(bvslt a b)`
    BvSLt(Box<Term>, Box<Term>),
    /// `(bvsle a b)`
    BvSLe(Box<Term>, Box<Term>),

    // === Bitvector bitwise ===
    /// `(bvand a b)`
    BvAnd(Box<Term>, Box<Term>),
    /// `(bvor a b)`
    BvOr(Box<Term>, Box<Term>),
    /// `(bvxor a b)`
    BvXor(Box<Term>, Box<Term>),
    /// `(bvnot a)`
    BvNot(Box<Term>),

    // === Integer arithmetic ===
    /// `(+ a b)`
    IntAdd(Box<Term>, Box<Term>),
    /// `(- a b)`
    IntSub(Box<Term>, Box<Term>),
    /// `(* a b)`
    IntMul(Box<Term>, Box<Term>),
    /// `(div a b)`: integer division
    IntDiv(Box<Term>, Box<Term>),
    /// `(mod a b)`
    IntMod(Box<Term>, Box<Term>),
    /// `(- a)`: integer negation
    IntNeg(Box<Term>),
    /// `(< a b)`
    IntLt(Box<Term>, Box<Term>),
    /// `(<= a b)`
    IntLe(Box<Term>, Box<Term>),
    /// `(> a b)`
    IntGt(Box<Term>, Box<Term>),
    /// `(>= a b)`
    IntGe(Box<Term>, Box<Term>),

    // === Strings ===
    /// `(str.++ a b ...)`
    StrConcat(Vec<Term>),
    /// `(str.len a)`
    StrLen(Box<Term>),
    /// `(str.prefixof a b)`: `a` is a prefix of `b`
    StrPrefixOf(Box<Term>, Box<Term>),
    /// `(str.contains a b)`: `b` occurs in `a`
    StrContains(Box<Term>, Box<Term>),

    // === Function application ===
    /// `(f arg1 arg2 ...)`, passed through to the solver verbatim
    App(String, Vec<Term>),
}

impl Term {
    /// Reference a declared constant by name.
    pub fn var(name: impl Into<String>) -> Self {
        Term::Const(name.into())
    }

    /// Negate a term.
    pub fn not(term: Term) -> Self {
        Term::Not(Box::new(term))
    }

    /// Build `(= lhs rhs)`.
    pub fn eq(lhs: Term, rhs: Term) -> Self {
        Term::Eq(Box::new(lhs), Box::new(rhs))
    }

    /// SMT-LIB operator of a compound term; `None` for literals and constants.
    pub fn operator(&self) -> Option<&str> {
        let op = match self {
            Term::BoolLit(_)
            | Term::IntLit(_)
            | Term::BitVecLit(..)
            | Term::StringLit(_)
            | Term::Const(_) => return None,
            Term::App(name, _) => return Some(name.as_str()),
            Term::Not(_) => "not",
            Term::And(_) => "and",
            Term::Or(_) => "or",
            Term::Implies(..) => "=>",
            Term::Iff(..) | Term::Eq(..) => "=",
            Term::Distinct(_) => "distinct",
            Term::Ite(..) => "ite",
            Term::BvAdd(..) => "bvadd",
            Term::BvSub(..) => "bvsub",
            Term::BvMul(..) => "bvmul",
            Term::BvUDiv(..) => "bvudiv",
            Term::BvURem(..) => "bvurem",
            Term::BvNeg(_) => "bvneg",
            Term::BvULt(..) => "bvult",
            Term::BvULe(..) => "bvule",
            Term::BvUGt(..) => "bvugt",
            Term::BvUGe(..) => "bvuge",
            Term::BvSLt(..) => "bvslt",
            Term::BvSLe(..) => "bvsle",
            Term::BvAnd(..) => "bvand",
            Term::BvOr(..) => "bvor",
            Term::BvXor(..) => "bvxor",
            Term::BvNot(_) => "bvnot",
            Term::IntAdd(..) => "+",
            Term::IntSub(..) | Term::IntNeg(_) => "-",
            Term::IntMul(..) => "*",
            Term::IntDiv(..) => "div",
            Term::IntMod(..) => "mod",
            Term::IntLt(..) => "<",
            Term::IntLe(..) => "<=",
            Term::IntGt(..) => ">",
            Term::IntGe(..) => ">=",
            Term::StrConcat(_) => "str.++",
            Term::StrLen(_) => "str.len",
            Term::StrPrefixOf(..) => "str.prefixof",
            Term::StrContains(..) => "str.contains",
        };
        Some(op)
    }

    /// Direct subterms, in argument order.
    pub fn args(&self) -> Vec<&Term> {
        match self {
            Term::BoolLit(_)
            | Term::IntLit(_)
            | Term::BitVecLit(..)
            | Term::StringLit(_)
            | Term::Const(_) => Vec::new(),
            Term::Not(a)
            | Term::BvNeg(a)
            | Term::BvNot(a)
            | Term::IntNeg(a)
            | Term::StrLen(a) => vec![&**a],
            Term::Implies(a, b)
            | Term::Iff(a, b)
            | Term::Eq(a, b)
            | Term::BvAdd(a, b)
            | Term::BvSub(a, b)
            | Term::BvMul(a, b)
            | Term::BvUDiv(a, b)
            | Term::BvURem(a, b)
            | Term::BvULt(a, b)
            | Term::BvULe(a, b)
            | Term::BvUGt(a, b)
            | Term::BvUGe(a, b)
            | Term::BvSLt(a, b)
            | Term::BvSLe(a, b)
            | Term::BvAnd(a, b)
            | Term::BvOr(a, b)
            | Term::BvXor(a, b)
            | Term::IntAdd(a, b)
            | Term::IntSub(a, b)
            | Term::IntMul(a, b)
            | Term::IntDiv(a, b)
            | Term::IntMod(a, b)
            | Term::IntLt(a, b)
            | Term::IntLe(a, b)
            | Term::IntGt(a, b)
            | Term::IntGe(a, b)
            | Term::StrPrefixOf(a, b)
            | Term::StrContains(a, b) => vec![&**a, &**b],
            Term::Ite(c, t, e) => vec![&**c, &**t, &**e],
            Term::And(terms)
            | Term::Or(terms)
            | Term::Distinct(terms)
            | Term::StrConcat(terms)
            | Term::App(_, terms) => terms.iter().collect(),
        }
    }
}
