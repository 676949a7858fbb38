use crate::command::Command;
use crate::sexp::{Sexp, SexpError};
use crate::sort::Sort;

/// An ordered list of commands, as written to a solver.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Script {
    commands: Vec<Command>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_commands(commands: Vec<Command>) -> Self {
        Self { commands }
    }

    pub fn push(&mut self, cmd: Command) {
        self.commands.push(cmd);
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Number of commands matching `pred`.
    pub fn count(&self, pred: impl Fn(&Command) -> bool) -> usize {
        self.commands.iter().filter(|c| pred(c)).count()
    }

    /// Stack depth after running the script from depth 0, or `None` if a
    /// pop would go below zero. `(reset)` returns to depth 0.
    pub fn final_depth(&self) -> Option<u32> {
        self.commands.iter().try_fold(0u32, |depth, cmd| match cmd {
            Command::Push(n) => depth.checked_add(*n),
            Command::Pop(n) => depth.checked_sub(*n),
            Command::Reset => Some(0),
            _ => Some(depth),
        })
    }
}

/// Commands allowed in text asserted verbatim. Anything that changes the
/// stack, queries the solver or ends the session is rejected.
const ASSERTABLE: &[&str] = &[
    "assert",
    "declare-const",
    "declare-fun",
    "define-fun",
    "declare-sort",
    "define-sort",
];

/// Validate SMT-LIB text meant to be asserted verbatim and return the
/// constants it declares, in order.
///
/// Nullary `declare-fun` counts as a constant declaration. Declarations
/// whose sort is not recognized are still accepted but not returned.
pub fn assertable_declarations(text: &str) -> Result<Vec<(String, Sort)>, SexpError> {
    let mut declared = Vec::new();
    for item in Sexp::parse_all(text)? {
        let head = item
            .head()
            .ok_or_else(|| SexpError(format!("Expected a command, got `{item}`")))?;
        if !ASSERTABLE.contains(&head) {
            return Err(SexpError(format!("`{head}` cannot be asserted as text")));
        }
        let parts = item.as_list().unwrap_or_default();
        let decl = match (head, parts) {
            ("declare-const", [_, Sexp::Atom(name), sort]) => Some((name, sort)),
            ("declare-fun", [_, Sexp::Atom(name), Sexp::List(params), sort])
                if params.is_empty() =>
            {
                Some((name, sort))
            }
            _ => None,
        };
        if let Some((name, sort)) = decl
            && let Some(sort) = Sort::from_sexp(sort)
        {
            declared.push((name.clone(), sort));
        }
    }
    Ok(declared)
}
