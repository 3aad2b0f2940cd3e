//! Command keywords and leading-token classification.

use std::collections::HashMap;
use std::rc::Rc;

use crate::var::VarStore;

/// Built-in command keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    OpenDataServer,
    ConnectControlClient,
    Var,
    SetVar,
    While,
    If,
    Print,
    Sleep,
    DefFunc,
    CallFunc,
}

/// Keyword text → [`Keyword`].  Matching is case-sensitive.
pub const KEYWORDS: &[(&str, Keyword)] = &[
    ("openDataServer", Keyword::OpenDataServer),
    ("connectControlClient", Keyword::ConnectControlClient),
    ("var", Keyword::Var),
    ("setVar", Keyword::SetVar),
    ("while", Keyword::While),
    ("if", Keyword::If),
    ("Print", Keyword::Print),
    ("Sleep", Keyword::Sleep),
    ("defFunc", Keyword::DefFunc),
    ("callFunc", Keyword::CallFunc),
];

impl Keyword {
    pub fn lookup(token: &str) -> Option<Keyword> {
        KEYWORDS.iter().find(|(name, _)| *name == token).map(|&(_, kw)| kw)
    }

    pub fn name(self) -> &'static str {
        KEYWORDS
            .iter()
            .find(|&&(_, kw)| kw == self)
            .map_or("?", |&(name, _)| name)
    }
}

/// A user-defined procedure: one formal parameter and a body token range.
#[derive(Debug, Clone)]
pub struct Procedure {
    pub param: String,
    pub body: Rc<[String]>,
    /// Script position of the first body token.
    pub offset: usize,
}

/// What the token under the cursor starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Keyword(Keyword),
    Assign,
    Call,
    CloseScope,
    LineEnd,
    Define,
}

/// Classify a leading token: keyword, then variable, then procedure, then
/// `}` and line end; anything else can only start a definition.
pub fn classify(token: &str, vars: &VarStore, procs: &HashMap<String, Procedure>) -> Command {
    if let Some(kw) = Keyword::lookup(token) {
        Command::Keyword(kw)
    } else if vars.contains(token) {
        Command::Assign
    } else if procs.contains_key(token) {
        Command::Call
    } else if token == "}" {
        Command::CloseScope
    } else if token == "\n" {
        Command::LineEnd
    } else {
        Command::Define
    }
}

/// `true` if `name` can be used for a variable, parameter or procedure.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else { return false };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && Keyword::lookup(name).is_none()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
