//! `if`/`while` conditions: two expressions joined by one relational operator.

use super::expr::{self, EvalContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl RelOp {
    pub fn apply(self, left: f64, right: f64) -> bool {
        match self {
            RelOp::Eq => left == right,
            RelOp::Ne => left != right,
            RelOp::Lt => left < right,
            RelOp::Le => left <= right,
            RelOp::Gt => left > right,
            RelOp::Ge => left >= right,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RelOp::Eq => "==",
            RelOp::Ne => "!=",
            RelOp::Lt => "<",
            RelOp::Le => "<=",
            RelOp::Gt => ">",
            RelOp::Ge => ">=",
        }
    }
}

/// A parsed condition.  The operand expressions are kept as text and
/// evaluated afresh on every [`Condition::evaluate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub left: String,
    pub op: RelOp,
    pub right: String,
}

impl Condition {
    /// Build a condition from the tokens between the keyword and `{`.
    ///
    /// The first relational token splits the operands.  The script lexer
    /// knows `<=` but not `>=`, so `>` followed by `=` (and likewise `<`
    /// followed by `=`) is read as one operator.
    pub fn parse<S: AsRef<str>>(tokens: &[S]) -> Result<Self, String> {
        let toks: Vec<&str> = tokens
            .iter()
            .map(AsRef::as_ref)
            .filter(|t| *t != "\n")
            .collect();

        for (i, &t) in toks.iter().enumerate() {
            let next_is_eq = toks.get(i + 1) == Some(&"=");
            let (op, width) = match t {
                "==" => (RelOp::Eq, 1),
                "!=" => (RelOp::Ne, 1),
                "<=" => (RelOp::Le, 1),
                ">=" => (RelOp::Ge, 1),
                ">" if next_is_eq => (RelOp::Ge, 2),
                "<" if next_is_eq => (RelOp::Le, 2),
                ">" => (RelOp::Gt, 1),
                "<" => (RelOp::Lt, 1),
                _ => continue,
            };
            let left = toks[..i].concat();
            let right = toks[i + width..].concat();
            if left.is_empty() {
                return Err(format!("missing left operand of `{}`", op.as_str()));
            }
            if right.is_empty() {
                return Err(format!("missing right operand of `{}`", op.as_str()));
            }
            return Ok(Self { left, op, right });
        }
        Err(format!("no relational operator in condition `{}`", toks.concat()))
    }

    /// Evaluate both sides (malformed side → 0) and compare.
    pub fn evaluate(&self, ctx: &dyn EvalContext) -> bool {
        let left = expr::eval(&self.left, ctx);
        let right = expr::eval(&self.right, ctx);
        self.op.apply(left, right)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
