//! Arithmetic expression evaluator.
//!
//! Infix text is converted to postfix with the shunting-yard algorithm and
//! the postfix sequence is evaluated on a value stack.
//!
//! Grammar accepted:
//!
//! - operands: numbers (`12`, `0.5`, `.5`) and variable names made of ASCII
//!   letters, digits and `_`;
//! - binary `+ - * /`, `* /` binding tighter.  An additive operator only
//!   flushes pending multiplicative and unary operators, and `*`/`/` flush
//!   nothing, so chains of equal precedence group to the right:
//!   `10-2+3` is `10-(2+3)` and `8/2/2` is `8/(2/2)`;
//! - unary `+`/`-` at the start or right after `(`;
//! - parentheses.
//!
//! Everything is `f64`; division by zero gives `inf`/`NaN`.
//!
//! [`eval`] keeps the scripting language's historical contract: a malformed
//! expression evaluates to [`FAILURE_VALUE`] (`0`).  Callers that need to
//! tell a computed zero from a failure use [`try_eval`].

use tracing::warn;

use crate::var::VarStore;

/// Value substituted for an expression that fails to parse or evaluate.
pub const FAILURE_VALUE: f64 = 0.0;

// ── EvalContext ───────────────────────────────────────────────────────────────

/// Variable lookup used during conversion and evaluation.
pub trait EvalContext {
    fn get_var(&self, name: &str) -> Option<f64>;
}

impl EvalContext for VarStore {
    fn get_var(&self, name: &str) -> Option<f64> {
        self.get(name)
    }
}

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum ExprError {
    Empty,
    /// An operator where an operand was expected (or vice versa).
    Misplaced { pos: usize, what: String },
    BadNumber { pos: usize, text: String },
    UnknownVariable(String),
    UnbalancedParens,
    EmptyParens { pos: usize },
    UnexpectedChar { pos: usize, ch: char },
    /// The postfix sequence did not reduce to a single value.
    Malformed,
}

impl std::fmt::Display for ExprError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExprError::Empty => write!(f, "empty expression"),
            ExprError::Misplaced { pos, what } => write!(f, "unexpected {what} at {pos}"),
            ExprError::BadNumber { pos, text } => write!(f, "bad number `{text}` at {pos}"),
            ExprError::UnknownVariable(name) => write!(f, "unknown variable `{name}`"),
            ExprError::UnbalancedParens => write!(f, "unbalanced parentheses"),
            ExprError::EmptyParens { pos } => write!(f, "empty parentheses at {pos}"),
            ExprError::UnexpectedChar { pos, ch } => write!(f, "unexpected `{ch}` at {pos}"),
            ExprError::Malformed => write!(f, "malformed expression"),
        }
    }
}

impl std::error::Error for ExprError {}

// ── Postfix form ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
    /// Unary `+` (identity).
    Pos,
    /// Unary `-`.
    Neg,
}

impl Op {
    /// Flushed from the stack when an additive operator arrives.
    fn yields_to_additive(self) -> bool {
        matches!(self, Op::Mul | Op::Div | Op::Pos | Op::Neg)
    }
}

/// One element of a postfix sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum Rpn {
    Num(f64),
    Var(String),
    Op(Op),
}

#[derive(Debug, Clone, Copy)]
enum Pending {
    Op(Op),
    LParen,
}

/// What the scanner saw last; decides how `+`/`-`/`(` are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Prev {
    Start,
    Operand,
    BinOp,
    UnaryOp,
    LParen,
    RParen,
}

impl Prev {
    fn ends_operand(self) -> bool {
        matches!(self, Prev::Operand | Prev::RParen)
    }
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Length of the operand run starting at `pos`, and whether it is a name.
///
/// A run is digits, letters and `_` with at most one `.`; a run with a
/// letter may not contain a `.` at all.
fn scan_operand(src: &[u8], pos: usize) -> Result<(usize, bool), ExprError> {
    let mut len = 0;
    let mut point = false;
    let mut name = false;
    while let Some(&b) = src.get(pos + len) {
        match b {
            b'0'..=b'9' => {}
            b'.' if point => return Err(bad_number(src, pos, len + 1)),
            b'.' => point = true,
            _ if is_word_byte(b) => name = true,
            _ => break,
        }
        len += 1;
    }
    if name && point {
        let tail = src[pos + len..]
            .iter()
            .take_while(|&&b| is_word_byte(b) || b == b'.')
            .count();
        return Err(bad_number(src, pos, len + tail));
    }
    Ok((len, name))
}

fn bad_number(src: &[u8], pos: usize, len: usize) -> ExprError {
    let end = (pos + len).min(src.len());
    ExprError::BadNumber { pos, text: String::from_utf8_lossy(&src[pos..end]).into_owned() }
}

/// Convert infix `src` to postfix.
///
/// Variable names must already exist in `ctx`.
pub fn to_postfix(src: &str, ctx: &dyn EvalContext) -> Result<Vec<Rpn>, ExprError> {
    let bytes = src.as_bytes();
    let mut out = Vec::new();
    let mut stack: Vec<Pending> = Vec::new();
    let mut depth = 0usize;
    let mut prev = Prev::Start;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b' ' | b'\t' | b'\r' | b'\n' => {
                i += 1;
                continue;
            }
            b'+' | b'-' => {
                if matches!(prev, Prev::Start | Prev::LParen) {
                    stack.push(Pending::Op(if b == b'+' { Op::Pos } else { Op::Neg }));
                    prev = Prev::UnaryOp;
                } else if prev.ends_operand() {
                    let op = if b == b'+' { Op::Add } else { Op::Sub };
                    pop_for_additive(&mut stack, &mut out);
                    stack.push(Pending::Op(op));
                    prev = Prev::BinOp;
                } else {
                    return Err(misplaced(i, b));
                }
            }
            b'*' | b'/' => {
                if !prev.ends_operand() {
                    return Err(misplaced(i, b));
                }
                stack.push(Pending::Op(if b == b'*' { Op::Mul } else { Op::Div }));
                prev = Prev::BinOp;
            }
            b'(' => {
                if prev.ends_operand() {
                    return Err(misplaced(i, b));
                }
                stack.push(Pending::LParen);
                depth += 1;
                prev = Prev::LParen;
            }
            b')' => {
                if depth == 0 {
                    return Err(ExprError::UnbalancedParens);
                }
                match prev {
                    Prev::LParen => return Err(ExprError::EmptyParens { pos: i }),
                    Prev::BinOp | Prev::UnaryOp => return Err(misplaced(i, b)),
                    _ => {}
                }
                loop {
                    match stack.pop() {
                        Some(Pending::Op(op)) => out.push(Rpn::Op(op)),
                        Some(Pending::LParen) => break,
                        None => return Err(ExprError::UnbalancedParens),
                    }
                }
                depth -= 1;
                prev = Prev::RParen;
            }
            _ => {
                let (len, is_name) = scan_operand(bytes, i)?;
                if len == 0 {
                    let ch = src[i..].chars().next().unwrap_or('\u{fffd}');
                    return Err(ExprError::UnexpectedChar { pos: i, ch });
                }
                if prev.ends_operand() {
                    return Err(ExprError::Misplaced { pos: i, what: "operand".to_owned() });
                }
                let text = &src[i..i + len];
                if is_name {
                    if ctx.get_var(text).is_none() {
                        return Err(ExprError::UnknownVariable(text.to_owned()));
                    }
                    out.push(Rpn::Var(text.to_owned()));
                } else {
                    let v: f64 = text
                        .parse()
                        .map_err(|_| ExprError::BadNumber { pos: i, text: text.to_owned() })?;
                    out.push(Rpn::Num(v));
                }
                prev = Prev::Operand;
                i += len;
                continue;
            }
        }
        i += 1;
    }

    match prev {
        Prev::Start => return Err(ExprError::Empty),
        Prev::BinOp | Prev::UnaryOp => {
            return Err(ExprError::Misplaced { pos: bytes.len(), what: "end of expression".to_owned() })
        }
        _ => {}
    }
    if depth != 0 {
        return Err(ExprError::UnbalancedParens);
    }
    while let Some(p) = stack.pop() {
        match p {
            Pending::Op(op) => out.push(Rpn::Op(op)),
            Pending::LParen => return Err(ExprError::UnbalancedParens),
        }
    }
    Ok(out)
}

/// Move pending multiplicative and unary operators to the output, stopping
/// at the first additive operator or `(`.
fn pop_for_additive(stack: &mut Vec<Pending>, out: &mut Vec<Rpn>) {
    while let Some(&Pending::Op(top)) = stack.last() {
        if !top.yields_to_additive() {
            break;
        }
        out.push(Rpn::Op(top));
        stack.pop();
    }
}

fn misplaced(pos: usize, b: u8) -> ExprError {
    ExprError::Misplaced { pos, what: format!("`{}`", b as char) }
}

/// Evaluate a postfix sequence.
pub fn eval_postfix(rpn: &[Rpn], ctx: &dyn EvalContext) -> Result<f64, ExprError> {
    let mut values: Vec<f64> = Vec::with_capacity(rpn.len());
    for item in rpn {
        match item {
            Rpn::Num(v) => values.push(*v),
            Rpn::Var(name) => {
                let v = ctx
                    .get_var(name)
                    .ok_or_else(|| ExprError::UnknownVariable(name.clone()))?;
                values.push(v);
            }
            Rpn::Op(op) => {
                let right = values.pop().ok_or(ExprError::Malformed)?;
                let v = match op {
                    Op::Pos => right,
                    Op::Neg => -right,
                    _ => {
                        let left = values.pop().ok_or(ExprError::Malformed)?;
                        match op {
                            Op::Add => left + right,
                            Op::Sub => left - right,
                            Op::Mul => left * right,
                            _ => left / right,
                        }
                    }
                };
                values.push(v);
            }
        }
    }
    match values.as_slice() {
        [v] => Ok(*v),
        _ => Err(ExprError::Malformed),
    }
}

/// Parse and evaluate `src`, reporting failures.
pub fn try_eval(src: &str, ctx: &dyn EvalContext) -> Result<f64, ExprError> {
    let rpn = to_postfix(src, ctx)?;
    eval_postfix(&rpn, ctx)
}

/// Parse and evaluate `src`; a malformed expression yields
/// [`FAILURE_VALUE`] and a warning in the log.
pub fn eval(src: &str, ctx: &dyn EvalContext) -> f64 {
    match try_eval(src, ctx) {
        Ok(v) => v,
        Err(e) => {
            warn!(expr = src, error = %e, "malformed expression evaluates to 0");
            FAILURE_VALUE
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
