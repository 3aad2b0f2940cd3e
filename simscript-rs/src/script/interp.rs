//! Script interpreter.
//!
//! The [`Interpreter`] walks a token sequence with a cursor.  The token under
//! the cursor is classified (see [`classify`]), the matching command consumes
//! its tokens and hands back the index of the next command.  Block bodies
//! are not compiled: `while` re-walks the body slice on every iteration and a
//! taken `if` simply continues into its body.
//!
//! The interpreter owns the variable store, the procedure table and the
//! simulator [`Link`].  It is `!Send` (procedure bodies are `Rc`-shared):
//! variables and procedures stay on the script thread, and the I/O tasks
//! only ever see the link's input table and output queue.

use std::collections::HashMap;
use std::io::{self, Write};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::{
    command::{classify, is_identifier, Command, Keyword, Procedure},
    cond::Condition,
    error::ScriptError,
    expr,
};
use crate::config::Catalog;
use crate::lexer::Lexer;
use crate::link::Link;
use crate::var::{Cell, VarStore};

/// Deepest allowed nesting of procedure calls.
pub const MAX_CALL_DEPTH: usize = 256;

// ── Span ──────────────────────────────────────────────────────────────────────

/// A slice of the script plus the script position of its first token.
#[derive(Debug, Clone, Copy)]
struct Span<'a> {
    code: &'a [String],
    base: usize,
}

impl<'a> Span<'a> {
    /// Token at `i`, or `""` past the end.
    fn tok(&self, i: usize) -> &'a str {
        let code = self.code;
        code.get(i).map_or("", String::as_str)
    }

    fn len(&self) -> usize {
        self.code.len()
    }

    fn abs(&self, i: usize) -> usize {
        self.base + i
    }

    fn sub(&self, from: usize, to: usize) -> Span<'a> {
        let code = self.code;
        Span { code: &code[from..to], base: self.base + from }
    }

    /// Tokens from `from` on that are outside quoted literals.
    fn unquoted(&self, from: usize) -> impl Iterator<Item = (usize, &'a str)> + 'a {
        let code = self.code;
        let mut quoted = false;
        code.iter()
            .enumerate()
            .skip(from)
            .filter_map(move |(i, t)| {
                if t == "\"" {
                    quoted = !quoted;
                    return None;
                }
                (!quoted).then_some((i, t.as_str()))
            })
    }

    /// Index of the `\n` or `}` that ends the statement containing `from`.
    fn stmt_end(&self, from: usize) -> usize {
        self.unquoted(from)
            .find(|&(_, t)| t == "\n" || t == "}")
            .map_or(self.len(), |(i, _)| i)
    }

    /// Concatenation of tokens `from..to`.
    fn merge(&self, from: usize, to: usize) -> String {
        if from >= to {
            return String::new();
        }
        self.code[from..to.min(self.len())].concat()
    }

    fn expect(&self, i: usize, want: &str) -> Result<(), ScriptError> {
        let found = self.tok(i);
        if found == want {
            Ok(())
        } else {
            Err(ScriptError::parse(
                self.abs(i),
                format!("expected `{want}`, found {}", describe(found)),
            ))
        }
    }

    /// First unquoted `{` at or after `from`.
    fn find_open(&self, from: usize) -> Result<usize, ScriptError> {
        self.unquoted(from)
            .find(|&(_, t)| t == "{")
            .map(|(i, _)| i)
            .ok_or_else(|| ScriptError::parse(self.abs(from), "expected `{`"))
    }

    /// Index of the `}` matching the `{` at `open`.
    fn block_end(&self, open: usize) -> Result<usize, ScriptError> {
        let mut depth = 0usize;
        for (i, t) in self.unquoted(open + 1) {
            match t {
                "{" => depth += 1,
                "}" if depth == 0 => return Ok(i),
                "}" => depth -= 1,
                _ => {}
            }
        }
        Err(ScriptError::parse(self.abs(open), "unclosed `{`"))
    }

    /// The token following the first `"` in `from..to`.
    fn quoted(&self, from: usize, to: usize) -> Option<&'a str> {
        (from..to)
            .find(|&i| self.tok(i) == "\"")
            .map(|q| self.tok(q + 1))
            .filter(|t| !t.is_empty() && *t != "\"")
    }
}

fn describe(token: &str) -> String {
    match token {
        "" => "end of script".to_owned(),
        "\n" => "end of line".to_owned(),
        t => format!("`{t}`"),
    }
}

/// Significant digits `Print` shows.
const PRINT_PRECISION: i32 = 6;

/// Render a number the way `Print` shows it: `%g` style with six
/// significant digits, trailing zeros dropped, exponent form below `1e-4`
/// and from `1e6` up (`0.333333`, `1e+06`, `nan`).
pub fn format_number(v: f64) -> String {
    if v.is_nan() {
        return "nan".to_owned();
    }
    if v.is_infinite() {
        return if v > 0.0 { "inf" } else { "-inf" }.to_owned();
    }
    if v == 0.0 {
        return if v.is_sign_negative() { "-0" } else { "0" }.to_owned();
    }

    // Rounding to the shown digits can bump the exponent (999999.5 → 1e+06).
    let sci = format!("{:.*e}", (PRINT_PRECISION - 1) as usize, v);
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };
    if exp < -4 || exp >= PRINT_PRECISION {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{sign}{:02}", trim_fraction(mantissa), exp.abs())
    } else {
        let decimals = (PRINT_PRECISION - 1 - exp) as usize;
        trim_fraction(&format!("{v:.decimals$}")).to_owned()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

fn sleep_duration(ms: f64) -> Duration {
    if ms.is_finite() && ms > 0.0 {
        Duration::try_from_secs_f64(ms / 1000.0).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}

// ── Interpreter ───────────────────────────────────────────────────────────────

/// Executes scripts.  `Print` output goes to `W`.
#[derive(Debug)]
pub struct Interpreter<W: Write = io::Stdout> {
    // Dropped first: channels stop before variables go away.
    link: Link,
    vars: VarStore,
    procs: HashMap<String, Procedure>,
    lexer: Lexer,
    out: W,
    depth: usize,
}

impl Interpreter<io::Stdout> {
    pub fn new(catalog: Catalog) -> Self {
        Self::with_writer(catalog, io::stdout())
    }
}

impl<W: Write> Interpreter<W> {
    pub fn with_writer(catalog: Catalog, out: W) -> Self {
        Self {
            link: Link::new(catalog),
            vars: VarStore::new(),
            procs: HashMap::new(),
            lexer: Lexer::script(),
            out,
            depth: 0,
        }
    }

    pub fn vars(&self) -> &VarStore {
        &self.vars
    }

    /// Current value of a script variable.
    pub fn var(&self, name: &str) -> Option<f64> {
        self.vars.get(name)
    }

    pub fn procedure(&self, name: &str) -> Option<&Procedure> {
        self.procs.get(name)
    }

    pub fn link(&self) -> &Link {
        &self.link
    }

    pub fn writer(&self) -> &W {
        &self.out
    }

    /// Stop both simulator channels and wait for them.  Idempotent; also
    /// happens when the interpreter is dropped.
    pub fn shutdown(&mut self) {
        self.link.shutdown();
    }

    // ── Execution ─────────────────────────────────────────────────────────────

    /// Tokenize and run script source.
    pub fn run_source(&mut self, text: &str) -> Result<(), ScriptError> {
        let tokens = self.lexer.tokenize(text);
        debug!(tokens = tokens.len(), "script tokenized");
        self.run(&tokens)
    }

    /// Run an already tokenized script.
    pub fn run(&mut self, tokens: &[String]) -> Result<(), ScriptError> {
        self.exec(Span { code: tokens, base: 0 })?;
        self.out.flush()?;
        Ok(())
    }

    fn exec(&mut self, s: Span<'_>) -> Result<(), ScriptError> {
        let mut pos = 0;
        while pos < s.len() {
            pos = self.step(s, pos)?;
        }
        Ok(())
    }

    /// Execute the command at `pos`; returns where the next one starts.
    fn step(&mut self, s: Span<'_>, pos: usize) -> Result<usize, ScriptError> {
        let token = s.tok(pos);
        let cmd = classify(token, &self.vars, &self.procs);
        match cmd {
            Command::LineEnd | Command::CloseScope => return Ok(pos + 1),
            _ => debug!(pos = s.abs(pos), token, ?cmd, "dispatch"),
        }
        match cmd {
            Command::Keyword(kw) => self.keyword(kw, s, pos),
            Command::Assign => self.assign(s, pos),
            Command::Call => self.call(s, pos),
            Command::Define => self.define(s, pos, false),
            Command::LineEnd | Command::CloseScope => Ok(pos + 1),
        }
    }

    fn keyword(&mut self, kw: Keyword, s: Span<'_>, pos: usize) -> Result<usize, ScriptError> {
        match kw {
            Keyword::OpenDataServer => self.open_data_server(s, pos),
            Keyword::ConnectControlClient => self.connect_control_client(s, pos),
            Keyword::Var => self.declare(s, pos),
            Keyword::SetVar => self.assign(s, pos + 1),
            Keyword::While => self.while_loop(s, pos),
            Keyword::If => self.if_block(s, pos),
            Keyword::Print => self.print(s, pos),
            Keyword::Sleep => self.sleep(s, pos),
            Keyword::DefFunc => self.define(s, pos + 1, true),
            Keyword::CallFunc => {
                let name = s.tok(pos + 1);
                if !self.procs.contains_key(name) {
                    return Err(ScriptError::UnknownProcedure {
                        pos: s.abs(pos + 1),
                        name: name.to_owned(),
                    });
                }
                self.call(s, pos + 1)
            }
        }
    }

    // ── Simulator link ────────────────────────────────────────────────────────

    fn port(&self, s: Span<'_>, pos: usize, text: &str) -> Result<u16, ScriptError> {
        let v = expr::try_eval(text, &self.vars).map_err(|e| {
            ScriptError::parse(s.abs(pos), format!("bad port expression `{text}`: {e}"))
        })?;
        if v.fract() != 0.0 || !(0.0..=65535.0).contains(&v) {
            return Err(ScriptError::parse(s.abs(pos), format!("port {v} out of range")));
        }
        Ok(v as u16)
    }

    /// `openDataServer(<port>)`
    fn open_data_server(&mut self, s: Span<'_>, pos: usize) -> Result<usize, ScriptError> {
        let end = s.stmt_end(pos + 1);
        let port = self.port(s, pos + 1, &s.merge(pos + 1, end))?;
        let peer = self.link.open_server(port)?;
        debug!(port, %peer, "data server handshake complete");
        Ok(end)
    }

    /// `connectControlClient("<host>", <port>)`
    fn connect_control_client(&mut self, s: Span<'_>, pos: usize) -> Result<usize, ScriptError> {
        s.expect(pos + 1, "(")?;
        let (host, comma) = if s.tok(pos + 2) == "\"" {
            s.expect(pos + 4, "\"")?;
            (s.tok(pos + 3), pos + 5)
        } else {
            (s.tok(pos + 2), pos + 3)
        };
        if host.is_empty() || host == "," || host == "\"" {
            return Err(ScriptError::parse(s.abs(pos + 2), "missing simulator address"));
        }
        s.expect(comma, ",")?;
        let end = s.stmt_end(comma + 1);
        // The closing `)` is part of the port tokens.
        let text = format!("({}", s.merge(comma + 1, end));
        let port = self.port(s, comma + 1, &text)?;
        let peer = self.link.connect_client(host, port)?;
        debug!(%peer, "control client handshake complete");
        Ok(end)
    }

    // ── Variables ─────────────────────────────────────────────────────────────

    /// `var n`, `var n = e`, `var n -> sim("p")`, `var n <- sim("p")`
    fn declare(&mut self, s: Span<'_>, pos: usize) -> Result<usize, ScriptError> {
        let name = s.tok(pos + 1);
        if !is_identifier(name) {
            return Err(ScriptError::parse(
                s.abs(pos + 1),
                format!("invalid variable name {}", describe(name)),
            ));
        }
        let end = s.stmt_end(pos + 1);
        let cell = if pos + 2 >= end {
            Cell::local(0.0)
        } else {
            match s.tok(pos + 2) {
                "=" => Cell::local(expr::eval(&s.merge(pos + 3, end), &self.vars)),
                arrow @ ("->" | "<-") => {
                    let path = s.quoted(pos + 3, end).ok_or_else(|| {
                        ScriptError::parse(s.abs(pos + 2), format!("`{arrow}` needs a quoted simulator path"))
                    })?;
                    if arrow == "->" {
                        Cell::push_on_write(path, Arc::clone(self.link.output()))
                    } else {
                        Cell::pull_on_read(path, Arc::clone(self.link.input()))
                    }
                }
                other => {
                    return Err(ScriptError::parse(
                        s.abs(pos + 2),
                        format!("unexpected {} after `var {name}`", describe(other)),
                    ))
                }
            }
        };
        let kind = cell.kind();
        if let Some(old) = self.vars.insert(name, cell) {
            debug!(name, old = old.kind(), new = kind, "variable redeclared");
        }
        Ok(end)
    }

    /// `n = e` (also the tail of `setVar n = e`)
    fn assign(&mut self, s: Span<'_>, at: usize) -> Result<usize, ScriptError> {
        let name = s.tok(at);
        if !self.vars.contains(name) {
            return Err(ScriptError::UnknownVariable { pos: s.abs(at), name: name.to_owned() });
        }
        s.expect(at + 1, "=")?;
        let end = s.stmt_end(at + 2);
        let value = expr::eval(&s.merge(at + 2, end), &self.vars);
        self.vars.set(name, value);
        Ok(end)
    }

    // ── Output / timing ───────────────────────────────────────────────────────

    /// `Print("literal")` or `Print(expr)`
    fn print(&mut self, s: Span<'_>, pos: usize) -> Result<usize, ScriptError> {
        s.expect(pos + 1, "(")?;
        let end = s.stmt_end(pos + 1);
        if s.tok(pos + 2) == "\"" {
            let text = match s.tok(pos + 3) {
                "\"" => "",
                t => t,
            };
            writeln!(self.out, "{text}")?;
        } else {
            let v = expr::eval(&s.merge(pos + 1, end), &self.vars);
            writeln!(self.out, "{}", format_number(v))?;
        }
        Ok(end)
    }

    /// `Sleep(ms)`
    fn sleep(&mut self, s: Span<'_>, pos: usize) -> Result<usize, ScriptError> {
        let end = s.stmt_end(pos + 1);
        let ms = expr::eval(&s.merge(pos + 1, end), &self.vars);
        self.out.flush()?;
        std::thread::sleep(sleep_duration(ms));
        Ok(end)
    }

    // ── Control flow ──────────────────────────────────────────────────────────

    /// Parse `<cond> {` after the keyword at `pos`; returns the condition and
    /// the positions of `{` and its matching `}`.
    fn block_header(&self, s: Span<'_>, pos: usize) -> Result<(Condition, usize, usize), ScriptError> {
        let open = s.find_open(pos + 1)?;
        let cond = Condition::parse(&s.code[pos + 1..open])
            .map_err(|m| ScriptError::parse(s.abs(pos), m))?;
        let close = s.block_end(open)?;
        Ok((cond, open, close))
    }

    fn if_block(&mut self, s: Span<'_>, pos: usize) -> Result<usize, ScriptError> {
        let (cond, open, close) = self.block_header(s, pos)?;
        if cond.evaluate(&self.vars) {
            Ok(open + 1)
        } else {
            Ok(close + 1)
        }
    }

    fn while_loop(&mut self, s: Span<'_>, pos: usize) -> Result<usize, ScriptError> {
        let (cond, open, close) = self.block_header(s, pos)?;
        let body = s.sub(open + 1, close);
        while cond.evaluate(&self.vars) {
            self.exec(body)?;
        }
        Ok(close + 1)
    }

    // ── Procedures ────────────────────────────────────────────────────────────

    /// `name(param) { body }`; `explicit` when introduced by `defFunc`.
    fn define(&mut self, s: Span<'_>, at: usize, explicit: bool) -> Result<usize, ScriptError> {
        let name = s.tok(at);
        let param = s.tok(at + 2);
        let shaped = is_identifier(name)
            && s.tok(at + 1) == "("
            && is_identifier(param)
            && s.tok(at + 3) == ")";
        let open = (at + 4..s.len()).find(|&i| s.tok(i) != "\n");

        let open = match open {
            Some(open) if shaped && s.tok(open) == "{" => open,
            _ if !explicit && s.tok(at + 1) == "=" => {
                return Err(ScriptError::UnknownVariable { pos: s.abs(at), name: name.to_owned() })
            }
            _ if explicit => {
                return Err(ScriptError::parse(
                    s.abs(at),
                    format!("malformed procedure definition {}", describe(name)),
                ))
            }
            _ => {
                return Err(ScriptError::parse(s.abs(at), format!("unknown command {}", describe(name))))
            }
        };

        let close = s.block_end(open)?;
        let proc = Procedure {
            param: param.to_owned(),
            body: Rc::from(&s.code[open + 1..close]),
            offset: s.abs(open + 1),
        };
        if self.procs.insert(name.to_owned(), proc).is_some() {
            debug!(name, "procedure redefined");
        }
        Ok(close + 1)
    }

    /// `name(arg)`.  The parameter cell replaces any variable of the same
    /// name and is removed afterwards; the replaced variable is not restored.
    fn call(&mut self, s: Span<'_>, at: usize) -> Result<usize, ScriptError> {
        let name = s.tok(at);
        let Some(proc) = self.procs.get(name).cloned() else {
            return Err(ScriptError::UnknownProcedure { pos: s.abs(at), name: name.to_owned() });
        };
        if self.depth >= MAX_CALL_DEPTH {
            return Err(ScriptError::CallDepth { pos: s.abs(at), limit: MAX_CALL_DEPTH });
        }
        let end = s.stmt_end(at + 1);
        let arg = expr::eval(&s.merge(at + 1, end), &self.vars);

        if let Some(old) = self.vars.insert(proc.param.clone(), Cell::local(arg)) {
            debug!(param = %proc.param, shadowed = old.kind(), "parameter replaces existing variable");
        }
        self.depth += 1;
        let result = self.exec(Span { code: &proc.body, base: proc.offset });
        self.depth -= 1;
        self.vars.remove(&proc.param);
        result.map(|()| end)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
