use proptest::prelude::*;
use simscript::config::Catalog;
use simscript::lexer::{tokenize_script, Lexer, SCRIPT_SEPARATORS};
use simscript::link::RecordFramer;
use simscript::script::expr::{try_eval, EvalContext};

struct NoVars;

impl EvalContext for NoVars {
    fn get_var(&self, _: &str) -> Option<f64> {
        None
    }
}

fn same(a: f64, b: f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

// ── Tokenizer ─────────────────────────────────────────────────────────────────

proptest! {
    /// With nothing omitted, the tokens are a partition of the input.
    #[test]
    fn tokens_concatenate_to_input(s in "\\PC*") {
        let lexer = Lexer::new(SCRIPT_SEPARATORS, &[]);
        prop_assert_eq!(lexer.tokenize(&s).concat(), s);
    }

    /// Quoted text survives as a single token, separators and all.
    #[test]
    fn quoted_text_is_one_token(body in "[^\"]+") {
        let toks = tokenize_script(&format!("Print(\"{body}\")"));
        prop_assert_eq!(toks.len(), 6);
        prop_assert_eq!(&toks[3], &body);
    }
}

// ── Expressions ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Expr {
    Num(u32),
    Neg(Box<Expr>),
    Bin(char, Box<Expr>, Box<Expr>),
}

impl Expr {
    fn render(&self) -> String {
        match self {
            Expr::Num(n) => n.to_string(),
            Expr::Neg(e) => format!("(-{})", e.render()),
            Expr::Bin(op, l, r) => format!("({}{op}{})", l.render(), r.render()),
        }
    }

    fn value(&self) -> f64 {
        match self {
            Expr::Num(n) => f64::from(*n),
            Expr::Neg(e) => -e.value(),
            Expr::Bin(op, l, r) => apply(*op, l.value(), r.value()),
        }
    }
}

fn apply(op: char, l: f64, r: f64) -> f64 {
    match op {
        '+' => l + r,
        '-' => l - r,
        '*' => l * r,
        _ => l / r,
    }
}

fn arb_op() -> impl Strategy<Value = char> {
    prop_oneof![Just('+'), Just('-'), Just('*'), Just('/')]
}

fn arb_expr() -> impl Strategy<Value = Expr> {
    let leaf = (0u32..100).prop_map(Expr::Num);
    leaf.prop_recursive(4, 32, 2, |inner| {
        prop_oneof![
            inner.clone().prop_map(|e| Expr::Neg(Box::new(e))),
            (arb_op(), inner.clone(), inner)
                .prop_map(|(op, l, r)| Expr::Bin(op, Box::new(l), Box::new(r))),
        ]
    })
}

/// `n0 op n1 op n2 …` with `* /` before `+ -`, where runs of equal
/// precedence group to the right: `a-b+c` is `a-(b+c)`.
fn flat_reference(nums: &[u32], ops: &[char]) -> f64 {
    fn fold_right(first: f64, rest: &[(char, f64)]) -> f64 {
        match rest.split_first() {
            None => first,
            Some((&(op, n), tail)) => apply(op, first, fold_right(n, tail)),
        }
    }

    // Split into multiplicative terms joined by additive operators.
    let mut terms: Vec<(char, f64, Vec<(char, f64)>)> =
        vec![('+', f64::from(nums[0]), Vec::new())];
    for (&op, &n) in ops.iter().zip(&nums[1..]) {
        let n = f64::from(n);
        match op {
            '*' | '/' => {
                if let Some(term) = terms.last_mut() {
                    term.2.push((op, n));
                }
            }
            _ => terms.push((op, n, Vec::new())),
        }
    }
    let values: Vec<(char, f64)> =
        terms.iter().map(|(op, first, rest)| (*op, fold_right(*first, rest))).collect();
    fold_right(values[0].1, &values[1..])
}

proptest! {
    #[test]
    fn evaluator_never_panics(s in "\\PC*") {
        let _ = try_eval(&s, &NoVars);
    }

    #[test]
    fn parenthesised_expressions_match_reference(e in arb_expr()) {
        let got = try_eval(&e.render(), &NoVars);
        prop_assert!(got.is_ok(), "{} → {:?}", e.render(), got);
        let got = got.unwrap();
        prop_assert!(same(got, e.value()), "{} = {} (want {})", e.render(), got, e.value());
    }

    #[test]
    fn flat_expressions_follow_precedence(
        (nums, ops) in (1usize..8).prop_flat_map(|n| (
            prop::collection::vec(0u32..20, n + 1),
            prop::collection::vec(arb_op(), n),
        ))
    ) {
        let mut src = nums[0].to_string();
        for (op, n) in ops.iter().zip(&nums[1..]) {
            src.push(*op);
            src.push_str(&n.to_string());
        }
        let got = try_eval(&src, &NoVars).unwrap();
        let want = flat_reference(&nums, &ops);
        prop_assert!(same(got, want), "{} = {} (want {})", src, got, want);
    }
}

// ── Framing and catalogs ──────────────────────────────────────────────────────

proptest! {
    /// Where the stream is cut does not change the records.
    #[test]
    fn framing_ignores_chunk_boundaries(
        records in prop::collection::vec("[0-9.,]{0,12}", 1..6),
        cut in any::<prop::sample::Index>(),
    ) {
        let stream: String = records.iter().map(|r| format!("{r}\n")).collect();
        let bytes = stream.as_bytes();
        let at = cut.index(bytes.len() + 1);

        let mut framer = RecordFramer::new();
        let mut got = framer.feed(&bytes[..at]);
        got.extend(framer.feed(&bytes[at..]));
        prop_assert_eq!(got, records);
        prop_assert!(framer.pending().is_empty());
    }

    #[test]
    fn catalog_loader_never_panics(s in "\\PC*") {
        let (catalog, _) = Catalog::load_str(&s);
        prop_assert!(catalog.paths().iter().all(|p| !p.is_empty()));
    }
}
