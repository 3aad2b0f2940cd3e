//! Script tokenizer.
//!
//! Splits raw text into an ordered token sequence given a list of separator
//! strings.  Separators are themselves emitted as tokens unless they are in
//! the omit set; the text between separators is emitted as-is and empty
//! runs are dropped, so concatenating the output (plus whatever omitted
//! separators were consumed) reproduces the input exactly.
//!
//! A `"` separator toggles quoted mode.  Inside quotes only the closing `"`
//! is recognised, so `Print("a b")` keeps `a b` as a single token.
//!
//! Separator lookup uses an [`aho_corasick`] automaton in leftmost-first
//! mode: the earliest match wins, and among matches starting at the same
//! position the separator listed first wins, so `<-` and `<=` beat `<`
//! and `==` beats `=`.

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};

// ── Script separator set ──────────────────────────────────────────────────────

/// Separators recognised in script text, in match-priority order.
pub const SCRIPT_SEPARATORS: &[&str] = &[
    "->", "<-", "==", "!=", "<=", "=>", "(", ")", "\n", "{", "}", " ", "<", ">", "\"", "=", ",",
    "\t",
];

/// Separators consumed but not emitted when lexing a script.
pub const SCRIPT_OMIT: &[&str] = &[" ", "\t"];

const QUOTE: &str = "\"";

// ── Lexer ─────────────────────────────────────────────────────────────────────

/// A compiled separator set.  Build once, tokenize many times.
#[derive(Debug, Clone)]
pub struct Lexer {
    seps: Vec<String>,
    keep: Vec<bool>,
    ac: AhoCorasick,
}

impl Lexer {
    /// Compile `seps` (priority order) with the subset `omit` dropped from
    /// the output.
    pub fn new(seps: &[&str], omit: &[&str]) -> Self {
        let seps: Vec<String> = seps
            .iter()
            .filter(|s| !s.is_empty())
            .map(|&s| s.to_owned())
            .collect();
        let keep = seps.iter().map(|s| !omit.contains(&s.as_str())).collect();
        let ac = AhoCorasickBuilder::new()
            .match_kind(MatchKind::LeftmostFirst)
            .build(&seps);
        Self { seps, keep, ac }
    }

    /// The lexer for script source.
    pub fn script() -> Self {
        Self::new(SCRIPT_SEPARATORS, SCRIPT_OMIT)
    }

    /// Split `text` into tokens.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let quote_idx = self.seps.iter().position(|s| s == QUOTE);
        let mut tokens = Vec::new();
        let mut last = 0;
        let mut quoted = false;

        while last < text.len() {
            let rest = &text[last..];
            // (start, end, separator index) relative to `last`
            let hit = if quoted {
                quote_idx.and_then(|qi| rest.find(QUOTE).map(|i| (i, i + QUOTE.len(), qi)))
            } else {
                self.ac.find(rest).map(|m| (m.start(), m.end(), m.pattern()))
            };
            let Some((start, end, idx)) = hit else { break };

            if start > 0 {
                tokens.push(rest[..start].to_owned());
            }
            if self.keep[idx] {
                tokens.push(self.seps[idx].clone());
            }
            if Some(idx) == quote_idx {
                quoted = !quoted;
            }
            last += end;
        }

        if last < text.len() {
            tokens.push(text[last..].to_owned());
        }
        tokens
    }
}

/// Tokenize with an ad-hoc separator set.
pub fn tokenize(text: &str, seps: &[&str], omit: &[&str]) -> Vec<String> {
    Lexer::new(seps, omit).tokenize(text)
}

/// Tokenize script source with the script separator set.
pub fn tokenize_script(text: &str) -> Vec<String> {
    Lexer::script().tokenize(text)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(src: &str) -> Vec<String> {
        tokenize_script(src)
    }

    #[test]
    fn var_declaration() {
        assert_eq!(toks("var x = 5\n"), vec!["var", "x", "=", "5", "\n"]);
    }

    #[test]
    fn arrows_are_single_tokens() {
        assert_eq!(
            toks("var h -> sim(\"/a/b\")"),
            vec!["var", "h", "->", "sim", "(", "\"", "/a/b", "\"", ")"]
        );
        assert_eq!(toks("a<-b"), vec!["a", "<-", "b"]);
    }

    #[test]
    fn less_equal_before_less() {
        assert_eq!(toks("x<=3"), vec!["x", "<=", "3"]);
        assert_eq!(toks("x<3"), vec!["x", "<", "3"]);
    }

    #[test]
    fn greater_equal_is_two_tokens() {
        // `>=` is not in the separator set; `=>` is.
        assert_eq!(toks("x >= 3"), vec!["x", ">", "=", "3"]);
    }

    #[test]
    fn quoted_region_not_split() {
        assert_eq!(
            toks("Print(\"hello, big world\")"),
            vec!["Print", "(", "\"", "hello, big world", "\"", ")"]
        );
    }

    #[test]
    fn empty_quotes() {
        assert_eq!(toks("Print(\"\")"), vec!["Print", "(", "\"", "\"", ")"]);
    }

    #[test]
    fn unterminated_quote_keeps_tail() {
        assert_eq!(toks("\"abc def"), vec!["\"", "abc def"]);
    }

    #[test]
    fn tabs_and_spaces_omitted() {
        assert_eq!(toks("\t x \t=\t1"), vec!["x", "=", "1"]);
    }

    #[test]
    fn arithmetic_is_one_token_per_run() {
        // Operators are not separators; expressions stay glued.
        assert_eq!(toks("x = x+1*2\n"), vec!["x", "=", "x+1*2", "\n"]);
    }

    #[test]
    fn csv_record() {
        assert_eq!(
            tokenize("1.0,2.0,3.0\n", &[","], &[","]),
            vec!["1.0", "2.0", "3.0\n"]
        );
    }

    #[test]
    fn roundtrip_without_omit() {
        let src = "while x < 3 {\n\tPrint(\"a b\")\n}\n";
        let lx = Lexer::new(SCRIPT_SEPARATORS, &[]);
        assert_eq!(lx.tokenize(src).concat(), src);
    }

    #[test]
    fn empty_input() {
        assert!(toks("").is_empty());
    }
}
