//! Tokenizing declarative value expressions.
//!
//! An expression is split into a flat, order-preserving token sequence by
//! a single compiled regex: quoted strings, word tokens (numbers,
//! keywords, and slash/dot reference paths share one permissive word
//! class, as in the source grammar), multi-character comparison symbols,
//! single-character operators, and parentheses. A second pass nests
//! parenthesized groups and splits their contents on top-level commas, so
//! a call's argument lists arrive pre-separated.
//!
//! The grammar is deliberately permissive: `a/b` is one reference path
//! while `a / b` is a division, and `a-b` is one (dashed) reference while
//! `a - b` is a subtraction. This mirrors the original CSS-adjacent
//! tokenizer, where dashed identifiers are ordinary names.

use lazy_static::lazy_static;
use regex::Regex;

use crate::value::{EvalError, EvalResult};

/// One element of the flat token sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// An operator symbol (or unknown punctuation, resolved permissively)
    Op(String),
    /// Numeric literal
    Number(f64),
    /// Quoted string literal
    Str(String),
    /// Bare word: an identifier/reference path, keyword, or word operator
    Reference(String),
    /// Parenthesized group; each item is one comma-separated sub-sequence
    Group(Vec<Vec<Token>>),
}

lazy_static! {
    static ref TOKEN_SCAN: Regex = Regex::new(
        r#"(?x)
        "((?:\\.|[^"\\])*)"          # double-quoted string
        | '((?:\\.|[^'\\])*)'        # single-quoted string
        | (>=|<=|==)                 # multi-char comparison
        | ([\w$.][\w$./-]*)          # word: number, keyword, or path
        | ([-+*/%!?:&|(),])          # operator / group punctuation
        | (\S)                       # anything else, resolved permissively
        "#
    )
    .expect("token scan regex");
}

#[derive(Debug, Clone, PartialEq)]
enum RawToken {
    Op(String),
    Number(f64),
    Str(String),
    Word(String),
    Open,
    Close,
    Comma,
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn scan(source: &str) -> Vec<RawToken> {
    let mut tokens = Vec::new();
    for capture in TOKEN_SCAN.captures_iter(source) {
        if let Some(s) = capture.get(1).or_else(|| capture.get(2)) {
            tokens.push(RawToken::Str(unescape(s.as_str())));
        } else if let Some(op) = capture.get(3) {
            tokens.push(RawToken::Op(op.as_str().to_string()));
        } else if let Some(word) = capture.get(4) {
            let word = word.as_str();
            match word.parse::<f64>() {
                Ok(n) => tokens.push(RawToken::Number(n)),
                Err(_) => tokens.push(RawToken::Word(word.to_string())),
            }
        } else if let Some(op) = capture.get(5) {
            tokens.push(match op.as_str() {
                "(" => RawToken::Open,
                ")" => RawToken::Close,
                "," => RawToken::Comma,
                other => RawToken::Op(other.to_string()),
            });
        } else if let Some(other) = capture.get(6) {
            // unknown punctuation falls through as an operator token; the
            // evaluator resolves it permissively (see the design notes)
            tokens.push(RawToken::Op(other.as_str().to_string()));
        }
    }
    tokens
}

/// Tokenize an expression into its flat token sequence with nested
/// parenthesized groups.
pub fn tokenize(source: &str) -> EvalResult<Vec<Token>> {
    let raw = scan(source);
    let mut iter = raw.into_iter();
    collect_sequence(&mut iter)
}

/// Collect top-level tokens until end of input.
fn collect_sequence(iter: &mut impl Iterator<Item = RawToken>) -> EvalResult<Vec<Token>> {
    let mut tokens = Vec::new();
    loop {
        match iter.next() {
            Some(RawToken::Open) => {
                let items = collect_group(iter)?;
                tokens.push(Token::Group(items));
            }
            Some(RawToken::Close) => {
                return Err(EvalError::reduction("unbalanced \")\""));
            }
            Some(RawToken::Comma) => {
                return Err(EvalError::reduction("\",\" outside a call"));
            }
            Some(RawToken::Op(op)) => tokens.push(Token::Op(op)),
            Some(RawToken::Number(n)) => tokens.push(Token::Number(n)),
            Some(RawToken::Str(s)) => tokens.push(Token::Str(s)),
            Some(RawToken::Word(w)) => tokens.push(Token::Reference(w)),
            None => return Ok(tokens),
        }
    }
}

/// Collect the comma-separated items between a `(` and its matching `)`.
fn collect_group(iter: &mut impl Iterator<Item = RawToken>) -> EvalResult<Vec<Vec<Token>>> {
    let mut items = Vec::new();
    let mut current = Vec::new();
    loop {
        match iter.next() {
            Some(RawToken::Open) => {
                let nested = collect_group(iter)?;
                current.push(Token::Group(nested));
            }
            Some(RawToken::Close) => {
                if !current.is_empty() {
                    items.push(current);
                }
                return Ok(items);
            }
            Some(RawToken::Comma) => {
                if !current.is_empty() {
                    items.push(std::mem::take(&mut current));
                }
            }
            Some(RawToken::Op(op)) => current.push(Token::Op(op)),
            Some(RawToken::Number(n)) => current.push(Token::Number(n)),
            Some(RawToken::Str(s)) => current.push(Token::Str(s)),
            Some(RawToken::Word(w)) => current.push(Token::Reference(w)),
            None => return Err(EvalError::reduction("unclosed \"(\"")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_tokens() {
        let tokens = tokenize("1 + 2 * 3").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Number(1.0),
                Token::Op("+".into()),
                Token::Number(2.0),
                Token::Op("*".into()),
                Token::Number(3.0),
            ]
        );
    }

    #[test]
    fn path_reference_is_one_token() {
        let tokens = tokenize("foo/bar/baz").unwrap();
        assert_eq!(tokens, vec![Token::Reference("foo/bar/baz".into())]);
    }

    #[test]
    fn spaced_slash_is_division() {
        let tokens = tokenize("a / b").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Reference("a".into()),
                Token::Op("/".into()),
                Token::Reference("b".into()),
            ]
        );
    }

    #[test]
    fn quoted_strings_unescape() {
        let tokens = tokenize(r#""hi \"there\"" + 'x'"#).unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Str("hi \"there\"".into()),
                Token::Op("+".into()),
                Token::Str("x".into()),
            ]
        );
    }

    #[test]
    fn multi_char_comparisons() {
        let tokens = tokenize("a >= b").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Reference("a".into()),
                Token::Op(">=".into()),
                Token::Reference("b".into()),
            ]
        );
    }

    #[test]
    fn call_group_splits_arguments() {
        let tokens = tokenize("max(a, b + 1)").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Reference("max".into()),
                Token::Group(vec![
                    vec![Token::Reference("a".into())],
                    vec![
                        Token::Reference("b".into()),
                        Token::Op("+".into()),
                        Token::Number(1.0),
                    ],
                ]),
            ]
        );
    }

    #[test]
    fn nested_groups() {
        let tokens = tokenize("(a + (b))").unwrap();
        assert_eq!(
            tokens,
            vec![Token::Group(vec![vec![
                Token::Reference("a".into()),
                Token::Op("+".into()),
                Token::Group(vec![vec![Token::Reference("b".into())]]),
            ]])]
        );
    }

    #[test]
    fn unbalanced_parens_fail() {
        assert!(tokenize("(a + b").is_err());
        assert!(tokenize("a + b)").is_err());
    }

    #[test]
    fn ternary_tokens() {
        let tokens = tokenize("c ? x : y").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Reference("c".into()),
                Token::Op("?".into()),
                Token::Reference("x".into()),
                Token::Op(":".into()),
                Token::Reference("y".into()),
            ]
        );
    }
}
