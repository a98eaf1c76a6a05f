use logos::{Lexer, Logos};
use std::fmt;
use thiserror::Error;

use crate::Span;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r\f\v]+")] // Skip whitespace
#[logos(skip r";[^\n]*")] // Skip comments
#[logos(error = LexerErrorKind)]
pub enum TokenKind {
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(".")]
    Dot,
    #[token("'")]
    Quote,
    #[regex(r"-?[0-9]+", lex_integer, priority = 5)]
    Integer(i64),
    #[regex(r"-?[0-9]+\.[0-9]*", lex_float, priority = 5)]
    Float(f64),
    #[regex(r#""([^"\\]|\\[\s\S])*"?"#, lex_string)]
    String(String),
    // A lone `-`, or `-` followed by a non-digit, is a symbol.
    #[regex(
        r"[a-zA-Z+*/%<>=?!&_][a-zA-Z0-9+\-*/%<>=?!&_]*|-([a-zA-Z+\-*/%<>=?!&_][a-zA-Z0-9+\-*/%<>=?!&_]*)?",
        |lex| lex.slice().to_string(),
        priority = 3
    )]
    Symbol(String),
    // Catches any atom that runs into a non-delimiter, e.g. `abc#`, `1.2.3` or `12x`.
    // Always reported as an error.
    #[regex(r#"[^\s()";'][^\s()";]*"#, lex_malformed, priority = 1)]
    Malformed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

fn lex_integer(lex: &mut Lexer<TokenKind>) -> LexerResult<i64> {
    let slice = lex.slice();
    slice
        .parse::<i64>()
        .map_err(|_| LexerErrorKind::InvalidNumberFormat(slice.to_string()))
}

fn lex_float(lex: &mut Lexer<TokenKind>) -> LexerResult<f64> {
    let slice = lex.slice();
    slice
        .parse::<f64>()
        .map_err(|_| LexerErrorKind::InvalidNumberFormat(slice.to_string()))
}

fn lex_string(lex: &mut Lexer<TokenKind>) -> LexerResult<String> {
    // skip the opening quote, unescape consumes the closing one
    unescape::unescape(&lex.slice()[1..])
}

fn lex_malformed(lex: &mut Lexer<TokenKind>) -> LexerResult<()> {
    let slice = lex.slice();
    let mut chars = slice.chars();
    let numeric = match chars.next() {
        Some('-') => chars.next().is_some_and(|c| c.is_ascii_digit() || c == '.'),
        Some(c) => c.is_ascii_digit() || c == '.',
        None => false,
    };
    if numeric {
        Err(LexerErrorKind::InvalidNumberFormat(slice.to_string()))
    } else {
        Err(LexerErrorKind::InvalidSymbol(slice.to_string()))
    }
}

mod unescape {
    use super::{LexerErrorKind, LexerResult};

    /// Unescapes a string body up to and including its closing quote.
    /// `\n` is a newline; any other escaped character stands for itself.
    pub fn unescape(s: &str) -> LexerResult<String> {
        let mut result = String::with_capacity(s.len());
        let mut chars = s.chars();
        while let Some(c) = chars.next() {
            match c {
                '"' => return Ok(result),
                '\\' => match chars.next() {
                    Some('n') => result.push('\n'),
                    Some(c) => result.push(c),
                    None => return Err(LexerErrorKind::UnterminatedString),
                },
                c => result.push(c),
            }
        }
        Err(LexerErrorKind::UnterminatedString)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::LParen => write!(f, "("),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::Dot => write!(f, "."),
            TokenKind::Quote => write!(f, "'"),
            TokenKind::Integer(i) => write!(f, "{}", i),
            TokenKind::Float(x) => write!(f, "{}", x),
            TokenKind::String(s) => write!(f, "{:?}", s),
            TokenKind::Symbol(s) => write!(f, "{}", s),
            TokenKind::Malformed => write!(f, "<malformed>"),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' at {}", self.kind, self.span)
    }
}

#[derive(Default, Debug, Clone, PartialEq, Error)]
pub enum LexerErrorKind {
    #[error("Unterminated string literal")]
    UnterminatedString,
    #[error("Invalid number format: '{0}'")]
    InvalidNumberFormat(String),
    #[error("Invalid symbol: '{0}' must be followed by a delimiter")]
    InvalidSymbol(String),
    #[default]
    #[error("Invalid token")]
    InvalidToken,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{error} at {span}")]
pub struct LexerError {
    pub error: LexerErrorKind,
    pub span: Span,
}

type LexerResult<T> = Result<T, LexerErrorKind>;

/// Tokenizes a whole input. Used by the REPL completer and in tests; the
/// reader pulls tokens lazily instead.
pub fn tokenize(input: &str) -> Result<Vec<Token>, LexerError> {
    TokenKind::lexer(input)
        .spanned()
        .map(|(result, range)| match result {
            Ok(kind) => Ok(Token {
                kind,
                span: range.into(),
            }),
            Err(error) => Err(LexerError {
                error,
                span: range.into(),
            }),
        })
        .collect()
}

/// True when `input` stops inside a list or a string, or right after a quote,
/// so that more text could complete it. Only lexes, so no symbols are interned.
/// Other lexical errors do not count: more input cannot fix them.
pub fn is_incomplete(input: &str) -> bool {
    let mut depth = 0usize;
    let mut dangling_quote = false;
    for result in TokenKind::lexer(input) {
        dangling_quote = false;
        match result {
            Ok(TokenKind::LParen) => depth += 1,
            Ok(TokenKind::RParen) => depth = depth.saturating_sub(1),
            Ok(TokenKind::Quote) => dangling_quote = true,
            Ok(_) => {}
            Err(LexerErrorKind::UnterminatedString) => return true,
            Err(_) => {}
        }
    }
    depth > 0 || dangling_quote
}
