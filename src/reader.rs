use crate::Span;
use crate::interpreter::Interpreter;
use crate::lexer::{LexerError, LexerErrorKind, Token, TokenKind};
use crate::types::ObjectRef;
use logos::{Lexer, Logos};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("Parse Error: Unexpected token {found}, expected {expected}")]
    UnexpectedToken { found: Token, expected: String },
    #[error("Parse Error: Unexpected end of input. Expected {0}")]
    UnexpectedEof(String),
    #[error("Parse Error: List opened at [{0}] is never closed")]
    UnclosedList(Span),
    #[error("Lexer Error: {0}")]
    LexerError(#[from] LexerError),
    #[error("Parse Error: Invalid syntax for dotted pair at [{0}]")]
    InvalidDotSyntax(Span),
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Reads forms from source text, one per call, interning symbols into the
/// interpreter's package as it goes.
///
/// Tokens are pulled from the lexer lazily, so the reader is always positioned
/// immediately after the last form it returned.
pub struct Reader<'src, 'i> {
    interp: &'i Interpreter,
    lexer: Lexer<'src, TokenKind>,
}

impl<'src, 'i> Reader<'src, 'i> {
    pub fn new(interp: &'i Interpreter, source: &'src str) -> Self {
        Reader {
            interp,
            lexer: TokenKind::lexer(source),
        }
    }

    /// Byte offset just past the last consumed token.
    pub fn position(&self) -> usize {
        self.lexer.span().end
    }

    fn next_token(&mut self) -> ParseResult<Option<Token>> {
        match self.lexer.next() {
            None => Ok(None),
            Some(Ok(kind)) => Ok(Some(Token {
                kind,
                span: self.lexer.span().into(),
            })),
            Some(Err(error)) => Err(ParseError::LexerError(LexerError {
                error,
                span: self.lexer.span().into(),
            })),
        }
    }

    /// Reads the next complete form.
    pub fn read(&mut self) -> ParseResult<ObjectRef> {
        match self.next_token()? {
            Some(token) => self.read_with_token(token),
            None => Err(ParseError::UnexpectedEof("an expression".to_string())),
        }
    }

    fn read_with_token(&mut self, token: Token) -> ParseResult<ObjectRef> {
        match token.kind {
            TokenKind::LParen => self.read_list(token.span),
            TokenKind::Quote => self.read_quoted(),
            TokenKind::Integer(i) => Ok(self.interp.integer(i)),
            TokenKind::Float(x) => Ok(self.interp.float(x)),
            TokenKind::String(s) => Ok(self.interp.string(s)),
            TokenKind::Symbol(name) => Ok(self.interp.intern(&name)),
            TokenKind::Dot => Err(ParseError::InvalidDotSyntax(token.span)),
            TokenKind::RParen => Err(ParseError::UnexpectedToken {
                found: token,
                expected: "an expression".to_string(),
            }),
            // the lexer never yields this kind successfully
            TokenKind::Malformed => Err(ParseError::LexerError(LexerError {
                error: LexerErrorKind::InvalidToken,
                span: token.span,
            })),
        }
    }

    /// `'x` reads as `(quote x)`.
    fn read_quoted(&mut self) -> ParseResult<ObjectRef> {
        let quoted = match self.next_token()? {
            Some(token) => self.read_with_token(token)?,
            None => {
                return Err(ParseError::UnexpectedEof(
                    "an expression after quote".to_string(),
                ));
            }
        };
        let quote = self.interp.intern("quote");
        Ok(self.interp.list([quote, quoted]))
    }

    /// Reads list elements after `(` up to the matching `)`, with an optional
    /// dotted tail. Elements are collected iteratively and consed up at the end.
    fn read_list(&mut self, open: Span) -> ParseResult<ObjectRef> {
        let mut items = Vec::new();
        loop {
            let token = self.next_token()?.ok_or(ParseError::UnclosedList(open))?;
            match token.kind {
                TokenKind::RParen => return Ok(self.interp.list(items)),
                TokenKind::Dot => {
                    if items.is_empty() {
                        return Err(ParseError::InvalidDotSyntax(token.span));
                    }
                    let tail_token = self.next_token()?.ok_or(ParseError::UnclosedList(open))?;
                    let tail = self.read_with_token(tail_token)?;
                    return match self.next_token()? {
                        Some(Token {
                            kind: TokenKind::RParen,
                            ..
                        }) => Ok(self.interp.list_with_tail(items, tail)),
                        Some(found) => Err(ParseError::UnexpectedToken {
                            found,
                            expected: "')' after dotted pair".to_string(),
                        }),
                        None => Err(ParseError::UnclosedList(open)),
                    };
                }
                _ => items.push(self.read_with_token(token)?),
            }
        }
    }
}

/// Successive top-level forms. Stops at end of input; after an error the
/// remaining input is not meaningful.
impl Iterator for Reader<'_, '_> {
    type Item = ParseResult<ObjectRef>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_token() {
            Ok(None) => None,
            Ok(Some(token)) => Some(self.read_with_token(token)),
            Err(err) => Some(Err(err)),
        }
    }
}

/// Reads exactly one form from `input`. Trailing tokens are an error.
pub fn read_str(interp: &Interpreter, input: &str) -> ParseResult<ObjectRef> {
    let mut reader = Reader::new(interp, input);
    let form = reader.read()?;
    match reader.next_token()? {
        None => Ok(form),
        Some(found) => Err(ParseError::UnexpectedToken {
            found,
            expected: "end of input".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::number::Number;
    use crate::types::eq;

    fn assert_reads(input: &str, expected: &str) {
        let interp = Interpreter::new();
        match read_str(&interp, input) {
            Ok(form) => assert_eq!(form.to_string(), expected, "Input: '{}'", input),
            Err(e) => panic!("Parsing failed for input '{}': {}", input, e),
        }
    }

    // Compare enum variants, ignoring payloads
    fn assert_parse_error(input: &str, expected: ParseError) {
        let interp = Interpreter::new();
        match read_str(&interp, input) {
            Ok(form) => panic!("Expected parsing of '{}' to fail, got {}", input, form),
            Err(e) => assert_eq!(
                std::mem::discriminant(&e),
                std::mem::discriminant(&expected),
                "Input: '{}', Expected error variant like {:?}, got: {:?}",
                input,
                expected,
                e
            ),
        }
    }

    fn lexer_error() -> ParseError {
        ParseError::LexerError(LexerError {
            error: LexerErrorKind::InvalidToken,
            span: Span::default(),
        })
    }

    #[test]
    fn test_atoms() {
        assert_reads("42", "42");
        assert_reads("-17", "-17");
        assert_reads("3.14", "3.14E+00");
        assert_reads("1.", "1E+00");
        assert_reads("\"hi there\"", "\"hi there\"");
        assert_reads("foo", "foo");
    }

    #[test]
    fn test_numbers_have_the_right_kind() {
        let interp = Interpreter::new();
        let int = read_str(&interp, "7").unwrap();
        let float = read_str(&interp, "7.0").unwrap();
        assert_eq!(int.as_number(), Some(Number::Integer(7)));
        assert_eq!(float.as_number(), Some(Number::Float(7.0)));
    }

    #[test]
    fn test_lists() {
        assert_reads("(1 2 3)", "(1 2 3)");
        assert_reads("(a (b c) d)", "(a (b c) d)");
        assert_reads("( a  b )", "(a b)");
        assert_reads("(a . b)", "(a . b)");
        assert_reads("(a b . c)", "(a b . c)");
        assert_reads("(a . (b c))", "(a b c)");
    }

    #[test]
    fn test_empty_list_is_nil() {
        let interp = Interpreter::new();
        let form = read_str(&interp, "()").unwrap();
        assert!(eq(&form, &interp.nil()));
    }

    #[test]
    fn test_quote() {
        assert_reads("'a", "(quote a)");
        assert_reads("'(1 2)", "(quote (1 2))");
        assert_reads("''a", "(quote (quote a))");
        assert_reads("(a 'b)", "(a (quote b))");
    }

    #[test]
    fn test_symbols_are_interned() {
        let interp = Interpreter::new();
        let form = read_str(&interp, "(foo foo bar)").unwrap();
        let items = form.list_items().unwrap();
        assert!(eq(&items[0], &items[1]));
        assert!(!eq(&items[0], &items[2]));
        assert!(eq(&items[0], &interp.intern("foo")));
    }

    #[test]
    fn test_comments_and_whitespace() {
        assert_reads("; leading comment\n  (a ; inside\n b)", "(a b)");
    }

    #[test]
    fn test_unclosed_list() {
        assert_parse_error("(1 2", ParseError::UnclosedList(Span::default()));
        assert_parse_error("(a (b c)", ParseError::UnclosedList(Span::default()));
        assert_parse_error("(a .", ParseError::UnclosedList(Span::default()));
        assert_parse_error("(a . b", ParseError::UnclosedList(Span::default()));

        let interp = Interpreter::new();
        assert_eq!(
            read_str(&interp, "  (a (b").unwrap_err(),
            ParseError::UnclosedList(Span::new(5, 6))
        );
    }

    #[test]
    fn test_unexpected_tokens() {
        let unexpected = ParseError::UnexpectedToken {
            found: Token {
                kind: TokenKind::RParen,
                span: Span::default(),
            },
            expected: String::new(),
        };
        assert_parse_error(")", unexpected.clone());
        assert_parse_error("(a . b c)", unexpected.clone());
        assert_parse_error("a b", unexpected);
        assert_parse_error("", ParseError::UnexpectedEof(String::new()));
        assert_parse_error("'", ParseError::UnexpectedEof(String::new()));
    }

    #[test]
    fn test_invalid_dot_syntax() {
        assert_parse_error("(. a)", ParseError::InvalidDotSyntax(Span::default()));
        assert_parse_error(".", ParseError::InvalidDotSyntax(Span::default()));
    }

    #[test]
    fn test_lexer_errors_propagate() {
        assert_parse_error("(a 1.2.3)", lexer_error());
        assert_parse_error("\"open", lexer_error());
        assert_parse_error("foo#", lexer_error());
    }

    #[test]
    fn test_reader_position_and_iteration() {
        let interp = Interpreter::new();
        let mut reader = Reader::new(&interp, "(a b) c  \"d\"");
        let first = reader.read().unwrap();
        assert_eq!(first.to_string(), "(a b)");
        assert_eq!(reader.position(), 5);

        let rest: Vec<String> = reader
            .map(|form| form.map(|f| f.to_string()))
            .collect::<ParseResult<_>>()
            .unwrap();
        assert_eq!(rest, vec!["c".to_string(), "\"d\"".to_string()]);
    }

    #[test]
    fn test_deep_nesting() {
        let depth = 200;
        let input = format!("{}x{}", "(".repeat(depth), ")".repeat(depth));
        let interp = Interpreter::new();
        let form = read_str(&interp, &input).unwrap();
        assert_eq!(form.to_string(), input);
    }
}
