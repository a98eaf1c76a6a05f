pub mod environment;
pub mod evaluator;
pub mod interpreter;
pub mod lexer;
pub mod number;
pub mod pretty_print;
pub mod primitives;
pub mod reader;
pub mod source;
pub mod special_forms;
pub mod types;

pub use environment::{Environment, Frame, Scope};
pub use evaluator::{EvalError, EvalResult};
pub use interpreter::{Error, Interpreter};
pub use lexer::{LexerError, Token, TokenKind, tokenize};
pub use number::Number;
pub use reader::{ParseError, Reader, read_str};
pub use source::Span;
pub use types::{Object, ObjectKind, ObjectRef, eq};
