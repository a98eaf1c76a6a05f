use crate::lexer::LexerErrorKind;
use crate::{Error, EvalError, ParseError};
use ariadne::{Label, Report, ReportKind, Source};
use std::io;
use std::ops::Range;

type Diagnostic<'a> = Report<'a, (&'a str, Range<usize>)>;

impl ParseError {
    pub fn report<'a>(&self, source_id: &'a str, input: &str) -> Diagnostic<'a> {
        let report = match self {
            ParseError::UnexpectedToken { found, expected } => {
                Report::build(ReportKind::Error, (source_id, found.span.to_range()))
                    .with_message(format!("Unexpected token: {}", found.kind))
                    .with_label(
                        Label::new((source_id, found.span.to_range()))
                            .with_message(format!("Expected {expected}")),
                    )
            }
            ParseError::UnexpectedEof(expected) => {
                let idx = input.len();
                Report::build(ReportKind::Error, (source_id, idx..idx))
                    .with_message("Unexpected end of input")
                    .with_label(
                        Label::new((source_id, idx..idx))
                            .with_message(format!("Expected {expected}")),
                    )
            }
            ParseError::UnclosedList(span) => {
                Report::build(ReportKind::Error, (source_id, span.to_range()))
                    .with_message("Unclosed list")
                    .with_label(
                        Label::new((source_id, span.to_range()))
                            .with_message("This '(' has no matching ')'"),
                    )
            }
            ParseError::LexerError(lex_err) => {
                let report = Report::build(ReportKind::Error, (source_id, lex_err.span.to_range()))
                    .with_message("Lexer Error")
                    .with_label(
                        Label::new((source_id, lex_err.span.to_range()))
                            .with_message(lex_err.error.to_string()),
                    );
                match lex_err.error {
                    LexerErrorKind::InvalidSymbol(_) => report.with_help(
                        "Symbols and numbers must end at whitespace, a parenthesis, '\"' or ';'",
                    ),
                    _ => report,
                }
            }
            ParseError::InvalidDotSyntax(span) => {
                Report::build(ReportKind::Error, (source_id, span.to_range()))
                    .with_message("Invalid Dot Syntax")
                    .with_label(
                        Label::new((source_id, span.to_range()))
                            .with_message("A dot may only precede the last element of a list"),
                    )
            }
        };
        report.finish()
    }

    pub fn pretty_print(&self, source_id: &str, input: &str) -> io::Result<()> {
        self.report(source_id, input)
            .eprint((source_id, Source::from(input)))
    }
}

impl EvalError {
    fn hint(&self) -> &'static str {
        match self {
            EvalError::UnboundVariable { .. } => "This symbol has no lexical binding or global value",
            EvalError::NoFunction { .. } => "This symbol's function cell is empty",
            EvalError::WrongNumberOfArguments { .. } => "Check the number of arguments in this call",
            EvalError::UnsupportedArgumentType { .. } => "An argument has the wrong type",
            EvalError::NotCallable { .. } => "The head of a form must name a function",
            EvalError::NotEvaluable { .. } => "Only numbers, strings, symbols and lists evaluate",
            EvalError::Malformed { .. } => "This form does not have the expected shape",
            EvalError::Arithmetic { .. } => "Arithmetic failed while evaluating this form",
        }
    }

    /// Evaluation errors carry no source position, so the whole input is labelled.
    pub fn report<'a>(&self, source_id: &'a str, input: &str) -> Diagnostic<'a> {
        let range = 0..input.trim_end().len();
        Report::build(ReportKind::Error, (source_id, range.clone()))
            .with_message(self.to_string())
            .with_label(Label::new((source_id, range)).with_message(self.hint()))
            .finish()
    }

    pub fn pretty_print(&self, source_id: &str, input: &str) -> io::Result<()> {
        self.report(source_id, input)
            .eprint((source_id, Source::from(input)))
    }
}

impl Error {
    pub fn pretty_print(&self, source_id: &str, input: &str) -> io::Result<()> {
        match self {
            Error::Parse(err) => err.pretty_print(source_id, input),
            Error::Eval(err) => err.pretty_print(source_id, input),
            Error::Io { .. } => Report::build(ReportKind::Error, (source_id, 0..0))
                .with_message(self.to_string())
                .finish()
                .eprint((source_id, Source::from(input))),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::Interpreter;

    fn render(report: ariadne::Report<'_, (&str, std::ops::Range<usize>)>, input: &str) -> String {
        let mut out = Vec::new();
        report
            .write(("test", ariadne::Source::from(input)), &mut out)
            .unwrap();
        String::from_utf8_lossy(&out).into_owned()
    }

    #[test]
    fn test_parse_error_report_mentions_problem() {
        let interp = Interpreter::new();
        let input = "(a 1.2.3)";
        let err = interp.read_str(input).unwrap_err();
        let text = render(err.report("test", input), input);
        assert!(text.contains("Lexer Error"), "{}", text);
        assert!(text.contains("Invalid number format"), "{}", text);
    }

    #[test]
    fn test_unexpected_eof_report() {
        let interp = Interpreter::new();
        let input = "'";
        let err = interp.read_str(input).unwrap_err();
        let text = render(err.report("test", input), input);
        assert!(text.contains("Unexpected end of input"), "{}", text);
    }

    #[test]
    fn test_eval_error_report() {
        let interp = Interpreter::new();
        let input = "(car 1 2)";
        let form = interp.read_str(input).unwrap();
        let err = interp.eval(&form).unwrap_err();
        let text = render(err.report("test", input), input);
        assert!(text.contains("Wrong number of arguments"), "{}", text);
    }
}
