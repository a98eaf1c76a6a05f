use std::borrow::Cow;
use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;

use kons::lexer::{TokenKind, is_incomplete};
use kons::{Error, Interpreter, Reader, tokenize};
use logos::Logos;
use rustyline::error::ReadlineError;
use rustyline::highlight::{CmdKind, Highlighter};
use rustyline::validate::{ValidationContext, ValidationResult, Validator};
use rustyline::{Cmd, Completer, Context, EditMode, Editor, EventHandler, KeyCode, KeyEvent, Modifiers};
use rustyline::{Helper, Highlighter, Hinter, Validator};
use tracing::warn;
use tracing_subscriber::EnvFilter;

const SOURCE_ID: &str = "REPL";

/// Settings taken from `KONS_*` environment variables.
struct ReplConfig {
    history: PathBuf,
    edit_mode: EditMode,
    log_filter: String,
}

impl ReplConfig {
    fn from_env() -> ReplConfig {
        let history = env::var_os("KONS_HISTORY")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("kons_history.txt"));
        let edit_mode = match env::var("KONS_EDIT_MODE").as_deref() {
            Ok("emacs") => EditMode::Emacs,
            _ => EditMode::Vi,
        };
        let log_filter = env::var("KONS_LOG").unwrap_or_else(|_| "warn".to_string());
        ReplConfig {
            history,
            edit_mode,
            log_filter,
        }
    }
}

struct KonsCompleter {
    interp: Rc<Interpreter>,
}

impl rustyline::completion::Completer for KonsCompleter {
    type Candidate = String;
    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        let prefix = match tokenize(&line[..pos]) {
            Ok(tokens) => match tokens.last() {
                Some(token) if token.span.end == pos => match &token.kind {
                    TokenKind::Symbol(name) => name.clone(),
                    _ => return Ok((pos, vec![])),
                },
                _ => return Ok((pos, vec![])),
            },
            Err(_) => return Ok((pos, vec![])),
        };
        let mut candidates: Vec<String> = self
            .interp
            .symbol_names()
            .into_iter()
            .filter(|name| name.starts_with(&prefix) && name.len() > prefix.len())
            .map(|name| name[prefix.len()..].to_string())
            .collect();
        candidates.sort();
        Ok((pos, candidates))
    }
}

#[derive(Completer, Helper, Highlighter, Hinter, Validator)]
struct KonsHelper {
    #[rustyline(Validator)]
    validator: KonsValidator,
    #[rustyline(Highlighter)]
    highlighter: KonsHighlighter,
    #[rustyline(Completer)]
    completer: KonsCompleter,
}

/// Asks for another line while the input ends inside a list or a string.
struct KonsValidator;

impl Validator for KonsValidator {
    fn validate(&self, ctx: &mut ValidationContext) -> rustyline::Result<ValidationResult> {
        if is_incomplete(ctx.input()) {
            Ok(ValidationResult::Incomplete)
        } else {
            // other read errors are reported when the line is evaluated
            Ok(ValidationResult::Valid(None))
        }
    }
}

struct KonsHighlighter;

impl KonsHighlighter {
    /// Byte offset of the parenthesis matching the one at `pos`, if any.
    fn matching_paren(line: &str, pos: usize) -> Option<usize> {
        let parens: Vec<(TokenKind, usize)> = TokenKind::lexer(line)
            .spanned()
            .filter_map(|(kind, range)| match kind {
                Ok(kind @ (TokenKind::LParen | TokenKind::RParen)) => Some((kind, range.start)),
                _ => None,
            })
            .collect();
        let mut stack = Vec::new();
        for (kind, start) in parens {
            match kind {
                TokenKind::LParen => stack.push(start),
                _ => {
                    let open = stack.pop()?;
                    if open == pos {
                        return Some(start);
                    }
                    if start == pos {
                        return Some(open);
                    }
                }
            }
        }
        None
    }
}

impl Highlighter for KonsHighlighter {
    fn highlight<'l>(&self, line: &'l str, pos: usize) -> Cow<'l, str> {
        let cursor = pos.checked_sub(1);
        let matched = cursor.and_then(|c| KonsHighlighter::matching_paren(line, c));
        let mut highlighted = String::with_capacity(line.len() * 2);
        let mut last = 0;

        for (kind, range) in TokenKind::lexer(line).spanned() {
            highlighted.push_str(&line[last..range.start]);
            let text = &line[range.clone()];
            let colour = match kind {
                Ok(TokenKind::String(_)) => Some("32"),
                Ok(TokenKind::Integer(_) | TokenKind::Float(_)) => Some("33"),
                Ok(TokenKind::Quote) => Some("35"),
                Ok(TokenKind::LParen | TokenKind::RParen)
                    if matched.is_some()
                        && (Some(range.start) == matched || Some(range.start) == cursor) =>
                {
                    Some("1;34")
                }
                Ok(_) => None,
                Err(_) => Some("31"),
            };
            match colour {
                Some(code) => highlighted.push_str(&format!("\x1b[{code}m{text}\x1b[0m")),
                None => highlighted.push_str(text),
            }
            last = range.end;
        }
        highlighted.push_str(&line[last..]);
        Cow::Owned(highlighted)
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _kind: CmdKind) -> bool {
        true
    }
}

fn report(err: &Error, source_id: &str, input: &str) {
    if let Err(io_err) = err.pretty_print(source_id, input) {
        eprintln!("{err} (could not render diagnostic: {io_err})");
    }
}

/// Loads each file in order. Returns false at the first failure.
fn load_files(interp: &Interpreter, paths: &[String]) -> bool {
    for path in paths {
        let source = match Interpreter::read_source(Path::new(path)) {
            Ok(source) => source,
            Err(err) => {
                report(&err, path, "");
                return false;
            }
        };
        if let Err(err) = interp.load_str(&source) {
            report(&err, path, &source);
            return false;
        }
    }
    true
}

fn eval_line(interp: &Interpreter, line: &str) {
    for form in Reader::new(interp, line) {
        let result = form
            .map_err(Error::from)
            .and_then(|form| interp.eval(&form).map_err(Error::from));
        match result {
            Ok(value) => println!("{value}"),
            Err(err) => {
                report(&err, SOURCE_ID, line);
                break;
            }
        }
    }
}

fn main() -> rustyline::Result<ExitCode> {
    let config = ReplConfig::from_env();
    let filter = EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let interp = Rc::new(Interpreter::new());
    let files: Vec<String> = env::args().skip(1).collect();
    if !load_files(&interp, &files) {
        return Ok(ExitCode::FAILURE);
    }

    println!("kons v{}", env!("CARGO_PKG_VERSION"));
    println!("Type 'exit' or press Ctrl-D to quit.");

    let helper = KonsHelper {
        validator: KonsValidator,
        highlighter: KonsHighlighter,
        completer: KonsCompleter {
            interp: Rc::clone(&interp),
        },
    };
    let rl_config = rustyline::config::Config::builder()
        .edit_mode(config.edit_mode)
        .auto_add_history(true)
        .build();
    let mut rl = Editor::with_config(rl_config)?;
    rl.set_helper(Some(helper));
    rl.bind_sequence(
        KeyEvent(KeyCode::Char('s'), Modifiers::CTRL),
        EventHandler::Simple(Cmd::Newline),
    );
    if rl.load_history(&config.history).is_err() {
        println!("No previous history.");
    }

    loop {
        match rl.readline("kons> ") {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                if trimmed.eq_ignore_ascii_case("exit") {
                    break;
                }
                eval_line(&interp, &line);
            }
            Err(ReadlineError::Interrupted) => {
                println!("Interrupted. Type 'exit' or Ctrl-D to quit.");
            }
            Err(ReadlineError::Eof) => {
                println!("\nExiting.");
                break;
            }
            Err(err) => {
                eprintln!("Readline Error: {err:?}");
                break;
            }
        }
    }
    if let Err(err) = rl.save_history(&config.history) {
        warn!(path = %config.history.display(), error = %err, "could not save history");
    }
    Ok(ExitCode::SUCCESS)
}
