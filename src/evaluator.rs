use crate::environment::{Environment, Frame};
use crate::interpreter::Interpreter;
use crate::number::ArithmeticError;
use crate::types::{Arity, Closure, ObjectKind, ObjectRef};
use std::rc::Rc;
use thiserror::Error;
use tracing::trace;

// --- Evaluation Error ---
#[derive(Debug, Clone, Error)]
pub enum EvalError {
    #[error("Unbound variable: '{name}'")]
    UnboundVariable { name: String },
    #[error("Undefined function: '{name}'")]
    NoFunction { name: String },
    #[error("Wrong number of arguments: expected {expected}, got {got}")]
    WrongNumberOfArguments { expected: Arity, got: usize },
    #[error("Unsupported argument type for '{operation}': {value}")]
    UnsupportedArgumentType { operation: String, value: ObjectRef },
    #[error("Not callable: {value}")]
    NotCallable { value: ObjectRef },
    #[error("Cannot evaluate an object of type {type_name}")]
    NotEvaluable { type_name: &'static str },
    #[error("Malformed expression: {message}")]
    Malformed { message: String },
    #[error("{operation}: {source}")]
    Arithmetic {
        operation: String,
        #[source]
        source: ArithmeticError,
    },
}

impl EvalError {
    pub fn malformed(message: impl Into<String>) -> EvalError {
        EvalError::Malformed {
            message: message.into(),
        }
    }

    pub fn unsupported(operation: &str, value: &ObjectRef) -> EvalError {
        EvalError::UnsupportedArgumentType {
            operation: operation.to_string(),
            value: Rc::clone(value),
        }
    }
}

pub type EvalResult<T = ObjectRef> = Result<T, EvalError>;

// --- Evaluate Function ---

/// Evaluates `object` in `env`.
///
/// Numbers and strings evaluate to themselves. A symbol yields its innermost
/// lexical binding, then its global value. A cons is an operator application.
pub fn evaluate(interp: &Interpreter, object: &ObjectRef, env: &mut Environment) -> EvalResult {
    match object.kind() {
        ObjectKind::Number(_) | ObjectKind::String(_) => Ok(Rc::clone(object)),
        ObjectKind::Symbol(symbol) => env
            .lookup(object)
            .or_else(|| symbol.value())
            .ok_or_else(|| EvalError::UnboundVariable {
                name: symbol.name().to_string(),
            }),
        ObjectKind::Cons(cell) => {
            let operator = resolve_operator(interp, &cell.car, env)?;
            apply(interp, &operator, &cell.cdr, env)
        }
        _ => Err(EvalError::NotEvaluable {
            type_name: object.type_name(),
        }),
    }
}

/// The head of a form names its operator through the symbol's function cell.
/// A literal `(lambda ...)` head is evaluated into a closure.
fn resolve_operator(interp: &Interpreter, head: &ObjectRef, env: &mut Environment) -> EvalResult {
    match head.kind() {
        ObjectKind::Symbol(symbol) => symbol.function().ok_or_else(|| EvalError::NoFunction {
            name: symbol.name().to_string(),
        }),
        ObjectKind::Cons(_) if interp.is_lambda_form(head) => evaluate(interp, head, env),
        _ => Err(EvalError::NotCallable {
            value: Rc::clone(head),
        }),
    }
}

/// Applies `operator` to the unevaluated argument list `raw_args`.
///
/// Special forms see the raw arguments. Builtins and closures get them
/// evaluated left to right first.
pub fn apply(
    interp: &Interpreter,
    operator: &ObjectRef,
    raw_args: &ObjectRef,
    env: &mut Environment,
) -> EvalResult {
    let args = raw_args.list_items().ok_or_else(|| {
        EvalError::malformed(format!("argument list is not a proper list: {}", raw_args))
    })?;
    trace!(%operator, argc = args.len(), "apply");

    match operator.kind() {
        ObjectKind::SpecialForm(form) => {
            form.arity.check(args.len())?;
            (form.code)(interp, env, &args)
        }
        ObjectKind::Builtin(builtin) => {
            let values = evaluate_arguments(interp, &args, env)?;
            builtin.arity.check(values.len())?;
            (builtin.code)(interp, env, &values)
        }
        ObjectKind::Closure(closure) => {
            let values = evaluate_arguments(interp, &args, env)?;
            call_closure(interp, closure, values)
        }
        _ => Err(EvalError::NotCallable {
            value: Rc::clone(operator),
        }),
    }
}

/// Applies `operator` to arguments that are already values (`funcall`).
pub fn apply_values(
    interp: &Interpreter,
    operator: &ObjectRef,
    values: Vec<ObjectRef>,
    env: &mut Environment,
) -> EvalResult {
    trace!(%operator, argc = values.len(), "apply values");
    match operator.kind() {
        ObjectKind::SpecialForm(native) | ObjectKind::Builtin(native) => {
            native.arity.check(values.len())?;
            (native.code)(interp, env, &values)
        }
        ObjectKind::Closure(closure) => call_closure(interp, closure, values),
        _ => Err(EvalError::NotCallable {
            value: Rc::clone(operator),
        }),
    }
}

fn evaluate_arguments(
    interp: &Interpreter,
    args: &[ObjectRef],
    env: &mut Environment,
) -> EvalResult<Vec<ObjectRef>> {
    args.iter().map(|arg| evaluate(interp, arg, env)).collect()
}

/// Runs a closure body in its captured environment plus one frame binding the
/// parameters. The frame is popped again however the body exits.
pub fn call_closure(interp: &Interpreter, closure: &Closure, args: Vec<ObjectRef>) -> EvalResult {
    closure.arity().check(args.len())?;

    let mut frame = Frame::new();
    let mut args = args.into_iter();
    for (param, value) in closure.params.iter().zip(args.by_ref()) {
        frame.bind(Rc::clone(param), value);
    }
    if let Some(rest) = &closure.rest {
        frame.bind(Rc::clone(rest), interp.list(args));
    }

    let mut env = closure.env.clone();
    let mut scope = env.scope();
    scope.push(frame);
    evaluate_body(interp, &closure.body, &mut scope)
}

/// Evaluates forms in order and returns the last value, or nil for no forms.
pub fn evaluate_body(
    interp: &Interpreter,
    body: &[ObjectRef],
    env: &mut Environment,
) -> EvalResult {
    let mut result = interp.nil();
    for form in body {
        result = evaluate(interp, form, env)?;
    }
    Ok(result)
}
