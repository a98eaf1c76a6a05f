//! Operators that receive their arguments unevaluated.

use crate::environment::{Environment, Frame};
use crate::evaluator::{EvalError, EvalResult, evaluate, evaluate_body};
use crate::interpreter::Interpreter;
use crate::types::{Arity, Closure, ObjectKind, ObjectRef, Symbol};
use std::rc::Rc;
use tracing::debug;

pub fn install(interp: &Interpreter) {
    interp.define_special_form("quote", Arity::exactly(1), special_quote);
    interp.define_special_form("function", Arity::exactly(1), special_function);
    interp.define_special_form("if", Arity::at_least(2), special_if);
    interp.define_special_form("setq", Arity::at_least(2), special_setq);
    interp.define_special_form("let", Arity::at_least(1), special_let);
    interp.define_special_form("let*", Arity::at_least(1), special_let_star);
    interp.define_special_form("lambda", Arity::at_least(1), special_lambda);
    interp.define_special_form("defun", Arity::at_least(2), special_defun);
}

/// Checks that `target` can be bound or assigned and returns its symbol.
fn expect_variable<'a>(
    interp: &Interpreter,
    target: &'a ObjectRef,
    operation: &str,
) -> EvalResult<&'a Symbol> {
    match target.as_symbol() {
        Some(_) if interp.is_constant(target) => Err(EvalError::malformed(format!(
            "{}: cannot bind or assign the constant {}",
            operation, target
        ))),
        Some(symbol) => Ok(symbol),
        None => Err(EvalError::unsupported(operation, target)),
    }
}

fn special_quote(_interp: &Interpreter, _env: &mut Environment, args: &[ObjectRef]) -> EvalResult {
    match args {
        [form] => Ok(Rc::clone(form)),
        _ => Err(EvalError::malformed("quote expects exactly one argument")),
    }
}

/// `(function name)` returns the function cell of `name`. `(function (lambda ...))`
/// builds a closure.
fn special_function(interp: &Interpreter, env: &mut Environment, args: &[ObjectRef]) -> EvalResult {
    let [target] = args else {
        return Err(EvalError::malformed("function expects exactly one argument"));
    };
    match target.kind() {
        ObjectKind::Symbol(symbol) => symbol.function().ok_or_else(|| EvalError::NoFunction {
            name: symbol.name().to_string(),
        }),
        ObjectKind::Cons(_) if interp.is_lambda_form(target) => evaluate(interp, target, env),
        _ => Err(EvalError::unsupported("function", target)),
    }
}

/// Any non-nil condition is true. Forms after the then-branch make up the
/// else-branch; with none, the result is nil.
fn special_if(interp: &Interpreter, env: &mut Environment, args: &[ObjectRef]) -> EvalResult {
    let [condition, then_branch, else_forms @ ..] = args else {
        return Err(EvalError::malformed("if expects a condition and a then-branch"));
    };
    if evaluate(interp, condition, env)?.is_nil() {
        evaluate_body(interp, else_forms, env)
    } else {
        evaluate(interp, then_branch, env)
    }
}

/// `(setq sym form ...)`. Each value is evaluated then assigned to the innermost
/// lexical binding of `sym`, or to its global value when it has none.
fn special_setq(interp: &Interpreter, env: &mut Environment, args: &[ObjectRef]) -> EvalResult {
    if args.len() % 2 != 0 {
        return Err(EvalError::malformed(
            "setq expects an even number of arguments",
        ));
    }
    let mut result = interp.nil();
    for pair in args.chunks_exact(2) {
        let (target, form) = (&pair[0], &pair[1]);
        let symbol = expect_variable(interp, target, "setq")?;
        let value = evaluate(interp, form, env)?;
        if !env.update_value(target, Rc::clone(&value)) {
            symbol.set_value(Rc::clone(&value));
        }
        result = value;
    }
    Ok(result)
}

type BindingSpec = (ObjectRef, Option<ObjectRef>);

/// Parses `((var init) var (var) ...)`. A bare symbol or a one-element list binds nil.
fn parse_bindings(
    interp: &Interpreter,
    bindings: &ObjectRef,
    operation: &str,
) -> EvalResult<Vec<BindingSpec>> {
    let items = bindings
        .list_items()
        .ok_or_else(|| EvalError::malformed(format!("{}: bindings must be a list", operation)))?;

    items
        .into_iter()
        .map(|item| -> EvalResult<BindingSpec> {
            if item.as_symbol().is_some() {
                expect_variable(interp, &item, operation)?;
                return Ok((item, None));
            }
            match item.list_items().as_deref() {
                Some([symbol]) => {
                    expect_variable(interp, symbol, operation)?;
                    Ok((Rc::clone(symbol), None))
                }
                Some([symbol, init]) => {
                    expect_variable(interp, symbol, operation)?;
                    Ok((Rc::clone(symbol), Some(Rc::clone(init))))
                }
                _ => Err(EvalError::malformed(format!(
                    "{}: invalid binding {}",
                    operation, item
                ))),
            }
        })
        .collect()
}

/// Parallel binding: every init form is evaluated in the enclosing
/// environment before any of the new bindings is visible.
fn special_let(interp: &Interpreter, env: &mut Environment, args: &[ObjectRef]) -> EvalResult {
    let Some((bindings, body)) = args.split_first() else {
        return Err(EvalError::malformed("let expects a binding list"));
    };

    let mut frame = Frame::new();
    for (symbol, init) in parse_bindings(interp, bindings, "let")? {
        let value = match init {
            Some(form) => evaluate(interp, &form, env)?,
            None => interp.nil(),
        };
        frame.bind(symbol, value);
    }

    let mut scope = env.scope();
    scope.push(frame);
    evaluate_body(interp, body, &mut scope)
}

/// Sequential binding: one frame per binding, each init sees the ones before it.
fn special_let_star(interp: &Interpreter, env: &mut Environment, args: &[ObjectRef]) -> EvalResult {
    let Some((bindings, body)) = args.split_first() else {
        return Err(EvalError::malformed("let* expects a binding list"));
    };
    let bindings = parse_bindings(interp, bindings, "let*")?;

    let mut scope = env.scope();
    for (symbol, init) in bindings {
        let value = match init {
            Some(form) => evaluate(interp, &form, &mut scope)?,
            None => interp.nil(),
        };
        scope.push(Frame::with_binding(symbol, value));
    }
    evaluate_body(interp, body, &mut scope)
}

/// Splits a lambda list into required parameters and an optional `&rest` parameter.
fn parse_lambda_list(
    interp: &Interpreter,
    lambda_list: &ObjectRef,
) -> EvalResult<(Vec<ObjectRef>, Option<ObjectRef>)> {
    let items = lambda_list
        .list_items()
        .ok_or_else(|| EvalError::malformed(format!("invalid lambda list: {}", lambda_list)))?;
    let rest_marker = interp.intern("&rest");

    let mut params = Vec::with_capacity(items.len());
    let mut items = items.into_iter();
    while let Some(item) = items.next() {
        if crate::types::eq(&item, &rest_marker) {
            return match (items.next(), items.next()) {
                (Some(rest), None) => {
                    expect_variable(interp, &rest, "lambda")?;
                    Ok((params, Some(rest)))
                }
                _ => Err(EvalError::malformed(
                    "&rest must be followed by exactly one parameter",
                )),
            };
        }
        expect_variable(interp, &item, "lambda")?;
        params.push(item);
    }
    Ok((params, None))
}

fn make_closure(
    interp: &Interpreter,
    name: Option<ObjectRef>,
    lambda_list: &ObjectRef,
    body: &[ObjectRef],
    env: &Environment,
) -> EvalResult {
    let (params, rest) = parse_lambda_list(interp, lambda_list)?;
    Ok(interp.alloc(ObjectKind::Closure(Closure {
        name,
        params,
        rest,
        body: body.to_vec(),
        env: env.clone(),
    })))
}

/// `(lambda (params...) body...)` captures the current environment.
fn special_lambda(interp: &Interpreter, env: &mut Environment, args: &[ObjectRef]) -> EvalResult {
    let Some((lambda_list, body)) = args.split_first() else {
        return Err(EvalError::malformed("lambda expects a parameter list"));
    };
    make_closure(interp, None, lambda_list, body, env)
}

/// `(defun name (params...) body...)` stores a named closure in the function
/// cell of `name` and returns the name.
fn special_defun(interp: &Interpreter, env: &mut Environment, args: &[ObjectRef]) -> EvalResult {
    let [name, lambda_list, body @ ..] = args else {
        return Err(EvalError::malformed("defun expects a name and a parameter list"));
    };
    let Some(symbol) = name.as_symbol() else {
        return Err(EvalError::unsupported("defun", name));
    };
    let closure = make_closure(interp, Some(Rc::clone(name)), lambda_list, body, env)?;
    symbol.set_function(closure);
    debug!(name = symbol.name(), "defun");
    Ok(Rc::clone(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    fn assert_eval(interp: &Interpreter, input: &str, expected: &str) {
        match interp.eval_str(input) {
            Ok(result) => assert_eq!(result.to_string(), expected, "Input: '{}'", input),
            Err(e) => panic!("Eval failed for input '{}': {}", input, e),
        }
    }

    fn assert_eval_fresh(input: &str, expected: &str) {
        assert_eval(&Interpreter::new(), input, expected);
    }

    fn eval_error(input: &str) -> EvalError {
        match Interpreter::new().eval_str(input) {
            Err(Error::Eval(e)) => e,
            other => panic!("Expected an evaluation error for '{}', got {:?}", input, other),
        }
    }

    #[test]
    fn test_quote() {
        assert_eval_fresh("(quote a)", "a");
        assert_eval_fresh("'(1 2 3)", "(1 2 3)");
        assert_eval_fresh("''a", "(quote a)");
        assert_eval_fresh("'(a . b)", "(a . b)");
        assert!(matches!(
            eval_error("(quote a b)"),
            EvalError::WrongNumberOfArguments { got: 2, .. }
        ));
        assert!(matches!(
            eval_error("(quote)"),
            EvalError::WrongNumberOfArguments { got: 0, .. }
        ));
    }

    #[test]
    fn test_quote_returns_the_read_object() {
        let interp = Interpreter::new();
        let form = interp.read_str("(quote (x y))").unwrap();
        let quoted = form.list_items().unwrap()[1].clone();
        let result = interp.eval(&form).unwrap();
        assert!(Rc::ptr_eq(&quoted, &result));
    }

    #[test]
    fn test_if() {
        assert_eval_fresh("(if t 1 2)", "1");
        assert_eval_fresh("(if nil 1 2)", "2");
        assert_eval_fresh("(if nil 1)", "nil");
        assert_eval_fresh("(if 0 'yes 'no)", "yes");
        assert_eval_fresh("(if '() 'yes 'no)", "no");
        assert_eval_fresh("(if nil 1 2 3)", "3");
        assert!(matches!(
            eval_error("(if t)"),
            EvalError::WrongNumberOfArguments { got: 1, .. }
        ));
    }

    #[test]
    fn test_if_does_not_evaluate_unused_branch() {
        assert_eval_fresh("(if t 'good unbound-variable)", "good");
        assert_eval_fresh("(if nil unbound-variable 'good)", "good");
    }

    #[test]
    fn test_setq_global_and_lexical() {
        let interp = Interpreter::new();
        assert_eval(&interp, "(setq x 10)", "10");
        assert_eval(&interp, "x", "10");
        // inside let, setq targets the lexical binding only
        assert_eval(&interp, "(let ((x 1)) (setq x 2) x)", "2");
        assert_eval(&interp, "x", "10");
        assert_eval(&interp, "(setq a 1 b (+ a 1))", "2");
        assert_eval(&interp, "b", "2");
    }

    #[test]
    fn test_setq_errors() {
        assert!(matches!(eval_error("(setq x)"), EvalError::WrongNumberOfArguments { .. }));
        assert!(matches!(eval_error("(setq x 1 y)"), EvalError::Malformed { .. }));
        assert!(matches!(
            eval_error("(setq 1 2)"),
            EvalError::UnsupportedArgumentType { .. }
        ));
        assert!(matches!(eval_error("(setq nil 1)"), EvalError::Malformed { .. }));
        assert!(matches!(eval_error("(setq t 1)"), EvalError::Malformed { .. }));
    }

    #[test]
    fn test_let_is_parallel() {
        assert_eval_fresh("(let ((x 1) (y 2)) (+ x y))", "3");
        assert_eval_fresh("(let (x (y) (z 3)) (list x y z))", "(nil nil 3)");
        assert_eval_fresh("(let () 5)", "5");
        assert_eval_fresh("(let ((x 1)))", "nil");

        let interp = Interpreter::new();
        assert_eval(&interp, "(setq x 100)", "100");
        assert_eval(&interp, "(let ((x 1) (y x)) y)", "100");
    }

    #[test]
    fn test_let_star_is_sequential() {
        assert_eval_fresh("(let* ((x 1) (y (+ x 1))) (list x y))", "(1 2)");
        assert_eval_fresh("(let* ((x 1) (x (+ x 1))) x)", "2");
        assert!(matches!(
            eval_error("(let ((x 1) (y (+ x 1))) y)"),
            EvalError::UnboundVariable { .. }
        ));
    }

    #[test]
    fn test_let_errors() {
        assert!(matches!(eval_error("(let)"), EvalError::WrongNumberOfArguments { .. }));
        assert!(matches!(eval_error("(let 5 1)"), EvalError::Malformed { .. }));
        assert!(matches!(eval_error("(let ((x 1 2)) x)"), EvalError::Malformed { .. }));
        assert!(matches!(
            eval_error("(let ((1 2)) 1)"),
            EvalError::UnsupportedArgumentType { .. }
        ));
        assert!(matches!(eval_error("(let ((t 1)) t)"), EvalError::Malformed { .. }));
    }

    #[test]
    fn test_lambda_and_function() {
        assert_eval_fresh("(lambda (x) x)", "#<function lambda>");
        assert_eval_fresh("(funcall (lambda (x y) (+ x y)) 1 2)", "3");
        assert_eval_fresh("(function car)", "#<builtin car>");
        assert_eval_fresh("(function if)", "#<special-form if>");
        assert_eval_fresh("(funcall (function (lambda () 7)))", "7");
        assert!(matches!(eval_error("(function undefined)"), EvalError::NoFunction { .. }));
        assert!(matches!(
            eval_error("(function 1)"),
            EvalError::UnsupportedArgumentType { .. }
        ));
    }

    #[test]
    fn test_lambda_list_errors() {
        assert!(matches!(eval_error("(lambda x x)"), EvalError::Malformed { .. }));
        assert!(matches!(eval_error("(lambda (1) 1)"), EvalError::UnsupportedArgumentType { .. }));
        assert!(matches!(eval_error("(lambda (&rest) 1)"), EvalError::Malformed { .. }));
        assert!(matches!(eval_error("(lambda (&rest a b) 1)"), EvalError::Malformed { .. }));
    }

    #[test]
    fn test_closures_capture_their_environment() {
        let interp = Interpreter::new();
        assert_eval(&interp, "(setq f (let ((n 10)) (lambda (x) (+ x n))))", "#<function lambda>");
        assert_eval(&interp, "(funcall f 5)", "15");
    }

    #[test]
    fn test_closures_share_captured_frames() {
        let interp = Interpreter::new();
        interp
            .eval_str(
                "(setq counter (let ((n 0)) (list (lambda () (setq n (+ n 1))) (lambda () n))))",
            )
            .unwrap();
        assert_eval(&interp, "(funcall (car counter))", "1");
        assert_eval(&interp, "(funcall (car counter))", "2");
        assert_eval(&interp, "(funcall (car (cdr counter)))", "2");
    }

    #[test]
    fn test_defun() {
        let interp = Interpreter::new();
        assert_eval(&interp, "(defun square (x) (* x x))", "square");
        assert_eval(&interp, "(square 12)", "144");
        assert_eval(&interp, "(function square)", "#<function square>");
        assert_eval(&interp, "(defun noop ())", "noop");
        assert_eval(&interp, "(noop)", "nil");
    }

    #[test]
    fn test_defun_recursion() {
        let interp = Interpreter::new();
        interp
            .eval_str("(defun fact (n) (if (= n 0) 1 (* n (fact (- n 1)))))")
            .unwrap();
        assert_eval(&interp, "(fact 10)", "3628800");
        interp
            .eval_str("(defun fib (n) (if (< n 2) n (+ (fib (- n 1)) (fib (- n 2)))))")
            .unwrap();
        assert_eval(&interp, "(fib 15)", "610");
    }

    #[test]
    fn test_function_and_value_cells_are_separate() {
        let interp = Interpreter::new();
        interp.eval_str("(defun x () 'function-cell)").unwrap();
        interp.eval_str("(setq x 'value-cell)").unwrap();
        assert_eval(&interp, "(x)", "function-cell");
        assert_eval(&interp, "x", "value-cell");
    }

    #[test]
    fn test_defun_errors() {
        assert!(matches!(eval_error("(defun f)"), EvalError::WrongNumberOfArguments { .. }));
        assert!(matches!(
            eval_error("(defun 1 (x) x)"),
            EvalError::UnsupportedArgumentType { .. }
        ));
    }
}
