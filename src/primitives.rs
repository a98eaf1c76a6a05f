use std::cmp::Ordering;
use std::rc::Rc;

use crate::environment::Environment;
use crate::evaluator::{EvalError, EvalResult, apply_values};
use crate::interpreter::Interpreter;
use crate::number::{ArithmeticError, ArithmeticResult, Number, floored_mod};
use crate::types::{Arity, ConsCell, ObjectKind, ObjectRef, Symbol, eq};

pub fn install(interp: &Interpreter) {
    // Identity and predicates
    interp.define_builtin("eq", Arity::exactly(2), prim_eq);
    interp.define_builtin("null", Arity::exactly(1), prim_null);
    interp.define_builtin("not", Arity::exactly(1), prim_null);
    interp.define_builtin("atom", Arity::exactly(1), prim_atom);
    interp.define_builtin("funcall", Arity::at_least(1), prim_funcall);

    // Arithmetic
    interp.define_builtin("+", Arity::at_least(0), prim_add);
    interp.define_builtin("-", Arity::at_least(1), prim_sub);
    interp.define_builtin("*", Arity::at_least(0), prim_mul);
    interp.define_builtin("/", Arity::at_least(1), prim_div);
    interp.define_builtin("mod", Arity::at_least(1), prim_mod);

    // Comparison
    interp.define_builtin("=", Arity::at_least(2), prim_equals);
    interp.define_builtin("<", Arity::at_least(2), prim_less_than);
    interp.define_builtin("<=", Arity::at_least(2), prim_less_than_or_equals);
    interp.define_builtin(">", Arity::at_least(2), prim_greater_than);
    interp.define_builtin(">=", Arity::at_least(2), prim_greater_than_or_equals);

    // Transcendental
    interp.define_builtin("sin", Arity::exactly(1), prim_sin);
    interp.define_builtin("cos", Arity::exactly(1), prim_cos);
    interp.define_builtin("tan", Arity::exactly(1), prim_tan);

    // Lists
    interp.define_builtin("car", Arity::exactly(1), prim_car);
    interp.define_builtin("first", Arity::exactly(1), prim_car);
    interp.define_builtin("cdr", Arity::exactly(1), prim_cdr);
    interp.define_builtin("rest", Arity::exactly(1), prim_cdr);
    interp.define_builtin("cons", Arity::exactly(2), prim_cons);
    interp.define_builtin("list", Arity::at_least(0), prim_list);

    // Symbol cells
    interp.define_builtin("symbol-name", Arity::exactly(1), prim_symbol_name);
    interp.define_builtin("symbol-value", Arity::exactly(1), prim_symbol_value);
    interp.define_builtin("symbol-function", Arity::exactly(1), prim_symbol_function);
    interp.define_builtin("symbol-plist", Arity::exactly(1), prim_symbol_plist);
    interp.define_builtin("symbol-package", Arity::exactly(1), prim_symbol_package);
}

// Extracts a number from an argument or returns UnsupportedArgumentType
macro_rules! expect_number {
    ($arg:expr, $name:expr) => {
        match $arg.as_number() {
            Some(n) => n,
            None => return Err(EvalError::unsupported($name, $arg)),
        }
    };
}

fn arithmetic_error(operation: &str) -> impl Fn(ArithmeticError) -> EvalError + '_ {
    move |source| EvalError::Arithmetic {
        operation: operation.to_string(),
        source,
    }
}

fn fold_numbers(
    interp: &Interpreter,
    start: Number,
    args: &[ObjectRef],
    func: fn(Number, Number) -> ArithmeticResult,
    operator: &str,
) -> EvalResult {
    let mut acc = start;
    for arg in args {
        let num = expect_number!(arg, operator);
        acc = func(acc, num).map_err(arithmetic_error(operator))?;
    }
    Ok(interp.number(acc))
}

pub fn prim_add(interp: &Interpreter, _env: &mut Environment, args: &[ObjectRef]) -> EvalResult {
    // (+) -> 0
    fold_numbers(interp, Number::Integer(0), args, Number::add, "+")
}

pub fn prim_sub(interp: &Interpreter, _env: &mut Environment, args: &[ObjectRef]) -> EvalResult {
    // (- x) -> -x
    // (- x y z) -> x - y - z
    match args {
        [only] => {
            let num = expect_number!(only, "-");
            Ok(interp.number(num.negate().map_err(arithmetic_error("-"))?))
        }
        [first, rest @ ..] => {
            let start = expect_number!(first, "-");
            fold_numbers(interp, start, rest, Number::sub, "-")
        }
        [] => Err(EvalError::WrongNumberOfArguments {
            expected: Arity::at_least(1),
            got: 0,
        }),
    }
}

pub fn prim_mul(interp: &Interpreter, _env: &mut Environment, args: &[ObjectRef]) -> EvalResult {
    // (*) -> 1
    fold_numbers(interp, Number::Integer(1), args, Number::mul, "*")
}

pub fn prim_div(interp: &Interpreter, _env: &mut Environment, args: &[ObjectRef]) -> EvalResult {
    // (/ x) -> 1/x
    // (/ x y z) -> x / y / z
    match args {
        [only] => {
            let num = expect_number!(only, "/");
            Ok(interp.number(Number::Integer(1).div(num).map_err(arithmetic_error("/"))?))
        }
        [first, rest @ ..] => {
            let start = expect_number!(first, "/");
            fold_numbers(interp, start, rest, Number::div, "/")
        }
        [] => Err(EvalError::WrongNumberOfArguments {
            expected: Arity::at_least(1),
            got: 0,
        }),
    }
}

/// Integer-only, floored. `(mod x)` is `x`.
pub fn prim_mod(interp: &Interpreter, _env: &mut Environment, args: &[ObjectRef]) -> EvalResult {
    let mut integers = Vec::with_capacity(args.len());
    for arg in args {
        match arg.as_number() {
            Some(Number::Integer(i)) => integers.push(i),
            _ => return Err(EvalError::unsupported("mod", arg)),
        }
    }
    let Some((&first, rest)) = integers.split_first() else {
        return Err(EvalError::WrongNumberOfArguments {
            expected: Arity::at_least(1),
            got: 0,
        });
    };
    let mut acc = first;
    for &divisor in rest {
        acc = floored_mod(acc, divisor).map_err(arithmetic_error("mod"))?;
    }
    Ok(interp.integer(acc))
}

/// Chained comparison: true when `holds` is true for every adjacent pair.
/// All arguments must be numbers even when an early pair already fails.
fn compare_numbers(
    interp: &Interpreter,
    args: &[ObjectRef],
    holds: fn(Ordering) -> bool,
    operator: &str,
) -> EvalResult {
    let mut numbers = Vec::with_capacity(args.len());
    for arg in args {
        numbers.push(expect_number!(arg, operator));
    }
    let result = numbers
        .windows(2)
        .all(|pair| pair[0].compare(pair[1]).is_some_and(holds));
    Ok(interp.truth(result))
}

pub fn prim_equals(interp: &Interpreter, _env: &mut Environment, args: &[ObjectRef]) -> EvalResult {
    compare_numbers(interp, args, |o| o == Ordering::Equal, "=")
}

pub fn prim_less_than(interp: &Interpreter, _env: &mut Environment, args: &[ObjectRef]) -> EvalResult {
    compare_numbers(interp, args, |o| o == Ordering::Less, "<")
}

pub fn prim_less_than_or_equals(
    interp: &Interpreter,
    _env: &mut Environment,
    args: &[ObjectRef],
) -> EvalResult {
    compare_numbers(interp, args, |o| o != Ordering::Greater, "<=")
}

pub fn prim_greater_than(
    interp: &Interpreter,
    _env: &mut Environment,
    args: &[ObjectRef],
) -> EvalResult {
    compare_numbers(interp, args, |o| o == Ordering::Greater, ">")
}

pub fn prim_greater_than_or_equals(
    interp: &Interpreter,
    _env: &mut Environment,
    args: &[ObjectRef],
) -> EvalResult {
    compare_numbers(interp, args, |o| o != Ordering::Less, ">=")
}

fn transcendental(
    interp: &Interpreter,
    args: &[ObjectRef],
    func: fn(f64) -> f64,
    operator: &str,
) -> EvalResult {
    let [arg] = args else {
        return Err(EvalError::WrongNumberOfArguments {
            expected: Arity::exactly(1),
            got: args.len(),
        });
    };
    let num = expect_number!(arg, operator);
    Ok(interp.float(func(num.to_f64())))
}

pub fn prim_sin(interp: &Interpreter, _env: &mut Environment, args: &[ObjectRef]) -> EvalResult {
    transcendental(interp, args, f64::sin, "sin")
}

pub fn prim_cos(interp: &Interpreter, _env: &mut Environment, args: &[ObjectRef]) -> EvalResult {
    transcendental(interp, args, f64::cos, "cos")
}

pub fn prim_tan(interp: &Interpreter, _env: &mut Environment, args: &[ObjectRef]) -> EvalResult {
    transcendental(interp, args, f64::tan, "tan")
}

// --- Identity and predicates ---

pub fn prim_eq(interp: &Interpreter, _env: &mut Environment, args: &[ObjectRef]) -> EvalResult {
    match args {
        [a, b] => Ok(interp.truth(eq(a, b))),
        _ => Err(EvalError::malformed("eq expects two arguments")),
    }
}

pub fn prim_null(interp: &Interpreter, _env: &mut Environment, args: &[ObjectRef]) -> EvalResult {
    Ok(interp.truth(args.first().is_some_and(|arg| arg.is_nil())))
}

pub fn prim_atom(interp: &Interpreter, _env: &mut Environment, args: &[ObjectRef]) -> EvalResult {
    Ok(interp.truth(args.first().is_some_and(|arg| arg.is_atom())))
}

/// `(funcall f args...)`. A symbol designates its function cell.
pub fn prim_funcall(interp: &Interpreter, env: &mut Environment, args: &[ObjectRef]) -> EvalResult {
    let Some((function, rest)) = args.split_first() else {
        return Err(EvalError::WrongNumberOfArguments {
            expected: Arity::at_least(1),
            got: 0,
        });
    };
    let operator = match function.kind() {
        ObjectKind::Symbol(symbol) => symbol.function().ok_or_else(|| EvalError::NoFunction {
            name: symbol.name().to_string(),
        })?,
        _ => Rc::clone(function),
    };
    apply_values(interp, &operator, rest.to_vec(), env)
}

// --- List Primitives ---

/// nil is the empty list; anything else that is not a cons is rejected.
fn expect_list<'a>(arg: &'a ObjectRef, operator: &str) -> EvalResult<Option<&'a ConsCell>> {
    if arg.is_nil() {
        return Ok(None);
    }
    match arg.as_cons() {
        Some(cell) => Ok(Some(cell)),
        None => Err(EvalError::unsupported(operator, arg)),
    }
}

pub fn prim_car(interp: &Interpreter, _env: &mut Environment, args: &[ObjectRef]) -> EvalResult {
    // (car nil) -> nil
    match args {
        [list] => Ok(expect_list(list, "car")?
            .map(|cell| Rc::clone(&cell.car))
            .unwrap_or_else(|| interp.nil())),
        _ => Err(EvalError::malformed("car expects one argument")),
    }
}

pub fn prim_cdr(interp: &Interpreter, _env: &mut Environment, args: &[ObjectRef]) -> EvalResult {
    // (cdr nil) -> nil
    match args {
        [list] => Ok(expect_list(list, "cdr")?
            .map(|cell| Rc::clone(&cell.cdr))
            .unwrap_or_else(|| interp.nil())),
        _ => Err(EvalError::malformed("cdr expects one argument")),
    }
}

pub fn prim_cons(interp: &Interpreter, _env: &mut Environment, args: &[ObjectRef]) -> EvalResult {
    // (cons a b) => (a . b)
    match args {
        [car, cdr] => Ok(interp.cons(Rc::clone(car), Rc::clone(cdr))),
        _ => Err(EvalError::malformed("cons expects two arguments")),
    }
}

pub fn prim_list(interp: &Interpreter, _env: &mut Environment, args: &[ObjectRef]) -> EvalResult {
    // (list) -> nil
    Ok(interp.list(args.iter().cloned()))
}

// --- Symbol cells ---

fn expect_symbol<'a>(args: &'a [ObjectRef], operator: &str) -> EvalResult<&'a Symbol> {
    match args {
        [arg] => arg
            .as_symbol()
            .ok_or_else(|| EvalError::unsupported(operator, arg)),
        _ => Err(EvalError::WrongNumberOfArguments {
            expected: Arity::exactly(1),
            got: args.len(),
        }),
    }
}

pub fn prim_symbol_name(_interp: &Interpreter, _env: &mut Environment, args: &[ObjectRef]) -> EvalResult {
    let symbol = expect_symbol(args, "symbol-name")?;
    Ok(Rc::clone(symbol.name_object()))
}

pub fn prim_symbol_value(_interp: &Interpreter, _env: &mut Environment, args: &[ObjectRef]) -> EvalResult {
    let symbol = expect_symbol(args, "symbol-value")?;
    symbol.value().ok_or_else(|| EvalError::UnboundVariable {
        name: symbol.name().to_string(),
    })
}

pub fn prim_symbol_function(
    _interp: &Interpreter,
    _env: &mut Environment,
    args: &[ObjectRef],
) -> EvalResult {
    let symbol = expect_symbol(args, "symbol-function")?;
    symbol.function().ok_or_else(|| EvalError::NoFunction {
        name: symbol.name().to_string(),
    })
}

pub fn prim_symbol_plist(interp: &Interpreter, _env: &mut Environment, args: &[ObjectRef]) -> EvalResult {
    let symbol = expect_symbol(args, "symbol-plist")?;
    Ok(symbol.plist().unwrap_or_else(|| interp.nil()))
}

pub fn prim_symbol_package(
    interp: &Interpreter,
    _env: &mut Environment,
    args: &[ObjectRef],
) -> EvalResult {
    let symbol = expect_symbol(args, "symbol-package")?;
    Ok(symbol.package().unwrap_or_else(|| interp.nil()))
}
