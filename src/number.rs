//! The two numeric kinds and the contagion rules between them.
//!
//! Any operation that mixes an integer with a float produces a float. Integer
//! arithmetic is checked: overflow is reported instead of wrapping.

use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Integer(i64),
    Float(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ArithmeticError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow")]
    Overflow,
}

pub type ArithmeticResult = Result<Number, ArithmeticError>;

impl Number {
    pub fn is_float(self) -> bool {
        matches!(self, Number::Float(_))
    }

    pub fn to_f64(self) -> f64 {
        match self {
            Number::Integer(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    /// Applies `int_op` when both sides are integers, otherwise promotes both
    /// sides to floats and applies `float_op`.
    fn combine<I, F>(self, other: Number, int_op: I, float_op: F) -> ArithmeticResult
    where
        I: Fn(i64, i64) -> Option<i64>,
        F: Fn(f64, f64) -> f64,
    {
        match (self, other) {
            (Number::Integer(a), Number::Integer(b)) => int_op(a, b)
                .map(Number::Integer)
                .ok_or(ArithmeticError::Overflow),
            (a, b) => Ok(Number::Float(float_op(a.to_f64(), b.to_f64()))),
        }
    }

    pub fn add(self, other: Number) -> ArithmeticResult {
        self.combine(other, i64::checked_add, |a, b| a + b)
    }

    pub fn sub(self, other: Number) -> ArithmeticResult {
        self.combine(other, i64::checked_sub, |a, b| a - b)
    }

    pub fn mul(self, other: Number) -> ArithmeticResult {
        self.combine(other, i64::checked_mul, |a, b| a * b)
    }

    /// Integer division truncates toward zero. A zero divisor is only an error
    /// for integer division; floats follow IEEE rules.
    pub fn div(self, other: Number) -> ArithmeticResult {
        if let (Number::Integer(_), Number::Integer(0)) = (self, other) {
            return Err(ArithmeticError::DivisionByZero);
        }
        self.combine(other, i64::checked_div, |a, b| a / b)
    }

    /// Floored modulus: the result takes the sign of the divisor.
    pub fn negate(self) -> ArithmeticResult {
        match self {
            Number::Integer(i) => i
                .checked_neg()
                .map(Number::Integer)
                .ok_or(ArithmeticError::Overflow),
            Number::Float(f) => Ok(Number::Float(-f)),
        }
    }

    /// Numeric ordering across kinds. `None` only when a NaN is involved.
    pub fn compare(self, other: Number) -> Option<Ordering> {
        match (self, other) {
            (Number::Integer(a), Number::Integer(b)) => Some(a.cmp(&b)),
            (a, b) => a.to_f64().partial_cmp(&b.to_f64()),
        }
    }
}

/// Renders a float in scientific notation with a signed, two-digit exponent,
/// e.g. `3.14E+00` or `-1.5E-07`.
/// Floored remainder: the result takes the sign of the divisor.
pub fn floored_mod(a: i64, b: i64) -> Result<i64, ArithmeticError> {
    if b == 0 {
        return Err(ArithmeticError::DivisionByZero);
    }
    let rem = a.checked_rem(b).ok_or(ArithmeticError::Overflow)?;
    if rem != 0 && (rem < 0) != (b < 0) {
        Ok(rem + b)
    } else {
        Ok(rem)
    }
}

pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }
    let rendered = format!("{:E}", value);
    match rendered.split_once('E') {
        Some((mantissa, exponent)) => match exponent.parse::<i32>() {
            Ok(exp) => {
                let sign = if exp < 0 { '-' } else { '+' };
                format!("{}E{}{:02}", mantissa, sign, exp.unsigned_abs())
            }
            Err(_) => rendered,
        },
        None => rendered,
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Integer(i) => write!(f, "{}", i),
            Number::Float(x) => write!(f, "{}", format_float(*x)),
        }
    }
}
