//! Numeric functions. Non-numeric operands yield NULL.

use crate::expression::ExpressionResult;
use crate::value::Value;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Non-finite results (NaN, infinities) are reported as NULL
fn finite(f: f64) -> Value {
    if f.is_finite() {
        Value::number(f)
    } else {
        Value::Null
    }
}

fn unary(args: &[Value], f: impl Fn(f64) -> f64) -> ExpressionResult<Value> {
    Ok(finite(f(number_arg!(args[0]))))
}

pub(super) fn abs(args: &[Value]) -> ExpressionResult<Value> {
    match &args[0] {
        Value::Int(i) => Ok(i
            .checked_abs()
            .map_or(Value::Float((*i as f64).abs()), Value::Int)),
        _ => unary(args, f64::abs),
    }
}

pub(super) fn ceil(args: &[Value]) -> ExpressionResult<Value> {
    unary(args, f64::ceil)
}

pub(super) fn floor(args: &[Value]) -> ExpressionResult<Value> {
    unary(args, f64::floor)
}

/// Scale by 10^digits, apply `f`, scale back
fn with_digits(args: &[Value], f: impl Fn(f64) -> f64) -> ExpressionResult<Value> {
    let n = number_arg!(args[0]);
    let digits = match args.get(1) {
        Some(digits) => integer_arg!(digits),
        None => 0,
    };
    if digits == 0 {
        return Ok(finite(f(n)));
    }
    let scale = 10f64.powi(digits.clamp(-308, 308) as i32);
    Ok(finite(f(n * scale) / scale))
}

/// Half away from zero
pub(super) fn round(args: &[Value]) -> ExpressionResult<Value> {
    with_digits(args, f64::round)
}

pub(super) fn trunc(args: &[Value]) -> ExpressionResult<Value> {
    with_digits(args, f64::trunc)
}

pub(super) fn sqrt(args: &[Value]) -> ExpressionResult<Value> {
    unary(args, f64::sqrt)
}

pub(super) fn power(args: &[Value]) -> ExpressionResult<Value> {
    let base = number_arg!(args[0]);
    let exponent = number_arg!(args[1]);
    Ok(finite(base.powf(exponent)))
}

pub(super) fn exp(args: &[Value]) -> ExpressionResult<Value> {
    unary(args, f64::exp)
}

pub(super) fn ln(args: &[Value]) -> ExpressionResult<Value> {
    unary(args, f64::ln)
}

/// Base 10
pub(super) fn log(args: &[Value]) -> ExpressionResult<Value> {
    unary(args, f64::log10)
}

pub(super) fn sign(args: &[Value]) -> ExpressionResult<Value> {
    let n = number_arg!(args[0]);
    let sign = if n > 0.0 {
        1
    } else if n < 0.0 {
        -1
    } else {
        0
    };
    Ok(Value::Int(sign))
}

pub(super) fn pi() -> ExpressionResult<Value> {
    Ok(Value::Float(std::f64::consts::PI))
}

/// Uniform in [0, 1). An integral seed gives a reproducible value.
pub(super) fn random(args: &[Value]) -> ExpressionResult<Value> {
    let value = match args.first() {
        Some(seed) => {
            let seed = integer_arg!(seed);
            StdRng::seed_from_u64(seed as u64).gen::<f64>()
        }
        None => rand::thread_rng().gen::<f64>(),
    };
    Ok(Value::Float(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rounding() -> ExpressionResult<()> {
        assert_eq!(round(&[Value::Float(2.5)])?, Value::Int(3));
        assert_eq!(round(&[Value::Float(-2.5)])?, Value::Int(-3));
        assert_eq!(round(&[Value::Float(3.14159), Value::Int(2)])?, Value::Float(3.14));
        assert_eq!(trunc(&[Value::Float(-3.99)])?, Value::Int(-3));
        assert_eq!(ceil(&[Value::Float(1.2)])?, Value::Int(2));
        assert_eq!(floor(&[Value::Float(-1.2)])?, Value::Int(-2));
        Ok(())
    }

    #[test]
    fn test_domain_errors_are_null() -> ExpressionResult<()> {
        assert!(sqrt(&[Value::Int(-1)])?.is_null());
        assert!(ln(&[Value::Int(0)])?.is_null());
        assert!(abs(&[Value::string("x")])?.is_null());
        Ok(())
    }

    #[test]
    fn test_basic() -> ExpressionResult<()> {
        assert_eq!(abs(&[Value::Int(-4)])?, Value::Int(4));
        assert_eq!(power(&[Value::Int(2), Value::Int(10)])?, Value::Int(1024));
        assert_eq!(sign(&[Value::Float(-0.5)])?, Value::Int(-1));
        assert_eq!(log(&[Value::Int(1)])?, Value::Int(0));
        Ok(())
    }

    #[test]
    fn test_seeded_random_is_reproducible() -> ExpressionResult<()> {
        let a = random(&[Value::Int(42)])?;
        let b = random(&[Value::Int(42)])?;
        assert_eq!(a, b);
        let unseeded = random(&[])?.as_f64().unwrap_or(-1.0);
        assert!((0.0..1.0).contains(&unseeded));
        Ok(())
    }
}
