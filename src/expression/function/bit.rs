//! Bitwise functions over 64-bit integers. Bit positions are 1-based from
//! the least significant bit.

use crate::expression::ExpressionResult;
use crate::value::Value;

fn fold(args: &[Value], f: impl Fn(i64, i64) -> i64) -> ExpressionResult<Value> {
    let mut acc = integer_arg!(args[0]);
    for arg in &args[1..] {
        acc = f(acc, integer_arg!(arg));
    }
    Ok(Value::Int(acc))
}

pub(super) fn and(args: &[Value]) -> ExpressionResult<Value> {
    fold(args, |a, b| a & b)
}

pub(super) fn or(args: &[Value]) -> ExpressionResult<Value> {
    fold(args, |a, b| a | b)
}

pub(super) fn xor(args: &[Value]) -> ExpressionResult<Value> {
    fold(args, |a, b| a ^ b)
}

pub(super) fn not(args: &[Value]) -> ExpressionResult<Value> {
    Ok(Value::Int(!integer_arg!(args[0])))
}

/// BITSHIFT(n, shift [, rotate]): positive shifts left, negative right.
pub(super) fn shift(args: &[Value]) -> ExpressionResult<Value> {
    let n = integer_arg!(args[0]) as u64;
    let shift = integer_arg!(args[1]);
    let rotate = match args.get(2) {
        Some(Value::Boolean(b)) => *b,
        Some(_) => return Ok(Value::Null),
        None => false,
    };

    let amount = shift.unsigned_abs();
    let shifted = if rotate {
        let amount = (amount % 64) as u32;
        if shift >= 0 {
            n.rotate_left(amount)
        } else {
            n.rotate_right(amount)
        }
    } else if amount >= 64 {
        0
    } else if shift >= 0 {
        n << amount
    } else {
        n >> amount
    };
    Ok(Value::Int(shifted as i64))
}

/// A single position or an array of positions, as a bit mask
fn mask(positions: &Value) -> Option<u64> {
    let bit = |position: &Value| -> Option<u64> {
        let position = position.as_i64()?;
        if (1..=64).contains(&position) {
            Some(1u64 << (position - 1))
        } else {
            None
        }
    };
    match positions {
        Value::Array(positions) => positions.iter().try_fold(0u64, |acc, p| Some(acc | bit(p)?)),
        single => bit(single),
    }
}

pub(super) fn set(args: &[Value]) -> ExpressionResult<Value> {
    let n = integer_arg!(args[0]) as u64;
    let Some(mask) = mask(&args[1]) else {
        return Ok(Value::Null);
    };
    Ok(Value::Int((n | mask) as i64))
}

pub(super) fn clear(args: &[Value]) -> ExpressionResult<Value> {
    let n = integer_arg!(args[0]) as u64;
    let Some(mask) = mask(&args[1]) else {
        return Ok(Value::Null);
    };
    Ok(Value::Int((n & !mask) as i64))
}

/// BITTEST(n, positions [, all]): any (default) or all of the bits are set
pub(super) fn bit_test(args: &[Value]) -> ExpressionResult<Value> {
    let n = integer_arg!(args[0]) as u64;
    let Some(mask) = mask(&args[1]) else {
        return Ok(Value::Null);
    };
    let all = match args.get(2) {
        Some(Value::Boolean(b)) => *b,
        Some(_) => return Ok(Value::Null),
        None => false,
    };
    let hit = if all { n & mask == mask } else { n & mask != 0 };
    Ok(Value::Boolean(hit))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> Vec<Value> {
        values.iter().map(|i| Value::Int(*i)).collect()
    }

    #[test]
    fn test_logic() -> ExpressionResult<()> {
        assert_eq!(and(&ints(&[0b1100, 0b1010]))?, Value::Int(0b1000));
        assert_eq!(or(&ints(&[0b1100, 0b1010, 1]))?, Value::Int(0b1111));
        assert_eq!(xor(&ints(&[0b1100, 0b1010]))?, Value::Int(0b0110));
        assert_eq!(not(&ints(&[0]))?, Value::Int(-1));
        Ok(())
    }

    #[test]
    fn test_non_integral_is_null() -> ExpressionResult<()> {
        assert!(and(&[Value::Float(1.5), Value::Int(1)])?.is_null());
        assert!(not(&[Value::string("1")])?.is_null());
        assert_eq!(and(&[Value::Float(3.0), Value::Int(1)])?, Value::Int(1));
        Ok(())
    }

    #[test]
    fn test_shift() -> ExpressionResult<()> {
        assert_eq!(shift(&ints(&[1, 4]))?, Value::Int(16));
        assert_eq!(shift(&ints(&[16, -4]))?, Value::Int(1));
        assert_eq!(shift(&ints(&[1, 64]))?, Value::Int(0));
        assert_eq!(
            shift(&[Value::Int(1), Value::Int(-1), Value::Boolean(true)])?,
            Value::Int(i64::MIN)
        );
        Ok(())
    }

    #[test]
    fn test_positions() -> ExpressionResult<()> {
        assert_eq!(set(&ints(&[0, 3]))?, Value::Int(4));
        assert_eq!(set(&[Value::Int(0), Value::from(ints(&[1, 2]))])?, Value::Int(3));
        assert_eq!(clear(&ints(&[7, 1]))?, Value::Int(6));
        assert!(set(&ints(&[0, 65]))?.is_null());
        assert_eq!(bit_test(&ints(&[6, 2]))?, Value::Boolean(true));
        assert_eq!(
            bit_test(&[Value::Int(6), Value::from(ints(&[1, 2])), Value::Boolean(true)])?,
            Value::Boolean(false)
        );
        Ok(())
    }
}
