//! Conditional functions for unknown values.

use crate::expression::function::Builtin;
use crate::expression::{Expression, ExpressionResult};
use crate::value::Value;

/// Whether `value` ends the search of IFMISSING, IFNULL or IFMISSINGORNULL
fn accepts(builtin: Builtin, value: &Value) -> bool {
    match builtin {
        Builtin::IfMissing => !value.is_missing(),
        Builtin::IfNull => !value.is_null(),
        _ => !value.is_unknown(),
    }
}

/// First accepted argument, or NULL
pub(super) fn first_accepted(builtin: Builtin, args: &[Value]) -> Value {
    args.iter()
        .find(|v| accepts(builtin, v))
        .cloned()
        .unwrap_or(Value::Null)
}

/// Evaluate operands left to right, stopping at the first accepted value.
/// Later operands are never evaluated.
pub(crate) fn evaluate_lazy<F>(
    builtin: Builtin,
    operands: &[Expression],
    mut evaluate: F,
) -> ExpressionResult<Value>
where
    F: FnMut(&Expression) -> ExpressionResult<Value>,
{
    for operand in operands {
        let value = evaluate(operand)?;
        if accepts(builtin, &value) {
            return Ok(value);
        }
    }
    Ok(Value::Null)
}

/// MISSING when both arguments are equal, else the first
pub(super) fn missing_if(args: &[Value]) -> ExpressionResult<Value> {
    Ok(if args[0] == args[1] {
        Value::Missing
    } else {
        args[0].clone()
    })
}

/// NULL when both arguments are equal, else the first
pub(super) fn null_if(args: &[Value]) -> ExpressionResult<Value> {
    Ok(if args[0] == args[1] {
        Value::Null
    } else {
        args[0].clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::ExpressionError;

    #[test]
    fn test_first_accepted() {
        let args = [Value::Missing, Value::Null, Value::Int(1)];
        assert!(first_accepted(Builtin::IfMissing, &args).is_null());
        assert!(first_accepted(Builtin::IfNull, &args).is_missing());
        assert_eq!(first_accepted(Builtin::IfMissingOrNull, &args), Value::Int(1));
        assert!(first_accepted(Builtin::IfMissingOrNull, &args[..2]).is_null());
    }

    #[test]
    fn test_lazy_stops_early() -> ExpressionResult<()> {
        let operands = vec![
            Expression::constant(1),
            Expression::function("ABORT", vec![])?,
        ];
        let mut evaluated = 0;
        let result = evaluate_lazy(Builtin::IfMissing, &operands, |e| {
            evaluated += 1;
            match e {
                Expression::Constant(v) => Ok(v.clone()),
                _ => Err(ExpressionError::Abort("evaluated".to_string())),
            }
        })?;
        assert_eq!(result, Value::Int(1));
        assert_eq!(evaluated, 1);
        Ok(())
    }

    #[test]
    fn test_if_equal() -> ExpressionResult<()> {
        assert!(missing_if(&[Value::Int(1), Value::Float(1.0)])?.is_missing());
        assert!(null_if(&[Value::string("a"), Value::string("a")])?.is_null());
        assert_eq!(null_if(&[Value::Int(1), Value::Int(2)])?, Value::Int(1));
        Ok(())
    }
}
