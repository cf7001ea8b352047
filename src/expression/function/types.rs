//! Type inspection and conversion functions.

use crate::expression::ExpressionResult;
use crate::value::{Value, ValueType};

/// TYPE(v): the type name, including "missing" and "null"
pub(super) fn type_name(args: &[Value]) -> ExpressionResult<Value> {
    Ok(Value::string(args[0].value_type().name()))
}

fn is_type(args: &[Value], test: impl Fn(ValueType) -> bool) -> ExpressionResult<Value> {
    Ok(Value::Boolean(test(args[0].value_type())))
}

pub(super) fn is_array(args: &[Value]) -> ExpressionResult<Value> {
    is_type(args, |t| t == ValueType::Array)
}

/// Boolean, number or string
pub(super) fn is_atom(args: &[Value]) -> ExpressionResult<Value> {
    is_type(args, |t| {
        matches!(t, ValueType::Boolean | ValueType::Number | ValueType::String)
    })
}

pub(super) fn is_boolean(args: &[Value]) -> ExpressionResult<Value> {
    is_type(args, |t| t == ValueType::Boolean)
}

pub(super) fn is_number(args: &[Value]) -> ExpressionResult<Value> {
    is_type(args, |t| t == ValueType::Number)
}

pub(super) fn is_object(args: &[Value]) -> ExpressionResult<Value> {
    is_type(args, |t| t == ValueType::Object)
}

pub(super) fn is_string(args: &[Value]) -> ExpressionResult<Value> {
    is_type(args, |t| t == ValueType::String)
}

pub(super) fn is_binary(args: &[Value]) -> ExpressionResult<Value> {
    is_type(args, |t| t == ValueType::Binary)
}

/// Arrays pass through; anything else is wrapped
pub(super) fn to_array(args: &[Value]) -> ExpressionResult<Value> {
    Ok(match &args[0] {
        Value::Array(_) => args[0].clone(),
        other => Value::Array(vec![other.clone()]),
    })
}

pub(super) fn to_boolean(args: &[Value]) -> ExpressionResult<Value> {
    Ok(Value::Boolean(args[0].truth()))
}

/// Numbers pass through, booleans become 0/1, numeric strings are parsed.
pub(super) fn to_number(args: &[Value]) -> ExpressionResult<Value> {
    Ok(match &args[0] {
        Value::Int(_) | Value::Float(_) => args[0].clone(),
        Value::Boolean(b) => Value::Int(*b as i64),
        Value::String(s) => {
            let s = s.trim();
            match s.parse::<i64>() {
                Ok(i) => Value::Int(i),
                Err(_) => s
                    .parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map_or(Value::Null, Value::Float),
            }
        }
        _ => Value::Null,
    })
}

/// Strings pass through; other values are JSON-encoded. Binary is NULL.
pub(super) fn to_string(args: &[Value]) -> ExpressionResult<Value> {
    Ok(match &args[0] {
        Value::String(_) => args[0].clone(),
        Value::Binary(_) => Value::Null,
        other => Value::String(other.to_json().to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_type_names() -> ExpressionResult<()> {
        assert_eq!(type_name(&[Value::Missing])?, Value::string("missing"));
        assert_eq!(type_name(&[Value::Float(1.5)])?, Value::string("number"));
        assert_eq!(is_atom(&[Value::string("x")])?, Value::Boolean(true));
        assert_eq!(is_atom(&[Value::from(vec![])])?, Value::Boolean(false));
        Ok(())
    }

    #[test]
    fn test_conversions() -> ExpressionResult<()> {
        assert_eq!(to_number(&[Value::string(" 42 ")])?, Value::Int(42));
        assert_eq!(to_number(&[Value::string("1.5")])?, Value::Float(1.5));
        assert!(to_number(&[Value::string("abc")])?.is_null());
        assert_eq!(to_number(&[Value::Boolean(true)])?, Value::Int(1));
        assert_eq!(to_string(&[Value::Int(3)])?, Value::string("3"));
        assert_eq!(
            to_string(&[Value::from(json!({"a": [1]}))])?,
            Value::string(r#"{"a":[1]}"#)
        );
        assert_eq!(to_array(&[Value::Int(1)])?, Value::from(json!([1])));
        assert_eq!(to_boolean(&[Value::string("")])?, Value::Boolean(false));
        Ok(())
    }
}
