//! Comparison, JSON and control functions.

use crate::context::Context;
use crate::expression::{ExpressionError, ExpressionResult};
use crate::value::Value;

/// Largest known argument; MISSING and NULL are skipped
pub(super) fn greatest(args: &[Value]) -> ExpressionResult<Value> {
    Ok(args
        .iter()
        .filter(|v| !v.is_unknown())
        .max()
        .cloned()
        .unwrap_or(Value::Null))
}

pub(super) fn least(args: &[Value]) -> ExpressionResult<Value> {
    Ok(args
        .iter()
        .filter(|v| !v.is_unknown())
        .min()
        .cloned()
        .unwrap_or(Value::Null))
}

pub(super) fn encode_json(args: &[Value]) -> ExpressionResult<Value> {
    Ok(Value::String(args[0].to_json().to_string()))
}

/// Invalid JSON text is NULL
pub(super) fn decode_json(args: &[Value]) -> ExpressionResult<Value> {
    let text = string_arg!(args[0]);
    Ok(serde_json::from_str::<serde_json::Value>(text).map_or(Value::Null, Value::from))
}

pub(super) fn infer_value(args: &[Value], ctx: &dyn Context) -> ExpressionResult<Value> {
    let options = args.get(1).cloned().unwrap_or(Value::Missing);
    ctx.infer_value(&args[0], &options)
}

/// Always fails with an abort carrying the message
pub(super) fn abort(args: &[Value]) -> ExpressionResult<Value> {
    let message = match args.first() {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "ABORT() function called".to_string(),
    };
    Err(ExpressionError::Abort(message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greatest_least_skip_unknowns() -> ExpressionResult<()> {
        let args = [Value::Null, Value::Int(3), Value::Missing, Value::Float(7.5)];
        assert_eq!(greatest(&args)?, Value::Float(7.5));
        assert_eq!(least(&args)?, Value::Int(3));
        assert!(greatest(&[Value::Null, Value::Missing])?.is_null());
        Ok(())
    }

    #[test]
    fn test_json() -> ExpressionResult<()> {
        let decoded = decode_json(&[Value::string(r#"{"a": [1, null]}"#)])?;
        assert_eq!(decoded, Value::from(serde_json::json!({"a": [1, null]})));
        assert_eq!(encode_json(&[decoded])?, Value::string(r#"{"a":[1,null]}"#));
        assert!(decode_json(&[Value::string("{")])?.is_null());
        Ok(())
    }

    #[test]
    fn test_abort() {
        let err = abort(&[Value::string("stop here")]).unwrap_err();
        assert_eq!(err, ExpressionError::Abort("stop here".to_string()));
        assert!(abort(&[]).unwrap_err().is_abort());
    }
}
