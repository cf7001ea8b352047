//! String functions. Positions and lengths count characters, not bytes.

use crate::config::EvalConfig;
use crate::expression::{ExpressionError, ExpressionResult};
use crate::value::Value;

fn check_size(function: &str, requested: usize, config: &EvalConfig) -> ExpressionResult<()> {
    if requested > config.max_string_size {
        return Err(ExpressionError::RangeExceeded {
            function: function.to_string(),
            requested: requested as u64,
            limit: config.max_string_size,
        });
    }
    Ok(())
}

pub(super) fn lower(args: &[Value]) -> ExpressionResult<Value> {
    Ok(Value::string(string_arg!(args[0]).to_lowercase()))
}

pub(super) fn upper(args: &[Value]) -> ExpressionResult<Value> {
    Ok(Value::string(string_arg!(args[0]).to_uppercase()))
}

pub(super) fn length(args: &[Value]) -> ExpressionResult<Value> {
    Ok(Value::from(string_arg!(args[0]).chars().count()))
}

pub(super) fn concat(args: &[Value], config: &EvalConfig) -> ExpressionResult<Value> {
    let mut out = String::new();
    for arg in args {
        let s = string_arg!(arg);
        check_size("CONCAT", out.len() + s.len(), config)?;
        out.push_str(s);
    }
    Ok(Value::String(out))
}

pub(super) fn contains(args: &[Value]) -> ExpressionResult<Value> {
    let haystack = string_arg!(args[0]);
    let needle = string_arg!(args[1]);
    Ok(Value::Boolean(haystack.contains(needle)))
}

/// SUBSTR(s, position [, length]), 0-based; a negative position counts from the end
pub(super) fn substr(args: &[Value]) -> ExpressionResult<Value> {
    let s = string_arg!(args[0]);
    let position = integer_arg!(args[1]);
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len() as i64;
    let start = if position < 0 { len + position } else { position };
    if start < 0 || start > len {
        return Ok(Value::Null);
    }
    let end = match args.get(2) {
        Some(length) => {
            let length = integer_arg!(length);
            if length < 0 {
                return Ok(Value::Null);
            }
            start.saturating_add(length).min(len)
        }
        None => len,
    };
    Ok(Value::String(chars[start as usize..end as usize].iter().collect()))
}

#[derive(Debug, Clone, Copy)]
pub(super) enum TrimSide {
    Both,
    Left,
    Right,
}

/// TRIM(s [, chars]): strips whitespace, or any of `chars`
pub(super) fn trim(args: &[Value], side: TrimSide) -> ExpressionResult<Value> {
    let s = string_arg!(args[0]);
    let set: Option<Vec<char>> = match args.get(1) {
        Some(chars) => Some(string_arg!(chars).chars().collect()),
        None => None,
    };
    let strip = |c: char| match &set {
        Some(set) => set.contains(&c),
        None => c.is_whitespace(),
    };
    let trimmed = match side {
        TrimSide::Both => s.trim_matches(strip),
        TrimSide::Left => s.trim_start_matches(strip),
        TrimSide::Right => s.trim_end_matches(strip),
    };
    Ok(Value::string(trimmed))
}

/// REPLACE(s, old, new [, n]): at most `n` replacements when `n` is non-negative
pub(super) fn replace(args: &[Value]) -> ExpressionResult<Value> {
    let s = string_arg!(args[0]);
    let old = string_arg!(args[1]);
    let new = string_arg!(args[2]);
    if old.is_empty() {
        return Ok(args[0].clone());
    }
    let replaced = match args.get(3) {
        Some(n) => {
            let n = integer_arg!(n);
            if n < 0 {
                s.replace(old, new)
            } else {
                s.replacen(old, new, n as usize)
            }
        }
        None => s.replace(old, new),
    };
    Ok(Value::String(replaced))
}

/// SPLIT(s [, separator]): whitespace-separated words without a separator
pub(super) fn split(args: &[Value]) -> ExpressionResult<Value> {
    let s = string_arg!(args[0]);
    let parts: Vec<Value> = match args.get(1) {
        Some(separator) => {
            let separator = string_arg!(separator);
            if separator.is_empty() {
                s.chars().map(|c| Value::String(c.to_string())).collect()
            } else {
                s.split(separator).map(Value::string).collect()
            }
        }
        None => s.split_whitespace().map(Value::string).collect(),
    };
    Ok(Value::Array(parts))
}

/// Character position of the first occurrence, or -1
pub(super) fn position(args: &[Value]) -> ExpressionResult<Value> {
    let s = string_arg!(args[0]);
    let needle = string_arg!(args[1]);
    let found = s.find(needle).map(|byte| s[..byte].chars().count());
    Ok(found.map_or(Value::Int(-1), Value::from))
}

pub(super) fn repeat(args: &[Value], config: &EvalConfig) -> ExpressionResult<Value> {
    let s = string_arg!(args[0]);
    let n = integer_arg!(args[1]);
    if n < 0 {
        return Ok(Value::Null);
    }
    let requested = s.len().saturating_mul(n as usize);
    check_size("REPEAT", requested, config)?;
    Ok(Value::String(s.repeat(n as usize)))
}

pub(super) fn reverse(args: &[Value]) -> ExpressionResult<Value> {
    Ok(Value::String(string_arg!(args[0]).chars().rev().collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(text: &str) -> Value {
        Value::string(text)
    }

    #[test]
    fn test_substr() -> ExpressionResult<()> {
        assert_eq!(substr(&[s("héllo"), Value::Int(1), Value::Int(3)])?, s("éll"));
        assert_eq!(substr(&[s("hello"), Value::Int(-3)])?, s("llo"));
        assert_eq!(substr(&[s("hello"), Value::Int(5)])?, s(""));
        assert!(substr(&[s("hello"), Value::Int(6)])?.is_null());
        assert!(substr(&[s("hello"), Value::Int(0), Value::Int(-1)])?.is_null());
        Ok(())
    }

    #[test]
    fn test_trim_variants() -> ExpressionResult<()> {
        assert_eq!(trim(&[s("  x  ")], TrimSide::Both)?, s("x"));
        assert_eq!(trim(&[s("  x  ")], TrimSide::Left)?, s("x  "));
        assert_eq!(trim(&[s("--x-"), s("-")], TrimSide::Right)?, s("--x"));
        Ok(())
    }

    #[test]
    fn test_size_limits() {
        let config = EvalConfig {
            max_string_size: 4,
            ..EvalConfig::default()
        };
        assert!(repeat(&[s("ab"), Value::Int(2)], &config).is_ok());
        assert!(matches!(
            repeat(&[s("ab"), Value::Int(3)], &config),
            Err(ExpressionError::RangeExceeded { .. })
        ));
        assert!(concat(&[s("abc"), s("de")], &config).is_err());
    }

    #[test]
    fn test_misc() -> ExpressionResult<()> {
        assert_eq!(position(&[s("héllo"), s("l")])?, Value::Int(2));
        assert_eq!(position(&[s("hello"), s("z")])?, Value::Int(-1));
        assert_eq!(replace(&[s("aaa"), s("a"), s("b"), Value::Int(2)])?, s("bba"));
        assert_eq!(split(&[s("a,b"), s(",")])?, Value::from(vec![s("a"), s("b")]));
        assert_eq!(split(&[s(" a  b ")])?, Value::from(vec![s("a"), s("b")]));
        assert_eq!(reverse(&[s("abc")])?, s("cba"));
        assert_eq!(length(&[s("héllo")])?, Value::Int(5));
        assert!(upper(&[Value::Int(1)])?.is_null());
        Ok(())
    }
}
