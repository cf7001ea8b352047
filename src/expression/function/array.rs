//! ARRAY_* functions.

use crate::config::EvalConfig;
use crate::expression::{ExpressionError, ExpressionResult};
use crate::pool::EvalPools;
use crate::value::{resolve_position, Value};

/// Reject outputs larger than the configured array limit
fn check_size(function: &str, requested: u64, config: &EvalConfig) -> ExpressionResult<()> {
    if requested > config.max_array_size as u64 {
        return Err(ExpressionError::RangeExceeded {
            function: function.to_string(),
            requested,
            limit: config.max_array_size,
        });
    }
    Ok(())
}

/// Values after the leading array may be NULL, but not MISSING
fn any_missing(args: &[Value]) -> bool {
    args.iter().any(Value::is_missing)
}

pub(super) fn append(args: &[Value]) -> ExpressionResult<Value> {
    if any_missing(args) {
        return Ok(Value::Missing);
    }
    let array = array_arg!(args[0]);
    let mut out = array.to_vec();
    out.extend_from_slice(&args[1..]);
    Ok(Value::Array(out))
}

/// ARRAY_PREPEND(value..., array)
pub(super) fn prepend(args: &[Value]) -> ExpressionResult<Value> {
    if any_missing(args) {
        return Ok(Value::Missing);
    }
    let Some((last, values)) = args.split_last() else {
        return Ok(Value::Null);
    };
    let array = array_arg!(last);
    let mut out = values.to_vec();
    out.extend_from_slice(array);
    Ok(Value::Array(out))
}

/// Append the values not already present
pub(super) fn put(args: &[Value]) -> ExpressionResult<Value> {
    if any_missing(args) {
        return Ok(Value::Missing);
    }
    let array = array_arg!(args[0]);
    let mut out = array.to_vec();
    for value in &args[1..] {
        if !out.contains(value) {
            out.push(value.clone());
        }
    }
    Ok(Value::Array(out))
}

/// ARRAY_INSERT(array, position, value...)
pub(super) fn insert(args: &[Value]) -> ExpressionResult<Value> {
    if any_missing(args) {
        return Ok(Value::Missing);
    }
    let array = array_arg!(args[0]);
    let position = integer_arg!(args[1]);
    let len = array.len() as i64;
    let at = if position < 0 { len + position } else { position };
    if at < 0 || at > len {
        return Ok(Value::Null);
    }
    let at = at as usize;
    let mut out = Vec::with_capacity(array.len() + args.len() - 2);
    out.extend_from_slice(&array[..at]);
    out.extend_from_slice(&args[2..]);
    out.extend_from_slice(&array[at..]);
    Ok(Value::Array(out))
}

/// Remove every element equal to one of the values
pub(super) fn remove(args: &[Value]) -> ExpressionResult<Value> {
    if any_missing(args) {
        return Ok(Value::Missing);
    }
    let array = array_arg!(args[0]);
    let removed = &args[1..];
    let out = array
        .iter()
        .filter(|v| !removed.contains(v))
        .cloned()
        .collect();
    Ok(Value::Array(out))
}

pub(super) fn concat(args: &[Value]) -> ExpressionResult<Value> {
    let mut out = Vec::new();
    for arg in args {
        out.extend_from_slice(array_arg!(arg));
    }
    Ok(Value::Array(out))
}

pub(super) fn contains(args: &[Value]) -> ExpressionResult<Value> {
    if any_missing(args) {
        return Ok(Value::Missing);
    }
    let array = array_arg!(args[0]);
    Ok(Value::Boolean(array.contains(&args[1])))
}

/// Zero-based position of the first equal element, or -1
pub(super) fn position(args: &[Value]) -> ExpressionResult<Value> {
    if any_missing(args) {
        return Ok(Value::Missing);
    }
    let array = array_arg!(args[0]);
    let found = array.iter().position(|v| v == &args[1]);
    Ok(found.map_or(Value::Int(-1), Value::from))
}

pub(super) fn length(args: &[Value]) -> ExpressionResult<Value> {
    Ok(Value::from(array_arg!(args[0]).len()))
}

/// Number of non-MISSING, non-NULL elements
pub(super) fn count(args: &[Value]) -> ExpressionResult<Value> {
    let array = array_arg!(args[0]);
    Ok(Value::from(array.iter().filter(|v| !v.is_unknown()).count()))
}

/// Sum of the numeric elements; other elements are ignored
pub(super) fn sum(args: &[Value]) -> ExpressionResult<Value> {
    let array = array_arg!(args[0]);
    let mut total = Value::Int(0);
    for element in array.iter().filter(|v| v.is_number()) {
        total = total.add_number(element).unwrap_or(Value::Null);
    }
    Ok(total)
}

pub(super) fn avg(args: &[Value]) -> ExpressionResult<Value> {
    let array = array_arg!(args[0]);
    let numbers: Vec<f64> = array.iter().filter_map(Value::as_f64).collect();
    if numbers.is_empty() {
        return Ok(Value::Null);
    }
    Ok(Value::number(numbers.iter().sum::<f64>() / numbers.len() as f64))
}

pub(super) fn max(args: &[Value]) -> ExpressionResult<Value> {
    let array = array_arg!(args[0]);
    Ok(array
        .iter()
        .filter(|v| !v.is_unknown())
        .max()
        .cloned()
        .unwrap_or(Value::Null))
}

pub(super) fn min(args: &[Value]) -> ExpressionResult<Value> {
    let array = array_arg!(args[0]);
    Ok(array
        .iter()
        .filter(|v| !v.is_unknown())
        .min()
        .cloned()
        .unwrap_or(Value::Null))
}

/// First element that is neither MISSING nor NULL
pub(super) fn if_null(args: &[Value]) -> ExpressionResult<Value> {
    let array = array_arg!(args[0]);
    Ok(array
        .iter()
        .find(|v| !v.is_unknown())
        .cloned()
        .unwrap_or(Value::Null))
}

/// Distinct elements in order of first occurrence. The sorted scratch list
/// comes from the value pool.
pub(super) fn distinct(args: &[Value], pools: &EvalPools) -> ExpressionResult<Value> {
    let array = array_arg!(args[0]);
    let mut seen = pools.values.acquire();
    let mut out = Vec::with_capacity(array.len());
    for element in array {
        if let Err(at) = seen.binary_search(element) {
            seen.insert(at, element.clone());
            out.push(element.clone());
        }
    }
    Ok(Value::Array(out))
}

/// Distinct elements of the first array present in every other array
pub(super) fn intersect(args: &[Value], pools: &EvalPools) -> ExpressionResult<Value> {
    let mut arrays = Vec::with_capacity(args.len());
    for arg in args {
        arrays.push(array_arg!(arg));
    }
    let Some((first, rest)) = arrays.split_first() else {
        return Ok(Value::Null);
    };
    let mut seen = pools.values.acquire();
    let mut out = Vec::new();
    for element in first.iter() {
        if rest.iter().all(|other| other.contains(element)) {
            if let Err(at) = seen.binary_search(element) {
                seen.insert(at, element.clone());
                out.push(element.clone());
            }
        }
    }
    Ok(Value::Array(out))
}

/// Distinct elements of all arrays in order of first occurrence
pub(super) fn union(args: &[Value], pools: &EvalPools) -> ExpressionResult<Value> {
    let mut seen = pools.values.acquire();
    let mut out = Vec::new();
    for arg in args {
        for element in array_arg!(arg) {
            if let Err(at) = seen.binary_search(element) {
                seen.insert(at, element.clone());
                out.push(element.clone());
            }
        }
    }
    Ok(Value::Array(out))
}

/// Flatten nested arrays up to `depth` levels; a negative depth flattens fully.
pub(super) fn flatten(args: &[Value]) -> ExpressionResult<Value> {
    let array = array_arg!(args[0]);
    let depth = integer_arg!(args[1]);
    let mut out = Vec::with_capacity(array.len());
    flatten_into(array, depth, &mut out);
    Ok(Value::Array(out))
}

fn flatten_into(array: &[Value], depth: i64, out: &mut Vec<Value>) {
    for element in array {
        match element {
            Value::Array(inner) if depth != 0 => flatten_into(inner, depth - 1, out),
            other => out.push(other.clone()),
        }
    }
}

pub(super) fn reverse(args: &[Value]) -> ExpressionResult<Value> {
    let array = array_arg!(args[0]);
    Ok(Value::Array(array.iter().rev().cloned().collect()))
}

/// Sort by collation order
pub(super) fn sort(args: &[Value]) -> ExpressionResult<Value> {
    let mut out = array_arg!(args[0]).to_vec();
    out.sort();
    Ok(Value::Array(out))
}

/// ARRAY_REPLACE(array, old, new [, max])
pub(super) fn replace(args: &[Value]) -> ExpressionResult<Value> {
    let array = array_arg!(args[0]);
    let limit = match args.get(3) {
        Some(max) => {
            let max = integer_arg!(max);
            if max < 0 {
                usize::MAX
            } else {
                max as usize
            }
        }
        None => usize::MAX,
    };
    let mut replaced = 0;
    let out = array
        .iter()
        .map(|element| {
            if replaced < limit && element == &args[1] {
                replaced += 1;
                args[2].clone()
            } else {
                element.clone()
            }
        })
        .collect();
    Ok(Value::Array(out))
}

/// ARRAY_RANGE(start, end [, step]): numbers from `start` towards `end`
/// (exclusive) by `step`.
pub(super) fn range(args: &[Value], config: &EvalConfig) -> ExpressionResult<Value> {
    let start = number_arg!(args[0]);
    let end = number_arg!(args[1]);
    let step = match args.get(2) {
        Some(step) => step.clone(),
        None => Value::Int(1),
    };
    let step_f = number_arg!(step);
    if step_f == 0.0 || !start.is_finite() || !end.is_finite() || !step_f.is_finite() {
        return Ok(Value::Null);
    }

    let steps = (end - start) / step_f;
    let count = if steps > 0.0 { steps.ceil() } else { 0.0 };
    let requested = if count >= u64::MAX as f64 {
        u64::MAX
    } else {
        count as u64
    };
    check_size("ARRAY_RANGE", requested, config)?;

    let integral = matches!((&args[0], &step), (Value::Int(_), Value::Int(_)));
    let out = (0..requested)
        .map(|i| {
            let value = start + step_f * i as f64;
            if integral {
                Value::Int(value as i64)
            } else {
                Value::Float(value)
            }
        })
        .collect();
    Ok(Value::Array(out))
}

/// ARRAY_REPEAT(value, n)
pub(super) fn repeat(args: &[Value], config: &EvalConfig) -> ExpressionResult<Value> {
    let n = integer_arg!(args[1]);
    if n < 0 {
        return Ok(Value::Null);
    }
    check_size("ARRAY_REPEAT", n as u64, config)?;
    Ok(Value::Array(vec![args[0].clone(); n as usize]))
}

/// ARRAY_SWAP(array, a, b). Positions may count from the end.
pub(super) fn swap(args: &[Value]) -> ExpressionResult<Value> {
    let array = array_arg!(args[0]);
    let (Some(a), Some(b)) = (
        resolve_index(&args[1], array.len()),
        resolve_index(&args[2], array.len()),
    ) else {
        return Ok(Value::Null);
    };
    if a == b {
        return Ok(args[0].clone());
    }
    let mut out = array.to_vec();
    out.swap(a, b);
    Ok(Value::Array(out))
}

/// ARRAY_MOVE(array, from, to). Positions may count from the end.
pub(super) fn move_element(args: &[Value]) -> ExpressionResult<Value> {
    let array = array_arg!(args[0]);
    let (Some(from), Some(to)) = (
        resolve_index(&args[1], array.len()),
        resolve_index(&args[2], array.len()),
    ) else {
        return Ok(Value::Null);
    };
    if from == to {
        return Ok(args[0].clone());
    }
    let mut out = array.to_vec();
    let element = out.remove(from);
    out.insert(to, element);
    Ok(Value::Array(out))
}

fn resolve_index(position: &Value, len: usize) -> Option<usize> {
    resolve_position(position.as_i64()?, len)
}
