//! OBJECT_* functions. Field order is the sorted key order.

use crate::expression::ExpressionResult;
use crate::value::Value;
use std::collections::BTreeMap;

pub(super) fn length(args: &[Value]) -> ExpressionResult<Value> {
    Ok(Value::from(object_arg!(args[0]).len()))
}

pub(super) fn names(args: &[Value]) -> ExpressionResult<Value> {
    let object = object_arg!(args[0]);
    Ok(Value::Array(object.keys().map(Value::string).collect()))
}

pub(super) fn values(args: &[Value]) -> ExpressionResult<Value> {
    let object = object_arg!(args[0]);
    Ok(Value::Array(object.values().cloned().collect()))
}

/// `[{"name": key, "val": value}, ...]`
pub(super) fn pairs(args: &[Value]) -> ExpressionResult<Value> {
    let object = object_arg!(args[0]);
    let pairs = object
        .iter()
        .map(|(name, value)| {
            let mut pair = BTreeMap::new();
            pair.insert("name".to_string(), Value::string(name));
            pair.insert("val".to_string(), value.clone());
            Value::Object(pair)
        })
        .collect();
    Ok(Value::Array(pairs))
}

/// The object and name propagate MISSING; the value may be MISSING
fn missing_target(args: &[Value]) -> bool {
    args[0].is_missing() || args[1].is_missing()
}

/// Add a field unless it already exists
pub(super) fn add(args: &[Value]) -> ExpressionResult<Value> {
    if missing_target(args) {
        return Ok(Value::Missing);
    }
    let object = object_arg!(args[0]);
    let name = string_arg!(args[1]);
    if object.contains_key(name) || args[2].is_missing() {
        return Ok(args[0].clone());
    }
    let mut out = object.clone();
    out.insert(name.to_string(), args[2].clone());
    Ok(Value::Object(out))
}

/// Set a field; a MISSING value removes it
pub(super) fn put(args: &[Value]) -> ExpressionResult<Value> {
    if missing_target(args) {
        return Ok(Value::Missing);
    }
    let object = object_arg!(args[0]);
    let name = string_arg!(args[1]);
    let mut out = object.clone();
    if args[2].is_missing() {
        out.remove(name);
    } else {
        out.insert(name.to_string(), args[2].clone());
    }
    Ok(Value::Object(out))
}

pub(super) fn remove(args: &[Value]) -> ExpressionResult<Value> {
    let mut out = object_arg!(args[0]).clone();
    for name in &args[1..] {
        out.remove(string_arg!(name));
    }
    Ok(Value::Object(out))
}

/// Merge left to right; later fields win
pub(super) fn concat(args: &[Value]) -> ExpressionResult<Value> {
    let mut out = BTreeMap::new();
    for arg in args {
        for (name, value) in object_arg!(arg) {
            out.insert(name.clone(), value.clone());
        }
    }
    Ok(Value::Object(out))
}
