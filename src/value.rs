//! Document values with a total collation order.
//!
//! The collation order across types is
//! MISSING < NULL < FALSE < TRUE < NUMBER < STRING < ARRAY < OBJECT < BINARY.
//! Equality and ordering on `Value` follow that collation, so `Int(1)` and
//! `Float(1.0)` compare equal.

use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Largest magnitude at which every integer is exactly representable as f64.
const MAX_EXACT_FLOAT_INT: f64 = 9_007_199_254_740_992.0;

/// Type tags, declared in collation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValueType {
    Missing,
    Null,
    Boolean,
    Number,
    String,
    Array,
    Object,
    Binary,
}

impl ValueType {
    /// Name reported by the TYPE() function
    pub fn name(&self) -> &'static str {
        match self {
            ValueType::Missing => "missing",
            ValueType::Null => "null",
            ValueType::Boolean => "boolean",
            ValueType::Number => "number",
            ValueType::String => "string",
            ValueType::Array => "array",
            ValueType::Object => "object",
            ValueType::Binary => "binary",
        }
    }
}

/// A document value
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Field or operand not present
    #[default]
    Missing,
    Null,
    Boolean(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
    Binary(Bytes),
}

impl Value {
    /// Build a number from a float, keeping integral results as integers.
    pub fn number(f: f64) -> Self {
        if f.fract() == 0.0 && f.abs() < MAX_EXACT_FLOAT_INT && !(f == 0.0 && f.is_sign_negative()) {
            Value::Int(f as i64)
        } else {
            Value::Float(f)
        }
    }

    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn empty_object() -> Self {
        Value::Object(BTreeMap::new())
    }

    /// Get the type tag of this value
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Missing => ValueType::Missing,
            Value::Null => ValueType::Null,
            Value::Boolean(_) => ValueType::Boolean,
            Value::Int(_) | Value::Float(_) => ValueType::Number,
            Value::String(_) => ValueType::String,
            Value::Array(_) => ValueType::Array,
            Value::Object(_) => ValueType::Object,
            Value::Binary(_) => ValueType::Binary,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// MISSING or NULL
    pub fn is_unknown(&self) -> bool {
        matches!(self, Value::Missing | Value::Null)
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Integral view of a number. Non-integral or out-of-range floats yield None.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) => {
                if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64 {
                    Some(*f as i64)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Truth coercion used by logical operators and predicates.
    pub fn truth(&self) -> bool {
        match self {
            Value::Missing | Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0 && !f.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Object(o) => !o.is_empty(),
            Value::Binary(b) => !b.is_empty(),
        }
    }

    /// Field lookup. Non-objects and absent fields are MISSING.
    pub fn field(&self, name: &str) -> Value {
        match self {
            Value::Object(o) => o.get(name).cloned().unwrap_or(Value::Missing),
            _ => Value::Missing,
        }
    }

    /// Positional lookup with negative-from-end addressing. Out of range is MISSING.
    pub fn index(&self, index: i64) -> Value {
        match self {
            Value::Array(a) => match resolve_position(index, a.len()) {
                Some(i) => a[i].clone(),
                None => Value::Missing,
            },
            _ => Value::Missing,
        }
    }

    /// Total collation order over all values.
    pub fn collate(&self, other: &Value) -> Ordering {
        let by_type = self.value_type().cmp(&other.value_type());
        if by_type != Ordering::Equal {
            return by_type;
        }

        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                let a = self.as_f64().unwrap_or_default();
                let b = other.as_f64().unwrap_or_default();
                a.partial_cmp(&b).unwrap_or_else(|| a.total_cmp(&b))
            }
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let ord = x.collate(y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Value::Object(a), Value::Object(b)) => collate_objects(a, b),
            (Value::Binary(a), Value::Binary(b)) => a.cmp(b),
            // Same type tag: only MISSING/MISSING and NULL/NULL remain
            _ => Ordering::Equal,
        }
    }

    /// Ternary equality: MISSING if either side is MISSING, then NULL if
    /// either side is NULL, otherwise a boolean.
    pub fn equals(&self, other: &Value) -> Value {
        self.ternary(other, |ord| ord == Ordering::Equal)
    }

    pub fn less_than(&self, other: &Value) -> Value {
        self.ternary(other, |ord| ord == Ordering::Less)
    }

    pub fn less_than_or_equal(&self, other: &Value) -> Value {
        self.ternary(other, |ord| ord != Ordering::Greater)
    }

    fn ternary(&self, other: &Value, test: impl FnOnce(Ordering) -> bool) -> Value {
        if self.is_missing() || other.is_missing() {
            Value::Missing
        } else if self.is_null() || other.is_null() {
            Value::Null
        } else {
            Value::Boolean(test(self.collate(other)))
        }
    }

    /// Every nested element and field value, depth first.
    pub fn descendants(&self, out: &mut Vec<Value>) {
        match self {
            Value::Array(a) => {
                for v in a {
                    out.push(v.clone());
                    v.descendants(out);
                }
            }
            Value::Object(o) => {
                for v in o.values() {
                    out.push(v.clone());
                    v.descendants(out);
                }
            }
            _ => {}
        }
    }

    /// Sum of two numbers. Integer overflow falls back to float arithmetic.
    pub fn add_number(&self, other: &Value) -> Option<Value> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => {
                Some(a.checked_add(*b).map_or(Value::Float(*a as f64 + *b as f64), Value::Int))
            }
            _ => Some(Value::Float(self.as_f64()? + other.as_f64()?)),
        }
    }

    pub fn sub_number(&self, other: &Value) -> Option<Value> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => {
                Some(a.checked_sub(*b).map_or(Value::Float(*a as f64 - *b as f64), Value::Int))
            }
            _ => Some(Value::Float(self.as_f64()? - other.as_f64()?)),
        }
    }

    pub fn mul_number(&self, other: &Value) -> Option<Value> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => {
                Some(a.checked_mul(*b).map_or(Value::Float(*a as f64 * *b as f64), Value::Int))
            }
            _ => Some(Value::Float(self.as_f64()? * other.as_f64()?)),
        }
    }

    pub fn neg_number(&self) -> Option<Value> {
        match self {
            Value::Int(i) => Some(i.checked_neg().map_or(Value::Float(-(*i as f64)), Value::Int)),
            Value::Float(f) => Some(Value::Float(-f)),
            _ => None,
        }
    }

    /// Convert to JSON. MISSING becomes null; binary becomes an array of bytes.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Missing | Value::Null => serde_json::Value::Null,
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(a) => serde_json::Value::Array(a.iter().map(Value::to_json).collect()),
            Value::Object(o) => serde_json::Value::Object(
                o.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Value::Binary(b) => {
                serde_json::Value::Array(b.iter().map(|x| serde_json::Value::from(*x)).collect())
            }
        }
    }
}

/// Resolve a possibly negative position against a length.
pub(crate) fn resolve_position(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let i = if index < 0 { len + index } else { index };
    if i >= 0 && i < len {
        Some(i as usize)
    } else {
        None
    }
}

/// Objects order by size, then by their sorted field names, then by values.
fn collate_objects(a: &BTreeMap<String, Value>, b: &BTreeMap<String, Value>) -> Ordering {
    let by_len = a.len().cmp(&b.len());
    if by_len != Ordering::Equal {
        return by_len;
    }
    for (x, y) in a.keys().zip(b.keys()) {
        let ord = x.cmp(y);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    for (x, y) in a.values().zip(b.values()) {
        let ord = x.collate(y);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.collate(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        self.collate(other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Missing => write!(f, "MISSING"),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(a) => Value::Array(a.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(o) => {
                Value::Object(o.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(a: Vec<Value>) -> Self {
        Value::Array(a)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(o: BTreeMap<String, Value>) -> Self {
        Value::Object(o)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use serde_json::json;

    #[test]
    fn test_type_collation_order() {
        let ordered = vec![
            Value::Missing,
            Value::Null,
            Value::Boolean(false),
            Value::Boolean(true),
            Value::Int(-5),
            Value::Float(2.5),
            Value::string(""),
            Value::string("a"),
            Value::Array(vec![]),
            Value::empty_object(),
            Value::Binary(Bytes::from_static(b"x")),
        ];
        for pair in ordered.windows(2) {
            assert_eq!(pair[0].collate(&pair[1]), Ordering::Less, "{:?}", pair);
        }
    }

    #[test]
    fn test_number_arithmetic() {
        assert!(matches!(Value::Int(2).add_number(&Value::Int(3)), Some(Value::Int(5))));
        assert!(matches!(
            Value::Int(i64::MAX).add_number(&Value::Int(1)),
            Some(Value::Float(_))
        ));
        assert_eq!(Value::Int(2).mul_number(&Value::Float(1.5)), Some(Value::Int(3)));
        assert_eq!(Value::Int(2).sub_number(&Value::string("x")), None);
        assert_eq!(Value::Int(i64::MIN).neg_number(), Some(Value::Float(9.223372036854776e18)));
    }

    #[test]
    fn test_mixed_number_equality() {
        assert_eq!(Value::Int(1), Value::Float(1.0));
        assert!(Value::Int(1) < Value::Float(1.5));
        assert_eq!(Value::number(3.0), Value::Int(3));
        assert!(matches!(Value::number(3.0), Value::Int(3)));
        assert!(matches!(Value::number(3.5), Value::Float(_)));
    }

    #[test]
    fn test_array_and_object_collation() {
        let short = Value::from(json!([1, 2]));
        let long = Value::from(json!([1, 2, 0]));
        assert!(short < long);
        assert!(Value::from(json!([1, 3])) > long);

        // Objects compare by size first
        let small = Value::from(json!({"z": 1}));
        let big = Value::from(json!({"a": 1, "b": 2}));
        assert!(small < big);
        assert!(Value::from(json!({"a": 1})) < Value::from(json!({"b": 0})));
        assert!(Value::from(json!({"a": 1})) < Value::from(json!({"a": 2})));
    }

    #[test]
    fn test_ternary_equality() {
        assert_eq!(Value::Missing.equals(&Value::Null).value_type(), ValueType::Missing);
        assert_eq!(Value::Null.equals(&Value::Int(1)).value_type(), ValueType::Null);
        assert_eq!(Value::Int(1).equals(&Value::Int(1)), Value::Boolean(true));
        assert_eq!(
            Value::string("a").less_than(&Value::Int(1)),
            Value::Boolean(false)
        );
        assert_eq!(
            Value::Int(2).less_than_or_equal(&Value::Int(2)),
            Value::Boolean(true)
        );
    }

    #[test]
    fn test_truth_coercion() {
        assert!(!Value::Missing.truth());
        assert!(!Value::Null.truth());
        assert!(!Value::Int(0).truth());
        assert!(Value::Float(0.5).truth());
        assert!(!Value::string("").truth());
        assert!(Value::from(json!([0])).truth());
        assert!(!Value::empty_object().truth());
    }

    #[test]
    fn test_navigation() {
        let doc = Value::from(json!({"a": {"b": [10, 20, 30]}}));
        assert_eq!(doc.field("a").field("b").index(-1), Value::Int(30));
        assert!(doc.field("nope").is_missing());
        assert!(doc.field("a").field("b").index(3).is_missing());
        assert!(Value::Int(1).field("a").is_missing());
    }

    #[test]
    fn test_integral_view() {
        assert_eq!(Value::Float(4.0).as_i64(), Some(4));
        assert_eq!(Value::Float(4.5).as_i64(), None);
        assert_eq!(Value::string("4").as_i64(), None);
    }

    #[test]
    fn test_json_conversion() -> Result<()> {
        let text = r#"{"a":[1,2.5,"x",null,true]}"#;
        let value: Value = serde_json::from_str(text)?;
        assert_eq!(value.field("a").index(1), Value::Float(2.5));
        assert_eq!(serde_json::to_string(&value)?, text);
        assert_eq!(Value::Missing.to_json(), serde_json::Value::Null);
        Ok(())
    }

    #[test]
    fn test_descendants() {
        let v = Value::from(json!([1, {"a": [2]}]));
        let mut out = Vec::new();
        v.descendants(&mut out);
        assert_eq!(out.len(), 4);
        assert!(out.contains(&Value::Int(2)));
    }
}
