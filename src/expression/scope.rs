//! Evaluation-time name scopes.

use crate::pool::Pooled;
use crate::value::Value;
use std::collections::BTreeMap;

/// A row value plus the annotations an index scan attached to it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotatedValue {
    pub value: Value,
    /// Covered expression values, keyed by cover key
    pub covers: BTreeMap<String, Value>,
}

impl AnnotatedValue {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            covers: BTreeMap::new(),
        }
    }

    pub fn with_cover(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.covers.insert(key.into(), value.into());
        self
    }

    pub fn cover(&self, key: &str) -> Option<&Value> {
        self.covers.get(key)
    }
}

/// Identifier resolution for one evaluation.
///
/// The root scope resolves names as fields of the row. A nested scope is
/// created per comprehension iteration: it binds the iteration variables and
/// falls through to its parent for every other name. Variables live in a
/// pooled buffer handed back when the scope drops.
pub struct Scope<'a> {
    item: &'a AnnotatedValue,
    parent: Option<&'a Scope<'a>>,
    vars: Option<Pooled<'a, Vec<(String, Value)>>>,
}

impl<'a> Scope<'a> {
    pub fn root(item: &'a AnnotatedValue) -> Self {
        Self {
            item,
            parent: None,
            vars: None,
        }
    }

    /// Child scope sharing the parent's row and annotations
    pub fn nested(parent: &'a Scope<'a>, vars: Pooled<'a, Vec<(String, Value)>>) -> Self {
        Self {
            item: parent.item,
            parent: Some(parent),
            vars: Some(vars),
        }
    }

    pub fn item(&self) -> &'a AnnotatedValue {
        self.item
    }

    /// Resolve an identifier. Unbound names that are not row fields are MISSING.
    pub fn lookup(&self, name: &str) -> Value {
        if let Some(vars) = &self.vars {
            if let Some((_, value)) = vars.iter().rev().find(|(n, _)| n == name) {
                return value.clone();
            }
        }
        match self.parent {
            Some(parent) => parent.lookup(name),
            None => self.item.value.field(name),
        }
    }

    /// Value an index scan stored for a covered expression
    pub fn cover(&self, key: &str) -> Option<&'a Value> {
        self.item.cover(key)
    }
}
