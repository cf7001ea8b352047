//! Covering analysis for index planning.
//!
//! Nothing here evaluates an expression; the results describe what a
//! predicate guarantees and which sub-expressions an index can supply.

use crate::expression::expr::{Callee, Function, IsTest};
use crate::expression::visitor::{traverse, Traverser};
use crate::expression::{Expression, ExpressionResult};
use crate::value::Value;
use std::collections::BTreeMap;

/// What a filter term guarantees about a covered expression
#[derive(Debug, Clone, PartialEq)]
pub enum CoverValue {
    /// The expression is TRUE for every qualifying row
    Satisfied,
    /// The expression equals this value for every qualifying row
    Equals(Value),
}

/// Guarantees of an index WHERE clause, keyed by expression
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterCovers {
    covers: BTreeMap<String, (Expression, CoverValue)>,
}

impl FilterCovers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, expr: &Expression, value: CoverValue) {
        self.covers.insert(cover_key(expr), (expr.clone(), value));
    }

    pub fn get(&self, expr: &Expression) -> Option<&CoverValue> {
        self.covers.get(&cover_key(expr)).map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.covers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.covers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Expression, &CoverValue)> {
        self.covers.values().map(|(expr, value)| (expr, value))
    }
}

/// Stable identity of an expression: its JSON form
pub fn cover_key(expr: &Expression) -> String {
    serde_json::to_string(expr).unwrap_or_else(|_| format!("{:?}", expr))
}

fn returns_boolean(function: &Function) -> bool {
    match &function.callee {
        Callee::Builtin(builtin) => builtin.returns_boolean(),
        Callee::User(_) => false,
    }
}

impl Expression {
    /// Record what this term guarantees when it appears in an index WHERE
    /// clause. Boolean terms cover themselves; an equality with a constant
    /// fixes the other side; IS MISSING and IS NULL fix the operand's type.
    /// Comprehensions are covered as a whole.
    pub fn filter_covers(&self, covers: &mut FilterCovers) {
        match self {
            Expression::And(operands) => {
                for operand in operands {
                    operand.filter_covers(covers);
                }
            }
            Expression::Eq(first, second) => match (first.constant_value(), second.constant_value()) {
                (_, Some(value)) => covers.insert(first, CoverValue::Equals(value.clone())),
                (Some(value), None) => covers.insert(second, CoverValue::Equals(value.clone())),
                (None, None) => covers.insert(self, CoverValue::Satisfied),
            },
            Expression::Is(test, operand) => {
                covers.insert(self, CoverValue::Satisfied);
                match test {
                    IsTest::Missing => covers.insert(operand, CoverValue::Equals(Value::Missing)),
                    IsTest::Null => covers.insert(operand, CoverValue::Equals(Value::Null)),
                    _ => {}
                }
            }
            Expression::Function(function) if returns_boolean(function) => {
                covers.insert(self, CoverValue::Satisfied)
            }
            Expression::Lt(..)
            | Expression::Le(..)
            | Expression::Between(_)
            | Expression::Like(_)
            | Expression::Or(_)
            | Expression::Not(_)
            | Expression::Any(_)
            | Expression::Every(_)
            | Expression::AnyEvery(_)
            | Expression::Exists(_)
            | Expression::In(..)
            | Expression::Within(..) => covers.insert(self, CoverValue::Satisfied),
            Expression::Constant(_)
            | Expression::Identifier(_)
            | Expression::Parameter(_)
            | Expression::Add(_)
            | Expression::Mult(_)
            | Expression::Sub(..)
            | Expression::Div(..)
            | Expression::Mod(..)
            | Expression::Idiv(..)
            | Expression::Imod(..)
            | Expression::Neg(_)
            | Expression::Field(..)
            | Expression::Element(..)
            | Expression::Slice(_)
            | Expression::ArrayConstruct(_)
            | Expression::ObjectConstruct(_)
            | Expression::SearchedCase(_)
            | Expression::SimpleCase(_)
            | Expression::Array(_)
            | Expression::First(_)
            | Expression::Object(_)
            | Expression::Function(_)
            | Expression::Subquery(_)
            | Expression::Cover(_)
            | Expression::Sequence(_) => {}
        }
    }

    /// Every row reference in this expression is one of `keys`, so an index
    /// on `keys` can evaluate it without fetching the document.
    pub fn is_covered_by(&self, keys: &[Expression]) -> bool {
        covered(self, keys, &mut Vec::new())
    }

    /// Replace each sub-expression equivalent to one of `keys` by a cover
    /// marker reading the value stored under the paired annotation key.
    /// Sub-expressions that use comprehension variables are left alone.
    pub fn cover_with(&self, keys: &[(Expression, String)]) -> ExpressionResult<Expression> {
        apply_covers(self, keys, &mut Vec::new())
    }
}

fn covered(expr: &Expression, keys: &[Expression], bound: &mut Vec<String>) -> bool {
    if keys.iter().any(|k| k.equivalent_to(expr)) {
        return true;
    }
    match expr {
        Expression::Identifier(name) => bound.contains(name),
        Expression::Subquery(subquery) => !subquery.correlated,
        _ => {
            let children = expr.children();
            let Some(bindings) = expr.bindings() else {
                return children.iter().all(|c| covered(c, keys, bound));
            };
            let (sources, body) = children.split_at(bindings.len().min(children.len()));
            if !sources.iter().all(|c| covered(c, keys, bound)) {
                return false;
            }
            let depth = bound.len();
            bound.extend(bindings.variables().map(String::from));
            let result = body.iter().all(|c| covered(c, keys, bound));
            bound.truncate(depth);
            result
        }
    }
}

/// Collects every identifier, bound or not
struct Identifiers(Vec<String>);

impl Traverser for Identifiers {
    fn visit_identifier(&mut self, name: &str) -> ExpressionResult<()> {
        self.0.push(name.to_string());
        Ok(())
    }
}

fn uses_any(expr: &Expression, names: &[String]) -> ExpressionResult<bool> {
    if names.is_empty() {
        return Ok(false);
    }
    let mut identifiers = Identifiers(Vec::new());
    traverse(&mut identifiers, expr)?;
    Ok(identifiers.0.iter().any(|i| names.contains(i)))
}

fn apply_covers(
    expr: &Expression,
    keys: &[(Expression, String)],
    bound: &mut Vec<String>,
) -> ExpressionResult<Expression> {
    if let Some((_, key)) = keys.iter().find(|(k, _)| k.equivalent_to(expr)) {
        if !uses_any(expr, bound)? {
            return Ok(Expression::cover(expr.clone(), key.clone()));
        }
    }

    let Some(bindings) = expr.bindings() else {
        return expr.map_children(&mut |child| apply_covers(child, keys, bound));
    };
    let sources = bindings.len();
    let variables: Vec<String> = bindings.variables().map(String::from).collect();
    let depth = bound.len();
    let mut position = 0;
    let result = expr.map_children(&mut |child| {
        if position == sources {
            bound.extend(variables.iter().cloned());
        }
        position += 1;
        apply_covers(child, keys, bound)
    });
    bound.truncate(depth);
    result
}
