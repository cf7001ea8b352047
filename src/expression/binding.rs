//! Comprehension variable bindings.

use crate::expression::visitor::{traverse, Traverser};
use crate::expression::{
    ArrayMap, Comprehension, Expression, ExpressionError, ExpressionResult, ObjectMap,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One variable bound to successive elements of a source collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    /// Variable bound to each element (or field value)
    pub variable: String,
    /// Variable bound to each field name (or array position)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_variable: Option<String>,
    /// Source collection
    pub expression: Expression,
    /// Iterate every descendant (WITHIN) instead of direct elements (IN)
    #[serde(default)]
    pub descend: bool,
}

impl Binding {
    /// `variable IN expression`
    pub fn new(variable: impl Into<String>, expression: Expression) -> Self {
        Self {
            variable: variable.into(),
            name_variable: None,
            expression,
            descend: false,
        }
    }

    /// `name_variable : variable IN expression`
    pub fn with_name(
        name_variable: impl Into<String>,
        variable: impl Into<String>,
        expression: Expression,
    ) -> Self {
        Self {
            variable: variable.into(),
            name_variable: Some(name_variable.into()),
            expression,
            descend: false,
        }
    }

    /// `variable WITHIN expression`
    pub fn within(variable: impl Into<String>, expression: Expression) -> Self {
        Self {
            descend: true,
            ..Self::new(variable, expression)
        }
    }

    /// Same variables, different source
    pub fn with_expression(&self, expression: Expression) -> Self {
        Self {
            variable: self.variable.clone(),
            name_variable: self.name_variable.clone(),
            expression,
            descend: self.descend,
        }
    }
}

/// Ordered bindings of one comprehension. Order is evaluation order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<Binding>", into = "Vec<Binding>")]
pub struct Bindings(Vec<Binding>);

impl Bindings {
    /// Build bindings, rejecting empty or repeated variable names.
    pub fn new(bindings: Vec<Binding>) -> ExpressionResult<Self> {
        let mut seen = HashSet::new();
        for binding in &bindings {
            let names = std::iter::once(&binding.variable).chain(binding.name_variable.as_ref());
            for name in names {
                if name.is_empty() {
                    return Err(ExpressionError::InvalidBindings(
                        "empty variable name".to_string(),
                    ));
                }
                if !seen.insert(name.as_str()) {
                    return Err(ExpressionError::InvalidBindings(format!(
                        "duplicate variable {}",
                        name
                    )));
                }
            }
        }
        Ok(Self(bindings))
    }

    pub fn single(binding: Binding) -> Self {
        Self(vec![binding])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Binding> {
        self.0.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Binding> {
        self.0.get(index)
    }

    /// Every variable and name variable, in binding order
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.0.iter().flat_map(|b| {
            std::iter::once(b.variable.as_str()).chain(b.name_variable.as_deref())
        })
    }

    pub fn binds(&self, name: &str) -> bool {
        self.variables().any(|v| v == name)
    }

    /// Source expressions in binding order
    pub fn sources(&self) -> impl Iterator<Item = &Expression> {
        self.0.iter().map(|b| &b.expression)
    }

    /// New bindings with every source rewritten by `f`
    pub fn map_sources<F>(&self, mut f: F) -> ExpressionResult<Bindings>
    where
        F: FnMut(&Expression) -> ExpressionResult<Expression>,
    {
        let bindings = self
            .0
            .iter()
            .map(|b| Ok(b.with_expression(f(&b.expression)?)))
            .collect::<ExpressionResult<Vec<_>>>()?;
        Ok(Self(bindings))
    }
}

impl TryFrom<Vec<Binding>> for Bindings {
    type Error = ExpressionError;

    fn try_from(bindings: Vec<Binding>) -> ExpressionResult<Self> {
        Bindings::new(bindings)
    }
}

impl From<Bindings> for Vec<Binding> {
    fn from(bindings: Bindings) -> Self {
        bindings.0
    }
}

impl<'a> IntoIterator for &'a Bindings {
    type Item = &'a Binding;
    type IntoIter = std::slice::Iter<'a, Binding>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Collects the bindings of every nested ANY, EVERY and ANY AND EVERY,
/// outer to inner. ARRAY, OBJECT, FIRST and EXISTS are opaque.
struct BindingsCollector {
    found: Vec<Bindings>,
}

impl BindingsCollector {
    fn collect(&mut self, comprehension: &Comprehension) -> ExpressionResult<()> {
        self.found.push(comprehension.bindings.clone());
        for source in comprehension.bindings.sources() {
            traverse(self, source)?;
        }
        traverse(self, &comprehension.satisfies)
    }
}

impl Traverser for BindingsCollector {
    fn visit_any(&mut self, any: &Comprehension) -> ExpressionResult<()> {
        self.collect(any)
    }

    fn visit_every(&mut self, every: &Comprehension) -> ExpressionResult<()> {
        self.collect(every)
    }

    fn visit_any_every(&mut self, any_every: &Comprehension) -> ExpressionResult<()> {
        self.collect(any_every)
    }

    fn visit_array(&mut self, _array: &ArrayMap) -> ExpressionResult<()> {
        Ok(())
    }

    fn visit_first(&mut self, _first: &ArrayMap) -> ExpressionResult<()> {
        Ok(())
    }

    fn visit_object(&mut self, _object: &ObjectMap) -> ExpressionResult<()> {
        Ok(())
    }

    fn visit_exists(&mut self, _operand: &Expression) -> ExpressionResult<()> {
        Ok(())
    }
}

/// Every bindings set introduced by comprehensions nested in `expr`.
pub fn collect_bindings(expr: &Expression) -> ExpressionResult<Vec<Bindings>> {
    let mut collector = BindingsCollector { found: Vec::new() };
    traverse(&mut collector, expr)?;
    Ok(collector.found)
}
