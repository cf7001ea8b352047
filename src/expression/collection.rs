//! Comprehension evaluation shared by ANY, EVERY, ANY AND EVERY, ARRAY,
//! FIRST and OBJECT.
//!
//! Binding sources are evaluated once against the enclosing scope. Iteration
//! then walks them in lock step up to the shortest length, binding each
//! variable in a fresh nested scope per position.

use crate::context::Context;
use crate::expression::eval::Evaluator;
use crate::expression::{
    ArrayMap, Bindings, Comprehension, Expression, ExpressionError, ExpressionResult, ObjectMap,
    Scope,
};
use crate::pool::Pooled;
use crate::value::Value;
use log::trace;
use std::collections::BTreeMap;
use std::ops::ControlFlow;

/// Elements of one binding source, plus names when a name variable is bound
struct Source<'p> {
    items: Pooled<'p, Vec<Value>>,
    names: Option<Pooled<'p, Vec<Value>>>,
}

enum Iteration {
    /// A source was MISSING or not a collection
    Unknown(Value),
    /// Every position was visited; `count` is the number of positions
    Completed { count: usize },
    /// The body stopped early with a result
    Stopped(Value),
}

/// Evaluate every source against `scope`. MISSING wins over NULL; a
/// non-collection source is NULL.
fn prepare<'p>(
    bindings: &Bindings,
    context: &'p dyn Context,
    scope: &Scope<'_>,
) -> ExpressionResult<Result<Vec<Source<'p>>, Value>> {
    let pools = context.pools();
    let mut sources = Vec::with_capacity(bindings.len());
    let mut null = false;

    for binding in bindings {
        let value = Evaluator::new(context, scope).evaluate(&binding.expression)?;
        if value.is_missing() {
            return Ok(Err(Value::Missing));
        }
        if null {
            continue;
        }

        let mut items = pools.values.acquire();
        let mut names = binding.name_variable.as_ref().map(|_| pools.values.acquire());
        let indexable = match &value {
            Value::Array(_) | Value::Object(_) if binding.descend => {
                value.descendants(&mut items);
                if let Some(names) = names.as_mut() {
                    names.extend((0..items.len()).map(Value::from));
                }
                true
            }
            Value::Array(elements) => {
                items.extend(elements.iter().cloned());
                if let Some(names) = names.as_mut() {
                    names.extend((0..elements.len()).map(Value::from));
                }
                true
            }
            Value::Object(fields) => match names.as_mut() {
                Some(names) => {
                    for (name, field) in fields {
                        names.push(Value::string(name));
                        items.push(field.clone());
                    }
                    true
                }
                None => false,
            },
            _ => false,
        };

        if indexable {
            sources.push(Source { items, names });
        } else {
            null = true;
        }
    }

    if null {
        return Ok(Err(Value::Null));
    }
    Ok(Ok(sources))
}

impl<'a> Evaluator<'a> {
    /// Walk the bindings, calling `body` for each position that passes the
    /// optional `when` filter.
    fn iterate<F>(
        &self,
        bindings: &Bindings,
        when: Option<&Expression>,
        mut body: F,
    ) -> ExpressionResult<Iteration>
    where
        F: FnMut(&mut Evaluator<'_>) -> ExpressionResult<ControlFlow<Value>>,
    {
        let context = self.context();
        let sources = match prepare(bindings, context, self.scope())? {
            Ok(sources) => sources,
            Err(unknown) => return Ok(Iteration::Unknown(unknown)),
        };
        let count = sources.iter().map(|s| s.items.len()).min().unwrap_or(0);
        trace!("comprehension over {} bindings, {} positions", sources.len(), count);

        for i in 0..count {
            if context.is_cancelled() {
                return Err(ExpressionError::Abort("query cancelled".to_string()));
            }

            let mut vars = context.pools().scopes.acquire();
            for (binding, source) in bindings.iter().zip(&sources) {
                vars.push((binding.variable.clone(), source.items[i].clone()));
                if let (Some(name), Some(names)) = (&binding.name_variable, &source.names) {
                    vars.push((name.clone(), names[i].clone()));
                }
            }
            let nested = Scope::nested(self.scope(), vars);
            let mut evaluator = Evaluator::new(context, &nested);

            if let Some(when) = when {
                if !evaluator.evaluate(when)?.truth() {
                    continue;
                }
            }
            if let ControlFlow::Break(result) = body(&mut evaluator)? {
                return Ok(Iteration::Stopped(result));
            }
        }
        Ok(Iteration::Completed { count })
    }

    /// TRUE as soon as one position satisfies the condition
    pub(crate) fn evaluate_any(&self, any: &Comprehension) -> ExpressionResult<Value> {
        let iteration = self.iterate(&any.bindings, None, |evaluator| {
            Ok(if evaluator.evaluate(&any.satisfies)?.truth() {
                ControlFlow::Break(Value::Boolean(true))
            } else {
                ControlFlow::Continue(())
            })
        })?;
        Ok(match iteration {
            Iteration::Unknown(value) | Iteration::Stopped(value) => value,
            Iteration::Completed { .. } => Value::Boolean(false),
        })
    }

    /// FALSE as soon as one position fails the condition. With
    /// `require_any`, empty sources are FALSE as well.
    pub(crate) fn evaluate_every(
        &self,
        every: &Comprehension,
        require_any: bool,
    ) -> ExpressionResult<Value> {
        let iteration = self.iterate(&every.bindings, None, |evaluator| {
            Ok(if evaluator.evaluate(&every.satisfies)?.truth() {
                ControlFlow::Continue(())
            } else {
                ControlFlow::Break(Value::Boolean(false))
            })
        })?;
        Ok(match iteration {
            Iteration::Unknown(value) | Iteration::Stopped(value) => value,
            Iteration::Completed { count: 0 } if require_any => Value::Boolean(false),
            Iteration::Completed { .. } => Value::Boolean(true),
        })
    }

    /// Mapped values in order; MISSING results are dropped
    pub(crate) fn evaluate_array(&self, array: &ArrayMap) -> ExpressionResult<Value> {
        let mut out = Vec::new();
        let iteration = self.iterate(&array.bindings, array.when.as_ref(), |evaluator| {
            let value = evaluator.evaluate(&array.mapping)?;
            if !value.is_missing() {
                out.push(value);
            }
            Ok(ControlFlow::Continue(()))
        })?;
        Ok(match iteration {
            Iteration::Unknown(value) | Iteration::Stopped(value) => value,
            Iteration::Completed { .. } => Value::Array(out),
        })
    }

    /// First mapped value, or MISSING when no position qualifies
    pub(crate) fn evaluate_first(&self, first: &ArrayMap) -> ExpressionResult<Value> {
        let iteration = self.iterate(&first.bindings, first.when.as_ref(), |evaluator| {
            Ok(ControlFlow::Break(evaluator.evaluate(&first.mapping)?))
        })?;
        Ok(match iteration {
            Iteration::Unknown(value) | Iteration::Stopped(value) => value,
            Iteration::Completed { .. } => Value::Missing,
        })
    }

    /// Object of name/value results. Non-string names and MISSING values are
    /// skipped; a later duplicate name replaces an earlier one.
    pub(crate) fn evaluate_object(&self, object: &ObjectMap) -> ExpressionResult<Value> {
        let mut out = BTreeMap::new();
        let iteration = self.iterate(&object.bindings, object.when.as_ref(), |evaluator| {
            let name = evaluator.evaluate(&object.name_mapping)?;
            let value = evaluator.evaluate(&object.value_mapping)?;
            if let (Value::String(name), false) = (name, value.is_missing()) {
                out.insert(name, value);
            }
            Ok(ControlFlow::Continue(()))
        })?;
        Ok(match iteration {
            Iteration::Unknown(value) | Iteration::Stopped(value) => value,
            Iteration::Completed { .. } => Value::Object(out),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::context::{Context, MemoryContext};
    use crate::expression::{AnnotatedValue, Binding, Bindings, Expression, ExpressionError, ExpressionResult};
    use crate::value::Value;
    use serde_json::json;

    fn row() -> AnnotatedValue {
        AnnotatedValue::new(json!({
            "nums": [1, 5, 9],
            "names": ["a", "b"],
            "empty": [],
            "obj": {"x": 1, "y": 2},
            "nested": {"a": [1, {"b": 7}]},
            "text": "abc"
        }))
    }

    fn eval(expr: &Expression) -> ExpressionResult<Value> {
        expr.evaluate(&row(), &MemoryContext::default())
    }

    fn over(variable: &str, source: &str) -> Bindings {
        Bindings::single(Binding::new(variable, Expression::path(source)))
    }

    fn gt(name: &str, n: i64) -> Expression {
        Expression::gt(Expression::identifier(name), Expression::constant(n))
    }

    #[test]
    fn test_quantifiers() -> ExpressionResult<()> {
        assert_eq!(eval(&Expression::any(over("v", "nums"), gt("v", 8)))?, Value::Boolean(true));
        assert_eq!(eval(&Expression::any(over("v", "nums"), gt("v", 9)))?, Value::Boolean(false));
        assert_eq!(eval(&Expression::every(over("v", "nums"), gt("v", 0)))?, Value::Boolean(true));
        assert_eq!(eval(&Expression::every(over("v", "nums"), gt("v", 1)))?, Value::Boolean(false));
        Ok(())
    }

    #[test]
    fn test_empty_sources() -> ExpressionResult<()> {
        assert_eq!(eval(&Expression::any(over("v", "empty"), gt("v", 0)))?, Value::Boolean(false));
        assert_eq!(eval(&Expression::every(over("v", "empty"), gt("v", 0)))?, Value::Boolean(true));
        assert_eq!(
            eval(&Expression::any_every(over("v", "empty"), gt("v", 0)))?,
            Value::Boolean(false)
        );
        assert_eq!(
            eval(&Expression::any_every(over("v", "nums"), gt("v", 0)))?,
            Value::Boolean(true)
        );
        Ok(())
    }

    #[test]
    fn test_unknown_sources() -> ExpressionResult<()> {
        assert!(eval(&Expression::any(over("v", "nope"), gt("v", 0)))?.is_missing());
        assert!(eval(&Expression::any(over("v", "text"), gt("v", 0)))?.is_null());
        assert!(eval(&Expression::array(over("v", "obj"), Expression::identifier("v"), None))?.is_null());

        // MISSING wins even when a NULL source comes first
        let bindings = Bindings::new(vec![
            Binding::new("a", Expression::path("text")),
            Binding::new("b", Expression::path("nope")),
        ])?;
        assert!(eval(&Expression::every(bindings, Expression::constant(true)))?.is_missing());
        Ok(())
    }

    #[test]
    fn test_lock_step_iteration() -> ExpressionResult<()> {
        let bindings = Bindings::new(vec![
            Binding::new("n", Expression::path("nums")),
            Binding::new("s", Expression::path("names")),
        ])?;
        let pair = Expression::array_construct(vec![Expression::identifier("n"), Expression::identifier("s")]);
        let expr = Expression::array(bindings, pair, None);
        assert_eq!(eval(&expr)?, Value::from(json!([[1, "a"], [5, "b"]])));
        Ok(())
    }

    #[test]
    fn test_array_with_filter_and_names() -> ExpressionResult<()> {
        let bindings = Bindings::single(Binding::with_name("i", "v", Expression::path("nums")));
        let expr = Expression::array(
            bindings,
            Expression::identifier("i"),
            Some(gt("v", 2)),
        );
        assert_eq!(eval(&expr)?, Value::from(json!([1, 2])));
        Ok(())
    }

    #[test]
    fn test_first_and_object() -> ExpressionResult<()> {
        let first = Expression::first(over("v", "nums"), Expression::identifier("v"), Some(gt("v", 4)));
        assert_eq!(eval(&first)?, Value::Int(5));
        let none = Expression::first(over("v", "nums"), Expression::identifier("v"), Some(gt("v", 40)));
        assert!(eval(&none)?.is_missing());

        let bindings = Bindings::single(Binding::with_name("k", "v", Expression::path("obj")));
        let object = Expression::object(
            bindings,
            Expression::identifier("k"),
            Expression::mult(vec![Expression::identifier("v"), Expression::constant(10)]),
            None,
        );
        assert_eq!(eval(&object)?, Value::from(json!({"x": 10, "y": 20})));
        Ok(())
    }

    #[test]
    fn test_within_descends() -> ExpressionResult<()> {
        let bindings = Bindings::single(Binding::within("v", Expression::path("nested")));
        assert_eq!(eval(&Expression::any(bindings.clone(), Expression::eq(Expression::identifier("v"), Expression::constant(7))))?, Value::Boolean(true));
        let count = Expression::array(bindings, Expression::identifier("v"), None);
        assert_eq!(eval(&count)?.as_array().map(|a| a.len()), Some(4));
        Ok(())
    }

    #[test]
    fn test_variables_shadow_row_fields() -> ExpressionResult<()> {
        // `text` is a row field, but the binding wins inside the body
        let expr = Expression::array(over("text", "nums"), Expression::identifier("text"), None);
        assert_eq!(eval(&expr)?, Value::from(json!([1, 5, 9])));
        Ok(())
    }

    #[test]
    fn test_cancellation_aborts() {
        let ctx = MemoryContext::default();
        ctx.cancel();
        let expr = Expression::any(over("v", "nums"), gt("v", 0));
        let err = expr.evaluate(&row(), &ctx).unwrap_err();
        assert!(matches!(err, ExpressionError::Abort(_)));
    }

    #[test]
    fn test_scope_buffers_released() -> ExpressionResult<()> {
        let ctx = MemoryContext::default();
        let expr = Expression::array(over("v", "nums"), Expression::identifier("v"), None);
        expr.evaluate(&row(), &ctx)?;
        assert_eq!(ctx.pools().scopes.idle(), 1);
        assert_eq!(ctx.pools().values.idle(), 1);
        Ok(())
    }
}
