//! Expression evaluation.
//!
//! Each node kind applies its own MISSING/NULL rule to its operand values.
//! MISSING is checked before NULL wherever a node propagates both.

use crate::context::{Context, Warning};
use crate::expression::expr::{
    ArrayConstruct, ArrayMap, Between, Callee, Comprehension, Cover, Function, IsTest, Like,
    ObjectConstruct, ObjectMap, Parameter, SearchedCase, Sequence, SequenceOp, SimpleCase, Slice,
    Subquery,
};
use crate::expression::function::{self, evaluate_lazy, propagate};
use crate::expression::visitor::Visitor;
use crate::expression::{AnnotatedValue, Expression, ExpressionError, ExpressionResult, Scope};
use crate::value::{resolve_position, Value};
use regex::Regex;
use std::collections::BTreeMap;

/// Evaluates expressions against one scope
pub struct Evaluator<'a> {
    context: &'a dyn Context,
    scope: &'a Scope<'a>,
}

impl<'a> Evaluator<'a> {
    pub fn new(context: &'a dyn Context, scope: &'a Scope<'a>) -> Self {
        Self { context, scope }
    }

    pub fn evaluate(&mut self, expr: &Expression) -> ExpressionResult<Value> {
        expr.accept(self)
    }

    pub fn context(&self) -> &'a dyn Context {
        self.context
    }

    pub fn scope(&self) -> &'a Scope<'a> {
        self.scope
    }

    /// Both operands, or the MISSING/NULL result when either is unknown or
    /// not a number
    fn numbers(
        &mut self,
        first: &Expression,
        second: &Expression,
    ) -> ExpressionResult<Result<(f64, f64), Value>> {
        let a = self.evaluate(first)?;
        let b = self.evaluate(second)?;
        if a.is_missing() || b.is_missing() {
            return Ok(Err(Value::Missing));
        }
        match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => Ok(Ok((a, b))),
            _ => Ok(Err(Value::Null)),
        }
    }

    /// Operands of IDIV and IMOD. Integers are taken exactly; floats are
    /// truncated.
    fn integers(
        &mut self,
        first: &Expression,
        second: &Expression,
    ) -> ExpressionResult<Result<(i64, i64), Value>> {
        let a = self.evaluate(first)?;
        let b = self.evaluate(second)?;
        if a.is_missing() || b.is_missing() {
            return Ok(Err(Value::Missing));
        }
        let truncate = |v: &Value| match v {
            Value::Int(i) => Some(*i),
            Value::Float(f) => Some(f.trunc() as i64),
            _ => None,
        };
        match (truncate(&a), truncate(&b)) {
            (Some(a), Some(b)) => Ok(Ok((a, b))),
            _ => Ok(Err(Value::Null)),
        }
    }

    /// N-ary arithmetic: MISSING wins, then any non-number gives NULL.
    /// Every operand is evaluated until a MISSING is found.
    fn accumulate(
        &mut self,
        operands: &[Expression],
        identity: Value,
        op: fn(&Value, &Value) -> Option<Value>,
    ) -> ExpressionResult<Value> {
        let mut acc = identity;
        let mut null = false;
        for operand in operands {
            let value = self.evaluate(operand)?;
            if value.is_missing() {
                return Ok(Value::Missing);
            }
            if null {
                continue;
            }
            match op(&acc, &value) {
                Some(result) => acc = result,
                None => null = true,
            }
        }
        Ok(if null { Value::Null } else { acc })
    }

    fn divide_by_zero(&self, operator: &'static str) -> Value {
        self.context.warn(Warning::DivideByZero { operator });
        Value::Null
    }

    fn compare(
        &mut self,
        first: &Expression,
        second: &Expression,
        op: fn(&Value, &Value) -> Value,
    ) -> ExpressionResult<Value> {
        let a = self.evaluate(first)?;
        let b = self.evaluate(second)?;
        Ok(op(&a, &b))
    }

    /// Membership of `item` in `candidates`
    fn member(item: &Value, candidates: &[Value]) -> Value {
        if item.is_null() {
            return Value::Null;
        }
        Value::Boolean(candidates.contains(item))
    }

    fn evaluate_args(&mut self, operands: &[Expression]) -> ExpressionResult<crate::pool::Pooled<'a, Vec<Value>>> {
        let mut args = self.context.pools().args.acquire();
        for operand in operands {
            args.push(self.evaluate(operand)?);
        }
        Ok(args)
    }
}

impl Expression {
    /// Evaluate against a row
    pub fn evaluate(&self, item: &AnnotatedValue, context: &dyn Context) -> ExpressionResult<Value> {
        let scope = Scope::root(item);
        self.evaluate_in(&scope, context)
    }

    /// Evaluate against an existing scope
    pub fn evaluate_in(&self, scope: &Scope<'_>, context: &dyn Context) -> ExpressionResult<Value> {
        Evaluator::new(context, scope).evaluate(self)
    }
}

/// Translate a LIKE pattern: `%` matches any run, `_` any one character,
/// `\` escapes the next character.
fn like_regex(pattern: &str) -> ExpressionResult<Regex> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push_str("(?s)^");
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => re.push_str(".*"),
            '_' => re.push('.'),
            '\\' => match chars.next() {
                Some(escaped) => re.push_str(&regex::escape(&escaped.to_string())),
                None => re.push_str(&regex::escape("\\")),
            },
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|e| ExpressionError::evaluation("LIKE", e.to_string()))
}

/// Resolve a slice bound; `len` itself is a valid end position
fn slice_bound(bound: &Value, len: usize) -> Option<usize> {
    let index = bound.as_i64()?;
    if index == len as i64 {
        return Some(len);
    }
    resolve_position(index, len)
}

impl Visitor for Evaluator<'_> {
    type Output = Value;

    fn visit_constant(&mut self, value: &Value) -> ExpressionResult<Value> {
        Ok(value.clone())
    }

    fn visit_identifier(&mut self, name: &str) -> ExpressionResult<Value> {
        Ok(self.scope.lookup(name))
    }

    fn visit_parameter(&mut self, parameter: &Parameter) -> ExpressionResult<Value> {
        match parameter {
            Parameter::Named(name) => self
                .context
                .named_parameter(name)
                .ok_or_else(|| ExpressionError::ParameterNotFound(format!("${}", name))),
            Parameter::Positional(position) => self
                .context
                .positional_parameter(*position)
                .ok_or_else(|| ExpressionError::ParameterNotFound(format!("${}", position))),
        }
    }

    fn visit_add(&mut self, operands: &[Expression]) -> ExpressionResult<Value> {
        self.accumulate(operands, Value::Int(0), Value::add_number)
    }

    fn visit_mult(&mut self, operands: &[Expression]) -> ExpressionResult<Value> {
        self.accumulate(operands, Value::Int(1), Value::mul_number)
    }

    fn visit_sub(&mut self, first: &Expression, second: &Expression) -> ExpressionResult<Value> {
        let a = self.evaluate(first)?;
        let b = self.evaluate(second)?;
        if a.is_missing() || b.is_missing() {
            return Ok(Value::Missing);
        }
        Ok(a.sub_number(&b).unwrap_or(Value::Null))
    }

    fn visit_div(&mut self, first: &Expression, second: &Expression) -> ExpressionResult<Value> {
        let (a, b) = match self.numbers(first, second)? {
            Ok(pair) => pair,
            Err(unknown) => return Ok(unknown),
        };
        if b == 0.0 {
            return Ok(self.divide_by_zero("DIV"));
        }
        Ok(Value::Float(a / b))
    }

    fn visit_mod(&mut self, first: &Expression, second: &Expression) -> ExpressionResult<Value> {
        let (a, b) = match self.numbers(first, second)? {
            Ok(pair) => pair,
            Err(unknown) => return Ok(unknown),
        };
        if b == 0.0 {
            return Ok(self.divide_by_zero("MOD"));
        }
        Ok(Value::Float(a % b))
    }

    fn visit_idiv(&mut self, first: &Expression, second: &Expression) -> ExpressionResult<Value> {
        let (a, b) = match self.integers(first, second)? {
            Ok(pair) => pair,
            Err(unknown) => return Ok(unknown),
        };
        if b == 0 {
            return Ok(self.divide_by_zero("IDIV"));
        }
        Ok(a.checked_div(b)
            .map_or(Value::Float((a as f64 / b as f64).trunc()), Value::Int))
    }

    fn visit_imod(&mut self, first: &Expression, second: &Expression) -> ExpressionResult<Value> {
        let (a, b) = match self.integers(first, second)? {
            Ok(pair) => pair,
            Err(unknown) => return Ok(unknown),
        };
        if b == 0 {
            return Ok(self.divide_by_zero("IMOD"));
        }
        Ok(Value::Int(a.checked_rem(b).unwrap_or(0)))
    }

    fn visit_neg(&mut self, operand: &Expression) -> ExpressionResult<Value> {
        let value = self.evaluate(operand)?;
        if value.is_missing() {
            return Ok(Value::Missing);
        }
        Ok(value.neg_number().unwrap_or(Value::Null))
    }

    fn visit_eq(&mut self, first: &Expression, second: &Expression) -> ExpressionResult<Value> {
        self.compare(first, second, Value::equals)
    }

    fn visit_lt(&mut self, first: &Expression, second: &Expression) -> ExpressionResult<Value> {
        self.compare(first, second, Value::less_than)
    }

    fn visit_le(&mut self, first: &Expression, second: &Expression) -> ExpressionResult<Value> {
        self.compare(first, second, Value::less_than_or_equal)
    }

    fn visit_between(&mut self, between: &Between) -> ExpressionResult<Value> {
        let operand = self.evaluate(&between.operand)?;
        let low = self.evaluate(&between.low)?;
        let high = self.evaluate(&between.high)?;
        if let Some(unknown) = propagate(&[operand.clone(), low.clone(), high.clone()]) {
            return Ok(unknown);
        }
        Ok(Value::Boolean(low <= operand && operand <= high))
    }

    fn visit_like(&mut self, like: &Like) -> ExpressionResult<Value> {
        let operand = self.evaluate(&like.operand)?;
        let pattern = self.evaluate(&like.pattern)?;
        if operand.is_missing() || pattern.is_missing() {
            return Ok(Value::Missing);
        }
        let (Some(text), Some(pattern_text)) = (operand.as_str(), pattern.as_str()) else {
            return Ok(Value::Null);
        };

        if let Some(regex) = like.regex.get() {
            return Ok(Value::Boolean(regex.is_match(text)));
        }
        let regex = like_regex(pattern_text)?;
        let matched = regex.is_match(text);
        if like.pattern.is_constant() {
            let _ = like.regex.set(regex);
        }
        Ok(Value::Boolean(matched))
    }

    fn visit_is(&mut self, test: IsTest, operand: &Expression) -> ExpressionResult<Value> {
        let value = self.evaluate(operand)?;
        Ok(Value::Boolean(test.test(&value)))
    }

    fn visit_and(&mut self, operands: &[Expression]) -> ExpressionResult<Value> {
        let mut missing = false;
        let mut null = false;
        for operand in operands {
            match self.evaluate(operand)? {
                Value::Missing => missing = true,
                Value::Null => null = true,
                value if !value.truth() => return Ok(Value::Boolean(false)),
                _ => {}
            }
        }
        Ok(if missing {
            Value::Missing
        } else if null {
            Value::Null
        } else {
            Value::Boolean(true)
        })
    }

    fn visit_or(&mut self, operands: &[Expression]) -> ExpressionResult<Value> {
        let mut missing = false;
        let mut null = false;
        for operand in operands {
            match self.evaluate(operand)? {
                Value::Missing => missing = true,
                Value::Null => null = true,
                value if value.truth() => return Ok(Value::Boolean(true)),
                _ => {}
            }
        }
        Ok(if missing {
            Value::Missing
        } else if null {
            Value::Null
        } else {
            Value::Boolean(false)
        })
    }

    fn visit_not(&mut self, operand: &Expression) -> ExpressionResult<Value> {
        Ok(match self.evaluate(operand)? {
            Value::Missing => Value::Missing,
            Value::Null => Value::Null,
            value => Value::Boolean(!value.truth()),
        })
    }

    fn visit_field(&mut self, base: &Expression, name: &str) -> ExpressionResult<Value> {
        Ok(self.evaluate(base)?.field(name))
    }

    fn visit_element(&mut self, base: &Expression, index: &Expression) -> ExpressionResult<Value> {
        let base = self.evaluate(base)?;
        let index = self.evaluate(index)?;
        if base.is_missing() || index.is_missing() {
            return Ok(Value::Missing);
        }
        Ok(match &index {
            Value::String(name) => base.field(name),
            Value::Null => Value::Null,
            number if number.is_number() => match number.as_i64() {
                Some(i) => base.index(i),
                None => Value::Missing,
            },
            _ => Value::Missing,
        })
    }

    fn visit_slice(&mut self, slice: &Slice) -> ExpressionResult<Value> {
        let base = self.evaluate(&slice.base)?;
        let start = self.evaluate(&slice.start)?;
        let end = match &slice.end {
            Some(end) => Some(self.evaluate(end)?),
            None => None,
        };
        let mut operands = vec![base.clone(), start.clone()];
        operands.extend(end.iter().cloned());
        if let Some(unknown) = propagate(&operands) {
            return Ok(unknown);
        }

        let Some(array) = base.as_array() else {
            return Ok(Value::Null);
        };
        let len = array.len();
        let Some(from) = slice_bound(&start, len) else {
            return Ok(Value::Null);
        };
        let to = match &end {
            Some(end) => match slice_bound(end, len) {
                Some(to) => to,
                None => return Ok(Value::Null),
            },
            None => len,
        };
        if from > to {
            return Ok(Value::Null);
        }
        Ok(Value::Array(array[from..to].to_vec()))
    }

    fn visit_array_construct(&mut self, construct: &ArrayConstruct) -> ExpressionResult<Value> {
        if let Some(cached) = construct.cache.get() {
            return Ok(cached.clone());
        }
        let mut elements = Vec::with_capacity(construct.operands.len());
        for operand in &construct.operands {
            match self.evaluate(operand)? {
                Value::Missing => elements.push(Value::Null),
                value => elements.push(value),
            }
        }
        let value = Value::Array(elements);
        if construct.operands.iter().all(Expression::is_static) {
            let _ = construct.cache.set(value.clone());
        }
        Ok(value)
    }

    fn visit_object_construct(&mut self, construct: &ObjectConstruct) -> ExpressionResult<Value> {
        if let Some(cached) = construct.cache.get() {
            return Ok(cached.clone());
        }
        let mut fields = BTreeMap::new();
        for (name, value) in &construct.pairs {
            let name = self.evaluate(name)?;
            let value = self.evaluate(value)?;
            if let (Value::String(name), false) = (name, value.is_missing()) {
                fields.insert(name, value);
            }
        }
        let value = Value::Object(fields);
        if construct
            .pairs
            .iter()
            .all(|(n, v)| n.is_static() && v.is_static())
        {
            let _ = construct.cache.set(value.clone());
        }
        Ok(value)
    }

    fn visit_searched_case(&mut self, case: &SearchedCase) -> ExpressionResult<Value> {
        for when in &case.whens {
            if self.evaluate(&when.when)?.truth() {
                return self.evaluate(&when.then);
            }
        }
        match &case.otherwise {
            Some(otherwise) => self.evaluate(otherwise),
            None => Ok(Value::Null),
        }
    }

    fn visit_simple_case(&mut self, case: &SimpleCase) -> ExpressionResult<Value> {
        let search = self.evaluate(&case.search)?;
        for when in &case.whens {
            let candidate = self.evaluate(&when.when)?;
            if search.equals(&candidate).truth() {
                return self.evaluate(&when.then);
            }
        }
        match &case.otherwise {
            Some(otherwise) => self.evaluate(otherwise),
            None => Ok(Value::Null),
        }
    }

    fn visit_any(&mut self, any: &Comprehension) -> ExpressionResult<Value> {
        self.evaluate_any(any)
    }

    fn visit_every(&mut self, every: &Comprehension) -> ExpressionResult<Value> {
        self.evaluate_every(every, false)
    }

    fn visit_any_every(&mut self, any_every: &Comprehension) -> ExpressionResult<Value> {
        self.evaluate_every(any_every, true)
    }

    fn visit_array(&mut self, array: &ArrayMap) -> ExpressionResult<Value> {
        self.evaluate_array(array)
    }

    fn visit_first(&mut self, first: &ArrayMap) -> ExpressionResult<Value> {
        self.evaluate_first(first)
    }

    fn visit_object(&mut self, object: &ObjectMap) -> ExpressionResult<Value> {
        self.evaluate_object(object)
    }

    fn visit_exists(&mut self, operand: &Expression) -> ExpressionResult<Value> {
        Ok(match self.evaluate(operand)? {
            Value::Missing => Value::Missing,
            Value::Null => Value::Null,
            Value::Array(elements) => Value::Boolean(!elements.is_empty()),
            _ => Value::Boolean(false),
        })
    }

    fn visit_in(&mut self, item: &Expression, collection: &Expression) -> ExpressionResult<Value> {
        let item = self.evaluate(item)?;
        let collection = self.evaluate(collection)?;
        if item.is_missing() || collection.is_missing() {
            return Ok(Value::Missing);
        }
        match collection.as_array() {
            Some(elements) => Ok(Self::member(&item, elements)),
            None => Ok(Value::Null),
        }
    }

    fn visit_within(&mut self, item: &Expression, collection: &Expression) -> ExpressionResult<Value> {
        let item = self.evaluate(item)?;
        let collection = self.evaluate(collection)?;
        if item.is_missing() || collection.is_missing() {
            return Ok(Value::Missing);
        }
        if !matches!(collection, Value::Array(_) | Value::Object(_)) {
            return Ok(Value::Null);
        }
        let mut descendants = self.context.pools().values.acquire();
        collection.descendants(&mut descendants);
        Ok(Self::member(&item, &descendants))
    }

    fn visit_function(&mut self, function: &Function) -> ExpressionResult<Value> {
        function.check_arity()?;
        match &function.callee {
            Callee::Builtin(builtin) if builtin.is_conditional() => {
                evaluate_lazy(*builtin, &function.operands, |operand| self.evaluate(operand))
            }
            Callee::Builtin(builtin) => {
                let args = self.evaluate_args(&function.operands)?;
                function::apply(*builtin, &args, self.context)
            }
            Callee::User(name) => {
                let args = self.evaluate_args(&function.operands)?;
                self.context.execute_function(name, &args)
            }
        }
    }

    fn visit_subquery(&mut self, subquery: &Subquery) -> ExpressionResult<Value> {
        self.context.evaluate_subquery(subquery, self.scope)
    }

    fn visit_cover(&mut self, cover: &Cover) -> ExpressionResult<Value> {
        match self.scope.cover(&cover.key) {
            Some(value) => Ok(value.clone()),
            None => self.evaluate(&cover.covered),
        }
    }

    fn visit_sequence(&mut self, sequence: &Sequence) -> ExpressionResult<Value> {
        match sequence.op {
            SequenceOp::Next => {
                if self.context.readonly() {
                    return Err(ExpressionError::evaluation(
                        "NEXT VALUE",
                        "not allowed in a readonly statement",
                    ));
                }
                self.context.next_sequence_value(sequence.full_name())
            }
            SequenceOp::Prev => self.context.prev_sequence_value(sequence.full_name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::MemoryContext;
    use serde_json::json;

    fn c(value: impl Into<Value>) -> Expression {
        Expression::constant(value)
    }

    fn eval(expr: &Expression) -> ExpressionResult<Value> {
        let ctx = MemoryContext::default();
        expr.evaluate(&AnnotatedValue::new(json!({"a": {"b": 2}, "s": "abc", "arr": [1, 2, 3]})), &ctx)
    }

    #[test]
    fn test_add_missing_before_null() -> ExpressionResult<()> {
        let expr = Expression::add(vec![c("x"), Expression::path("nope"), c(1)]);
        assert!(eval(&expr)?.is_missing());
        let expr = Expression::add(vec![c(1), c("x"), c(2)]);
        assert!(eval(&expr)?.is_null());
        let expr = Expression::mult(vec![c(2), Expression::path("a.b"), c(1.5)]);
        assert_eq!(eval(&expr)?, Value::Int(6));
        Ok(())
    }

    #[test]
    fn test_division_warnings() -> ExpressionResult<()> {
        let ctx = MemoryContext::default();
        let row = AnnotatedValue::default();
        for expr in [
            Expression::div(c(1), c(0)),
            Expression::modulo(c(1), c(0)),
            Expression::idiv(c(1), c(0)),
            Expression::imod(c(1), c(0.5)),
        ] {
            assert!(expr.evaluate(&row, &ctx)?.is_null());
            assert_eq!(ctx.take_warnings().len(), 1);
        }
        Ok(())
    }

    #[test]
    fn test_integer_division_truncates() -> ExpressionResult<()> {
        assert_eq!(eval(&Expression::idiv(c(-7), c(2)))?, Value::Int(-3));
        assert_eq!(eval(&Expression::imod(c(-7), c(2)))?, Value::Int(-1));
        assert_eq!(eval(&Expression::idiv(c(7.9), c(2)))?, Value::Int(3));
        assert_eq!(eval(&Expression::div(c(7), c(2)))?, Value::Float(3.5));

        // Past 2^53 integers stay exact
        let big: i64 = 9_007_199_254_740_993;
        assert_eq!(eval(&Expression::idiv(c(big), c(1)))?, Value::Int(big));
        assert_eq!(eval(&Expression::imod(c(big), c(10)))?, Value::Int(3));
        assert_eq!(eval(&Expression::idiv(c(big), c(2.5)))?, Value::Int(big / 2));
        Ok(())
    }

    #[test]
    fn test_logic() -> ExpressionResult<()> {
        let missing = Expression::path("nope");
        assert_eq!(
            eval(&Expression::and(vec![missing.clone(), Expression::null(), c(false)]))?,
            Value::Boolean(false)
        );
        assert!(eval(&Expression::and(vec![Expression::null(), missing.clone()]))?.is_missing());
        assert!(eval(&Expression::or(vec![Expression::null(), c(false)]))?.is_null());
        assert_eq!(eval(&Expression::or(vec![missing.clone(), c(1)]))?, Value::Boolean(true));
        assert!(eval(&Expression::not(missing))?.is_missing());
        Ok(())
    }

    #[test]
    fn test_is_never_propagates() -> ExpressionResult<()> {
        for operand in [Expression::path("nope"), Expression::null(), c(1)] {
            for test in [IsTest::Missing, IsTest::Null, IsTest::Valued, IsTest::NotMissing] {
                let value = eval(&Expression::is(test, operand.clone()))?;
                assert!(matches!(value, Value::Boolean(_)));
            }
        }
        Ok(())
    }

    #[test]
    fn test_like() -> ExpressionResult<()> {
        let like = Expression::like(Expression::path("s"), c("a_c%"));
        assert_eq!(eval(&like)?, Value::Boolean(true));
        assert_eq!(eval(&like)?, Value::Boolean(true));
        if let Expression::Like(l) = &like {
            assert!(l.regex.get().is_some());
        }
        assert_eq!(eval(&Expression::like(c("a%"), c("a\\%")))?, Value::Boolean(true));
        assert_eq!(eval(&Expression::like(c("ab"), c("a\\%")))?, Value::Boolean(false));
        assert!(eval(&Expression::like(c(1), c("%")))?.is_null());
        Ok(())
    }

    #[test]
    fn test_navigation() -> ExpressionResult<()> {
        assert_eq!(eval(&Expression::path("a.b"))?, Value::Int(2));
        let arr = Expression::path("arr");
        assert_eq!(eval(&Expression::element(arr.clone(), c(-1)))?, Value::Int(3));
        assert!(eval(&Expression::element(arr.clone(), c(5)))?.is_missing());
        assert_eq!(eval(&Expression::element(Expression::path("a"), c("b")))?, Value::Int(2));
        assert_eq!(
            eval(&Expression::slice(arr.clone(), c(1), None))?,
            Value::from(json!([2, 3]))
        );
        assert_eq!(
            eval(&Expression::slice(arr.clone(), c(0), Some(c(-1))))?,
            Value::from(json!([1, 2]))
        );
        assert!(eval(&Expression::slice(arr, c(4), None))?.is_null());
        Ok(())
    }

    #[test]
    fn test_constructors_cache_static_values() -> ExpressionResult<()> {
        let expr = Expression::array_construct(vec![c(1), Expression::missing()]);
        assert_eq!(eval(&expr)?, Value::from(json!([1, null])));
        if let Expression::ArrayConstruct(construct) = &expr {
            assert!(construct.cache.get().is_some());
        }

        let dynamic = Expression::object_construct(vec![
            (c("x"), Expression::path("a.b")),
            (c("gone"), Expression::path("nope")),
            (c(1), c(2)),
        ]);
        assert_eq!(eval(&dynamic)?, Value::from(json!({"x": 2})));
        if let Expression::ObjectConstruct(construct) = &dynamic {
            assert!(construct.cache.get().is_none());
        }
        Ok(())
    }

    #[test]
    fn test_case() -> ExpressionResult<()> {
        let searched = Expression::searched_case(
            vec![
                crate::expression::When { when: c(false), then: c("no") },
                crate::expression::When { when: Expression::eq(Expression::path("a.b"), c(2)), then: c("yes") },
            ],
            None,
        );
        assert_eq!(eval(&searched)?, Value::string("yes"));
        let simple = Expression::simple_case(
            Expression::path("s"),
            vec![crate::expression::When { when: c("x"), then: c(1) }],
            Some(c(0)),
        );
        assert_eq!(eval(&simple)?, Value::Int(0));
        Ok(())
    }

    #[test]
    fn test_membership() -> ExpressionResult<()> {
        assert_eq!(eval(&Expression::in_(c(2), Expression::path("arr")))?, Value::Boolean(true));
        assert_eq!(eval(&Expression::within(c(2), Expression::path("a")))?, Value::Boolean(true));
        assert!(eval(&Expression::in_(c(2), c("x")))?.is_null());
        assert_eq!(eval(&Expression::exists(Expression::path("arr")))?, Value::Boolean(true));
        assert!(eval(&Expression::exists(Expression::path("nope")))?.is_missing());
        Ok(())
    }

    #[test]
    fn test_parameters_and_functions() -> ExpressionResult<()> {
        let ctx = MemoryContext::default()
            .with_named_parameter("x", 5)
            .with_function("double", |args: &[Value]| {
                Ok(args[0].mul_number(&Value::Int(2)).unwrap_or(Value::Null))
            });
        let row = AnnotatedValue::default();
        let expr = Expression::user_function("double", vec![Expression::named_parameter("x")]);
        assert_eq!(expr.evaluate(&row, &ctx)?, Value::Int(10));
        assert!(matches!(
            Expression::positional_parameter(1).evaluate(&row, &ctx),
            Err(ExpressionError::ParameterNotFound(_))
        ));

        let lazy = Expression::function(
            "IFMISSING",
            vec![Expression::path("nope"), c(3), Expression::function("ABORT", vec![])?],
        )?;
        assert_eq!(lazy.evaluate(&row, &ctx)?, Value::Int(3));

        let lower = Expression::function("LOWER", vec![c("AbC")])?;
        assert_eq!(lower.evaluate(&row, &ctx)?, Value::string("abc"));
        assert_eq!(ctx.pools().args.idle(), 1);
        Ok(())
    }

    #[test]
    fn test_cover_and_sequence() -> ExpressionResult<()> {
        let ctx = MemoryContext::default().with_sequence("b.s", 1, 1);
        let row = AnnotatedValue::new(json!({"a": 1})).with_cover("(a)", 42);
        assert_eq!(
            Expression::cover(Expression::path("a"), "(a)").evaluate(&row, &ctx)?,
            Value::Int(42)
        );
        assert_eq!(
            Expression::cover(Expression::path("a"), "other").evaluate(&row, &ctx)?,
            Value::Int(1)
        );

        let next = Expression::next_value(vec!["b".to_string(), "s".to_string()]);
        assert_eq!(next.evaluate(&row, &ctx)?, Value::Int(1));
        assert_eq!(next.evaluate(&row, &ctx)?, Value::Int(2));

        let readonly = MemoryContext::default().with_sequence("b.s", 1, 1).with_readonly(true);
        assert!(next.evaluate(&row, &readonly).is_err());
        Ok(())
    }
}
