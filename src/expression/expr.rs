//! Expression node model.
//!
//! The node kinds form a closed enum: every analysis matches on it
//! exhaustively (directly or through [`crate::expression::Visitor`]), so adding
//! a kind is a compile error until every algorithm handles it.
//!
//! Trees are shared read-only once built. The only interior mutation is a
//! handful of set-once caches (`OnceLock`): the constant value of an array or
//! object constructor, the array id of a comprehension, the compiled pattern
//! of a LIKE and the full name of a sequence. Populating them is idempotent.

use crate::expression::binding::Bindings;
use crate::expression::function::Builtin;
use crate::expression::{ExpressionError, ExpressionResult};
use crate::value::Value;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Upper arity bound of variadic nodes
pub const VARIADIC: usize = usize::MAX;

/// Type classification tests (IS [NOT] MISSING / NULL / VALUED)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsTest {
    Missing,
    NotMissing,
    Null,
    NotNull,
    Valued,
    NotValued,
}

impl IsTest {
    /// Classify a value. Never propagates MISSING or NULL.
    pub fn test(&self, value: &Value) -> bool {
        match self {
            IsTest::Missing => value.is_missing(),
            IsTest::NotMissing => !value.is_missing(),
            IsTest::Null => value.is_null(),
            IsTest::NotNull => !value.is_null(),
            IsTest::Valued => !value.is_unknown(),
            IsTest::NotValued => value.is_unknown(),
        }
    }
}

/// Query parameter reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parameter {
    /// `$name`
    Named(String),
    /// `$1`, 1-based
    Positional(usize),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Between {
    pub operand: Expression,
    pub low: Expression,
    pub high: Expression,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Like {
    pub operand: Expression,
    pub pattern: Expression,
    /// Compiled pattern, only populated when `pattern` is a constant
    #[serde(skip)]
    pub(crate) regex: OnceLock<Regex>,
}

impl PartialEq for Like {
    fn eq(&self, other: &Self) -> bool {
        self.operand == other.operand && self.pattern == other.pattern
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slice {
    pub base: Expression,
    pub start: Expression,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<Expression>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArrayConstruct {
    pub operands: Vec<Expression>,
    #[serde(skip)]
    pub(crate) cache: OnceLock<Value>,
}

impl PartialEq for ArrayConstruct {
    fn eq(&self, other: &Self) -> bool {
        self.operands == other.operands
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectConstruct {
    /// (name, value) pairs
    pub pairs: Vec<(Expression, Expression)>,
    #[serde(skip)]
    pub(crate) cache: OnceLock<Value>,
}

impl PartialEq for ObjectConstruct {
    fn eq(&self, other: &Self) -> bool {
        self.pairs == other.pairs
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct When {
    pub when: Expression,
    pub then: Expression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchedCase {
    pub whens: Vec<When>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otherwise: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleCase {
    pub search: Expression,
    pub whens: Vec<When>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otherwise: Option<Expression>,
}

/// ANY / EVERY / ANY AND EVERY
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comprehension {
    pub bindings: Bindings,
    pub satisfies: Expression,
    #[serde(skip)]
    pub(crate) array_id: OnceLock<u32>,
}

impl Comprehension {
    pub fn new(bindings: Bindings, satisfies: Expression) -> Self {
        Self {
            bindings,
            satisfies,
            array_id: OnceLock::new(),
        }
    }

    /// Id assigned by [`crate::expression::assign_array_id`]
    pub fn array_id(&self) -> Option<u32> {
        self.array_id.get().copied()
    }
}

impl PartialEq for Comprehension {
    fn eq(&self, other: &Self) -> bool {
        self.bindings == other.bindings && self.satisfies == other.satisfies
    }
}

/// ARRAY mapping FOR bindings [WHEN filter] END, and FIRST
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayMap {
    pub bindings: Bindings,
    pub mapping: Expression,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<Expression>,
}

/// OBJECT name : value FOR bindings [WHEN filter] END
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectMap {
    pub bindings: Bindings,
    pub name_mapping: Expression,
    pub value_mapping: Expression,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Callee {
    Builtin(Builtin),
    /// User-defined function, executed by the context
    User(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub callee: Callee,
    pub operands: Vec<Expression>,
}

impl Function {
    pub fn name(&self) -> &str {
        match &self.callee {
            Callee::Builtin(builtin) => builtin.name(),
            Callee::User(name) => name,
        }
    }

    pub fn arity(&self) -> (usize, usize) {
        match &self.callee {
            Callee::Builtin(builtin) => builtin.arity(),
            Callee::User(_) => (0, VARIADIC),
        }
    }

    pub fn check_arity(&self) -> ExpressionResult<()> {
        let (min, max) = self.arity();
        let actual = self.operands.len();
        if actual < min || actual > max {
            return Err(ExpressionError::FunctionArgumentCount {
                function: self.name().to_string(),
                min,
                max,
                actual,
            });
        }
        Ok(())
    }
}

/// Handle to a subquery planned and executed outside this crate
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subquery {
    pub name: String,
    /// References variables of the enclosing query
    #[serde(default)]
    pub correlated: bool,
}

/// An expression whose value an index scan has already produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cover {
    pub covered: Expression,
    /// Annotation key the scan stored the value under
    pub key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceOp {
    Next,
    Prev,
}

/// NEXT VALUE FOR / PREV VALUE FOR a named sequence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sequence {
    pub op: SequenceOp,
    /// Name parts, e.g. `["default", "bucket", "scope", "seq"]`
    pub path: Vec<String>,
    #[serde(skip)]
    full_name: OnceLock<String>,
}

impl Sequence {
    pub fn new(op: SequenceOp, path: Vec<String>) -> Self {
        Self {
            op,
            path,
            full_name: OnceLock::new(),
        }
    }

    /// `namespace:bucket.scope.name` for a four-part path, dotted otherwise.
    pub fn full_name(&self) -> &str {
        self.full_name.get_or_init(|| match self.path.split_first() {
            Some((namespace, rest)) if self.path.len() == 4 => {
                format!("{}:{}", namespace, rest.join("."))
            }
            _ => self.path.join("."),
        })
    }
}

impl PartialEq for Sequence {
    fn eq(&self, other: &Self) -> bool {
        self.op == other.op && self.path == other.path
    }
}

/// Expression tree node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expression {
    Constant(Value),
    Identifier(String),
    Parameter(Parameter),

    // Arithmetic
    Add(Vec<Expression>),
    Mult(Vec<Expression>),
    Sub(Box<Expression>, Box<Expression>),
    Div(Box<Expression>, Box<Expression>),
    Mod(Box<Expression>, Box<Expression>),
    Idiv(Box<Expression>, Box<Expression>),
    Imod(Box<Expression>, Box<Expression>),
    Neg(Box<Expression>),

    // Comparison
    Eq(Box<Expression>, Box<Expression>),
    Lt(Box<Expression>, Box<Expression>),
    Le(Box<Expression>, Box<Expression>),
    Between(Box<Between>),
    Like(Box<Like>),
    Is(IsTest, Box<Expression>),

    // Logical
    And(Vec<Expression>),
    Or(Vec<Expression>),
    Not(Box<Expression>),

    // Navigation
    Field(Box<Expression>, String),
    Element(Box<Expression>, Box<Expression>),
    Slice(Box<Slice>),

    // Construction
    ArrayConstruct(ArrayConstruct),
    ObjectConstruct(ObjectConstruct),

    // Conditional
    SearchedCase(Box<SearchedCase>),
    SimpleCase(Box<SimpleCase>),

    // Collections
    Any(Box<Comprehension>),
    Every(Box<Comprehension>),
    AnyEvery(Box<Comprehension>),
    Array(Box<ArrayMap>),
    First(Box<ArrayMap>),
    Object(Box<ObjectMap>),
    Exists(Box<Expression>),
    In(Box<Expression>, Box<Expression>),
    Within(Box<Expression>, Box<Expression>),

    Function(Function),
    Subquery(Subquery),
    Cover(Box<Cover>),
    Sequence(Box<Sequence>),
}

impl Expression {
    pub fn constant(value: impl Into<Value>) -> Self {
        Expression::Constant(value.into())
    }

    pub fn missing() -> Self {
        Expression::Constant(Value::Missing)
    }

    pub fn null() -> Self {
        Expression::Constant(Value::Null)
    }

    pub fn identifier(name: impl Into<String>) -> Self {
        Expression::Identifier(name.into())
    }

    /// Dotted path: an identifier followed by field steps, e.g. `"a.b.c"`.
    pub fn path(path: &str) -> Self {
        let mut parts = path.split('.');
        let mut expr = Expression::identifier(parts.next().unwrap_or_default());
        for part in parts {
            expr = Expression::field(expr, part);
        }
        expr
    }

    pub fn named_parameter(name: impl Into<String>) -> Self {
        Expression::Parameter(Parameter::Named(name.into()))
    }

    pub fn positional_parameter(position: usize) -> Self {
        Expression::Parameter(Parameter::Positional(position))
    }

    /// N-ary addition. A leading ADD operand is spliced in; later ones are not.
    pub fn add(operands: Vec<Expression>) -> Self {
        let mut operands = operands;
        if matches!(operands.first(), Some(Expression::Add(_))) {
            if let Expression::Add(mut inner) = operands.remove(0) {
                inner.append(&mut operands);
                operands = inner;
            }
        }
        Expression::Add(operands)
    }

    /// N-ary multiplication. A leading MULT operand is spliced in; later ones are not.
    pub fn mult(operands: Vec<Expression>) -> Self {
        let mut operands = operands;
        if matches!(operands.first(), Some(Expression::Mult(_))) {
            if let Expression::Mult(mut inner) = operands.remove(0) {
                inner.append(&mut operands);
                operands = inner;
            }
        }
        Expression::Mult(operands)
    }

    pub fn sub(first: Expression, second: Expression) -> Self {
        Expression::Sub(Box::new(first), Box::new(second))
    }

    pub fn div(first: Expression, second: Expression) -> Self {
        Expression::Div(Box::new(first), Box::new(second))
    }

    pub fn modulo(first: Expression, second: Expression) -> Self {
        Expression::Mod(Box::new(first), Box::new(second))
    }

    pub fn idiv(first: Expression, second: Expression) -> Self {
        Expression::Idiv(Box::new(first), Box::new(second))
    }

    pub fn imod(first: Expression, second: Expression) -> Self {
        Expression::Imod(Box::new(first), Box::new(second))
    }

    pub fn neg(operand: Expression) -> Self {
        Expression::Neg(Box::new(operand))
    }

    pub fn eq(first: Expression, second: Expression) -> Self {
        Expression::Eq(Box::new(first), Box::new(second))
    }

    /// `first != second`, expressed as NOT(first = second)
    pub fn ne(first: Expression, second: Expression) -> Self {
        Expression::not(Expression::eq(first, second))
    }

    pub fn lt(first: Expression, second: Expression) -> Self {
        Expression::Lt(Box::new(first), Box::new(second))
    }

    pub fn le(first: Expression, second: Expression) -> Self {
        Expression::Le(Box::new(first), Box::new(second))
    }

    /// `first > second`, expressed as `second < first`
    pub fn gt(first: Expression, second: Expression) -> Self {
        Expression::lt(second, first)
    }

    /// `first >= second`, expressed as `second <= first`
    pub fn ge(first: Expression, second: Expression) -> Self {
        Expression::le(second, first)
    }

    pub fn between(operand: Expression, low: Expression, high: Expression) -> Self {
        Expression::Between(Box::new(Between { operand, low, high }))
    }

    pub fn like(operand: Expression, pattern: Expression) -> Self {
        Expression::Like(Box::new(Like {
            operand,
            pattern,
            regex: OnceLock::new(),
        }))
    }

    pub fn is(test: IsTest, operand: Expression) -> Self {
        Expression::Is(test, Box::new(operand))
    }

    pub fn is_missing(operand: Expression) -> Self {
        Expression::is(IsTest::Missing, operand)
    }

    pub fn is_not_missing(operand: Expression) -> Self {
        Expression::is(IsTest::NotMissing, operand)
    }

    pub fn is_null(operand: Expression) -> Self {
        Expression::is(IsTest::Null, operand)
    }

    pub fn is_not_null(operand: Expression) -> Self {
        Expression::is(IsTest::NotNull, operand)
    }

    pub fn is_valued(operand: Expression) -> Self {
        Expression::is(IsTest::Valued, operand)
    }

    pub fn and(operands: Vec<Expression>) -> Self {
        Expression::And(operands)
    }

    pub fn or(operands: Vec<Expression>) -> Self {
        Expression::Or(operands)
    }

    pub fn not(operand: Expression) -> Self {
        Expression::Not(Box::new(operand))
    }

    pub fn field(base: Expression, name: impl Into<String>) -> Self {
        Expression::Field(Box::new(base), name.into())
    }

    pub fn element(base: Expression, index: Expression) -> Self {
        Expression::Element(Box::new(base), Box::new(index))
    }

    pub fn slice(base: Expression, start: Expression, end: Option<Expression>) -> Self {
        Expression::Slice(Box::new(Slice { base, start, end }))
    }

    pub fn array_construct(operands: Vec<Expression>) -> Self {
        Expression::ArrayConstruct(ArrayConstruct {
            operands,
            cache: OnceLock::new(),
        })
    }

    pub fn object_construct(pairs: Vec<(Expression, Expression)>) -> Self {
        Expression::ObjectConstruct(ObjectConstruct {
            pairs,
            cache: OnceLock::new(),
        })
    }

    pub fn searched_case(whens: Vec<When>, otherwise: Option<Expression>) -> Self {
        Expression::SearchedCase(Box::new(SearchedCase { whens, otherwise }))
    }

    pub fn simple_case(search: Expression, whens: Vec<When>, otherwise: Option<Expression>) -> Self {
        Expression::SimpleCase(Box::new(SimpleCase {
            search,
            whens,
            otherwise,
        }))
    }

    pub fn any(bindings: Bindings, satisfies: Expression) -> Self {
        Expression::Any(Box::new(Comprehension::new(bindings, satisfies)))
    }

    pub fn every(bindings: Bindings, satisfies: Expression) -> Self {
        Expression::Every(Box::new(Comprehension::new(bindings, satisfies)))
    }

    pub fn any_every(bindings: Bindings, satisfies: Expression) -> Self {
        Expression::AnyEvery(Box::new(Comprehension::new(bindings, satisfies)))
    }

    pub fn array(bindings: Bindings, mapping: Expression, when: Option<Expression>) -> Self {
        Expression::Array(Box::new(ArrayMap {
            bindings,
            mapping,
            when,
        }))
    }

    pub fn first(bindings: Bindings, mapping: Expression, when: Option<Expression>) -> Self {
        Expression::First(Box::new(ArrayMap {
            bindings,
            mapping,
            when,
        }))
    }

    pub fn object(
        bindings: Bindings,
        name_mapping: Expression,
        value_mapping: Expression,
        when: Option<Expression>,
    ) -> Self {
        Expression::Object(Box::new(ObjectMap {
            bindings,
            name_mapping,
            value_mapping,
            when,
        }))
    }

    pub fn exists(operand: Expression) -> Self {
        Expression::Exists(Box::new(operand))
    }

    pub fn in_(first: Expression, second: Expression) -> Self {
        Expression::In(Box::new(first), Box::new(second))
    }

    pub fn within(first: Expression, second: Expression) -> Self {
        Expression::Within(Box::new(first), Box::new(second))
    }

    /// Call a builtin function by name, checking its arity.
    pub fn function(name: &str, operands: Vec<Expression>) -> ExpressionResult<Self> {
        let builtin = Builtin::from_name(name)
            .ok_or_else(|| ExpressionError::UnknownFunction(name.to_string()))?;
        let function = Function {
            callee: Callee::Builtin(builtin),
            operands,
        };
        function.check_arity()?;
        Ok(Expression::Function(function))
    }

    pub fn user_function(name: impl Into<String>, operands: Vec<Expression>) -> Self {
        Expression::Function(Function {
            callee: Callee::User(name.into()),
            operands,
        })
    }

    pub fn subquery(name: impl Into<String>, correlated: bool) -> Self {
        Expression::Subquery(Subquery {
            name: name.into(),
            correlated,
        })
    }

    pub fn cover(covered: Expression, key: impl Into<String>) -> Self {
        Expression::Cover(Box::new(Cover {
            covered,
            key: key.into(),
        }))
    }

    pub fn next_value(path: Vec<String>) -> Self {
        Expression::Sequence(Box::new(Sequence::new(SequenceOp::Next, path)))
    }

    pub fn prev_value(path: Vec<String>) -> Self {
        Expression::Sequence(Box::new(Sequence::new(SequenceOp::Prev, path)))
    }

    /// Operands in evaluation order. Comprehensions list their binding
    /// sources first. Cover markers are leaves.
    pub fn children(&self) -> Vec<&Expression> {
        match self {
            Expression::Constant(_)
            | Expression::Identifier(_)
            | Expression::Parameter(_)
            | Expression::Subquery(_)
            | Expression::Cover(_)
            | Expression::Sequence(_) => Vec::new(),
            Expression::Add(operands)
            | Expression::Mult(operands)
            | Expression::And(operands)
            | Expression::Or(operands) => operands.iter().collect(),
            Expression::Sub(first, second)
            | Expression::Div(first, second)
            | Expression::Mod(first, second)
            | Expression::Idiv(first, second)
            | Expression::Imod(first, second)
            | Expression::Eq(first, second)
            | Expression::Lt(first, second)
            | Expression::Le(first, second)
            | Expression::Element(first, second)
            | Expression::In(first, second)
            | Expression::Within(first, second) => vec![&**first, &**second],
            Expression::Neg(operand)
            | Expression::Not(operand)
            | Expression::Exists(operand)
            | Expression::Is(_, operand)
            | Expression::Field(operand, _) => vec![&**operand],
            Expression::Between(between) => vec![&between.operand, &between.low, &between.high],
            Expression::Like(like) => vec![&like.operand, &like.pattern],
            Expression::Slice(slice) => {
                let mut children = vec![&slice.base, &slice.start];
                children.extend(slice.end.as_ref());
                children
            }
            Expression::ArrayConstruct(construct) => construct.operands.iter().collect(),
            Expression::ObjectConstruct(construct) => construct
                .pairs
                .iter()
                .flat_map(|(name, value)| [name, value])
                .collect(),
            Expression::SearchedCase(case) => {
                let mut children: Vec<&Expression> = case
                    .whens
                    .iter()
                    .flat_map(|w| [&w.when, &w.then])
                    .collect();
                children.extend(case.otherwise.as_ref());
                children
            }
            Expression::SimpleCase(case) => {
                let mut children = vec![&case.search];
                children.extend(case.whens.iter().flat_map(|w| [&w.when, &w.then]));
                children.extend(case.otherwise.as_ref());
                children
            }
            Expression::Any(c) | Expression::Every(c) | Expression::AnyEvery(c) => {
                let mut children: Vec<&Expression> = c.bindings.sources().collect();
                children.push(&c.satisfies);
                children
            }
            Expression::Array(m) | Expression::First(m) => {
                let mut children: Vec<&Expression> = m.bindings.sources().collect();
                children.push(&m.mapping);
                children.extend(m.when.as_ref());
                children
            }
            Expression::Object(m) => {
                let mut children: Vec<&Expression> = m.bindings.sources().collect();
                children.push(&m.name_mapping);
                children.push(&m.value_mapping);
                children.extend(m.when.as_ref());
                children
            }
            Expression::Function(function) => function.operands.iter().collect(),
        }
    }

    /// Minimum and maximum operand counts of this node kind
    pub fn arity(&self) -> (usize, usize) {
        match self {
            Expression::Constant(_)
            | Expression::Identifier(_)
            | Expression::Parameter(_)
            | Expression::Subquery(_)
            | Expression::Cover(_)
            | Expression::Sequence(_) => (0, 0),
            Expression::Add(_) | Expression::Mult(_) => (2, VARIADIC),
            Expression::And(_) | Expression::Or(_) => (1, VARIADIC),
            Expression::Sub(..)
            | Expression::Div(..)
            | Expression::Mod(..)
            | Expression::Idiv(..)
            | Expression::Imod(..)
            | Expression::Eq(..)
            | Expression::Lt(..)
            | Expression::Le(..)
            | Expression::Like(_)
            | Expression::Element(..)
            | Expression::In(..)
            | Expression::Within(..) => (2, 2),
            Expression::Neg(_)
            | Expression::Not(_)
            | Expression::Exists(_)
            | Expression::Is(..)
            | Expression::Field(..) => (1, 1),
            Expression::Between(_) => (3, 3),
            Expression::Slice(_) => (2, 3),
            Expression::ArrayConstruct(_) | Expression::ObjectConstruct(_) => (0, VARIADIC),
            Expression::SearchedCase(_) => (2, VARIADIC),
            Expression::SimpleCase(_) => (3, VARIADIC),
            Expression::Any(_)
            | Expression::Every(_)
            | Expression::AnyEvery(_)
            | Expression::Array(_)
            | Expression::First(_)
            | Expression::Object(_) => (2, VARIADIC),
            Expression::Function(function) => function.arity(),
        }
    }

    /// Independently owned, structurally equal copy. Populated caches are
    /// carried over; they hold whole-subtree values and stay valid.
    pub fn copy(&self) -> Expression {
        self.clone()
    }

    /// Structural equivalence, ignoring caches
    pub fn equivalent_to(&self, other: &Expression) -> bool {
        self == other
    }

    /// Value may differ between evaluations with identical inputs
    pub fn is_volatile(&self) -> bool {
        match self {
            Expression::Function(function) => match &function.callee {
                Callee::Builtin(builtin) => builtin.is_volatile(),
                Callee::User(_) => true,
            },
            Expression::Sequence(_) => true,
            _ => false,
        }
    }

    /// Operands are evaluated lazily
    pub fn is_conditional(&self) -> bool {
        match self {
            Expression::And(_)
            | Expression::Or(_)
            | Expression::SearchedCase(_)
            | Expression::SimpleCase(_) => true,
            Expression::Function(Function {
                callee: Callee::Builtin(builtin),
                ..
            }) => builtin.is_conditional(),
            _ => false,
        }
    }

    /// Value depends only on the node itself and its children, never on the
    /// row, the parameters or external services.
    pub fn is_self_contained(&self) -> bool {
        !matches!(
            self,
            Expression::Identifier(_)
                | Expression::Parameter(_)
                | Expression::Subquery(_)
                | Expression::Cover(_)
        ) && !self.is_volatile()
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Expression::Constant(_))
    }

    pub fn constant_value(&self) -> Option<&Value> {
        match self {
            Expression::Constant(value) => Some(value),
            _ => None,
        }
    }

    /// Built entirely from constants and constructors of constants
    pub fn is_static(&self) -> bool {
        match self {
            Expression::Constant(_) => true,
            Expression::ArrayConstruct(_) | Expression::ObjectConstruct(_) => {
                self.children().iter().all(|c| c.is_static())
            }
            _ => false,
        }
    }

    /// Array id of a comprehension node, once assigned
    pub fn array_id(&self) -> Option<u32> {
        match self {
            Expression::Any(c) | Expression::Every(c) | Expression::AnyEvery(c) => c.array_id(),
            _ => None,
        }
    }

    /// Bindings introduced by a comprehension node. Its first
    /// `bindings.len()` children are the sources; the rest see the variables.
    pub fn bindings(&self) -> Option<&Bindings> {
        match self {
            Expression::Any(c) | Expression::Every(c) | Expression::AnyEvery(c) => {
                Some(&c.bindings)
            }
            Expression::Array(m) | Expression::First(m) => Some(&m.bindings),
            Expression::Object(m) => Some(&m.bindings),
            _ => None,
        }
    }

    /// Rebuild this node with every child replaced by `f(child)`. The result
    /// is always a new node with empty caches.
    pub fn map_children<F>(&self, f: &mut F) -> ExpressionResult<Expression>
    where
        F: FnMut(&Expression) -> ExpressionResult<Expression>,
    {
        let mut map_box = |e: &Expression| -> ExpressionResult<Box<Expression>> { Ok(Box::new(f(e)?)) };
        let expr = match self {
            Expression::Constant(_)
            | Expression::Identifier(_)
            | Expression::Parameter(_)
            | Expression::Subquery(_)
            | Expression::Cover(_) => self.clone(),
            Expression::Sequence(sequence) => {
                Expression::Sequence(Box::new(Sequence::new(sequence.op, sequence.path.clone())))
            }
            Expression::Add(operands) => Expression::add(map_all(operands, &mut map_box)?),
            Expression::Mult(operands) => Expression::mult(map_all(operands, &mut map_box)?),
            Expression::And(operands) => Expression::And(map_all(operands, &mut map_box)?),
            Expression::Or(operands) => Expression::Or(map_all(operands, &mut map_box)?),
            Expression::Sub(a, b) => Expression::Sub(map_box(a)?, map_box(b)?),
            Expression::Div(a, b) => Expression::Div(map_box(a)?, map_box(b)?),
            Expression::Mod(a, b) => Expression::Mod(map_box(a)?, map_box(b)?),
            Expression::Idiv(a, b) => Expression::Idiv(map_box(a)?, map_box(b)?),
            Expression::Imod(a, b) => Expression::Imod(map_box(a)?, map_box(b)?),
            Expression::Eq(a, b) => Expression::Eq(map_box(a)?, map_box(b)?),
            Expression::Lt(a, b) => Expression::Lt(map_box(a)?, map_box(b)?),
            Expression::Le(a, b) => Expression::Le(map_box(a)?, map_box(b)?),
            Expression::Element(a, b) => Expression::Element(map_box(a)?, map_box(b)?),
            Expression::In(a, b) => Expression::In(map_box(a)?, map_box(b)?),
            Expression::Within(a, b) => Expression::Within(map_box(a)?, map_box(b)?),
            Expression::Neg(a) => Expression::Neg(map_box(a)?),
            Expression::Not(a) => Expression::Not(map_box(a)?),
            Expression::Exists(a) => Expression::Exists(map_box(a)?),
            Expression::Is(test, a) => Expression::Is(*test, map_box(a)?),
            Expression::Field(a, name) => Expression::Field(map_box(a)?, name.clone()),
            Expression::Between(b) => Expression::between(
                *map_box(&b.operand)?,
                *map_box(&b.low)?,
                *map_box(&b.high)?,
            ),
            Expression::Like(l) => Expression::like(*map_box(&l.operand)?, *map_box(&l.pattern)?),
            Expression::Slice(s) => Expression::slice(
                *map_box(&s.base)?,
                *map_box(&s.start)?,
                map_option(s.end.as_ref(), &mut map_box)?,
            ),
            Expression::ArrayConstruct(c) => {
                Expression::array_construct(map_all(&c.operands, &mut map_box)?)
            }
            Expression::ObjectConstruct(c) => Expression::object_construct(
                c.pairs
                    .iter()
                    .map(|(n, v)| Ok((*map_box(n)?, *map_box(v)?)))
                    .collect::<ExpressionResult<Vec<_>>>()?,
            ),
            Expression::SearchedCase(c) => Expression::searched_case(
                map_whens(&c.whens, &mut map_box)?,
                map_option(c.otherwise.as_ref(), &mut map_box)?,
            ),
            Expression::SimpleCase(c) => Expression::simple_case(
                *map_box(&c.search)?,
                map_whens(&c.whens, &mut map_box)?,
                map_option(c.otherwise.as_ref(), &mut map_box)?,
            ),
            Expression::Any(c) => {
                let bindings = c.bindings.map_sources(|e| Ok(*map_box(e)?))?;
                Expression::any(bindings, *map_box(&c.satisfies)?)
            }
            Expression::Every(c) => {
                let bindings = c.bindings.map_sources(|e| Ok(*map_box(e)?))?;
                Expression::every(bindings, *map_box(&c.satisfies)?)
            }
            Expression::AnyEvery(c) => {
                let bindings = c.bindings.map_sources(|e| Ok(*map_box(e)?))?;
                Expression::any_every(bindings, *map_box(&c.satisfies)?)
            }
            Expression::Array(m) => {
                let bindings = m.bindings.map_sources(|e| Ok(*map_box(e)?))?;
                Expression::array(
                    bindings,
                    *map_box(&m.mapping)?,
                    map_option(m.when.as_ref(), &mut map_box)?,
                )
            }
            Expression::First(m) => {
                let bindings = m.bindings.map_sources(|e| Ok(*map_box(e)?))?;
                Expression::first(
                    bindings,
                    *map_box(&m.mapping)?,
                    map_option(m.when.as_ref(), &mut map_box)?,
                )
            }
            Expression::Object(m) => {
                let bindings = m.bindings.map_sources(|e| Ok(*map_box(e)?))?;
                Expression::object(
                    bindings,
                    *map_box(&m.name_mapping)?,
                    *map_box(&m.value_mapping)?,
                    map_option(m.when.as_ref(), &mut map_box)?,
                )
            }
            Expression::Function(function) => Expression::Function(Function {
                callee: function.callee.clone(),
                operands: map_all(&function.operands, &mut map_box)?,
            }),
        };
        Ok(expr)
    }
}

type MapBox<'f> = dyn FnMut(&Expression) -> ExpressionResult<Box<Expression>> + 'f;

fn map_all(operands: &[Expression], f: &mut MapBox<'_>) -> ExpressionResult<Vec<Expression>> {
    operands.iter().map(|e| Ok(*f(e)?)).collect()
}

fn map_option(
    operand: Option<&Expression>,
    f: &mut MapBox<'_>,
) -> ExpressionResult<Option<Expression>> {
    operand.map(|e| Ok(*f(e)?)).transpose()
}

fn map_whens(whens: &[When], f: &mut MapBox<'_>) -> ExpressionResult<Vec<When>> {
    whens
        .iter()
        .map(|w| {
            Ok(When {
                when: *f(&w.when)?,
                then: *f(&w.then)?,
            })
        })
        .collect()
}

impl From<Value> for Expression {
    fn from(value: Value) -> Self {
        Expression::Constant(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::Binding;

    fn ident(name: &str) -> Expression {
        Expression::identifier(name)
    }

    #[test]
    fn test_add_flattens_first_operand_only() {
        let leading = Expression::add(vec![
            Expression::add(vec![ident("a"), ident("b")]),
            ident("c"),
        ]);
        assert_eq!(leading.children().len(), 3);
        assert_eq!(
            leading,
            Expression::Add(vec![ident("a"), ident("b"), ident("c")])
        );

        let trailing = Expression::add(vec![
            ident("a"),
            Expression::add(vec![ident("b"), ident("c")]),
        ]);
        assert_eq!(trailing.children().len(), 2);
        assert!(matches!(trailing.children()[1], Expression::Add(_)));

        // The splice does not recurse into the spliced node's own first operand
        let deep = Expression::add(vec![
            Expression::Add(vec![Expression::Add(vec![ident("a"), ident("b")]), ident("c")]),
            ident("d"),
        ]);
        assert_eq!(deep.children().len(), 3);
        assert!(matches!(deep.children()[0], Expression::Add(_)));
    }

    #[test]
    fn test_mult_flattening_is_kind_specific() {
        let mixed = Expression::mult(vec![
            Expression::add(vec![ident("a"), ident("b")]),
            ident("c"),
        ]);
        assert_eq!(mixed.children().len(), 2);

        let same = Expression::mult(vec![
            Expression::mult(vec![ident("a"), ident("b")]),
            ident("c"),
        ]);
        assert_eq!(same.children().len(), 3);
    }

    #[test]
    fn test_path_builder() {
        let expr = Expression::path("a.b.c");
        assert_eq!(
            expr,
            Expression::field(Expression::field(ident("a"), "b"), "c")
        );
    }

    #[test]
    fn test_function_arity_checked() {
        assert!(Expression::function("array_swap", vec![ident("a")]).is_err());
        assert!(Expression::function("ARRAY_SWAP", vec![ident("a"), ident("b"), ident("c")]).is_ok());
        assert!(matches!(
            Expression::function("no_such_fn", vec![]),
            Err(ExpressionError::UnknownFunction(_))
        ));
    }

    #[test]
    fn test_flags() -> ExpressionResult<()> {
        let random = Expression::function("RANDOM", vec![])?;
        assert!(random.is_volatile());
        assert!(!random.is_self_contained());
        assert!(Expression::next_value(vec!["s".to_string()]).is_volatile());
        assert!(Expression::and(vec![ident("a"), ident("b")]).is_conditional());
        assert!(Expression::function("IFMISSING", vec![ident("a"), ident("b")])?.is_conditional());
        assert!(!Expression::add(vec![ident("a"), ident("b")]).is_conditional());
        Ok(())
    }

    #[test]
    fn test_children_order_for_comprehension() -> ExpressionResult<()> {
        let bindings = Bindings::new(vec![
            Binding::new("v", Expression::path("a")),
            Binding::new("w", Expression::path("b")),
        ])?;
        let expr = Expression::any(bindings, Expression::eq(ident("v"), ident("w")));
        let children = expr.children();
        assert_eq!(children.len(), 3);
        assert_eq!(children[0], &Expression::path("a"));
        assert_eq!(children[1], &Expression::path("b"));
        assert_eq!(expr.arity(), (2, VARIADIC));
        Ok(())
    }

    #[test]
    fn test_copy_is_equivalent_and_independent() {
        let original = Expression::eq(Expression::path("a.b"), Expression::constant(1));
        let mut copy = original.copy();
        assert!(copy.equivalent_to(&original));

        if let Expression::Eq(_, second) = &mut copy {
            **second = Expression::constant(2);
        }
        assert!(!copy.equivalent_to(&original));
        assert_eq!(
            original,
            Expression::eq(Expression::path("a.b"), Expression::constant(1))
        );
    }

    #[test]
    fn test_sequence_full_name() {
        let parts = ["default", "b", "s", "seq"].map(String::from).to_vec();
        let expr = Expression::next_value(parts);
        if let Expression::Sequence(sequence) = &expr {
            assert_eq!(sequence.full_name(), "default:b.s.seq");
        }
        let short = Sequence::new(SequenceOp::Prev, vec!["s".to_string(), "seq".to_string()]);
        assert_eq!(short.full_name(), "s.seq");
    }

    #[test]
    fn test_map_children_rebuilds() -> ExpressionResult<()> {
        let expr = Expression::lt(ident("a"), Expression::constant(3));
        let mapped = expr.map_children(&mut |child| {
            Ok(match child {
                Expression::Identifier(_) => ident("z"),
                other => other.clone(),
            })
        })?;
        assert_eq!(mapped, Expression::lt(ident("z"), Expression::constant(3)));
        Ok(())
    }

    #[test]
    fn test_serde_tree() -> anyhow::Result<()> {
        let json = r#"{"add":[{"identifier":"a"},{"constant":2}]}"#;
        let expr: Expression = serde_json::from_str(json)?;
        assert_eq!(expr, Expression::add(vec![ident("a"), Expression::constant(2)]));
        assert_eq!(serde_json::to_string(&expr)?, json);

        let call: Expression = serde_json::from_str(
            r#"{"function":{"callee":{"builtin":"ARRAY_LENGTH"},"operands":[{"identifier":"a"}]}}"#,
        )?;
        assert!(matches!(call, Expression::Function(_)));
        Ok(())
    }
}
