//! Double-dispatch visitor protocol.
//!
//! [`Visitor`] has one required method per node kind, so an analysis that
//! forgets a kind fails to compile. [`Traverser`] is the permissive variant:
//! every method defaults to recursing into the node's children, and an
//! analysis overrides only the kinds it cares about.

use crate::expression::expr::{
    ArrayConstruct, ArrayMap, Between, Comprehension, Cover, Expression, Function, IsTest, Like,
    ObjectConstruct, ObjectMap, Parameter, SearchedCase, Sequence, SimpleCase, Slice, Subquery,
};
use crate::expression::ExpressionResult;
use crate::value::Value;

/// One method per node kind
pub trait Visitor {
    type Output;

    fn visit_constant(&mut self, value: &Value) -> ExpressionResult<Self::Output>;
    fn visit_identifier(&mut self, name: &str) -> ExpressionResult<Self::Output>;
    fn visit_parameter(&mut self, parameter: &Parameter) -> ExpressionResult<Self::Output>;

    fn visit_add(&mut self, operands: &[Expression]) -> ExpressionResult<Self::Output>;
    fn visit_mult(&mut self, operands: &[Expression]) -> ExpressionResult<Self::Output>;
    fn visit_sub(&mut self, first: &Expression, second: &Expression) -> ExpressionResult<Self::Output>;
    fn visit_div(&mut self, first: &Expression, second: &Expression) -> ExpressionResult<Self::Output>;
    fn visit_mod(&mut self, first: &Expression, second: &Expression) -> ExpressionResult<Self::Output>;
    fn visit_idiv(&mut self, first: &Expression, second: &Expression) -> ExpressionResult<Self::Output>;
    fn visit_imod(&mut self, first: &Expression, second: &Expression) -> ExpressionResult<Self::Output>;
    fn visit_neg(&mut self, operand: &Expression) -> ExpressionResult<Self::Output>;

    fn visit_eq(&mut self, first: &Expression, second: &Expression) -> ExpressionResult<Self::Output>;
    fn visit_lt(&mut self, first: &Expression, second: &Expression) -> ExpressionResult<Self::Output>;
    fn visit_le(&mut self, first: &Expression, second: &Expression) -> ExpressionResult<Self::Output>;
    fn visit_between(&mut self, between: &Between) -> ExpressionResult<Self::Output>;
    fn visit_like(&mut self, like: &Like) -> ExpressionResult<Self::Output>;
    fn visit_is(&mut self, test: IsTest, operand: &Expression) -> ExpressionResult<Self::Output>;

    fn visit_and(&mut self, operands: &[Expression]) -> ExpressionResult<Self::Output>;
    fn visit_or(&mut self, operands: &[Expression]) -> ExpressionResult<Self::Output>;
    fn visit_not(&mut self, operand: &Expression) -> ExpressionResult<Self::Output>;

    fn visit_field(&mut self, base: &Expression, name: &str) -> ExpressionResult<Self::Output>;
    fn visit_element(&mut self, base: &Expression, index: &Expression) -> ExpressionResult<Self::Output>;
    fn visit_slice(&mut self, slice: &Slice) -> ExpressionResult<Self::Output>;

    fn visit_array_construct(&mut self, construct: &ArrayConstruct) -> ExpressionResult<Self::Output>;
    fn visit_object_construct(&mut self, construct: &ObjectConstruct) -> ExpressionResult<Self::Output>;

    fn visit_searched_case(&mut self, case: &SearchedCase) -> ExpressionResult<Self::Output>;
    fn visit_simple_case(&mut self, case: &SimpleCase) -> ExpressionResult<Self::Output>;

    fn visit_any(&mut self, any: &Comprehension) -> ExpressionResult<Self::Output>;
    fn visit_every(&mut self, every: &Comprehension) -> ExpressionResult<Self::Output>;
    fn visit_any_every(&mut self, any_every: &Comprehension) -> ExpressionResult<Self::Output>;
    fn visit_array(&mut self, array: &ArrayMap) -> ExpressionResult<Self::Output>;
    fn visit_first(&mut self, first: &ArrayMap) -> ExpressionResult<Self::Output>;
    fn visit_object(&mut self, object: &ObjectMap) -> ExpressionResult<Self::Output>;
    fn visit_exists(&mut self, operand: &Expression) -> ExpressionResult<Self::Output>;
    fn visit_in(&mut self, item: &Expression, collection: &Expression) -> ExpressionResult<Self::Output>;
    fn visit_within(&mut self, item: &Expression, collection: &Expression) -> ExpressionResult<Self::Output>;

    fn visit_function(&mut self, function: &Function) -> ExpressionResult<Self::Output>;
    fn visit_subquery(&mut self, subquery: &Subquery) -> ExpressionResult<Self::Output>;
    fn visit_cover(&mut self, cover: &Cover) -> ExpressionResult<Self::Output>;
    fn visit_sequence(&mut self, sequence: &Sequence) -> ExpressionResult<Self::Output>;
}

impl Expression {
    /// Dispatch to the visitor method for this node's kind
    pub fn accept<V: Visitor + ?Sized>(&self, visitor: &mut V) -> ExpressionResult<V::Output> {
        match self {
            Expression::Constant(value) => visitor.visit_constant(value),
            Expression::Identifier(name) => visitor.visit_identifier(name),
            Expression::Parameter(parameter) => visitor.visit_parameter(parameter),
            Expression::Add(operands) => visitor.visit_add(operands),
            Expression::Mult(operands) => visitor.visit_mult(operands),
            Expression::Sub(a, b) => visitor.visit_sub(a, b),
            Expression::Div(a, b) => visitor.visit_div(a, b),
            Expression::Mod(a, b) => visitor.visit_mod(a, b),
            Expression::Idiv(a, b) => visitor.visit_idiv(a, b),
            Expression::Imod(a, b) => visitor.visit_imod(a, b),
            Expression::Neg(a) => visitor.visit_neg(a),
            Expression::Eq(a, b) => visitor.visit_eq(a, b),
            Expression::Lt(a, b) => visitor.visit_lt(a, b),
            Expression::Le(a, b) => visitor.visit_le(a, b),
            Expression::Between(between) => visitor.visit_between(between),
            Expression::Like(like) => visitor.visit_like(like),
            Expression::Is(test, operand) => visitor.visit_is(*test, operand),
            Expression::And(operands) => visitor.visit_and(operands),
            Expression::Or(operands) => visitor.visit_or(operands),
            Expression::Not(operand) => visitor.visit_not(operand),
            Expression::Field(base, name) => visitor.visit_field(base, name),
            Expression::Element(base, index) => visitor.visit_element(base, index),
            Expression::Slice(slice) => visitor.visit_slice(slice),
            Expression::ArrayConstruct(construct) => visitor.visit_array_construct(construct),
            Expression::ObjectConstruct(construct) => visitor.visit_object_construct(construct),
            Expression::SearchedCase(case) => visitor.visit_searched_case(case),
            Expression::SimpleCase(case) => visitor.visit_simple_case(case),
            Expression::Any(c) => visitor.visit_any(c),
            Expression::Every(c) => visitor.visit_every(c),
            Expression::AnyEvery(c) => visitor.visit_any_every(c),
            Expression::Array(m) => visitor.visit_array(m),
            Expression::First(m) => visitor.visit_first(m),
            Expression::Object(m) => visitor.visit_object(m),
            Expression::Exists(operand) => visitor.visit_exists(operand),
            Expression::In(a, b) => visitor.visit_in(a, b),
            Expression::Within(a, b) => visitor.visit_within(a, b),
            Expression::Function(function) => visitor.visit_function(function),
            Expression::Subquery(subquery) => visitor.visit_subquery(subquery),
            Expression::Cover(cover) => visitor.visit_cover(cover),
            Expression::Sequence(sequence) => visitor.visit_sequence(sequence),
        }
    }
}

/// A visitor whose every method defaults to visiting all children
pub trait Traverser: Sized {
    /// Visit each child of `expr` in order
    fn visit_children(&mut self, expr: &Expression) -> ExpressionResult<()> {
        for child in expr.children() {
            traverse(self, child)?;
        }
        Ok(())
    }

    fn visit_leaf(&mut self) -> ExpressionResult<()> {
        Ok(())
    }

    fn visit_identifier(&mut self, _name: &str) -> ExpressionResult<()> {
        self.visit_leaf()
    }

    fn visit_subquery(&mut self, _subquery: &Subquery) -> ExpressionResult<()> {
        self.visit_leaf()
    }

    fn visit_any(&mut self, any: &Comprehension) -> ExpressionResult<()> {
        comprehension_children(self, any)
    }

    fn visit_every(&mut self, every: &Comprehension) -> ExpressionResult<()> {
        comprehension_children(self, every)
    }

    fn visit_any_every(&mut self, any_every: &Comprehension) -> ExpressionResult<()> {
        comprehension_children(self, any_every)
    }

    fn visit_array(&mut self, array: &ArrayMap) -> ExpressionResult<()> {
        array_map_children(self, array)
    }

    fn visit_first(&mut self, first: &ArrayMap) -> ExpressionResult<()> {
        array_map_children(self, first)
    }

    fn visit_object(&mut self, object: &ObjectMap) -> ExpressionResult<()> {
        for source in object.bindings.sources() {
            traverse(self, source)?;
        }
        traverse(self, &object.name_mapping)?;
        traverse(self, &object.value_mapping)?;
        if let Some(when) = &object.when {
            traverse(self, when)?;
        }
        Ok(())
    }

    fn visit_exists(&mut self, operand: &Expression) -> ExpressionResult<()> {
        traverse(self, operand)
    }

    fn visit_function(&mut self, function: &Function) -> ExpressionResult<()> {
        for operand in &function.operands {
            traverse(self, operand)?;
        }
        Ok(())
    }
}

/// Walk the binding sources then the SATISFIES clause
pub fn comprehension_children<T: Traverser>(
    traverser: &mut T,
    comprehension: &Comprehension,
) -> ExpressionResult<()> {
    for source in comprehension.bindings.sources() {
        traverse(traverser, source)?;
    }
    traverse(traverser, &comprehension.satisfies)
}

fn array_map_children<T: Traverser>(traverser: &mut T, map: &ArrayMap) -> ExpressionResult<()> {
    for source in map.bindings.sources() {
        traverse(traverser, source)?;
    }
    traverse(traverser, &map.mapping)?;
    if let Some(when) = &map.when {
        traverse(traverser, when)?;
    }
    Ok(())
}

/// Adapts a [`Traverser`] to the full [`Visitor`] contract
struct Traversal<'t, T: Traverser>(&'t mut T);

/// Walk `expr` with a traverser
pub fn traverse<T: Traverser>(traverser: &mut T, expr: &Expression) -> ExpressionResult<()> {
    let mut traversal = Traversal(traverser);
    traversal.walk(expr)
}

impl<T: Traverser> Traversal<'_, T> {
    fn walk(&mut self, expr: &Expression) -> ExpressionResult<()> {
        expr.accept(self)
    }

    fn children_of(&mut self, expr: &Expression) -> ExpressionResult<()> {
        for child in expr.children() {
            self.walk(child)?;
        }
        Ok(())
    }

    fn all(&mut self, operands: &[Expression]) -> ExpressionResult<()> {
        for operand in operands {
            self.walk(operand)?;
        }
        Ok(())
    }

    fn pair(&mut self, first: &Expression, second: &Expression) -> ExpressionResult<()> {
        self.walk(first)?;
        self.walk(second)
    }
}

impl<T: Traverser> Visitor for Traversal<'_, T> {
    type Output = ();

    fn visit_constant(&mut self, _value: &Value) -> ExpressionResult<()> {
        self.0.visit_leaf()
    }

    fn visit_identifier(&mut self, name: &str) -> ExpressionResult<()> {
        self.0.visit_identifier(name)
    }

    fn visit_parameter(&mut self, _parameter: &Parameter) -> ExpressionResult<()> {
        self.0.visit_leaf()
    }

    fn visit_add(&mut self, operands: &[Expression]) -> ExpressionResult<()> {
        self.all(operands)
    }

    fn visit_mult(&mut self, operands: &[Expression]) -> ExpressionResult<()> {
        self.all(operands)
    }

    fn visit_sub(&mut self, first: &Expression, second: &Expression) -> ExpressionResult<()> {
        self.pair(first, second)
    }

    fn visit_div(&mut self, first: &Expression, second: &Expression) -> ExpressionResult<()> {
        self.pair(first, second)
    }

    fn visit_mod(&mut self, first: &Expression, second: &Expression) -> ExpressionResult<()> {
        self.pair(first, second)
    }

    fn visit_idiv(&mut self, first: &Expression, second: &Expression) -> ExpressionResult<()> {
        self.pair(first, second)
    }

    fn visit_imod(&mut self, first: &Expression, second: &Expression) -> ExpressionResult<()> {
        self.pair(first, second)
    }

    fn visit_neg(&mut self, operand: &Expression) -> ExpressionResult<()> {
        self.walk(operand)
    }

    fn visit_eq(&mut self, first: &Expression, second: &Expression) -> ExpressionResult<()> {
        self.pair(first, second)
    }

    fn visit_lt(&mut self, first: &Expression, second: &Expression) -> ExpressionResult<()> {
        self.pair(first, second)
    }

    fn visit_le(&mut self, first: &Expression, second: &Expression) -> ExpressionResult<()> {
        self.pair(first, second)
    }

    fn visit_between(&mut self, between: &Between) -> ExpressionResult<()> {
        self.walk(&between.operand)?;
        self.pair(&between.low, &between.high)
    }

    fn visit_like(&mut self, like: &Like) -> ExpressionResult<()> {
        self.pair(&like.operand, &like.pattern)
    }

    fn visit_is(&mut self, _test: IsTest, operand: &Expression) -> ExpressionResult<()> {
        self.walk(operand)
    }

    fn visit_and(&mut self, operands: &[Expression]) -> ExpressionResult<()> {
        self.all(operands)
    }

    fn visit_or(&mut self, operands: &[Expression]) -> ExpressionResult<()> {
        self.all(operands)
    }

    fn visit_not(&mut self, operand: &Expression) -> ExpressionResult<()> {
        self.walk(operand)
    }

    fn visit_field(&mut self, base: &Expression, _name: &str) -> ExpressionResult<()> {
        self.walk(base)
    }

    fn visit_element(&mut self, base: &Expression, index: &Expression) -> ExpressionResult<()> {
        self.pair(base, index)
    }

    fn visit_slice(&mut self, slice: &Slice) -> ExpressionResult<()> {
        self.pair(&slice.base, &slice.start)?;
        match &slice.end {
            Some(end) => self.walk(end),
            None => Ok(()),
        }
    }

    fn visit_array_construct(&mut self, construct: &ArrayConstruct) -> ExpressionResult<()> {
        self.all(&construct.operands)
    }

    fn visit_object_construct(&mut self, construct: &ObjectConstruct) -> ExpressionResult<()> {
        for (name, value) in &construct.pairs {
            self.pair(name, value)?;
        }
        Ok(())
    }

    fn visit_searched_case(&mut self, case: &SearchedCase) -> ExpressionResult<()> {
        for when in &case.whens {
            self.pair(&when.when, &when.then)?;
        }
        match &case.otherwise {
            Some(otherwise) => self.walk(otherwise),
            None => Ok(()),
        }
    }

    fn visit_simple_case(&mut self, case: &SimpleCase) -> ExpressionResult<()> {
        self.walk(&case.search)?;
        for when in &case.whens {
            self.pair(&when.when, &when.then)?;
        }
        match &case.otherwise {
            Some(otherwise) => self.walk(otherwise),
            None => Ok(()),
        }
    }

    fn visit_any(&mut self, any: &Comprehension) -> ExpressionResult<()> {
        self.0.visit_any(any)
    }

    fn visit_every(&mut self, every: &Comprehension) -> ExpressionResult<()> {
        self.0.visit_every(every)
    }

    fn visit_any_every(&mut self, any_every: &Comprehension) -> ExpressionResult<()> {
        self.0.visit_any_every(any_every)
    }

    fn visit_array(&mut self, array: &ArrayMap) -> ExpressionResult<()> {
        self.0.visit_array(array)
    }

    fn visit_first(&mut self, first: &ArrayMap) -> ExpressionResult<()> {
        self.0.visit_first(first)
    }

    fn visit_object(&mut self, object: &ObjectMap) -> ExpressionResult<()> {
        self.0.visit_object(object)
    }

    fn visit_exists(&mut self, operand: &Expression) -> ExpressionResult<()> {
        self.0.visit_exists(operand)
    }

    fn visit_in(&mut self, item: &Expression, collection: &Expression) -> ExpressionResult<()> {
        self.pair(item, collection)
    }

    fn visit_within(&mut self, item: &Expression, collection: &Expression) -> ExpressionResult<()> {
        self.pair(item, collection)
    }

    fn visit_function(&mut self, function: &Function) -> ExpressionResult<()> {
        self.0.visit_function(function)
    }

    fn visit_subquery(&mut self, subquery: &Subquery) -> ExpressionResult<()> {
        self.0.visit_subquery(subquery)
    }

    fn visit_cover(&mut self, _cover: &Cover) -> ExpressionResult<()> {
        self.0.visit_leaf()
    }

    fn visit_sequence(&mut self, _sequence: &Sequence) -> ExpressionResult<()> {
        self.0.visit_leaf()
    }
}
