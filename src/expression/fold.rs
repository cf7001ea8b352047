//! Constant folding and simplification.
//!
//! Children are folded first. A node that is self-contained and whose
//! children are all constants is then evaluated once and replaced by the
//! resulting constant. A node whose trial evaluation fails or warns is kept
//! as is, with its children folded; aborts always propagate.

use crate::config::EvalConfig;
use crate::context::{Context, Warning};
use crate::expression::expr::{
    ArrayConstruct, ArrayMap, Between, Comprehension, Cover, Function, IsTest, Like,
    ObjectConstruct, ObjectMap, Parameter, SearchedCase, Sequence, SimpleCase, Slice, Subquery,
    When,
};
use crate::expression::visitor::Visitor;
use crate::expression::{AnnotatedValue, Expression, ExpressionResult};
use crate::pool::EvalPools;
use crate::value::Value;
use log::{debug, trace};
use std::sync::atomic::{AtomicBool, Ordering};

/// Context for trial evaluation. Records whether a warning was raised.
struct FoldContext {
    config: EvalConfig,
    pools: EvalPools,
    warned: AtomicBool,
}

impl Context for FoldContext {
    fn config(&self) -> &EvalConfig {
        &self.config
    }

    fn pools(&self) -> &EvalPools {
        &self.pools
    }

    fn warn(&self, warning: Warning) {
        trace!("fold trial raised: {}", warning);
        self.warned.store(true, Ordering::Relaxed);
    }
}

/// Folds expression trees. The result is always a new tree.
pub struct Folder {
    context: FoldContext,
}

impl Default for Folder {
    fn default() -> Self {
        Self::new(EvalConfig::default())
    }
}

impl Folder {
    /// `config` bounds the values trial evaluation may build
    pub fn new(config: EvalConfig) -> Self {
        Self {
            context: FoldContext {
                config,
                pools: EvalPools::default(),
                warned: AtomicBool::new(false),
            },
        }
    }

    pub fn fold(&mut self, expr: &Expression) -> ExpressionResult<Expression> {
        let node = expr.map_children(&mut |child| self.fold(child))?;
        let node = match node.accept(self)? {
            Some(rewritten) => rewritten,
            None => node,
        };
        self.reduce(node)
    }

    /// Replace a self-contained node over constants by its value
    fn reduce(&mut self, node: Expression) -> ExpressionResult<Expression> {
        if node.is_constant()
            || !node.is_self_contained()
            || !node.children().iter().all(|c| c.is_constant())
        {
            return Ok(node);
        }

        self.context.warned.store(false, Ordering::Relaxed);
        match node.evaluate(&AnnotatedValue::default(), &self.context) {
            Ok(_) if self.context.warned.load(Ordering::Relaxed) => {
                debug!("not folding, evaluation warned: {:?}", node);
                Ok(node)
            }
            Ok(value) => {
                trace!("folded {:?} to {}", node, value);
                Ok(Expression::Constant(value))
            }
            Err(e) if e.is_abort() => Err(e),
            Err(e) => {
                debug!("not folding, evaluation failed: {}", e);
                Ok(node)
            }
        }
    }
}

impl Expression {
    /// Fold with the default limits
    pub fn fold(&self) -> ExpressionResult<Expression> {
        Folder::default().fold(self)
    }
}

fn is_one(expr: &Expression) -> bool {
    expr.constant_value() == Some(&Value::Int(1))
}

/// A known constant whose truth value is `truth`
fn known_truth(expr: &Expression, truth: bool) -> bool {
    expr.constant_value()
        .is_some_and(|v| !v.is_unknown() && v.truth() == truth)
}

/// Kinds with no rewrite beyond generic constant reduction
macro_rules! no_rewrite {
    ($($method:ident ( $($arg:ident : $ty:ty),* );)*) => {
        $(
            fn $method(&mut self, $($arg: $ty),*) -> ExpressionResult<Option<Expression>> {
                $(let _ = $arg;)*
                Ok(None)
            }
        )*
    };
}

/// Each method sees a node whose children are already folded and returns
/// a rewrite, if any.
impl Visitor for Folder {
    type Output = Option<Expression>;

    no_rewrite! {
        visit_constant(value: &Value);
        visit_identifier(name: &str);
        visit_parameter(parameter: &Parameter);
        visit_add(operands: &[Expression]);
        visit_mult(operands: &[Expression]);
        visit_sub(first: &Expression, second: &Expression);
        visit_mod(first: &Expression, second: &Expression);
        visit_idiv(first: &Expression, second: &Expression);
        visit_imod(first: &Expression, second: &Expression);
        visit_neg(operand: &Expression);
        visit_eq(first: &Expression, second: &Expression);
        visit_lt(first: &Expression, second: &Expression);
        visit_le(first: &Expression, second: &Expression);
        visit_between(between: &Between);
        visit_like(like: &Like);
        visit_is(test: IsTest, operand: &Expression);
        visit_not(operand: &Expression);
        visit_field(base: &Expression, name: &str);
        visit_element(base: &Expression, index: &Expression);
        visit_slice(slice: &Slice);
        visit_array_construct(construct: &ArrayConstruct);
        visit_object_construct(construct: &ObjectConstruct);
        visit_any(any: &Comprehension);
        visit_every(every: &Comprehension);
        visit_any_every(any_every: &Comprehension);
        visit_array(array: &ArrayMap);
        visit_first(first: &ArrayMap);
        visit_object(object: &ObjectMap);
        visit_exists(operand: &Expression);
        visit_in(item: &Expression, collection: &Expression);
        visit_within(item: &Expression, collection: &Expression);
        visit_function(function: &Function);
        visit_subquery(subquery: &Subquery);
        visit_cover(cover: &Cover);
        visit_sequence(sequence: &Sequence);
    }

    /// `1 / (1 / x)` is `x`; `1 / (a * b)` is `(1 / a) * (1 / b)`
    fn visit_div(&mut self, first: &Expression, second: &Expression) -> ExpressionResult<Option<Expression>> {
        if !is_one(first) {
            return Ok(None);
        }
        match second {
            Expression::Div(one, inner) if is_one(one) => {
                trace!("reciprocal of reciprocal");
                Ok(Some((**inner).clone()))
            }
            Expression::Mult(factors) => {
                trace!("distributing reciprocal over {} factors", factors.len());
                let reciprocals = factors
                    .iter()
                    .map(|f| Expression::div(Expression::constant(1), f.clone()))
                    .collect();
                Ok(Some(self.fold(&Expression::mult(reciprocals))?))
            }
            _ => Ok(None),
        }
    }

    /// Drop known TRUE operands; a known FALSE decides the result
    fn visit_and(&mut self, operands: &[Expression]) -> ExpressionResult<Option<Expression>> {
        Ok(prune_logic(operands, false, Expression::and))
    }

    /// Drop known FALSE operands; a known TRUE decides the result
    fn visit_or(&mut self, operands: &[Expression]) -> ExpressionResult<Option<Expression>> {
        Ok(prune_logic(operands, true, Expression::or))
    }

    /// Drop branches whose condition is a constant that can never be TRUE.
    /// A leading constant TRUE condition selects its branch.
    fn visit_searched_case(&mut self, case: &SearchedCase) -> ExpressionResult<Option<Expression>> {
        let mut whens: Vec<When> = Vec::with_capacity(case.whens.len());
        for when in &case.whens {
            match when.when.constant_value() {
                Some(v) if v.truth() => {
                    if whens.is_empty() {
                        return Ok(Some(when.then.clone()));
                    }
                    whens.push(when.clone());
                    break;
                }
                Some(_) => continue,
                None => whens.push(when.clone()),
            }
        }

        if whens.is_empty() {
            return Ok(Some(otherwise_or_null(&case.otherwise)));
        }
        if whens.len() == case.whens.len() {
            return Ok(None);
        }
        Ok(Some(Expression::searched_case(whens, case.otherwise.clone())))
    }

    /// With a constant search value, resolve leading constant branches
    fn visit_simple_case(&mut self, case: &SimpleCase) -> ExpressionResult<Option<Expression>> {
        let Some(search) = case.search.constant_value() else {
            return Ok(None);
        };
        let mut pruned = 0;
        for when in &case.whens {
            let Some(candidate) = when.when.constant_value() else {
                break;
            };
            if search.equals(candidate).truth() {
                return Ok(Some(when.then.clone()));
            }
            pruned += 1;
        }

        if pruned == case.whens.len() {
            return Ok(Some(otherwise_or_null(&case.otherwise)));
        }
        if pruned == 0 {
            return Ok(None);
        }
        Ok(Some(Expression::simple_case(
            case.search.clone(),
            case.whens[pruned..].to_vec(),
            case.otherwise.clone(),
        )))
    }
}

/// Shared AND/OR pruning. A `decisive` constant ends evaluation, so later
/// operands go. It replaces the whole node only when every operand before it
/// is a constant; otherwise the operands before it still run first.
fn prune_logic(
    operands: &[Expression],
    decisive: bool,
    build: fn(Vec<Expression>) -> Expression,
) -> Option<Expression> {
    let mut kept: Vec<Expression> = Vec::with_capacity(operands.len());
    for operand in operands {
        if known_truth(operand, decisive) {
            if kept.iter().all(Expression::is_constant) {
                return Some(Expression::constant(decisive));
            }
            kept.push(operand.clone());
            break;
        }
        if !known_truth(operand, !decisive) {
            kept.push(operand.clone());
        }
    }
    match kept.len() {
        0 => Some(Expression::constant(!decisive)),
        n if n == operands.len() => None,
        _ => Some(build(kept)),
    }
}

fn otherwise_or_null(otherwise: &Option<Expression>) -> Expression {
    otherwise.clone().unwrap_or_else(Expression::null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::MemoryContext;
    use crate::expression::{Binding, Bindings, ExpressionError};

    fn c(value: impl Into<Value>) -> Expression {
        Expression::constant(value)
    }

    fn x() -> Expression {
        Expression::identifier("x")
    }

    #[test]
    fn test_constant_subtree_folds() -> ExpressionResult<()> {
        let expr = Expression::add(vec![x(), Expression::mult(vec![c(2), c(3)])]);
        assert_eq!(expr.fold()?, Expression::add(vec![x(), c(6)]));

        let constant = Expression::function("UPPER", vec![c("abc")])?;
        assert_eq!(constant.fold()?, c("ABC"));
        Ok(())
    }

    #[test]
    fn test_fold_preserves_first_operand_flattening() -> ExpressionResult<()> {
        let leading = Expression::add(vec![Expression::add(vec![c(1), c(2)]), x()]);
        assert_eq!(leading.children().len(), 3);
        assert_eq!(leading.fold()?.children().len(), 3);

        let trailing = Expression::add(vec![x(), Expression::add(vec![c(1), x()])]);
        let folded = trailing.fold()?;
        assert_eq!(folded.children().len(), 2);
        assert!(matches!(folded.children()[1], Expression::Add(_)));
        Ok(())
    }

    #[test]
    fn test_volatile_and_row_dependent_nodes_kept() -> ExpressionResult<()> {
        let random = Expression::function("RANDOM", vec![])?;
        assert_eq!(random.fold()?, random);
        let param = Expression::add(vec![Expression::named_parameter("p"), c(1)]);
        assert_eq!(param.fold()?, param);
        let next = Expression::next_value(vec!["s".to_string()]);
        assert_eq!(next.fold()?, next);
        Ok(())
    }

    #[test]
    fn test_warning_prevents_folding() -> ExpressionResult<()> {
        let expr = Expression::div(c(1), c(0));
        let folded = expr.fold()?;
        assert_eq!(folded, expr);

        // The warning still surfaces at run time
        let ctx = MemoryContext::default();
        assert!(folded.evaluate(&AnnotatedValue::default(), &ctx)?.is_null());
        assert_eq!(ctx.warnings().len(), 1);
        Ok(())
    }

    #[test]
    fn test_errors_keep_node_aborts_propagate() -> ExpressionResult<()> {
        let mut folder = Folder::new(EvalConfig::default().with_max_array_size(5));
        let range = Expression::function("ARRAY_RANGE", vec![c(0), c(100)])?;
        assert_eq!(folder.fold(&range)?, range);

        let abort = Expression::function("ABORT", vec![c("stop")])?;
        assert_eq!(abort.fold()?, abort);
        Ok(())
    }

    #[test]
    fn test_reciprocal_rewrites() -> ExpressionResult<()> {
        let double = Expression::div(c(1), Expression::div(c(1), x()));
        assert_eq!(double.fold()?, x());

        let product = Expression::div(c(1), Expression::mult(vec![c(4), x()]));
        assert_eq!(
            product.fold()?,
            Expression::mult(vec![c(0.25), Expression::div(c(1), x())])
        );
        Ok(())
    }

    #[test]
    fn test_logic_pruning() -> ExpressionResult<()> {
        assert_eq!(Expression::and(vec![c(false), x()]).fold()?, c(false));
        assert_eq!(
            Expression::and(vec![x(), c(true), c(false), x()]).fold()?,
            Expression::and(vec![x(), c(false)])
        );
        assert_eq!(Expression::and(vec![c(true), x()]).fold()?, Expression::and(vec![x()]));
        assert_eq!(Expression::and(vec![c(true), c(1)]).fold()?, c(true));
        assert_eq!(Expression::or(vec![c(1), x()]).fold()?, c(true));
        assert_eq!(
            Expression::or(vec![x(), c(1)]).fold()?,
            Expression::or(vec![x(), c(1)])
        );
        assert_eq!(Expression::or(vec![c(false), c(0)]).fold()?, c(false));
        // Unknown constants are not decisive
        let unknown = Expression::and(vec![Expression::null(), x()]);
        assert_eq!(unknown.fold()?, unknown);
        Ok(())
    }

    /// Result and warnings of evaluating against `{"x": 4}`
    fn run(expr: &Expression) -> (ExpressionResult<Value>, usize) {
        let ctx = MemoryContext::default();
        let row = AnnotatedValue::new(serde_json::json!({"x": 4}));
        let result = expr.evaluate(&row, &ctx);
        (result, ctx.warnings().len())
    }

    #[test]
    fn test_logic_pruning_keeps_earlier_side_effects() -> ExpressionResult<()> {
        let div = Expression::div(x(), c(0));
        let abort = Expression::function("ABORT", vec![c("stop")])?;
        let cases = vec![
            Expression::and(vec![div.clone(), c(false)]),
            Expression::and(vec![abort.clone(), c(false)]),
            Expression::or(vec![div.clone(), c(true)]),
            Expression::or(vec![abort.clone(), c(true)]),
            Expression::and(vec![c(true), div.clone(), c(false), abort.clone()]),
            Expression::or(vec![c(false), abort, c(true), div]),
        ];
        for expr in cases {
            let folded = expr.fold()?;
            assert!(!folded.is_constant(), "{:?}", folded);
            assert_eq!(run(&folded), run(&expr), "{:?}", expr);
        }

        let (result, warnings) = run(&Expression::and(vec![Expression::div(x(), c(0)), c(false)]).fold()?);
        assert_eq!(result?, Value::Boolean(false));
        assert_eq!(warnings, 1);
        Ok(())
    }

    #[test]
    fn test_case_pruning() -> ExpressionResult<()> {
        let searched = Expression::searched_case(
            vec![
                When { when: c(false), then: c(1) },
                When { when: Expression::eq(c(1), c(1)), then: c(2) },
                When { when: x(), then: c(3) },
            ],
            None,
        );
        assert_eq!(searched.fold()?, c(2));

        let partial = Expression::searched_case(
            vec![
                When { when: Expression::null(), then: c(1) },
                When { when: x(), then: c(3) },
            ],
            Some(c(4)),
        );
        assert_eq!(
            partial.fold()?,
            Expression::searched_case(vec![When { when: x(), then: c(3) }], Some(c(4)))
        );

        let simple = Expression::simple_case(
            c("b"),
            vec![When { when: c("a"), then: c(1) }, When { when: c("b"), then: c(2) }],
            None,
        );
        assert_eq!(simple.fold()?, c(2));
        let unmatched = Expression::simple_case(c("z"), vec![When { when: c("a"), then: c(1) }], None);
        assert_eq!(unmatched.fold()?, Expression::null());
        Ok(())
    }

    #[test]
    fn test_comprehension_over_constant_folds_children_only() -> ExpressionResult<()> {
        let expr = Expression::any(
            Bindings::single(Binding::new("v", Expression::array_construct(vec![c(1), c(2)]))),
            Expression::gt(Expression::identifier("v"), Expression::add(vec![c(0), c(1)])),
        );
        let folded = expr.fold()?;
        let Expression::Any(any) = &folded else {
            return Err(ExpressionError::evaluation("test", "expected ANY"));
        };
        assert!(any.bindings.sources().all(Expression::is_constant));
        assert_eq!(
            any.satisfies,
            Expression::gt(Expression::identifier("v"), c(1))
        );
        assert_eq!(
            folded.evaluate(&AnnotatedValue::default(), &MemoryContext::default())?,
            Value::Boolean(true)
        );
        Ok(())
    }
}
