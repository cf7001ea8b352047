//! Comprehension analyses used by the planner: aligning ANY predicates with
//! array index keys, numbering comprehensions, and reference scans.

use crate::expression::binding::collect_bindings;
use crate::expression::rename::{
    align_variables, rename_binding_variables, rename_bindings, rename_variables, RenameOutcome,
};
use crate::expression::visitor::{comprehension_children, traverse, Traverser};
use crate::expression::{
    ArrayMap, Bindings, Comprehension, Expression, ExpressionError, ExpressionResult, ObjectMap,
    Subquery,
};
use log::{debug, trace};
use std::collections::{BTreeMap, HashSet};

/// An ANY predicate whose bindings were aligned with an array index key
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedAny {
    /// The predicate as written
    pub original: Expression,
    /// The predicate using the index key's variable names
    pub renamed: Expression,
}

/// Find every ANY (and ANY AND EVERY) in `expr` that iterates the same
/// sources as `array_key`, an `ARRAY ... FOR ... END` index key, renaming
/// its variables to the key's. Nested keys such as
/// `ARRAY (ARRAY w FOR w IN v.b END) FOR v IN a END` are matched level by
/// level inside the SATISFIES clause.
///
/// Fails with [`ExpressionError::BindingConflict`] when a matching predicate
/// cannot be renamed, or when renamed variables are visible to a correlated
/// subquery.
pub fn gather_any(
    expr: &Expression,
    array_key: &Expression,
    aliases: &HashSet<String>,
) -> ExpressionResult<Vec<AlignedAny>> {
    match array_key {
        Expression::Array(key) => gather_with(expr, key, aliases),
        _ => Ok(Vec::new()),
    }
}

fn gather_with(
    expr: &Expression,
    key: &ArrayMap,
    aliases: &HashSet<String>,
) -> ExpressionResult<Vec<AlignedAny>> {
    let mut gatherer = Gatherer {
        key,
        aliases,
        found: Vec::new(),
    };
    traverse(&mut gatherer, expr)?;
    Ok(gatherer.found)
}

struct Gatherer<'k> {
    key: &'k ArrayMap,
    aliases: &'k HashSet<String>,
    found: Vec<AlignedAny>,
}

impl Gatherer<'_> {
    fn gather(
        &mut self,
        comprehension: &Comprehension,
        build: fn(Bindings, Expression) -> Expression,
    ) -> ExpressionResult<()> {
        match align(comprehension, self.key, self.aliases)? {
            Some((bindings, satisfies)) => {
                self.found.push(AlignedAny {
                    original: build(
                        comprehension.bindings.clone(),
                        comprehension.satisfies.clone(),
                    ),
                    renamed: build(bindings, satisfies),
                });
                Ok(())
            }
            None => comprehension_children(self, comprehension),
        }
    }
}

impl Traverser for Gatherer<'_> {
    fn visit_any(&mut self, any: &Comprehension) -> ExpressionResult<()> {
        self.gather(any, Expression::any)
    }

    fn visit_any_every(&mut self, any_every: &Comprehension) -> ExpressionResult<()> {
        self.gather(any_every, Expression::any_every)
    }
}

/// Renamed bindings and SATISFIES clause, or `None` when the shapes differ
fn align(
    comprehension: &Comprehension,
    key: &ArrayMap,
    aliases: &HashSet<String>,
) -> ExpressionResult<Option<(Bindings, Expression)>> {
    let bindings = &comprehension.bindings;
    if align_variables(bindings, &key.bindings).is_none() {
        return Ok(None);
    }

    let nested = collect_bindings(&comprehension.satisfies)?;
    let renames = match rename_bindings(bindings, &key.bindings, aliases, &nested) {
        RenameOutcome::Same => BTreeMap::new(),
        RenameOutcome::Rename(renames) => renames,
        RenameOutcome::Conflict => {
            let from: Vec<&str> = bindings.variables().collect();
            let to: Vec<&str> = key.bindings.variables().collect();
            return Err(ExpressionError::BindingConflict(format!(
                "cannot rename [{}] to [{}]",
                from.join(", "),
                to.join(", ")
            )));
        }
    };

    if !renames.is_empty() && contains_correlated_subquery(&comprehension.satisfies)? {
        return Err(ExpressionError::BindingConflict(
            "renamed variables are visible to a correlated subquery".to_string(),
        ));
    }
    debug!("aligned comprehension with index key, renames {:?}", renames);

    let renamed_bindings = rename_binding_variables(bindings, &renames)?;
    let mut satisfies = rename_variables(&comprehension.satisfies, &renames)?;

    if let Expression::Array(inner) = &key.mapping {
        let mut inner_aliases = aliases.clone();
        inner_aliases.extend(key.bindings.variables().map(String::from));
        for aligned in gather_with(&satisfies, inner, &inner_aliases)? {
            satisfies = replace(&satisfies, &aligned.original, &aligned.renamed)?;
        }
    }
    Ok(Some((renamed_bindings, satisfies)))
}

/// Copy of `expr` with every occurrence of `target` replaced
fn replace(
    expr: &Expression,
    target: &Expression,
    replacement: &Expression,
) -> ExpressionResult<Expression> {
    if expr.equivalent_to(target) {
        return Ok(replacement.clone());
    }
    expr.map_children(&mut |child| replace(child, target, replacement))
}

struct ArrayIdAssigner {
    last: u32,
}

impl ArrayIdAssigner {
    fn assign(&mut self, comprehension: &Comprehension) -> ExpressionResult<()> {
        self.last = self
            .last
            .checked_add(1)
            .ok_or_else(|| ExpressionError::evaluation("array id", "id space exhausted"))?;
        if comprehension.array_id.set(self.last).is_err() {
            trace!("comprehension already numbered, keeping its id");
        }
        traverse(self, &comprehension.satisfies)?;
        for source in comprehension.bindings.sources() {
            traverse(self, source)?;
        }
        Ok(())
    }
}

impl Traverser for ArrayIdAssigner {
    fn visit_any(&mut self, any: &Comprehension) -> ExpressionResult<()> {
        self.assign(any)
    }

    fn visit_every(&mut self, every: &Comprehension) -> ExpressionResult<()> {
        self.assign(every)
    }

    fn visit_any_every(&mut self, any_every: &Comprehension) -> ExpressionResult<()> {
        self.assign(any_every)
    }
}

/// Number every ANY, EVERY and ANY AND EVERY in pre-order, starting above
/// `seed`. Returns the last id handed out. Ids are set once; numbering an
/// already numbered tree keeps the original ids.
pub fn assign_array_id(expr: &Expression, seed: u32) -> ExpressionResult<u32> {
    let mut assigner = ArrayIdAssigner { last: seed };
    traverse(&mut assigner, expr)?;
    Ok(assigner.last)
}

struct CorrelationFinder {
    found: bool,
}

impl Traverser for CorrelationFinder {
    fn visit_subquery(&mut self, subquery: &Subquery) -> ExpressionResult<()> {
        self.found |= subquery.correlated;
        Ok(())
    }
}

pub fn contains_correlated_subquery(expr: &Expression) -> ExpressionResult<bool> {
    let mut finder = CorrelationFinder { found: false };
    traverse(&mut finder, expr)?;
    Ok(finder.found)
}

/// Counts free references to keyspace aliases
struct KeyspaceCounter<'k> {
    keyspaces: &'k HashSet<String>,
    bound: Vec<String>,
    counts: BTreeMap<String, usize>,
}

impl KeyspaceCounter<'_> {
    fn scoped<F>(&mut self, bindings: &Bindings, body: F) -> ExpressionResult<()>
    where
        F: FnOnce(&mut Self) -> ExpressionResult<()>,
    {
        for source in bindings.sources() {
            traverse(self, source)?;
        }
        let depth = self.bound.len();
        self.bound.extend(bindings.variables().map(String::from));
        let result = body(self);
        self.bound.truncate(depth);
        result
    }
}

impl Traverser for KeyspaceCounter<'_> {
    fn visit_identifier(&mut self, name: &str) -> ExpressionResult<()> {
        if self.keyspaces.contains(name) && !self.bound.iter().any(|b| b == name) {
            *self.counts.entry(name.to_string()).or_default() += 1;
        }
        Ok(())
    }

    fn visit_any(&mut self, any: &Comprehension) -> ExpressionResult<()> {
        self.scoped(&any.bindings, |t| traverse(t, &any.satisfies))
    }

    fn visit_every(&mut self, every: &Comprehension) -> ExpressionResult<()> {
        self.scoped(&every.bindings, |t| traverse(t, &every.satisfies))
    }

    fn visit_any_every(&mut self, any_every: &Comprehension) -> ExpressionResult<()> {
        self.scoped(&any_every.bindings, |t| traverse(t, &any_every.satisfies))
    }

    fn visit_array(&mut self, array: &ArrayMap) -> ExpressionResult<()> {
        self.scoped(&array.bindings, |t| {
            traverse(t, &array.mapping)?;
            array.when.as_ref().map_or(Ok(()), |w| traverse(t, w))
        })
    }

    fn visit_first(&mut self, first: &ArrayMap) -> ExpressionResult<()> {
        self.visit_array(first)
    }

    fn visit_object(&mut self, object: &ObjectMap) -> ExpressionResult<()> {
        self.scoped(&object.bindings, |t| {
            traverse(t, &object.name_mapping)?;
            traverse(t, &object.value_mapping)?;
            object.when.as_ref().map_or(Ok(()), |w| traverse(t, w))
        })
    }
}

/// Number of free references to each of `keyspaces` in `expr`. Names
/// rebound by a comprehension are not counted inside it.
pub fn count_keyspace_references(
    expr: &Expression,
    keyspaces: &HashSet<String>,
) -> ExpressionResult<BTreeMap<String, usize>> {
    let mut counter = KeyspaceCounter {
        keyspaces,
        bound: Vec::new(),
        counts: BTreeMap::new(),
    };
    traverse(&mut counter, expr)?;
    Ok(counter.counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::Binding;

    fn ident(name: &str) -> Expression {
        Expression::identifier(name)
    }

    fn over(variable: &str, source: &str) -> Bindings {
        Bindings::single(Binding::new(variable, Expression::path(source)))
    }

    fn eq(a: Expression, b: i64) -> Expression {
        Expression::eq(a, Expression::constant(b))
    }

    /// ARRAY v FOR v IN a.b END
    fn flat_key() -> Expression {
        Expression::array(over("v", "a.b"), ident("v"), None)
    }

    #[test]
    fn test_gather_renames_to_key_variables() -> ExpressionResult<()> {
        let predicate = Expression::any(over("x", "a.b"), eq(ident("x"), 3));
        let filter = Expression::and(vec![eq(Expression::path("c"), 1), predicate.clone()]);

        let found = gather_any(&filter, &flat_key(), &HashSet::new())?;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].original, predicate);
        assert_eq!(found[0].renamed, Expression::any(over("v", "a.b"), eq(ident("v"), 3)));
        Ok(())
    }

    #[test]
    fn test_gather_skips_other_sources() -> ExpressionResult<()> {
        let predicate = Expression::any(over("x", "a.other"), eq(ident("x"), 3));
        assert!(gather_any(&predicate, &flat_key(), &HashSet::new())?.is_empty());
        assert!(gather_any(&predicate, &Expression::path("a.b"), &HashSet::new())?.is_empty());
        Ok(())
    }

    #[test]
    fn test_gather_conflicts() {
        // The new name is a keyspace alias
        let predicate = Expression::any(over("x", "a.b"), eq(ident("x"), 3));
        let aliases: HashSet<String> = ["v".to_string()].into_iter().collect();
        let err = gather_any(&predicate, &flat_key(), &aliases).unwrap_err();
        assert!(matches!(err, ExpressionError::BindingConflict(_)));

        // Renamed variables reach a correlated subquery
        let correlated = Expression::any(
            over("x", "a.b"),
            Expression::and(vec![eq(ident("x"), 3), Expression::subquery("sq", true)]),
        );
        let err = gather_any(&correlated, &flat_key(), &HashSet::new()).unwrap_err();
        assert!(matches!(err, ExpressionError::BindingConflict(_)));

        // Without a rename the correlated subquery is harmless
        let same = Expression::any(
            over("v", "a.b"),
            Expression::and(vec![eq(ident("v"), 3), Expression::subquery("sq", true)]),
        );
        assert!(gather_any(&same, &flat_key(), &HashSet::new()).is_ok());
    }

    #[test]
    fn test_gather_nested_levels() -> ExpressionResult<()> {
        // ARRAY (ARRAY w FOR w IN v.c END) FOR v IN a END
        let key = Expression::array(
            over("v", "a"),
            Expression::array(over("w", "v.c"), ident("w"), None),
            None,
        );
        // ANY x IN a SATISFIES (ANY y IN x.c SATISFIES y = 1 END) END
        let predicate = Expression::any(
            over("x", "a"),
            Expression::any(over("y", "x.c"), eq(ident("y"), 1)),
        );
        let found = gather_any(&predicate, &key, &HashSet::new())?;
        assert_eq!(found.len(), 1);
        assert_eq!(
            found[0].renamed,
            Expression::any(over("v", "a"), Expression::any(over("w", "v.c"), eq(ident("w"), 1)))
        );
        Ok(())
    }

    #[test]
    fn test_assign_array_id_pre_order() -> ExpressionResult<()> {
        let inner = Expression::every(over("y", "x.c"), eq(ident("y"), 1));
        let outer = Expression::any(over("x", "a"), inner);
        let sibling = Expression::any_every(over("z", "b"), eq(ident("z"), 2));
        let expr = Expression::and(vec![outer, sibling]);

        assert_eq!(assign_array_id(&expr, 10)?, 13);
        let Expression::And(operands) = &expr else {
            return Err(ExpressionError::evaluation("test", "expected AND"));
        };
        assert_eq!(operands[0].array_id(), Some(11));
        let Expression::Any(outer) = &operands[0] else {
            return Err(ExpressionError::evaluation("test", "expected ANY"));
        };
        assert_eq!(outer.satisfies.array_id(), Some(12));
        assert_eq!(operands[1].array_id(), Some(13));

        // Renumbering keeps the ids already assigned
        assign_array_id(&expr, 100)?;
        assert_eq!(operands[0].array_id(), Some(11));
        Ok(())
    }

    #[test]
    fn test_count_keyspace_references() -> ExpressionResult<()> {
        let keyspaces: HashSet<String> = ["t".to_string(), "u".to_string()].into_iter().collect();
        // t.a = 1 AND ANY t IN u.list SATISFIES t = 2 END
        let expr = Expression::and(vec![
            eq(Expression::path("t.a"), 1),
            Expression::any(over("t", "u.list"), eq(ident("t"), 2)),
        ]);
        let counts = count_keyspace_references(&expr, &keyspaces)?;
        assert_eq!(counts.get("t"), Some(&1));
        assert_eq!(counts.get("u"), Some(&1));
        Ok(())
    }

    #[test]
    fn test_correlated_subquery_detection() -> ExpressionResult<()> {
        assert!(!contains_correlated_subquery(&Expression::subquery("s", false))?);
        let nested = Expression::not(Expression::exists(Expression::subquery("s", true)));
        assert!(contains_correlated_subquery(&nested)?);
        Ok(())
    }
}
