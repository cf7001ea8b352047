//! Binding variable renaming.
//!
//! [`rename_bindings`] decides whether one set of comprehension bindings can
//! be renamed to another. [`rename_variables`] applies the resulting map to
//! an expression, leaving names shadowed by inner comprehensions alone.

use crate::expression::{Binding, Bindings, Expression, ExpressionResult};
use log::debug;
use std::collections::{BTreeMap, HashSet};

/// Outcome of comparing two binding sets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameOutcome {
    /// Same variables in the same positions
    Same,
    /// The sets cannot be aligned without ambiguity
    Conflict,
    /// Old name to new name, for every variable that changes
    Rename(BTreeMap<String, String>),
}

/// Both bindings iterate the same source the same way, once the renames of
/// earlier positions are applied to `from`'s source
fn same_shape(from: &Binding, to: &Binding, renames: &BTreeMap<String, String>) -> bool {
    from.descend == to.descend
        && from.name_variable.is_some() == to.name_variable.is_some()
        && renamed_source(from, renames).is_ok_and(|source| source.equivalent_to(&to.expression))
}

/// Rename map that turns `from`'s variables into `to`'s, position by
/// position. `None` when some position differs in shape.
pub(crate) fn align_variables(from: &Bindings, to: &Bindings) -> Option<BTreeMap<String, String>> {
    if from.len() != to.len() {
        return None;
    }
    let mut renames = BTreeMap::new();
    for (f, t) in from.iter().zip(to) {
        if !same_shape(f, t, &renames) {
            return None;
        }
        let names = std::iter::once((&f.variable, &t.variable))
            .chain(f.name_variable.iter().zip(t.name_variable.iter()));
        for (old, new) in names {
            if old != new {
                renames.insert(old.clone(), new.clone());
            }
        }
    }
    Some(renames)
}

fn renamed_source(
    binding: &Binding,
    renames: &BTreeMap<String, String>,
) -> ExpressionResult<Expression> {
    if renames.is_empty() {
        return Ok(binding.expression.clone());
    }
    rename_variables(&binding.expression, renames)
}

/// Align `from` (existing bindings) with `to` (the names wanted instead).
///
/// A new name is rejected when it is one of the caller's `aliases` or is
/// bound by one of the `nested` binding sets, since either would capture
/// references to it.
pub fn rename_bindings(
    from: &Bindings,
    to: &Bindings,
    aliases: &HashSet<String>,
    nested: &[Bindings],
) -> RenameOutcome {
    let Some(renames) = align_variables(from, to) else {
        return RenameOutcome::Conflict;
    };
    if renames.is_empty() {
        return RenameOutcome::Same;
    }

    for new in renames.values() {
        if aliases.contains(new) || nested.iter().any(|b| b.binds(new)) {
            debug!("rename to {} conflicts with an alias or nested binding", new);
            return RenameOutcome::Conflict;
        }
        // An unchanged variable of `from` already uses the new name
        if from.binds(new) && !renames.contains_key(new) {
            return RenameOutcome::Conflict;
        }
    }
    RenameOutcome::Rename(renames)
}

/// Rewrite free references to renamed variables. The result is always a
/// new tree.
pub fn rename_variables(
    expr: &Expression,
    renames: &BTreeMap<String, String>,
) -> ExpressionResult<Expression> {
    Renamer {
        renames,
        shadowed: Vec::new(),
    }
    .rename(expr)
}

/// `bindings` with their own variable names renamed. A source is rewritten
/// only where it refers to an earlier binding's variable; everything else in
/// it belongs to the enclosing scope.
pub fn rename_binding_variables(
    bindings: &Bindings,
    renames: &BTreeMap<String, String>,
) -> ExpressionResult<Bindings> {
    let rename = |name: &String| renames.get(name).unwrap_or(name).clone();
    let mut earlier = BTreeMap::new();
    let mut renamed = Vec::with_capacity(bindings.len());
    for b in bindings {
        renamed.push(Binding {
            variable: rename(&b.variable),
            name_variable: b.name_variable.as_ref().map(rename),
            expression: renamed_source(b, &earlier)?,
            descend: b.descend,
        });
        for name in std::iter::once(&b.variable).chain(b.name_variable.iter()) {
            if let Some(new) = renames.get(name) {
                earlier.insert(name.clone(), new.clone());
            }
        }
    }
    Bindings::new(renamed)
}

struct Renamer<'r> {
    renames: &'r BTreeMap<String, String>,
    /// Names rebound by enclosing inner comprehensions
    shadowed: Vec<String>,
}

impl Renamer<'_> {
    fn rename(&mut self, expr: &Expression) -> ExpressionResult<Expression> {
        match expr {
            Expression::Identifier(name) if !self.shadowed.contains(name) => {
                Ok(match self.renames.get(name) {
                    Some(new) => Expression::identifier(new.clone()),
                    None => expr.clone(),
                })
            }
            _ => match expr.bindings() {
                Some(bindings) => self.rename_comprehension(expr, bindings),
                None => expr.map_children(&mut |child| self.rename(child)),
            },
        }
    }

    /// Sources are renamed in the current scope; the body with this
    /// comprehension's variables shadowed.
    fn rename_comprehension(
        &mut self,
        expr: &Expression,
        bindings: &Bindings,
    ) -> ExpressionResult<Expression> {
        let sources = bindings.len();
        let bound: Vec<String> = bindings
            .variables()
            .filter(|v| self.renames.contains_key(*v))
            .map(String::from)
            .collect();

        let mut position = 0;
        let depth = self.shadowed.len();
        let result = expr.map_children(&mut |child| {
            if position == sources {
                self.shadowed.extend(bound.iter().cloned());
            }
            position += 1;
            self.rename(child)
        });
        self.shadowed.truncate(depth);
        result
    }
}
